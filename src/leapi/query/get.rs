//! 获取查询

use super::{LeFilteredQuery, LeQuery, OrderClause, QueryFilter};
use crate::adapter::SelectQuery;
use crate::error::{LodelError, LodelResult};
use crate::leapi::{LeClass, LeModel, Row};
use async_trait::async_trait;
use rat_logger::debug;
use std::sync::Arc;

/// 获取查询的选项
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// 返回的字段，None 表示全部字段
    pub field_list: Option<Vec<String>>,
    pub order: Vec<OrderClause>,
    pub group: Vec<OrderClause>,
    /// 必须大于 0
    pub limit: Option<usize>,
    pub offset: usize,
}

impl GetOptions {
    pub fn fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.field_list = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn order(mut self, clause: OrderClause) -> Self {
        self.order.push(clause);
        self
    }

    pub fn group(mut self, clause: OrderClause) -> Self {
        self.group.push(clause);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// 获取查询
#[derive(Debug)]
pub struct LeGetQuery {
    base: LeFilteredQuery,
    field_list: Vec<String>,
    order: Vec<OrderClause>,
    group: Vec<OrderClause>,
    limit: Option<usize>,
    offset: usize,
}

impl LeGetQuery {
    pub fn new(
        model: &LeModel,
        target: Arc<LeClass>,
        filters: &[QueryFilter],
        options: GetOptions,
    ) -> LodelResult<Self> {
        let mut base = LeFilteredQuery::new(model, target.clone());
        base.set_query_filter(filters)?;

        let field_list = match options.field_list {
            None => target.fieldnames(true),
            Some(fields) => {
                let mut errors: Vec<(String, LodelError)> = Vec::new();
                let mut unique: Vec<String> = Vec::new();
                for field in fields {
                    if !target.has_field(&field) {
                        errors.push((
                            field.clone(),
                            crate::lodel_error!(query, format!("{} 中不存在字段 '{}'", target.name(), field)),
                        ));
                    } else if !unique.contains(&field) {
                        unique.push(field);
                    }
                }
                if !errors.is_empty() {
                    return Err(LodelError::QueryErrors {
                        message: crate::i18n::t("error.field_list"),
                        errors,
                    });
                }
                unique
            }
        };

        let mut errors: Vec<(String, LodelError)> = Vec::new();
        for clause in options.order.iter().chain(options.group.iter()) {
            if !target.has_field(&clause.field) {
                errors.push((
                    clause.field.clone(),
                    crate::lodel_error!(query, format!("无法按未知字段 '{}' 排序或分组", clause.field)),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(LodelError::QueryErrors {
                message: crate::i18n::t("error.order_group"),
                errors,
            });
        }

        if options.limit == Some(0) {
            return Err(crate::lodel_error!(query, "limit 必须大于 0"));
        }

        Ok(Self {
            base,
            field_list,
            order: options.order,
            group: options.group,
            limit: options.limit,
            offset: options.offset,
        })
    }

    pub fn target(&self) -> &Arc<LeClass> {
        self.base.target()
    }

    pub fn field_list(&self) -> &[String] {
        &self.field_list
    }

    pub fn filtered(&self) -> &LeFilteredQuery {
        &self.base
    }
}

#[async_trait]
impl LeQuery for LeGetQuery {
    type Output = Vec<Row>;

    fn target_name(&self) -> &str {
        self.base.target().name()
    }

    async fn execute(&self, datas: Option<Row>) -> LodelResult<Vec<Row>> {
        if datas.is_some() {
            return Err(crate::lodel_error!(query, "获取查询不接受数据"));
        }
        let target = self.base.target();
        let query = SelectQuery {
            field_list: self.field_list.clone(),
            filters: self.base.merged_filters().await?,
            relational_filters: self.base.relational_filters().to_vec(),
            order: self.order.clone(),
            group: self.group.clone(),
            limit: self.limit,
            offset: self.offset,
        };
        debug!("执行获取查询: {}", self.base);
        let rows = target
            .ro_datasource()
            .select(self.base.model(), target, &query)
            .await?;
        debug!("获取查询返回 {} 行", rows.len());
        Ok(rows)
    }
}
