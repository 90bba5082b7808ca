//! 更新查询
//!
//! 两种形式：
//! - 按类更新：带过滤器，执行时必须提供数据
//! - 按实例更新：以实例的标识为过滤器，使用实例自身的数据，执行时不接受数据
//!
//! 两种形式都先取出匹配的完整行，合并新数据后对每一行完整地执行
//! 检查、构造与一致性校验，再逐行写入。

use super::{LeFilteredQuery, LeQuery, QueryFilter, QueryOperator, SimpleFilter};
use crate::adapter::SelectQuery;
use crate::datahandlers::ConstructContext;
use crate::error::{LodelError, LodelResult};
use crate::leapi::{LeClass, LeModel, Row};
use async_trait::async_trait;
use rat_logger::{debug, info};
use std::sync::Arc;

/// 更新查询
#[derive(Debug)]
pub struct LeUpdateQuery {
    base: LeFilteredQuery,
    /// 按实例更新时实例自身的数据
    instance_datas: Option<Row>,
}

impl LeUpdateQuery {
    /// 按类更新
    pub fn new(model: &LeModel, target: Arc<LeClass>, filters: &[QueryFilter]) -> LodelResult<Self> {
        let mut base = LeFilteredQuery::new(model, target);
        base.set_query_filter(filters)?;
        Ok(Self {
            base,
            instance_datas: None,
        })
    }

    /// 按实例更新，`datas` 必须包含全部标识字段
    pub fn for_instance(model: &LeModel, class: Arc<LeClass>, datas: Row) -> LodelResult<Self> {
        let mut filters = Vec::new();
        for fname in class.uid() {
            let value = datas.get(fname).filter(|v| !v.is_null()).ok_or_else(|| {
                crate::lodel_error!(
                    query,
                    format!("实例缺少标识字段 '{}'，无法更新", fname)
                )
            })?;
            filters.push(QueryFilter::from(&SimpleFilter::new(
                fname,
                QueryOperator::Eq,
                value.clone(),
            )));
        }
        let mut base = LeFilteredQuery::new(model, class);
        base.set_query_filter(&filters)?;
        Ok(Self {
            base,
            instance_datas: Some(datas),
        })
    }

    pub fn target(&self) -> &Arc<LeClass> {
        self.base.target()
    }

    pub fn is_instance_update(&self) -> bool {
        self.instance_datas.is_some()
    }
}

#[async_trait]
impl LeQuery for LeUpdateQuery {
    type Output = u64;

    fn target_name(&self) -> &str {
        self.base.target().name()
    }

    async fn execute(&self, datas: Option<Row>) -> LodelResult<u64> {
        let datas = match (&self.instance_datas, datas) {
            (Some(_), Some(_)) => {
                return Err(crate::lodel_error!(
                    query,
                    "按实例更新时不接受额外数据，应直接修改实例"
                ));
            }
            (Some(instance), None) => instance.clone(),
            (None, Some(datas)) => datas,
            (None, None) => return Err(crate::lodel_error!(query, "按类更新时必须提供数据")),
        };

        let target = self.base.target();
        let model = self.base.model();
        let rw = target.rw_datasource()?;

        let query = SelectQuery {
            field_list: target.fieldnames(true),
            filters: self.base.merged_filters().await?,
            relational_filters: self.base.relational_filters().to_vec(),
            ..SelectQuery::default()
        };
        let rows = target.ro_datasource().select(model, target, &query).await?;
        debug!("更新 {}: 匹配 {} 行", target.name(), rows.len());

        let context = ConstructContext::update();
        let mut prepared = Vec::with_capacity(rows.len());
        let mut errors: Vec<(String, LodelError)> = Vec::new();
        for row in rows {
            let mut merged = row;
            for (k, v) in &datas {
                merged.insert(k.clone(), v.clone());
            }
            let key = target
                .uid()
                .iter()
                .map(|f| merged.get(f).map(|v| v.to_string()).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(",");
            match target.prepare_datas(&merged, true, true, &context) {
                Ok(constructed) => prepared.push(constructed),
                Err(e) => errors.push((key, e)),
            }
        }
        if !errors.is_empty() {
            return Err(LodelError::DataCheckErrors {
                message: crate::i18n::tf("error.update_datas", &[("class", target.name())]),
                errors,
            });
        }

        let mut updated = 0u64;
        for row in prepared {
            let uid_filters: Vec<SimpleFilter> = target
                .uid()
                .iter()
                .filter_map(|f| {
                    row.get(f)
                        .map(|v| SimpleFilter::new(f, QueryOperator::Eq, v.clone()))
                })
                .collect();
            updated += rw.update(model, target, &uid_filters, &[], &row).await?;
        }
        info!("更新 {} 完成，共 {} 行", target.name(), updated);
        Ok(updated)
    }
}
