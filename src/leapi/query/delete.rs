//! 删除查询

use super::{LeFilteredQuery, LeQuery, QueryFilter};
use crate::error::LodelResult;
use crate::leapi::{LeClass, LeModel, Row};
use async_trait::async_trait;
use rat_logger::info;
use std::sync::Arc;

/// 删除查询，返回删除的行数
#[derive(Debug)]
pub struct LeDeleteQuery {
    base: LeFilteredQuery,
}

impl LeDeleteQuery {
    pub fn new(model: &LeModel, target: Arc<LeClass>, filters: &[QueryFilter]) -> LodelResult<Self> {
        let mut base = LeFilteredQuery::new(model, target);
        base.set_query_filter(filters)?;
        Ok(Self { base })
    }

    pub fn target(&self) -> &Arc<LeClass> {
        self.base.target()
    }
}

#[async_trait]
impl LeQuery for LeDeleteQuery {
    type Output = u64;

    fn target_name(&self) -> &str {
        self.base.target().name()
    }

    async fn execute(&self, datas: Option<Row>) -> LodelResult<u64> {
        if datas.is_some() {
            return Err(crate::lodel_error!(query, "删除查询不接受数据"));
        }
        let target = self.base.target();
        let rw = target.rw_datasource()?;
        let filters = self.base.merged_filters().await?;
        let deleted = rw
            .delete(
                self.base.model(),
                target,
                &filters,
                self.base.relational_filters(),
            )
            .await?;
        info!("删除 {} 完成，共 {} 行: {}", target.name(), deleted, self.base);
        Ok(deleted)
    }
}
