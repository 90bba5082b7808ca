//! 空数据源
//!
//! 不保存任何数据：查询返回空结果，写操作返回 0 或空值，只记录调用日志

use super::{Datasource, SelectQuery};
use crate::error::LodelResult;
use crate::leapi::query::{RelationalFilter, SimpleFilter};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::DataValue;
use async_trait::async_trait;
use rat_logger::debug;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct DummyDatasource {
    name: String,
    last_id: AtomicI64,
}

impl DummyDatasource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_id: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl Datasource for DummyDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, _model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<Vec<Row>> {
        debug!("[{}] select {} {:?}", self.name, class.name(), query.filters);
        Ok(Vec::new())
    }

    async fn insert(&self, _model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
        debug!("[{}] insert {} {:?}", self.name, class.name(), class.loggable(&datas));
        Ok(DataValue::Null)
    }

    async fn update(
        &self,
        _model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        _relational_filters: &[RelationalFilter],
        datas: &Row,
    ) -> LodelResult<u64> {
        debug!(
            "[{}] update {} {:?} {:?}",
            self.name,
            class.name(),
            filters,
            class.loggable(datas)
        );
        Ok(0)
    }

    async fn delete(
        &self,
        _model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        _relational_filters: &[RelationalFilter],
    ) -> LodelResult<u64> {
        debug!("[{}] delete {} {:?}", self.name, class.name(), filters);
        Ok(0)
    }

    async fn new_numeric_id(&self, _model: &LeModel, class: &LeClass) -> LodelResult<i64> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("[{}] new_numeric_id {} -> {}", self.name, class.name(), id);
        Ok(id)
    }
}
