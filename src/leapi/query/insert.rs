//! 插入查询

use super::LeQuery;
use crate::datahandlers::ConstructContext;
use crate::error::{LodelError, LodelResult};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::DataValue;
use async_trait::async_trait;
use rat_logger::{debug, info};
use std::sync::Arc;

/// 插入查询，目标必须是具体类
#[derive(Debug)]
pub struct LeInsertQuery {
    model: LeModel,
    target: Arc<LeClass>,
}

impl LeInsertQuery {
    pub fn new(model: &LeModel, target: Arc<LeClass>) -> LodelResult<Self> {
        if target.is_abstract() {
            return Err(crate::lodel_error!(
                query,
                format!("无法插入抽象类 {} 的实例", target.name())
            ));
        }
        Ok(Self {
            model: model.clone(),
            target,
        })
    }

    pub fn target(&self) -> &Arc<LeClass> {
        &self.target
    }

    /// 分配一个数字标识
    ///
    /// 批量插入时只向数据源申请一次，之后的行在上一个标识上递增
    async fn allocate_id(&self, last: &mut Option<i64>) -> LodelResult<i64> {
        let id = match *last {
            Some(previous) => previous + 1,
            None => {
                self.target
                    .rw_datasource()?
                    .new_numeric_id(&self.model, &self.target)
                    .await?
            }
        };
        *last = Some(id);
        Ok(id)
    }

    /// 检查、分配标识、构造并校验一致性
    async fn prepare(&self, datas: &Row, last_id: &mut Option<i64>) -> LodelResult<Row> {
        let checked = self.target.check_datas_value(datas, true, false)?;

        let needs_id = self.target.uid().iter().any(|fname| {
            self.target
                .field(fname)
                .map(|h| h.name() == "uniqid")
                .unwrap_or(false)
                && checked.get(fname).map_or(true, |v| v.is_null())
        });
        let new_uid = if needs_id {
            Some(DataValue::Int(self.allocate_id(last_id).await?))
        } else {
            None
        };

        let constructed = self
            .target
            .construct_datas(&checked, &ConstructContext::creation(new_uid))?;
        self.target.check_datas_consistency(&constructed)?;
        Ok(constructed)
    }

    /// 插入多行，任何一行准备失败时不写入任何数据
    pub async fn insert_multi(&self, rows: Vec<Row>) -> LodelResult<Vec<DataValue>> {
        let rw = self.target.rw_datasource()?;
        let mut prepared = Vec::with_capacity(rows.len());
        let mut errors: Vec<(String, LodelError)> = Vec::new();
        let mut last_id = None;
        for (i, row) in rows.iter().enumerate() {
            match self.prepare(row, &mut last_id).await {
                Ok(datas) => prepared.push(datas),
                Err(e) => errors.push((i.to_string(), e)),
            }
        }
        if !errors.is_empty() {
            return Err(LodelError::DataCheckErrors {
                message: crate::i18n::tf("error.insert_multi", &[("class", self.target.name())]),
                errors,
            });
        }
        let uids = rw.insert_multi(&self.model, &self.target, prepared).await?;
        info!("批量插入 {} 条 {} 数据", uids.len(), self.target.name());
        Ok(uids)
    }
}

#[async_trait]
impl LeQuery for LeInsertQuery {
    type Output = DataValue;

    fn target_name(&self) -> &str {
        self.target.name()
    }

    async fn execute(&self, datas: Option<Row>) -> LodelResult<DataValue> {
        let datas = datas.ok_or_else(|| crate::lodel_error!(query, "插入查询需要数据"))?;
        let rw = self.target.rw_datasource()?;
        let prepared = self.prepare(&datas, &mut None).await?;
        debug!(
            "插入 {} 数据: {:?}",
            self.target.name(),
            self.target.loggable(&prepared)
        );
        let uid = rw.insert(&self.model, &self.target, prepared).await?;
        info!("插入 {} 成功，标识: {}", self.target.name(), uid);
        Ok(uid)
    }
}
