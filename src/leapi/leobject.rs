//! 编辑对象实例
//!
//! `LeObject` 是一个具体类的实例：持有字段值，区分未初始化（只设置了部分
//! 字段）和已初始化（全部非内部字段都已设置）两种状态。类级操作
//! （get/insert/delete_bundle）以关联函数的形式提供，内部构造对应的查询对象。

use super::query::{
    GetOptions, LeDeleteQuery, LeGetQuery, LeInsertQuery, LeQuery, LeUpdateQuery, QueryFilter,
    QueryOperator, SimpleFilter,
};
use super::{LeClass, LeModel, Row};
use crate::datahandlers::ConstructContext;
use crate::error::{LodelError, LodelResult};
use crate::types::DataValue;
use rat_logger::debug;
use std::sync::Arc;

/// 编辑对象实例
#[derive(Debug, Clone)]
pub struct LeObject {
    model: LeModel,
    class: Arc<LeClass>,
    datas: Row,
    initialized: bool,
}

impl LeObject {
    /// 创建实例
    ///
    /// 必须提供全部标识字段；未知字段和内部字段汇总为一个错误
    pub fn new(model: &LeModel, class_name: &str, datas: Row) -> LodelResult<Self> {
        let class = model.class(class_name)?;
        if class.is_abstract() {
            return Err(crate::lodel_error!(
                api,
                format!("无法实例化抽象类 {}", class_name)
            ));
        }

        let mut errors: Vec<(String, LodelError)> = Vec::new();
        for fname in class.uid() {
            if datas.get(fname).map_or(true, |v| v.is_null()) {
                errors.push((
                    fname.clone(),
                    crate::lodel_error!(api, format!("缺少标识字段 '{}'", fname)),
                ));
            }
        }

        let mut fnames: Vec<&String> = datas.keys().collect();
        fnames.sort();
        let mut checked = Row::new();
        for fname in fnames {
            if class.uid().contains(fname) {
                checked.insert(fname.clone(), datas[fname].clone());
                continue;
            }
            match class.field(fname) {
                Err(e) => errors.push((fname.clone(), e)),
                Ok(handler) if handler.is_internal() => errors.push((
                    fname.clone(),
                    crate::lodel_error!(api, format!("内部字段 '{}' 不能直接设置", fname)),
                )),
                Ok(handler) => match handler.check_data_value(&datas[fname]) {
                    Ok(value) => {
                        checked.insert(fname.clone(), value);
                    }
                    Err(e) => errors.push((fname.clone(), e)),
                },
            }
        }

        if !errors.is_empty() {
            return Err(LodelError::ApiErrors {
                message: crate::i18n::tf("error.create_instance", &[("class", class_name)]),
                errors,
            });
        }

        let mut object = Self {
            model: model.clone(),
            class,
            datas: checked,
            initialized: false,
        };
        object.initialized = object.missing_fields().is_empty();
        Ok(object)
    }

    /// 由数据源返回的行构造实例，行已由数据源校验
    pub(crate) fn from_row(model: &LeModel, class: Arc<LeClass>, datas: Row) -> Self {
        let mut object = Self {
            model: model.clone(),
            class,
            datas,
            initialized: false,
        };
        object.initialized = object.missing_fields().is_empty();
        object
    }

    pub fn class(&self) -> &Arc<LeClass> {
        &self.class
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 尚未设置的非内部字段
    pub fn missing_fields(&self) -> Vec<String> {
        self.class
            .fieldnames(false)
            .into_iter()
            .filter(|f| !self.datas.contains_key(f))
            .collect()
    }

    /// 读取一个字段
    pub fn data(&self, field: &str) -> LodelResult<&DataValue> {
        self.class.field(field)?;
        self.datas.get(field).ok_or_else(|| {
            crate::lodel_error!(
                runtime,
                format!("字段 '{}' 尚未设置", field)
            )
        })
    }

    /// 全部字段值，`internal` 为 false 时排除内部字段
    pub fn datas(&self, internal: bool) -> Row {
        self.datas
            .iter()
            .filter(|(k, _)| {
                internal || self.class.field(k).map(|h| !h.is_internal()).unwrap_or(false)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 标识值，顺序与类的标识字段一致
    pub fn uid(&self) -> Vec<DataValue> {
        self.class
            .uid()
            .iter()
            .map(|f| self.datas.get(f).cloned().unwrap_or(DataValue::Null))
            .collect()
    }

    /// 设置一个字段
    ///
    /// 未初始化时只检查该字段的值；已初始化时对整个实例重新检查和构造，
    /// 成功后以构造结果替换实例数据
    pub fn set_data(&mut self, field: &str, value: DataValue) -> LodelResult<()> {
        let handler = self.class.field(field)?;
        if handler.is_internal() {
            return Err(crate::lodel_error!(
                api,
                format!("字段 '{}' 为内部字段，不能直接设置", field)
            ));
        }

        if !self.initialized {
            let value = handler.check_data_value(&value)?;
            self.datas.insert(field.to_string(), value);
            if self.missing_fields().is_empty() {
                debug!("{} 实例已初始化", self.class.name());
                self.initialized = true;
            }
            return Ok(());
        }

        let mut datas = self.datas.clone();
        datas.insert(field.to_string(), value);
        let constructed = self
            .class
            .prepare_datas(&datas, true, true, &ConstructContext::update())?;
        self.datas = constructed;
        Ok(())
    }

    /// 获取对象
    ///
    /// 显式给出字段列表时自动补上标识字段和子类标识字段。每一行按子类标识
    /// 实例化为其具体类。
    pub async fn get(
        model: &LeModel,
        class_name: &str,
        filters: &[QueryFilter],
        mut options: GetOptions,
    ) -> LodelResult<Vec<LeObject>> {
        let class = model.class(class_name)?;
        if let Some(fields) = options.field_list.as_mut() {
            let mut required: Vec<String> = class.uid().to_vec();
            if let Some(identifier) = class.subclass_identifier_field() {
                required.push(identifier.to_string());
            }
            for fname in required {
                if !fields.contains(&fname) {
                    fields.push(fname);
                }
            }
        }

        let query = LeGetQuery::new(model, class.clone(), filters, options)?;
        let rows = query.execute(None).await?;
        rows.into_iter()
            .map(|row| {
                let concrete = model.concrete_class_of(&class, &row)?;
                Ok(LeObject::from_row(model, concrete, row))
            })
            .collect()
    }

    /// 按标识获取一个对象，多于一个匹配时为致命错误
    pub async fn get_from_uid(
        model: &LeModel,
        class_name: &str,
        uid: impl Into<DataValue>,
    ) -> LodelResult<Option<LeObject>> {
        let class = model.class(class_name)?;
        let uid_field = class.uid().first().cloned().ok_or_else(|| {
            crate::lodel_error!(api, format!("类 {} 没有标识字段", class_name))
        })?;
        let filter = QueryFilter::from(&SimpleFilter::new(&uid_field, QueryOperator::Eq, uid.into()));
        let mut objects = Self::get(model, class_name, &[filter], GetOptions::default()).await?;
        match objects.len() {
            0 => Ok(None),
            1 => Ok(objects.pop()),
            n => Err(crate::lodel_error!(
                fatal,
                format!("{} 中有 {} 个对象使用同一标识", class_name, n)
            )),
        }
    }

    /// 插入新对象，返回新标识
    pub async fn insert(model: &LeModel, class_name: &str, datas: Row) -> LodelResult<DataValue> {
        let query = LeInsertQuery::new(model, model.class(class_name)?)?;
        query.execute(Some(datas)).await
    }

    /// 批量插入
    pub async fn insert_multi(
        model: &LeModel,
        class_name: &str,
        rows: Vec<Row>,
    ) -> LodelResult<Vec<DataValue>> {
        let query = LeInsertQuery::new(model, model.class(class_name)?)?;
        query.insert_multi(rows).await
    }

    /// 按过滤器删除，返回删除的行数
    pub async fn delete_bundle(
        model: &LeModel,
        class_name: &str,
        filters: &[QueryFilter],
    ) -> LodelResult<u64> {
        let query = LeDeleteQuery::new(model, model.class(class_name)?, filters)?;
        query.execute(None).await
    }

    /// 按类更新，返回更新的行数
    pub async fn update_bundle(
        model: &LeModel,
        class_name: &str,
        filters: &[QueryFilter],
        datas: Row,
    ) -> LodelResult<u64> {
        let query = LeUpdateQuery::new(model, model.class(class_name)?, filters)?;
        query.execute(Some(datas)).await
    }

    /// 保存实例，`datas` 中的字段先逐个设置到实例上
    pub async fn update(&mut self, datas: Option<Row>) -> LodelResult<u64> {
        if let Some(datas) = datas {
            let mut fnames: Vec<String> = datas.keys().cloned().collect();
            fnames.sort();
            let mut errors: Vec<(String, LodelError)> = Vec::new();
            for fname in fnames {
                if let Err(e) = self.set_data(&fname, datas[&fname].clone()) {
                    errors.push((fname, e));
                }
            }
            if !errors.is_empty() {
                return Err(LodelError::ApiErrors {
                    message: crate::i18n::tf("error.set_instance_datas", &[("class", self.class.name())]),
                    errors,
                });
            }
        }
        let query = LeUpdateQuery::for_instance(&self.model, self.class.clone(), self.datas.clone())?;
        query.execute(None).await
    }

    /// 删除实例在数据源中的数据
    pub async fn delete(&self) -> LodelResult<u64> {
        let filters: Vec<QueryFilter> = self
            .class
            .uid()
            .iter()
            .map(|f| {
                let value = self.datas.get(f).cloned().unwrap_or(DataValue::Null);
                QueryFilter::from(&SimpleFilter::new(f, QueryOperator::Eq, value))
            })
            .collect();
        let query = LeDeleteQuery::new(&self.model, self.class.clone(), &filters)?;
        query.execute(None).await
    }
}
