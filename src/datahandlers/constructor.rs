//! 数据构造器
//!
//! 按需构造字段值：读取一个字段时，若尚未构造则调用其处理器的
//! `construct_data`，处理器可以继续读取其他字段。重复进入正在构造的字段
//! 视为循环依赖。

use super::InternalKind;
use crate::error::{LodelError, LodelResult};
use crate::leapi::LeClass;
use crate::types::DataValue;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{HashMap, HashSet};

/// 构造上下文
#[derive(Debug, Clone)]
pub struct ConstructContext {
    /// 插入时预先分配的新标识
    pub new_uid: Option<DataValue>,
    /// 构造时刻
    pub now: DateTime<FixedOffset>,
    /// 是否为新建对象
    pub creation: bool,
}

impl ConstructContext {
    pub fn creation(new_uid: Option<DataValue>) -> Self {
        Self {
            new_uid,
            now: Utc::now().fixed_offset(),
            creation: true,
        }
    }

    pub fn update() -> Self {
        Self {
            new_uid: None,
            now: Utc::now().fixed_offset(),
            creation: false,
        }
    }
}

/// 字段值构造器
pub struct DatasConstructor<'a> {
    class: &'a LeClass,
    datas: &'a HashMap<String, DataValue>,
    context: &'a ConstructContext,
    constructed: HashMap<String, DataValue>,
    under_construction: HashSet<String>,
}

impl<'a> DatasConstructor<'a> {
    pub fn new(
        class: &'a LeClass,
        datas: &'a HashMap<String, DataValue>,
        context: &'a ConstructContext,
    ) -> Self {
        Self {
            class,
            datas,
            context,
            constructed: HashMap::new(),
            under_construction: HashSet::new(),
        }
    }

    pub fn context(&self) -> &ConstructContext {
        self.context
    }

    /// 构造前的原始值
    pub fn raw(&self, fname: &str) -> Option<&DataValue> {
        self.datas.get(fname)
    }

    /// 获取字段的构造值，必要时先构造
    pub fn get(&mut self, fname: &str) -> LodelResult<DataValue> {
        if let Some(value) = self.constructed.get(fname) {
            return Ok(value.clone());
        }
        if self.under_construction.contains(fname) {
            return Err(LodelError::Runtime {
                message: crate::i18n::tf("error.circular_construction", &[("field", fname)]),
            });
        }

        let class = self.class;
        let handler = class.field(fname)?.clone();
        let datas = self.datas;
        let cur_value = datas.get(fname);

        self.under_construction.insert(fname.to_string());
        let result = handler.construct_data(class, fname, self, cur_value);
        self.under_construction.remove(fname);

        let value = result?;
        self.constructed.insert(fname.to_string(), value.clone());
        Ok(value)
    }

    /// 构造类的全部字段（数据库自动维护的字段除外）
    pub fn construct_all(mut self) -> LodelResult<HashMap<String, DataValue>> {
        let class = self.class;
        for (fname, handler) in class.fields() {
            if handler.internal_kind() == InternalKind::AutoSql {
                continue;
            }
            self.get(fname)?;
        }
        Ok(self.constructed)
    }
}
