//! 数据处理器模块
//!
//! 每个字段由一个数据处理器描述：负责值的转换与校验、数据构造（可通过
//! [`DatasConstructor`] 读取其他字段）以及一致性检查。处理器按名称注册在
//! [`DataHandlerRegistry`] 中，编辑模型通过名称引用它们。

use crate::error::{LodelError, LodelResult};
use crate::leapi::LeClass;
use crate::types::DataValue;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

mod base;
mod constructor;
mod datas;
mod references;

pub use base::{
    BooleanHandler, DateTimeHandler, DecimalHandler, FileHandler, IntegerHandler, TextHandler,
    VarcharHandler,
};
pub use constructor::{ConstructContext, DatasConstructor};
pub use datas::{
    EmailsHandler, FormatStringHandler, IdentifierLevel, MlStringHandler, PasswordHandler,
    RegexHandler, SubclassIdentifierHandler, UniqIdHandler,
};
pub use references::{
    HierarchHandler, MultipleRefHandler, MultipleRefKind, ReferenceSpec, SingleRefHandler,
};

/// 内部字段的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalKind {
    /// 普通字段，可由用户设置
    None,
    /// 由处理器自动构造
    Automatic,
    /// 由数据库自动维护（不参与构造和插入）
    AutoSql,
}

/// 处理器存储的基础类型，数据源据此选择列类型和存储方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Varchar(usize),
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    MlString,
    SingleRef,
    MultipleRef,
}

/// 所有处理器共有的选项
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub nullable: bool,
    pub internal: InternalKind,
    pub uniq: bool,
    pub primary_key: bool,
    pub immutable: bool,
    pub default: Option<DataValue>,
    raw: Map<String, JsonValue>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            nullable: true,
            internal: InternalKind::None,
            uniq: false,
            primary_key: false,
            immutable: false,
            default: None,
            raw: Map::new(),
        }
    }
}

impl HandlerOptions {
    /// 从编辑模型中的 JSON 选项解析
    pub fn from_json(options: &Map<String, JsonValue>) -> LodelResult<Self> {
        let internal = match options.get("internal") {
            None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => InternalKind::None,
            Some(JsonValue::Bool(true)) => InternalKind::Automatic,
            Some(JsonValue::String(s)) if s == "automatic" => InternalKind::Automatic,
            Some(JsonValue::String(s)) if s == "autosql" => InternalKind::AutoSql,
            Some(other) => {
                return Err(crate::lodel_error!(
                    model,
                    format!("internal 选项的值无效: {}", other)
                ));
            }
        };

        let flag = |key: &str, default: bool| -> LodelResult<bool> {
            match options.get(key) {
                None | Some(JsonValue::Null) => Ok(default),
                Some(JsonValue::Bool(b)) => Ok(*b),
                Some(other) => Err(crate::lodel_error!(
                    model,
                    format!("{} 选项必须是布尔值，实际为 {}", key, other)
                )),
            }
        };

        Ok(Self {
            nullable: flag("nullable", true)?,
            internal,
            uniq: flag("uniq", false)?,
            primary_key: flag("primary_key", false)?,
            immutable: flag("immutable", false)?,
            default: options
                .get("default")
                .filter(|v| !v.is_null())
                .map(|v| crate::types::json_value_to_data_value(v.clone())),
            raw: options.clone(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.raw.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 读取字符串数组选项
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            JsonValue::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
            ),
            JsonValue::String(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// 数据处理器
pub trait DataHandler: Send + Sync + Debug {
    /// 注册名称
    fn name(&self) -> &'static str;

    fn options(&self) -> &HandlerOptions;

    fn base_type(&self) -> BaseType;

    /// 转换并校验一个非空值
    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue>;

    /// 转换并校验一个值
    ///
    /// 空值在字段可空时原样接受，否则报错
    fn check_data_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        if value.is_null() {
            if self.is_nullable() || self.is_internal() {
                return Ok(DataValue::Null);
            }
            return Err(self.invalid("字段不可为空"));
        }
        self.cast_value(value)
    }

    /// 构造字段的存储值
    ///
    /// 默认实现：保留已有值，否则使用默认值
    fn construct_data(
        &self,
        _class: &LeClass,
        _fieldname: &str,
        _datas: &mut DatasConstructor<'_>,
        cur_value: Option<&DataValue>,
    ) -> LodelResult<DataValue> {
        Ok(match cur_value {
            Some(value) if !value.is_null() => value.clone(),
            _ => self.default().cloned().unwrap_or(DataValue::Null),
        })
    }

    /// 构造完成后检查字段值与其他字段的一致性
    fn check_data_consistency(
        &self,
        _class: &LeClass,
        _fieldname: &str,
        _datas: &HashMap<String, DataValue>,
    ) -> LodelResult<()> {
        Ok(())
    }

    fn is_reference(&self) -> bool {
        false
    }

    fn is_singlereference(&self) -> bool {
        false
    }

    /// 引用处理器的引用描述
    fn reference(&self) -> Option<&ReferenceSpec> {
        None
    }

    /// 引用的类名列表
    fn linked_classes(&self) -> &[String] {
        self.reference()
            .map(|r| r.allowed_classes.as_slice())
            .unwrap_or(&[])
    }

    /// 反向引用 (类名, 字段名)
    fn back_reference(&self) -> Option<(&str, &str)> {
        self.reference()
            .and_then(|r| r.back_reference.as_ref())
            .map(|(c, f)| (c.as_str(), f.as_str()))
    }

    /// 子类标识字段的级别，普通字段返回 None
    fn identifier_level(&self) -> Option<IdentifierLevel> {
        None
    }

    /// 值是否不得出现在日志中
    fn is_secret(&self) -> bool {
        false
    }

    fn internal_kind(&self) -> InternalKind {
        self.options().internal
    }

    fn is_internal(&self) -> bool {
        self.internal_kind() != InternalKind::None
    }

    fn is_primary_key(&self) -> bool {
        self.options().primary_key
    }

    fn is_uniq(&self) -> bool {
        self.options().uniq
    }

    fn is_nullable(&self) -> bool {
        self.options().nullable
    }

    fn default(&self) -> Option<&DataValue> {
        self.options().default.as_ref()
    }

    fn directly_editable(&self) -> bool {
        !self.is_internal()
    }

    /// 构造该处理器的校验错误
    fn invalid(&self, message: &str) -> LodelError {
        LodelError::FieldValidation {
            field: self.name().to_string(),
            message: message.to_string(),
        }
    }
}

type HandlerFactory = fn(HandlerOptions) -> LodelResult<Arc<dyn DataHandler>>;

/// 数据处理器注册表
pub struct DataHandlerRegistry {
    factories: HashMap<&'static str, HandlerFactory>,
}

impl Default for DataHandlerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("varchar", |o| Ok(Arc::new(VarcharHandler::new(o)?)));
        registry.register("text", |o| Ok(Arc::new(TextHandler::new(o))));
        registry.register("integer", |o| Ok(Arc::new(IntegerHandler::new(o))));
        registry.register("decimal", |o| Ok(Arc::new(DecimalHandler::new(o))));
        registry.register("boolean", |o| Ok(Arc::new(BooleanHandler::new(o))));
        registry.register("datetime", |o| Ok(Arc::new(DateTimeHandler::new(o))));
        registry.register("file", |o| Ok(Arc::new(FileHandler::new(o)?)));
        registry.register("regex", |o| Ok(Arc::new(RegexHandler::new(o)?)));
        registry.register("password", |o| Ok(Arc::new(PasswordHandler::new(o)?)));
        registry.register("emails", |o| Ok(Arc::new(EmailsHandler::new(o))));
        registry.register("format_string", |o| Ok(Arc::new(FormatStringHandler::new(o)?)));
        registry.register("concat", |o| Ok(Arc::new(FormatStringHandler::new(o)?)));
        registry.register("uniqid", |o| Ok(Arc::new(UniqIdHandler::new(o))));
        registry.register("leobject_subclass_identifier", |o| {
            Ok(Arc::new(SubclassIdentifierHandler::new(o)?))
        });
        registry.register("mlstring", |o| Ok(Arc::new(MlStringHandler::new(o))));
        registry.register("link", |o| Ok(Arc::new(SingleRefHandler::new(o)?)));
        registry.register("list", |o| {
            Ok(Arc::new(MultipleRefHandler::new(MultipleRefKind::List, o)?))
        });
        registry.register("set", |o| {
            Ok(Arc::new(MultipleRefHandler::new(MultipleRefKind::Set, o)?))
        });
        registry.register("map", |o| {
            Ok(Arc::new(MultipleRefHandler::new(MultipleRefKind::Map, o)?))
        });
        registry.register("hierarch", |o| Ok(Arc::new(HierarchHandler::new(o)?)));
        registry
    }
}

impl DataHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（或替换）一个处理器工厂
    pub fn register(&mut self, name: &'static str, factory: HandlerFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 已注册的处理器名称（已排序）
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// 根据名称和 JSON 选项创建处理器
    pub fn create(
        &self,
        name: &str,
        options: &Map<String, JsonValue>,
    ) -> LodelResult<Arc<dyn DataHandler>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            crate::lodel_error!(model, format!("未知的数据处理器: {}", name))
        })?;
        factory(HandlerOptions::from_json(options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_registry_knows_every_builtin() {
        let registry = DataHandlerRegistry::new();
        for name in [
            "varchar",
            "text",
            "integer",
            "decimal",
            "boolean",
            "datetime",
            "file",
            "regex",
            "password",
            "emails",
            "format_string",
            "uniqid",
            "leobject_subclass_identifier",
            "mlstring",
            "link",
            "list",
            "set",
            "map",
            "hierarch",
        ] {
            assert!(registry.contains(name), "{} 未注册", name);
        }
        assert!(registry.create("nope", &Map::new()).is_err());
    }

    #[test]
    fn test_common_options() {
        let opts = HandlerOptions::from_json(&options(json!({
            "nullable": false,
            "internal": "autosql",
            "default": 3
        })))
        .unwrap();
        assert!(!opts.nullable);
        assert_eq!(opts.internal, InternalKind::AutoSql);
        assert_eq!(opts.default, Some(DataValue::Int(3)));

        assert!(HandlerOptions::from_json(&options(json!({"internal": "sometimes"}))).is_err());
        assert!(HandlerOptions::from_json(&options(json!({"nullable": "no"}))).is_err());
    }

    #[test]
    fn test_null_handling() {
        let registry = DataHandlerRegistry::new();
        let nullable = registry.create("integer", &Map::new()).unwrap();
        assert_eq!(nullable.check_data_value(&DataValue::Null).unwrap(), DataValue::Null);

        let strict = registry
            .create("integer", &options(json!({"nullable": false})))
            .unwrap();
        assert!(strict.check_data_value(&DataValue::Null).is_err());
    }
}
