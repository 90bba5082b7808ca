//! 引用类数据处理器
//!
//! 单引用 (`link`) 存储一个被引用对象的标识，多引用 (`list`/`set`/`map`/`hierarch`)
//! 存储多个标识。可选的反向引用声明被引用类中记录反向关系的字段。

use super::{BaseType, DataHandler, HandlerOptions};
use crate::error::LodelResult;
use crate::leapi::LeClass;
use crate::types::DataValue;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// 引用描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    /// 允许引用的类名
    pub allowed_classes: Vec<String>,
    /// 反向引用 (类名, 字段名)
    pub back_reference: Option<(String, String)>,
}

impl ReferenceSpec {
    fn from_options(options: &HandlerOptions) -> LodelResult<Self> {
        let allowed_classes = options.get_str_list("allowed_classes").unwrap_or_default();
        let back_reference = match options.get("back_reference") {
            None => None,
            Some(JsonValue::Array(items)) if items.len() == 2 => {
                match (items[0].as_str(), items[1].as_str()) {
                    (Some(class), Some(field)) => Some((class.to_string(), field.to_string())),
                    _ => return Err(invalid_back_reference(options)),
                }
            }
            Some(JsonValue::String(s)) => match s.split_once('.') {
                Some((class, field)) if !class.is_empty() && !field.is_empty() => {
                    Some((class.to_string(), field.to_string()))
                }
                _ => return Err(invalid_back_reference(options)),
            },
            Some(_) => return Err(invalid_back_reference(options)),
        };
        Ok(Self {
            allowed_classes,
            back_reference,
        })
    }
}

fn invalid_back_reference(options: &HandlerOptions) -> crate::error::LodelError {
    crate::lodel_error!(
        model,
        format!(
            "back_reference 必须是 [类名, 字段名] 或 \"类名.字段名\"，实际为 {:?}",
            options.get("back_reference")
        )
    )
}

/// 转换一个被引用对象的标识：整数、数字字符串转为整数，其余字符串原样保留
fn cast_uid(handler: &dyn DataHandler, value: &DataValue) -> LodelResult<DataValue> {
    match value {
        DataValue::Int(i) => Ok(DataValue::Int(*i)),
        DataValue::String(s) => Ok(s
            .trim()
            .parse::<i64>()
            .map(DataValue::Int)
            .unwrap_or_else(|_| DataValue::String(s.clone()))),
        other => Err(handler.invalid(&format!(
            "引用值必须是对象标识，实际为 {}",
            other.type_name()
        ))),
    }
}

fn is_uid(value: &DataValue) -> bool {
    matches!(value, DataValue::Int(_) | DataValue::String(_))
}

/// 单引用
#[derive(Debug)]
pub struct SingleRefHandler {
    options: HandlerOptions,
    reference: ReferenceSpec,
}

impl SingleRefHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        let reference = ReferenceSpec::from_options(&options)?;
        Ok(Self { options, reference })
    }
}

impl DataHandler for SingleRefHandler {
    fn name(&self) -> &'static str {
        "link"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::SingleRef
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        cast_uid(self, value)
    }

    fn check_data_consistency(
        &self,
        _class: &LeClass,
        fieldname: &str,
        datas: &HashMap<String, DataValue>,
    ) -> LodelResult<()> {
        match datas.get(fieldname) {
            None | Some(DataValue::Null) => Ok(()),
            Some(value) if is_uid(value) => Ok(()),
            Some(value) => Err(self.invalid(&format!("'{}' 不是对象标识", value))),
        }
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn is_singlereference(&self) -> bool {
        true
    }

    fn reference(&self) -> Option<&ReferenceSpec> {
        Some(&self.reference)
    }
}

/// 多引用的容器形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleRefKind {
    List,
    /// 去重，保留首次出现的顺序
    Set,
    /// 键到标识的映射
    Map,
}

/// 多引用
#[derive(Debug)]
pub struct MultipleRefHandler {
    options: HandlerOptions,
    reference: ReferenceSpec,
    kind: MultipleRefKind,
    max_item: Option<usize>,
}

impl MultipleRefHandler {
    pub fn new(kind: MultipleRefKind, options: HandlerOptions) -> LodelResult<Self> {
        let reference = ReferenceSpec::from_options(&options)?;
        let max_item = options
            .get_i64("max_item")
            .filter(|m| *m > 0)
            .map(|m| m as usize);
        Ok(Self {
            options,
            reference,
            kind,
            max_item,
        })
    }

    pub fn kind(&self) -> MultipleRefKind {
        self.kind
    }

    pub fn max_item(&self) -> Option<usize> {
        self.max_item
    }

    fn cast_items(&self, value: &DataValue) -> LodelResult<Vec<DataValue>> {
        match value {
            DataValue::Array(items) => items.iter().map(|item| cast_uid(self, item)).collect(),
            DataValue::String(s) => s
                .split(',')
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .map(|part| cast_uid(self, &DataValue::String(part.to_string())))
                .collect(),
            other => cast_uid(self, other).map(|uid| vec![uid]),
        }
    }
}

impl DataHandler for MultipleRefHandler {
    fn name(&self) -> &'static str {
        match self.kind {
            MultipleRefKind::List => "list",
            MultipleRefKind::Set => "set",
            MultipleRefKind::Map => "map",
        }
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::MultipleRef
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        match (self.kind, value) {
            (MultipleRefKind::Map, DataValue::Object(map)) => {
                let mut casted = HashMap::with_capacity(map.len());
                for (key, uid) in map {
                    casted.insert(key.clone(), cast_uid(self, uid)?);
                }
                Ok(DataValue::Object(casted))
            }
            (MultipleRefKind::Map, other) => Err(self.invalid(&format!(
                "map 引用需要对象，实际为 {}",
                other.type_name()
            ))),
            (MultipleRefKind::Set, _) => {
                let mut unique: Vec<DataValue> = Vec::new();
                for uid in self.cast_items(value)? {
                    if !unique.contains(&uid) {
                        unique.push(uid);
                    }
                }
                Ok(DataValue::Array(unique))
            }
            (MultipleRefKind::List, _) => self.cast_items(value).map(DataValue::Array),
        }
    }

    fn check_data_consistency(
        &self,
        _class: &LeClass,
        fieldname: &str,
        datas: &HashMap<String, DataValue>,
    ) -> LodelResult<()> {
        let uids: Vec<&DataValue> = match datas.get(fieldname) {
            None | Some(DataValue::Null) => return Ok(()),
            Some(DataValue::Array(items)) => items.iter().collect(),
            Some(DataValue::Object(map)) => map.values().collect(),
            Some(other) => {
                return Err(self.invalid(&format!("多引用的值必须是集合，实际为 {}", other.type_name())));
            }
        };
        if let Some(bad) = uids.iter().find(|uid| !is_uid(uid)) {
            return Err(self.invalid(&format!("'{}' 不是对象标识", bad)));
        }
        if let Some(max) = self.max_item {
            if uids.len() > max {
                return Err(self.invalid(&format!(
                    "引用数量 {} 超过 max_item {}",
                    uids.len(),
                    max
                )));
            }
        }
        Ok(())
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn reference(&self) -> Option<&ReferenceSpec> {
        Some(&self.reference)
    }
}

/// 树形层级的子节点列表，必须声明反向引用（父节点字段）
#[derive(Debug)]
pub struct HierarchHandler {
    inner: MultipleRefHandler,
}

impl HierarchHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        let inner = MultipleRefHandler::new(MultipleRefKind::List, options)?;
        if inner.reference.back_reference.is_none() {
            return Err(crate::lodel_error!(model, "hierarch 处理器必须声明 back_reference"));
        }
        Ok(Self { inner })
    }
}

impl DataHandler for HierarchHandler {
    fn name(&self) -> &'static str {
        "hierarch"
    }

    fn options(&self) -> &HandlerOptions {
        self.inner.options()
    }

    fn base_type(&self) -> BaseType {
        BaseType::MultipleRef
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        self.inner.cast_value(value)
    }

    fn check_data_consistency(
        &self,
        class: &LeClass,
        fieldname: &str,
        datas: &HashMap<String, DataValue>,
    ) -> LodelResult<()> {
        self.inner.check_data_consistency(class, fieldname, datas)?;
        let own_uid = class.uid().first().and_then(|uid| datas.get(uid));
        if let (Some(own), Some(DataValue::Array(children))) = (own_uid, datas.get(fieldname)) {
            if children.iter().any(|child| child.loose_eq(own)) {
                return Err(self.invalid("对象不能成为自身的子节点"));
            }
        }
        Ok(())
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn reference(&self) -> Option<&ReferenceSpec> {
        self.inner.reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(value: serde_json::Value) -> HandlerOptions {
        HandlerOptions::from_json(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_back_reference_forms() {
        let a = SingleRefHandler::new(opts(json!({
            "allowed_classes": ["Person"],
            "back_reference": ["Person", "linked_texts"]
        })))
        .unwrap();
        let b = SingleRefHandler::new(opts(json!({
            "allowed_classes": "Person",
            "back_reference": "Person.linked_texts"
        })))
        .unwrap();
        assert_eq!(a.reference(), b.reference());
        assert_eq!(a.back_reference(), Some(("Person", "linked_texts")));
        assert!(SingleRefHandler::new(opts(json!({"back_reference": "nodot"}))).is_err());
    }

    #[test]
    fn test_set_deduplicates_in_order() {
        let handler = MultipleRefHandler::new(MultipleRefKind::Set, HandlerOptions::default()).unwrap();
        assert_eq!(
            handler.check_data_value(&DataValue::String("3, 1,3,2".into())).unwrap(),
            DataValue::Array(vec![DataValue::Int(3), DataValue::Int(1), DataValue::Int(2)])
        );
    }

    #[test]
    fn test_map_requires_object() {
        let handler = MultipleRefHandler::new(MultipleRefKind::Map, HandlerOptions::default()).unwrap();
        assert!(handler.check_data_value(&DataValue::Array(vec![])).is_err());
        let mut map = HashMap::new();
        map.insert("main".to_string(), DataValue::String("7".into()));
        assert_eq!(
            handler.check_data_value(&DataValue::Object(map)).unwrap(),
            DataValue::Object(HashMap::from([("main".to_string(), DataValue::Int(7))]))
        );
    }

    #[test]
    fn test_hierarch_needs_back_reference() {
        assert!(HierarchHandler::new(HandlerOptions::default()).is_err());
        assert!(HierarchHandler::new(opts(json!({
            "allowed_classes": ["Section"],
            "back_reference": ["Section", "parent"]
        })))
        .is_ok());
    }
}
