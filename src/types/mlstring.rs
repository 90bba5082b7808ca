//! 多语言字符串
//!
//! 语言代码到文本的映射，用于编辑模型的显示名称以及 `mlstring` 字段的值

use crate::error::{LodelError, LodelResult};
use crate::types::DataValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 默认语言代码
pub const DEFAULT_LANG: &str = "eng";

/// 多语言字符串
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MlString {
    values: BTreeMap<String, String>,
}

impl MlString {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用默认语言创建
    pub fn with_default(text: &str) -> Self {
        let mut ml = Self::new();
        ml.set(DEFAULT_LANG, text);
        ml
    }

    pub fn set(&mut self, lang: &str, text: &str) {
        self.values.insert(lang.to_string(), text.to_string());
    }

    /// 获取指定语言的文本，不存在时回退到默认语言
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.values
            .get(lang)
            .or_else(|| self.values.get(DEFAULT_LANG))
            .map(|s| s.as_str())
    }

    /// 删除指定语言
    pub fn remove(&mut self, lang: &str) -> Option<String> {
        self.values.remove(lang)
    }

    pub fn langs(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 转换为 DataValue::Object
    pub fn to_data_value(&self) -> DataValue {
        DataValue::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
                .collect(),
        )
    }

    /// 从 DataValue 解析
    ///
    /// 接受对象（每个值必须是字符串）、JSON 对象字符串或普通字符串（视为默认语言）
    pub fn from_data_value(value: &DataValue) -> LodelResult<Self> {
        match value {
            DataValue::Object(map) => {
                let mut ml = Self::new();
                for (lang, text) in map {
                    match text {
                        DataValue::String(s) => ml.set(lang, s),
                        other => {
                            return Err(LodelError::FieldValidation {
                                field: lang.clone(),
                                message: format!("多语言字符串的值必须是字符串，实际为 {}", other.type_name()),
                            });
                        }
                    }
                }
                Ok(ml)
            }
            DataValue::String(s) if s.trim_start().starts_with('{') => {
                let parsed: BTreeMap<String, String> = serde_json::from_str(s)?;
                Ok(Self { values: parsed })
            }
            DataValue::String(s) => Ok(Self::with_default(s)),
            other => Err(LodelError::FieldValidation {
                field: "mlstring".to_string(),
                message: format!("无法将 {} 转换为多语言字符串", other.type_name()),
            }),
        }
    }
}

impl std::fmt::Display for MlString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get(DEFAULT_LANG).unwrap_or(""))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MlString {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut ml = MlString::new();
        for (lang, text) in iter {
            ml.set(lang, text);
        }
        ml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_to_default_lang() {
        let ml: MlString = [("eng", "Issue"), ("fre", "Numéro")].into_iter().collect();
        assert_eq!(ml.get("fre"), Some("Numéro"));
        assert_eq!(ml.get("ger"), Some("Issue"));
        assert_eq!(ml.to_string(), "Issue");
    }

    #[test]
    fn test_data_value_conversion() {
        let ml: MlString = [("eng", "Title"), ("fre", "Titre")].into_iter().collect();
        let back = MlString::from_data_value(&ml.to_data_value()).unwrap();
        assert_eq!(back, ml);

        let from_json = MlString::from_data_value(&DataValue::String(
            r#"{"eng": "Title", "fre": "Titre"}"#.to_string(),
        ))
        .unwrap();
        assert_eq!(from_json, ml);

        assert!(MlString::from_data_value(&DataValue::Int(3)).is_err());
    }
}
