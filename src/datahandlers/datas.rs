//! 派生数据处理器
//!
//! 在基础处理器之上增加约束或自动构造逻辑的处理器

use super::base::{scalar_to_string, IntegerHandler, VarcharHandler};
use super::{BaseType, DataHandler, DatasConstructor, HandlerOptions, InternalKind};
use crate::error::LodelResult;
use crate::leapi::LeClass;
use crate::types::{DataValue, MlString};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s,]+@[^@\s,]+\.[^@\s,]+$").expect("邮箱正则表达式无效")
});

/// 必须匹配正则表达式的字符串
#[derive(Debug)]
pub struct RegexHandler {
    inner: VarcharHandler,
    regex: Regex,
}

impl RegexHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        let pattern = options
            .get_str("regex")
            .ok_or_else(|| crate::lodel_error!(model, "regex 处理器缺少 regex 选项"))?;
        let regex = Regex::new(pattern).map_err(|e| {
            crate::lodel_error!(model, format!("regex 选项无效 '{}': {}", pattern, e))
        })?;
        Ok(Self {
            inner: VarcharHandler::new(options)?,
            regex,
        })
    }
}

impl DataHandler for RegexHandler {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn options(&self) -> &HandlerOptions {
        self.inner.options()
    }

    fn base_type(&self) -> BaseType {
        self.inner.base_type()
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let text = self.inner.cast_string(self, value)?;
        if !self.regex.is_match(&text) {
            return Err(self.invalid(&format!(
                "值不匹配正则表达式 '{}'",
                self.regex.as_str()
            )));
        }
        Ok(DataValue::String(text))
    }
}

/// 密码，值不会出现在日志中
#[derive(Debug)]
pub struct PasswordHandler {
    inner: VarcharHandler,
}

impl PasswordHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        Ok(Self {
            inner: VarcharHandler::new(options)?,
        })
    }
}

impl DataHandler for PasswordHandler {
    fn name(&self) -> &'static str {
        "password"
    }

    fn options(&self) -> &HandlerOptions {
        self.inner.options()
    }

    fn base_type(&self) -> BaseType {
        self.inner.base_type()
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        match value {
            DataValue::String(_) => self.inner.cast_string(self, value).map(DataValue::String),
            _ => Err(self.invalid("密码必须是字符串")),
        }
    }

    fn is_secret(&self) -> bool {
        true
    }
}

/// 逗号分隔的邮箱地址列表
#[derive(Debug)]
pub struct EmailsHandler {
    options: HandlerOptions,
}

impl EmailsHandler {
    pub fn new(options: HandlerOptions) -> Self {
        Self { options }
    }
}

impl DataHandler for EmailsHandler {
    fn name(&self) -> &'static str {
        "emails"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Text
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let addresses: Vec<String> = match value {
            DataValue::String(s) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            DataValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| self.invalid("邮箱列表只能包含字符串"))
                })
                .collect::<LodelResult<_>>()?,
            other => {
                return Err(self.invalid(&format!(
                    "无法将 {} 转换为邮箱列表",
                    other.type_name()
                )));
            }
        };
        if let Some(bad) = addresses.iter().find(|a| !EMAIL_REGEX.is_match(a)) {
            return Err(self.invalid(&format!("'{}' 不是有效的邮箱地址", bad)));
        }
        Ok(DataValue::String(addresses.join(",")))
    }
}

/// 由其他字段拼接而成的字符串
///
/// `format_string` 中的每个 `%s` 依次替换为 `field_list` 中字段的构造值
#[derive(Debug)]
pub struct FormatStringHandler {
    inner: VarcharHandler,
    format_string: String,
    field_list: Vec<String>,
}

impl FormatStringHandler {
    pub fn new(mut options: HandlerOptions) -> LodelResult<Self> {
        let format_string = options
            .get_str("format_string")
            .ok_or_else(|| crate::lodel_error!(model, "format_string 处理器缺少 format_string 选项"))?
            .to_string();
        let field_list = options.get_str_list("field_list").unwrap_or_default();
        let placeholders = format_string.matches("%s").count();
        if placeholders != field_list.len() {
            return Err(crate::lodel_error!(
                model,
                format!(
                    "format_string 包含 {} 个占位符，但 field_list 有 {} 个字段",
                    placeholders,
                    field_list.len()
                )
            ));
        }
        if options.internal == InternalKind::None {
            options.internal = InternalKind::Automatic;
        }
        Ok(Self {
            inner: VarcharHandler::new(options)?,
            format_string,
            field_list,
        })
    }

    pub fn field_list(&self) -> &[String] {
        &self.field_list
    }
}

impl DataHandler for FormatStringHandler {
    fn name(&self) -> &'static str {
        "format_string"
    }

    fn options(&self) -> &HandlerOptions {
        self.inner.options()
    }

    fn base_type(&self) -> BaseType {
        self.inner.base_type()
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        self.inner.cast_string(self, value).map(DataValue::String)
    }

    fn construct_data(
        &self,
        _class: &LeClass,
        _fieldname: &str,
        datas: &mut DatasConstructor<'_>,
        _cur_value: Option<&DataValue>,
    ) -> LodelResult<DataValue> {
        let mut pieces = self.format_string.split("%s");
        let mut result = pieces.next().unwrap_or_default().to_string();
        for (fname, piece) in self.field_list.iter().zip(pieces) {
            let value = datas.get(fname)?;
            match value {
                DataValue::Null => {}
                DataValue::Object(_) => {
                    result.push_str(&MlString::from_data_value(&value)?.to_string())
                }
                other => result.push_str(&scalar_to_string(&other).unwrap_or_else(|| other.to_string())),
            }
            result.push_str(piece);
        }
        let max = self.inner.max_length();
        if result.chars().count() > max {
            result = result.chars().take(max).collect();
        }
        Ok(DataValue::String(result))
    }
}

/// 数字唯一标识，由数据源分配
#[derive(Debug)]
pub struct UniqIdHandler {
    options: HandlerOptions,
}

impl UniqIdHandler {
    pub fn new(mut options: HandlerOptions) -> Self {
        options.primary_key = true;
        options.uniq = true;
        if options.internal == InternalKind::None {
            options.internal = InternalKind::Automatic;
        }
        Self { options }
    }
}

impl DataHandler for UniqIdHandler {
    fn name(&self) -> &'static str {
        "uniqid"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Integer
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        IntegerHandler::cast_integer(self, value).map(DataValue::Int)
    }

    fn construct_data(
        &self,
        class: &LeClass,
        fieldname: &str,
        datas: &mut DatasConstructor<'_>,
        cur_value: Option<&DataValue>,
    ) -> LodelResult<DataValue> {
        if let Some(value) = cur_value.filter(|v| !v.is_null()) {
            return Ok(value.clone());
        }
        datas.context().new_uid.clone().ok_or_else(|| {
            crate::lodel_error!(
                runtime,
                format!("没有可用于 {}.{} 的新标识", class.name(), fieldname)
            )
        })
    }
}

/// 子类标识字段的级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierLevel {
    /// 具体类名
    Type,
    /// 根类下第一层祖先类名
    Class,
}

/// 存储对象所属类名的字段
#[derive(Debug)]
pub struct SubclassIdentifierHandler {
    options: HandlerOptions,
    level: IdentifierLevel,
}

impl SubclassIdentifierHandler {
    pub fn new(mut options: HandlerOptions) -> LodelResult<Self> {
        let level = match options.get_str("level") {
            None | Some("type") => IdentifierLevel::Type,
            Some("class") => IdentifierLevel::Class,
            Some(other) => {
                return Err(crate::lodel_error!(
                    model,
                    format!("子类标识级别无效: {}", other)
                ));
            }
        };
        if options.internal == InternalKind::None {
            options.internal = InternalKind::Automatic;
        }
        Ok(Self { options, level })
    }

    pub fn level(&self) -> IdentifierLevel {
        self.level
    }
}

impl DataHandler for SubclassIdentifierHandler {
    fn name(&self) -> &'static str {
        "leobject_subclass_identifier"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Varchar(64)
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        match value {
            DataValue::String(s) => Ok(DataValue::String(s.clone())),
            other => Err(self.invalid(&format!("类名必须是字符串，实际为 {}", other.type_name()))),
        }
    }

    fn construct_data(
        &self,
        class: &LeClass,
        _fieldname: &str,
        _datas: &mut DatasConstructor<'_>,
        cur_value: Option<&DataValue>,
    ) -> LodelResult<DataValue> {
        // 抽象类上构造时无法得知具体类，保留已有值
        if class.is_abstract() {
            return Ok(cur_value.cloned().unwrap_or(DataValue::Null));
        }
        Ok(DataValue::String(match self.level {
            IdentifierLevel::Type => class.name().to_string(),
            IdentifierLevel::Class => class.class_level().to_string(),
        }))
    }

    fn identifier_level(&self) -> Option<IdentifierLevel> {
        Some(self.level)
    }
}

/// 多语言字符串
#[derive(Debug)]
pub struct MlStringHandler {
    options: HandlerOptions,
    default_lang: String,
}

impl MlStringHandler {
    pub fn new(options: HandlerOptions) -> Self {
        let default_lang = options
            .get_str("default_lang")
            .unwrap_or(crate::types::DEFAULT_LANG)
            .to_string();
        Self {
            options,
            default_lang,
        }
    }
}

impl DataHandler for MlStringHandler {
    fn name(&self) -> &'static str {
        "mlstring"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::MlString
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let ml = match value {
            DataValue::String(s) if !s.trim_start().starts_with('{') => {
                let mut ml = MlString::new();
                ml.set(&self.default_lang, s);
                ml
            }
            other => MlString::from_data_value(other).map_err(|e| self.invalid(&e.to_string()))?,
        };
        Ok(ml.to_data_value())
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
    fn test_regex_handler() {
        let handler = RegexHandler::new(opts(json!({"regex": "^[A-Z]{3}$"}))).unwrap();
        assert!(handler.check_data_value(&DataValue::String("ABC".into())).is_ok());
        assert!(handler.check_data_value(&DataValue::String("abc".into())).is_err());
        assert!(RegexHandler::new(opts(json!({"regex": "("}))).is_err());
    }

    #[test]
    fn test_emails_normalised() {
        let handler = EmailsHandler::new(HandlerOptions::default());
        assert_eq!(
            handler
                .check_data_value(&DataValue::String("a@b.org , c@d.fr".into()))
                .unwrap(),
            DataValue::String("a@b.org,c@d.fr".into())
        );
        assert!(handler.check_data_value(&DataValue::String("not-an-email".into())).is_err());
    }

    #[test]
    fn test_format_string_requires_matching_field_list() {
        assert!(FormatStringHandler::new(opts(json!({
            "format_string": "%s - %s",
            "field_list": ["titre"]
        })))
        .is_err());
        let handler = FormatStringHandler::new(opts(json!({
            "format_string": "%s (%s)",
            "field_list": ["titre", "soustitre"]
        })))
        .unwrap();
        assert!(handler.is_internal());
    }

    #[test]
    fn test_uniqid_is_internal_primary_key() {
        let handler = UniqIdHandler::new(HandlerOptions::default());
        assert!(handler.is_primary_key());
        assert!(handler.is_internal());
        assert_eq!(
            handler.check_data_value(&DataValue::String("12".into())).unwrap(),
            DataValue::Int(12)
        );
    }

    #[test]
    fn test_mlstring_plain_text_uses_default_lang() {
        let handler = MlStringHandler::new(opts(json!({"default_lang": "fre"})));
        let value = handler
            .check_data_value(&DataValue::String("Bonjour".into()))
            .unwrap();
        let ml = MlString::from_data_value(&value).unwrap();
        assert_eq!(ml.get("fre"), Some("Bonjour"));
    }

    #[test]
    fn test_password_is_secret() {
        let handler = PasswordHandler::new(HandlerOptions::default()).unwrap();
        assert!(handler.is_secret());
        assert!(handler.check_data_value(&DataValue::Int(1)).is_err());
    }
}
