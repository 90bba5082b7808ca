//! 基础数据处理器：字符串、数值、布尔、日期时间和文件

use super::{BaseType, ConstructContext, DataHandler, DatasConstructor, HandlerOptions};
use crate::error::LodelResult;
use crate::leapi::LeClass;
use crate::types::DataValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// varchar 默认最大长度
pub const DEFAULT_MAX_LENGTH: usize = 255;

/// 将标量值转换为字符串
pub(crate) fn scalar_to_string(value: &DataValue) -> Option<String> {
    match value {
        DataValue::String(s) => Some(s.clone()),
        DataValue::Int(i) => Some(i.to_string()),
        DataValue::Float(f) => Some(f.to_string()),
        DataValue::Bool(b) => Some(b.to_string()),
        DataValue::DateTime(dt) => Some(dt.to_rfc3339()),
        _ => None,
    }
}

/// 有长度限制的字符串
#[derive(Debug)]
pub struct VarcharHandler {
    options: HandlerOptions,
    max_length: usize,
}

impl VarcharHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        let max_length = match options.get_i64("max_length") {
            Some(len) if len <= 0 => {
                return Err(crate::lodel_error!(
                    model,
                    format!("max_length 必须为正数，实际为 {}", len)
                ));
            }
            Some(len) => len as usize,
            None => DEFAULT_MAX_LENGTH,
        };
        Ok(Self {
            options,
            max_length,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// 转换为字符串并检查长度，供派生处理器复用
    pub(crate) fn cast_string(&self, handler: &dyn DataHandler, value: &DataValue) -> LodelResult<String> {
        let text = scalar_to_string(value).ok_or_else(|| {
            handler.invalid(&format!("无法将 {} 转换为字符串", value.type_name()))
        })?;
        if text.chars().count() > self.max_length {
            return Err(handler.invalid(&format!(
                "字符串长度超过最大值 {}",
                self.max_length
            )));
        }
        Ok(text)
    }
}

impl DataHandler for VarcharHandler {
    fn name(&self) -> &'static str {
        "varchar"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Varchar(self.max_length)
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        self.cast_string(self, value).map(DataValue::String)
    }
}

/// 不限长度的文本
#[derive(Debug)]
pub struct TextHandler {
    options: HandlerOptions,
}

impl TextHandler {
    pub fn new(options: HandlerOptions) -> Self {
        Self { options }
    }
}

impl DataHandler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Text
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        scalar_to_string(value)
            .map(DataValue::String)
            .ok_or_else(|| self.invalid(&format!("无法将 {} 转换为文本", value.type_name())))
    }
}

/// 整数
#[derive(Debug)]
pub struct IntegerHandler {
    options: HandlerOptions,
    min: Option<i64>,
    max: Option<i64>,
}

impl IntegerHandler {
    pub fn new(options: HandlerOptions) -> Self {
        let min = options.get_i64("min");
        let max = options.get_i64("max");
        Self { options, min, max }
    }

    pub(crate) fn cast_integer(handler: &dyn DataHandler, value: &DataValue) -> LodelResult<i64> {
        match value {
            DataValue::Int(i) => Ok(*i),
            DataValue::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            DataValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| handler.invalid(&format!("'{}' 不是有效的整数", s))),
            other => Err(handler.invalid(&format!(
                "无法将 {} 转换为整数",
                other.type_name()
            ))),
        }
    }
}

impl DataHandler for IntegerHandler {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Integer
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let i = Self::cast_integer(self, value)?;
        if let Some(min) = self.min {
            if i < min {
                return Err(self.invalid(&format!("值 {} 小于最小值 {}", i, min)));
            }
        }
        if let Some(max) = self.max {
            if i > max {
                return Err(self.invalid(&format!("值 {} 大于最大值 {}", i, max)));
            }
        }
        Ok(DataValue::Int(i))
    }
}

/// 小数
#[derive(Debug)]
pub struct DecimalHandler {
    options: HandlerOptions,
    decimal_places: Option<u32>,
    min: Option<f64>,
    max: Option<f64>,
}

impl DecimalHandler {
    pub fn new(options: HandlerOptions) -> Self {
        let decimal_places = options
            .get_i64("decimal_places")
            .filter(|p| *p >= 0)
            .map(|p| p as u32);
        let min = options.get_f64("min");
        let max = options.get_f64("max");
        Self {
            options,
            decimal_places,
            min,
            max,
        }
    }
}

impl DataHandler for DecimalHandler {
    fn name(&self) -> &'static str {
        "decimal"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Decimal
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let mut f = match value {
            DataValue::Float(f) => *f,
            DataValue::Int(i) => *i as f64,
            DataValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.invalid(&format!("'{}' 不是有效的小数", s)))?,
            other => {
                return Err(self.invalid(&format!(
                    "无法将 {} 转换为小数",
                    other.type_name()
                )));
            }
        };
        if !f.is_finite() {
            return Err(self.invalid("小数必须是有限值"));
        }
        if let Some(places) = self.decimal_places {
            let factor = 10f64.powi(places as i32);
            f = (f * factor).round() / factor;
        }
        if self.min.is_some_and(|min| f < min) || self.max.is_some_and(|max| f > max) {
            return Err(self.invalid(&format!("值 {} 超出允许范围", f)));
        }
        Ok(DataValue::Float(f))
    }
}

/// 布尔值
#[derive(Debug)]
pub struct BooleanHandler {
    options: HandlerOptions,
}

impl BooleanHandler {
    pub fn new(options: HandlerOptions) -> Self {
        Self { options }
    }
}

impl DataHandler for BooleanHandler {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::Boolean
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        match value {
            DataValue::Bool(b) => Ok(DataValue::Bool(*b)),
            DataValue::Int(0) => Ok(DataValue::Bool(false)),
            DataValue::Int(1) => Ok(DataValue::Bool(true)),
            DataValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(DataValue::Bool(true)),
                "false" | "0" => Ok(DataValue::Bool(false)),
                _ => Err(self.invalid(&format!("'{}' 不是有效的布尔值", s))),
            },
            other => Err(self.invalid(&format!("无法将 {} 转换为布尔值", other)))
        }
    }
}

/// 日期时间
///
/// 接受 RFC3339、`%Y-%m-%d %H:%M:%S` 和 `%Y-%m-%d` 格式的字符串，无时区的值视为 UTC
#[derive(Debug)]
pub struct DateTimeHandler {
    options: HandlerOptions,
    now_on_create: bool,
    now_on_update: bool,
}

impl DateTimeHandler {
    pub fn new(options: HandlerOptions) -> Self {
        let now_on_create = options.get_bool("now_on_create").unwrap_or(false);
        let now_on_update = options.get_bool("now_on_update").unwrap_or(false);
        Self {
            options,
            now_on_create,
            now_on_update,
        }
    }

    pub fn now_on_update(&self) -> bool {
        self.now_on_update
    }

    fn parse(&self, s: &str) -> LodelResult<DataValue> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(DataValue::DateTime(dt));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(Utc.from_utc_datetime(&naive).into());
        }
        if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(Utc.from_utc_datetime(&naive).into());
        }
        Err(self.invalid(&format!("'{}' 不是可识别的日期时间", s)))
    }
}

impl DataHandler for DateTimeHandler {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn base_type(&self) -> BaseType {
        BaseType::DateTime
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        match value {
            DataValue::DateTime(dt) => Ok(DataValue::DateTime(*dt)),
            DataValue::String(s) => self.parse(s),
            other => Err(self.invalid(&format!(
                "无法将 {} 转换为日期时间",
                other.type_name()
            ))),
        }
    }

    fn construct_data(
        &self,
        _class: &LeClass,
        _fieldname: &str,
        datas: &mut DatasConstructor<'_>,
        cur_value: Option<&DataValue>,
    ) -> LodelResult<DataValue> {
        let context: &ConstructContext = datas.context();
        let is_empty = cur_value.is_none_or(|v| v.is_null());
        if self.now_on_update || (self.now_on_create && is_empty) {
            return Ok(DataValue::DateTime(context.now));
        }
        Ok(match cur_value {
            Some(value) if !value.is_null() => value.clone(),
            _ => self.default().cloned().unwrap_or(DataValue::Null),
        })
    }
}

/// 文件路径
#[derive(Debug)]
pub struct FileHandler {
    inner: VarcharHandler,
    upload_directory: Option<String>,
}

impl FileHandler {
    pub fn new(options: HandlerOptions) -> LodelResult<Self> {
        let upload_directory = options.get_str("upload_directory").map(|s| s.to_string());
        Ok(Self {
            inner: VarcharHandler::new(options)?,
            upload_directory,
        })
    }

    pub fn upload_directory(&self) -> Option<&str> {
        self.upload_directory.as_deref()
    }
}

impl DataHandler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn options(&self) -> &HandlerOptions {
        self.inner.options()
    }

    fn base_type(&self) -> BaseType {
        self.inner.base_type()
    }

    fn cast_value(&self, value: &DataValue) -> LodelResult<DataValue> {
        let path = self.inner.cast_string(self, value)?;
        if path.trim().is_empty() {
            return Err(self.invalid("文件路径不能为空"));
        }
        if path.split('/').any(|part| part == "..") {
            return Err(self.invalid("文件路径不能包含 '..'"));
        }
        Ok(DataValue::String(path))
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
    fn test_varchar_length_and_cast() {
        let handler = VarcharHandler::new(opts(json!({"max_length": 5}))).unwrap();
        assert_eq!(
            handler.check_data_value(&DataValue::Int(42)).unwrap(),
            DataValue::String("42".into())
        );
        assert!(handler.check_data_value(&DataValue::String("abcdef".into())).is_err());
        assert!(handler.check_data_value(&DataValue::Array(vec![])).is_err());
        assert!(VarcharHandler::new(opts(json!({"max_length": 0}))).is_err());
    }

    #[test]
    fn test_integer_casts_numeric_strings() {
        let handler = IntegerHandler::new(opts(json!({"min": 0, "max": 100})));
        assert_eq!(
            handler.check_data_value(&DataValue::String(" 42 ".into())).unwrap(),
            DataValue::Int(42)
        );
        assert!(handler.check_data_value(&DataValue::String("4x".into())).is_err());
        assert!(handler.check_data_value(&DataValue::Int(101)).is_err());
        assert!(handler.check_data_value(&DataValue::Float(1.5)).is_err());
    }

    #[test]
    fn test_decimal_rounding() {
        let handler = DecimalHandler::new(opts(json!({"decimal_places": 2})));
        assert_eq!(
            handler.check_data_value(&DataValue::String("3.14159".into())).unwrap(),
            DataValue::Float(3.14)
        );
    }

    #[test]
    fn test_boolean_cast() {
        let handler = BooleanHandler::new(HandlerOptions::default());
        assert_eq!(
            handler.check_data_value(&DataValue::String("TRUE".into())).unwrap(),
            DataValue::Bool(true)
        );
        assert_eq!(handler.check_data_value(&DataValue::Int(0)).unwrap(), DataValue::Bool(false));
        assert!(handler.check_data_value(&DataValue::Int(2)).is_err());
    }

    #[test]
    fn test_datetime_formats() {
        let handler = DateTimeHandler::new(HandlerOptions::default());
        let a = handler
            .check_data_value(&DataValue::String("2016-05-04 10:20:30".into()))
            .unwrap();
        let b = handler
            .check_data_value(&DataValue::String("2016-05-04T10:20:30+00:00".into()))
            .unwrap();
        assert!(a.loose_eq(&b));
        assert!(handler.check_data_value(&DataValue::String("2016-05-04".into())).is_ok());
        assert!(handler.check_data_value(&DataValue::String("yesterday".into())).is_err());
    }

    #[test]
    fn test_file_rejects_parent_dirs() {
        let handler = FileHandler::new(HandlerOptions::default()).unwrap();
        assert!(handler.check_data_value(&DataValue::String("docs/a.pdf".into())).is_ok());
        assert!(handler.check_data_value(&DataValue::String("../etc/passwd".into())).is_err());
    }
}
