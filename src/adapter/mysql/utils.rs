//! MySQL适配器辅助工具方法
//!
//! 参数绑定以及按字段基础类型安全读取列值

use super::adapter::MysqlDatasource;
use super::query_builder::SqlStatement;
use crate::datahandlers::BaseType;
use crate::error::{LodelError, LodelResult};
use crate::types::{json_value_to_data_value, DataValue};
use chrono::{DateTime, NaiveDateTime, Utc};
use rat_logger::{debug, warn};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, Row};

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

impl MysqlDatasource {
    /// 绑定一个参数，数组与对象以JSON文本写入
    fn bind_value<'q>(query: MySqlQuery<'q>, value: &DataValue) -> MySqlQuery<'q> {
        match value {
            DataValue::String(s) => query.bind(s.clone()),
            DataValue::Int(i) => query.bind(*i),
            DataValue::Float(f) => query.bind(*f),
            DataValue::Bool(b) => query.bind(*b),
            DataValue::DateTime(dt) => query.bind(dt.naive_utc()),
            DataValue::Bytes(bytes) => query.bind(bytes.clone()),
            DataValue::Null => query.bind(Option::<String>::None),
            DataValue::Array(_) | DataValue::Object(_) => query.bind(value.to_json_value().to_string()),
        }
    }

    /// 构造已绑定全部参数的查询
    pub(super) fn prepare(statement: &SqlStatement) -> MySqlQuery<'_> {
        debug!("执行MySQL语句: {} 参数: {:?}", statement.sql, statement.params);
        statement
            .params
            .iter()
            .fold(sqlx::query::<MySql>(&statement.sql), |query, value| Self::bind_value(query, value))
    }

    /// 按字段的基础类型读取列值
    pub(super) fn read_value(row: &MySqlRow, column: &str, base_type: BaseType, json: bool) -> LodelResult<DataValue> {
        if json {
            return Self::safe_read_json(row, column);
        }
        match base_type {
            BaseType::Integer | BaseType::SingleRef => Self::safe_read_integer(row, column),
            BaseType::Decimal => Self::safe_read_float(row, column),
            BaseType::Boolean => Self::safe_read_bool(row, column),
            BaseType::DateTime => Self::safe_read_datetime(row, column),
            _ => Self::safe_read_string(row, column),
        }
    }

    /// 安全地读取整数字段，防止 byteorder 错误
    pub(super) fn safe_read_integer(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<i64>, _>(column) {
            return Ok(val.map(DataValue::Int).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<i32>, _>(column) {
            return Ok(val.map(|i| DataValue::Int(i as i64)).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<u64>, _>(column) {
            return Ok(match val {
                Some(i) if i <= i64::MAX as u64 => DataValue::Int(i as i64),
                // 超出 i64 范围
                Some(i) => DataValue::String(i.to_string()),
                None => DataValue::Null,
            });
        }

        if let Ok(val) = row.try_get::<Option<String>, _>(column) {
            return Ok(match val {
                Some(s) => s.parse::<i64>().map(DataValue::Int).unwrap_or(DataValue::String(s)),
                None => DataValue::Null,
            });
        }

        Err(LodelError::SerializationError {
            message: format!("无法读取整数字段 '{}' 的值，所有类型转换都失败", column),
        })
    }

    /// 安全读取浮点数
    fn safe_read_float(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<f64>, _>(column) {
            return Ok(val.map(DataValue::Float).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<f32>, _>(column) {
            return Ok(val.map(|f| DataValue::Float(f as f64)).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<String>, _>(column) {
            return Ok(match val {
                Some(s) => s.parse::<f64>().map(DataValue::Float).unwrap_or(DataValue::String(s)),
                None => DataValue::Null,
            });
        }

        Err(LodelError::SerializationError {
            message: format!("无法读取浮点数字段 '{}'", column),
        })
    }

    /// 安全读取布尔值，BOOLEAN 在 MySQL 中为 TINYINT
    fn safe_read_bool(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<bool>, _>(column) {
            return Ok(val.map(DataValue::Bool).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<i8>, _>(column) {
            return Ok(val.map(|i| DataValue::Bool(i != 0)).unwrap_or(DataValue::Null));
        }

        Err(LodelError::SerializationError {
            message: format!("无法读取布尔字段 '{}'", column),
        })
    }

    /// DATETIME 列不带时区，按UTC解释
    fn safe_read_datetime(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<NaiveDateTime>, _>(column) {
            return Ok(val
                .map(|dt| DataValue::DateTime(dt.and_utc().fixed_offset()))
                .unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<DateTime<Utc>>, _>(column) {
            return Ok(val
                .map(|dt| DataValue::DateTime(dt.fixed_offset()))
                .unwrap_or(DataValue::Null));
        }

        Err(LodelError::SerializationError {
            message: format!("无法读取日期时间字段 '{}'", column),
        })
    }

    fn safe_read_string(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<String>, _>(column) {
            return Ok(val.map(DataValue::String).unwrap_or(DataValue::Null));
        }

        if let Ok(val) = row.try_get::<Option<Vec<u8>>, _>(column) {
            return Ok(match val {
                Some(bytes) => match String::from_utf8(bytes) {
                    Ok(s) => DataValue::String(s),
                    Err(e) => DataValue::Bytes(e.into_bytes()),
                },
                None => DataValue::Null,
            });
        }

        Err(LodelError::SerializationError {
            message: format!("无法读取字符串字段 '{}'", column),
        })
    }

    /// 读取以JSON文本存放的字段
    fn safe_read_json(row: &MySqlRow, column: &str) -> LodelResult<DataValue> {
        if let Ok(val) = row.try_get::<Option<JsonValue>, _>(column) {
            return Ok(val.map(json_value_to_data_value).unwrap_or(DataValue::Null));
        }

        match row.try_get::<Option<String>, _>(column) {
            Ok(Some(s)) => match serde_json::from_str::<JsonValue>(&s) {
                Ok(json) => Ok(json_value_to_data_value(json)),
                Err(e) => {
                    warn!("JSON字段 '{}' 解析失败: {}", column, e);
                    Ok(DataValue::String(s))
                }
            },
            Ok(None) => Ok(DataValue::Null),
            Err(e) => Err(LodelError::SerializationError {
                message: format!("无法读取JSON字段 '{}' 的值: {}", column, e),
            }),
        }
    }
}
