//! MongoDB工具函数模块
//!
//! DataValue 与 BSON 之间的转换

use crate::leapi::Row;
use crate::types::DataValue;
use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};
use std::collections::HashMap;

/// 将DataValue转换为BSON值
pub(crate) fn data_value_to_bson(value: &DataValue) -> Bson {
    match value {
        DataValue::String(s) => Bson::String(s.clone()),
        DataValue::Int(i) => Bson::Int64(*i),
        DataValue::Float(f) => Bson::Double(*f),
        DataValue::Bool(b) => Bson::Boolean(*b),
        DataValue::DateTime(dt) => {
            let utc_dt = DateTime::<Utc>::from(*dt);
            Bson::DateTime(mongodb::bson::DateTime::from_system_time(utc_dt.into()))
        }
        DataValue::Array(arr) => Bson::Array(arr.iter().map(data_value_to_bson).collect()),
        DataValue::Object(obj) => {
            let mut doc = Document::new();
            for (key, value) in obj {
                doc.insert(key, data_value_to_bson(value));
            }
            Bson::Document(doc)
        }
        DataValue::Null => Bson::Null,
        DataValue::Bytes(bytes) => Bson::Binary(mongodb::bson::Binary {
            bytes: bytes.clone(),
            subtype: mongodb::bson::spec::BinarySubtype::Generic,
        }),
    }
}

/// 将BSON转换为DataValue
pub(crate) fn bson_to_data_value(bson: &Bson) -> DataValue {
    match bson {
        Bson::String(s) => DataValue::String(s.clone()),
        Bson::Int64(i) => DataValue::Int(*i),
        Bson::Int32(i) => DataValue::Int(*i as i64),
        Bson::Double(d) => DataValue::Float(*d),
        Bson::Boolean(b) => DataValue::Bool(*b),
        Bson::DateTime(dt) => {
            let utc_dt = DateTime::<Utc>::from(dt.to_system_time());
            DataValue::DateTime(utc_dt.fixed_offset())
        }
        Bson::ObjectId(oid) => DataValue::String(oid.to_hex()),
        Bson::Null | Bson::Undefined => DataValue::Null,
        Bson::Array(arr) => DataValue::Array(arr.iter().map(bson_to_data_value).collect()),
        Bson::Document(doc) => DataValue::Object(
            doc.iter()
                .map(|(k, v)| (k.clone(), bson_to_data_value(v)))
                .collect::<HashMap<_, _>>(),
        ),
        Bson::Binary(bin) => DataValue::Bytes(bin.bytes.clone()),
        Bson::Decimal128(decimal) => DataValue::String(decimal.to_string()),
        other => DataValue::String(other.to_string()),
    }
}

/// 文档转为结果行，去掉 `_id`
pub(crate) fn document_to_row(doc: &Document) -> Row {
    doc.iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .map(|(key, value)| (key.clone(), bson_to_data_value(value)))
        .collect()
}

pub(crate) fn row_to_document(row: &Row) -> Document {
    let mut doc = Document::new();
    for (key, value) in row {
        doc.insert(key, data_value_to_bson(value));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_document_conversion() {
        let mut row = Row::new();
        row.insert("lodel_id".to_string(), DataValue::Int(3));
        row.insert(
            "linked_texts".to_string(),
            DataValue::Array(vec![DataValue::Int(1), DataValue::Int(2)]),
        );
        row.insert("subtitle".to_string(), DataValue::Null);

        let mut doc = row_to_document(&row);
        assert_eq!(doc.get_i64("lodel_id").unwrap(), 3);
        doc.insert("_id", mongodb::bson::oid::ObjectId::new());

        let back = document_to_row(&doc);
        assert!(!back.contains_key("_id"));
        assert_eq!(back, row);
    }
}
