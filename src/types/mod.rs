//! 数据源无关的通用类型
//!
//! 数据值、多语言字符串与数据源连接配置

pub mod data_value;
pub mod datasource_config;
pub mod mlstring;

pub use data_value::{json_value_to_data_value, DataValue};
pub use datasource_config::{ConnectionConfig, DatasourceConfig, DatasourceKind};
pub use mlstring::{MlString, DEFAULT_LANG};
