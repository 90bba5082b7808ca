//! # 配置构建器模块
//!
//! 提供所有配置类型的构建器实现，支持链式调用和严格验证

pub mod app_builder;
pub mod datasource_builder;
pub mod lodel_builder;
pub mod logging_builder;

pub use app_builder::AppConfigBuilder;
pub use datasource_builder::DatasourceConfigBuilder;
pub use lodel_builder::LodelConfigBuilder;
pub use logging_builder::LoggingConfigBuilder;
