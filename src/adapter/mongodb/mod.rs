//! MongoDB数据源模块
//!
//! 过滤文档与聚合管道的构建、BSON转换以及基于官方驱动的数据源实现

mod adapter;
mod query_builder;
mod utils;

pub use adapter::MongoDatasource;
pub use query_builder::MongoQueryBuilder;
