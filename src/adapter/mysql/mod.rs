//! MySQL数据源模块
//!
//! 表结构与查询构建不依赖驱动，可单独使用和测试；执行部分基于sqlx，
//! 需要启用 `mysql-support` 特性

mod query_builder;
mod schema;

#[cfg(feature = "mysql-support")]
mod adapter;
#[cfg(feature = "mysql-support")]
mod utils;

pub use query_builder::{MysqlQueryBuilder, SelectPlan, SqlStatement};
pub use schema::{FieldStorage, MysqlSchema, RELATION_TABLE};

#[cfg(feature = "mysql-support")]
pub use adapter::MysqlDatasource;
