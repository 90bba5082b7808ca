//! 编辑对象 API
//!
//! 运行时模型、对象实例与查询

mod leobject;
mod model;
pub mod query;

pub use leobject::LeObject;
pub use model::{LeClass, LeModel, Row};
pub use query::{
    GetOptions, LeDeleteQuery, LeFilteredQuery, LeGetQuery, LeInsertQuery, LeQuery,
    LeUpdateQuery, OrderClause, QueryFilter, QueryOperator, RelationalFilter, SimpleFilter,
    SortDirection,
};
