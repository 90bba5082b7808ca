//! 查询模块
//!
//! 过滤器解析与准备、跨数据源子查询以及获取/插入/更新/删除查询

use crate::error::{LodelError, LodelResult};
use crate::leapi::Row;
use crate::types::DataValue;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

mod delete;
mod filters;
mod get;
mod insert;
mod update;

pub use delete::LeDeleteQuery;
pub use filters::{prepare_filters, LeFilteredQuery};
pub use get::{GetOptions, LeGetQuery};
pub use insert::LeInsertQuery;
pub use update::LeUpdateQuery;

/// 过滤器操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOperator {
    Eq,
    Le,
    Ge,
    Ne,
    Lt,
    Gt,
    In,
    NotIn,
    Like,
    NotLike,
}

impl QueryOperator {
    /// 按匹配优先级排列的全部操作符
    pub const ALL: [QueryOperator; 10] = [
        QueryOperator::Eq,
        QueryOperator::Le,
        QueryOperator::Ge,
        QueryOperator::Ne,
        QueryOperator::Lt,
        QueryOperator::Gt,
        QueryOperator::In,
        QueryOperator::NotIn,
        QueryOperator::Like,
        QueryOperator::NotLike,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::Eq => "=",
            QueryOperator::Le => "<=",
            QueryOperator::Ge => ">=",
            QueryOperator::Ne => "!=",
            QueryOperator::Lt => "<",
            QueryOperator::Gt => ">",
            QueryOperator::In => "in",
            QueryOperator::NotIn => "not in",
            QueryOperator::Like => "like",
            QueryOperator::NotLike => "not like",
        }
    }

    /// 解析操作符，忽略大小写，单词间允许任意空白
    pub fn from_str(op: &str) -> LodelResult<Self> {
        let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        Self::ALL
            .iter()
            .find(|candidate| candidate.as_str() == normalized)
            .copied()
            .ok_or_else(|| LodelError::InvalidFilter {
                filter: format!("未知操作符 '{}'", op),
            })
    }

    /// 值为列表的操作符
    pub fn is_list(&self) -> bool {
        matches!(self, QueryOperator::In | QueryOperator::NotIn)
    }

    pub fn is_like(&self) -> bool {
        matches!(self, QueryOperator::Like | QueryOperator::NotLike)
    }
}

impl std::fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static FILTER_REGEX: Lazy<Regex> = Lazy::new(|| {
    let field = r"[a-z_][a-z0-9\-_]*";
    // 单词操作符前必须有空白，否则会从字段名中截出操作符
    let symbols = r"<=|>=|!=|=|<|>";
    let words = r"(?i:not\s+in|in|not\s+like|like)";
    Regex::new(&format!(
        r"^\s*(?P<field>{field}(?:\.{field})*)(?:\s*(?P<symbol>{symbols})|\s+(?P<word>{words})\b)\s*(?P<value>.*?)\s*$"
    ))
    .expect("过滤器正则表达式无效")
});

/// 拆分形如 `FIELD[.REF_FIELD] OP VALUE` 的过滤器字符串
///
/// 返回的操作符已规范化（小写，单词间单个空格）
pub fn split_filter(filter: &str) -> LodelResult<(String, QueryOperator, String)> {
    let invalid = || LodelError::InvalidFilter {
        filter: filter.to_string(),
    };
    let caps = FILTER_REGEX.captures(filter).ok_or_else(invalid)?;
    let field = caps.name("field").ok_or_else(invalid)?.as_str();
    let op = caps
        .name("symbol")
        .or_else(|| caps.name("word"))
        .ok_or_else(invalid)?
        .as_str();
    let value = caps.name("value").map(|m| m.as_str()).unwrap_or("");
    if value.is_empty() {
        return Err(invalid());
    }
    Ok((field.to_string(), QueryOperator::from_str(op)?, value.to_string()))
}

/// 用户提供的过滤器
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// `"field op value"` 字符串
    Text(String),
    /// (字段, 操作符, 值)
    Triple(String, String, DataValue),
}

impl QueryFilter {
    /// 用作错误键的文本形式
    pub fn key(&self) -> String {
        match self {
            QueryFilter::Text(s) => s.clone(),
            QueryFilter::Triple(f, op, v) => format!("{} {} {}", f, op, v),
        }
    }
}

impl From<&str> for QueryFilter {
    fn from(value: &str) -> Self {
        QueryFilter::Text(value.to_string())
    }
}

impl From<String> for QueryFilter {
    fn from(value: String) -> Self {
        QueryFilter::Text(value)
    }
}

impl<V: Into<DataValue>> From<(&str, &str, V)> for QueryFilter {
    fn from((field, op, value): (&str, &str, V)) -> Self {
        QueryFilter::Triple(field.to_string(), op.to_string(), value.into())
    }
}

impl From<&SimpleFilter> for QueryFilter {
    fn from(filter: &SimpleFilter) -> Self {
        QueryFilter::Triple(
            filter.field.clone(),
            filter.operator.as_str().to_string(),
            filter.value.clone(),
        )
    }
}

/// 准备好的普通过滤器
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFilter {
    pub field: String,
    pub operator: QueryOperator,
    pub value: DataValue,
}

impl SimpleFilter {
    pub fn new(field: &str, operator: QueryOperator, value: DataValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }
}

/// 准备好的关系过滤器
///
/// `references` 为 (被引用类, 被引用字段) 列表，满足任一引用即匹配
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalFilter {
    pub field: String,
    pub references: Vec<(String, String)>,
    pub operator: QueryOperator,
    pub value: DataValue,
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// 排序或分组子句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderClause {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    /// 解析 `"field"`、`"field ASC"` 或 `"field DESC"`
    pub fn parse(clause: &str) -> LodelResult<Self> {
        let parts: Vec<&str> = clause.split_whitespace().collect();
        match parts.as_slice() {
            [field] => Ok(Self::asc(field)),
            [field, dir] if dir.eq_ignore_ascii_case("asc") => Ok(Self::asc(field)),
            [field, dir] if dir.eq_ignore_ascii_case("desc") => Ok(Self::desc(field)),
            _ => Err(crate::lodel_error!(
                query,
                format!("无效的排序子句 '{}'", clause)
            )),
        }
    }
}

/// 查询的统一接口
///
/// 每个查询对象对应一次操作，`datas` 仅插入和按类更新时使用
#[async_trait]
pub trait LeQuery: Send + Sync {
    type Output: Send;

    /// 目标类名
    fn target_name(&self) -> &str;

    async fn execute(&self, datas: Option<Row>) -> LodelResult<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filter_normalises_operator() {
        let (field, op, value) = split_filter("titre   NOT    like  foo*").unwrap();
        assert_eq!(field, "titre");
        assert_eq!(op, QueryOperator::NotLike);
        assert_eq!(value, "foo*");

        let (field, op, value) = split_filter("lodel_id<=42").unwrap();
        assert_eq!((field.as_str(), op, value.as_str()), ("lodel_id", QueryOperator::Le, "42"));

        let (field, op, _) = split_filter("author.lastname in Doe,Smith").unwrap();
        assert_eq!(field, "author.lastname");
        assert_eq!(op, QueryOperator::In);

        let (field, op, value) = split_filter("titre_in in 1").unwrap();
        assert_eq!((field.as_str(), op, value.as_str()), ("titre_in", QueryOperator::In, "1"));
    }

    #[test]
    fn test_split_filter_rejects_invalid_strings() {
        for bad in ["", "titre", "titre =", "9titre = 3", "titre ~ 3", "= 3", "Titre = 3"] {
            assert!(split_filter(bad).is_err(), "'{}' 应当无效", bad);
        }
        // 单词操作符不能与字段名相连
        for bad in ["titrein 3", "titrelike foo", "titre in3", "titre likefoo"] {
            assert!(split_filter(bad).is_err(), "'{}' 应当无效", bad);
        }
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(QueryOperator::from_str("NOT  IN").unwrap(), QueryOperator::NotIn);
        assert_eq!(QueryOperator::from_str(">=").unwrap(), QueryOperator::Ge);
        assert!(QueryOperator::from_str("=>").is_err());
        for op in QueryOperator::ALL {
            assert_eq!(QueryOperator::from_str(op.as_str()).unwrap(), op);
        }
    }

    #[test]
    fn test_order_clause_parse() {
        assert_eq!(OrderClause::parse("titre DESC").unwrap(), OrderClause::desc("titre"));
        assert_eq!(OrderClause::parse("titre").unwrap(), OrderClause::asc("titre"));
        assert!(OrderClause::parse("titre sideways").is_err());
    }
}
