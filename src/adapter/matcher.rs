//! 内存中的过滤、排序、分组与分页
//!
//! 文档型存储在内存中求值过滤器。多值字段（数组或对象）按任一元素匹配：
//! `=`/`in`/比较/`like` 只要有一个元素满足即匹配，`!=`/`not in`/`not like`
//! 要求没有元素满足。

use crate::error::LodelResult;
use crate::leapi::query::{OrderClause, QueryOperator, SimpleFilter, SortDirection};
use crate::leapi::Row;
use crate::types::DataValue;
use regex::Regex;
use std::cmp::Ordering;

/// 把 `like` 模式转换为正则表达式，`*` 匹配任意字符串，忽略大小写
pub fn like_to_regex(pattern: &str) -> LodelResult<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?is)^{}$", body)).map_err(|e| {
        crate::lodel_error!(query, format!("无效的 like 模式 '{}': {}", pattern, e))
    })
}

fn as_text(value: &DataValue) -> String {
    match value {
        DataValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 单值比较
fn scalar_matches(stored: &DataValue, operator: QueryOperator, expected: &DataValue, like: Option<&Regex>) -> bool {
    match operator {
        QueryOperator::Eq | QueryOperator::Ne => stored.loose_eq(expected),
        QueryOperator::Lt => stored.compare(expected) == Some(Ordering::Less),
        QueryOperator::Le => matches!(
            stored.compare(expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        QueryOperator::Gt => stored.compare(expected) == Some(Ordering::Greater),
        QueryOperator::Ge => matches!(
            stored.compare(expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        QueryOperator::In | QueryOperator::NotIn => match expected {
            DataValue::Array(items) => items.iter().any(|item| stored.loose_eq(item)),
            other => stored.loose_eq(other),
        },
        QueryOperator::Like | QueryOperator::NotLike => {
            !stored.is_null() && like.is_some_and(|re| re.is_match(&as_text(stored)))
        }
    }
}

/// 判断一个存储值是否满足过滤条件
pub fn value_matches(stored: &DataValue, operator: QueryOperator, expected: &DataValue) -> LodelResult<bool> {
    let like = if operator.is_like() {
        Some(like_to_regex(&as_text(expected))?)
    } else {
        None
    };
    let negated = matches!(
        operator,
        QueryOperator::Ne | QueryOperator::NotIn | QueryOperator::NotLike
    );

    let hit = match stored {
        DataValue::Array(items) => items
            .iter()
            .any(|item| scalar_matches(item, operator, expected, like.as_ref())),
        DataValue::Object(map) => map
            .values()
            .any(|item| scalar_matches(item, operator, expected, like.as_ref())),
        scalar => scalar_matches(scalar, operator, expected, like.as_ref()),
    };
    Ok(if negated { !hit } else { hit })
}

/// 一行是否满足全部过滤器
pub fn row_matches(row: &Row, filters: &[SimpleFilter]) -> LodelResult<bool> {
    for filter in filters {
        let stored = row.get(&filter.field).unwrap_or(&DataValue::Null);
        if !value_matches(stored, filter.operator, &filter.value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_values(a: &DataValue, b: &DataValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .compare(b)
            .unwrap_or_else(|| as_text(a).cmp(&as_text(b))),
    }
}

/// 按排序子句稳定排序
pub fn sort_rows(rows: &mut [Row], order: &[OrderClause]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for clause in order {
            let left = a.get(&clause.field).unwrap_or(&DataValue::Null);
            let right = b.get(&clause.field).unwrap_or(&DataValue::Null);
            let ordering = match clause.direction {
                SortDirection::Asc => compare_values(left, right),
                SortDirection::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// 按分组字段去重，保留每组的第一行，结果按分组字段排序
pub fn group_rows(mut rows: Vec<Row>, group: &[OrderClause]) -> Vec<Row> {
    if group.is_empty() {
        return rows;
    }
    sort_rows(&mut rows, group);
    let mut grouped: Vec<Row> = Vec::new();
    for row in rows {
        let duplicate = grouped.last().is_some_and(|last| {
            group.iter().all(|clause| {
                let a = last.get(&clause.field).unwrap_or(&DataValue::Null);
                let b = row.get(&clause.field).unwrap_or(&DataValue::Null);
                compare_values(a, b) == Ordering::Equal
            })
        });
        if !duplicate {
            grouped.push(row);
        }
    }
    grouped
}

/// 偏移与数量限制
pub fn paginate(rows: Vec<Row>, offset: usize, limit: Option<usize>) -> Vec<Row> {
    let iter = rows.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// 只保留字段列表中的字段，列表为空时返回全部字段
pub fn project(row: &Row, fields: &[String]) -> Row {
    if fields.is_empty() {
        return row.clone();
    }
    fields
        .iter()
        .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(DataValue::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, DataValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_like_patterns() {
        let re = like_to_regex("foo*bar").unwrap();
        assert!(re.is_match("FOO and BAR"));
        assert!(!re.is_match("foo and baz"));
        assert!(like_to_regex("a.b").unwrap().is_match("a.b"));
        assert!(!like_to_regex("a.b").unwrap().is_match("axb"));
    }

    #[test]
    fn test_multi_valued_fields_match_any_element() {
        let stored = DataValue::Array(vec![DataValue::Int(1), DataValue::Int(3)]);
        assert!(value_matches(&stored, QueryOperator::Eq, &DataValue::Int(3)).unwrap());
        assert!(!value_matches(&stored, QueryOperator::Ne, &DataValue::Int(3)).unwrap());
        assert!(value_matches(
            &stored,
            QueryOperator::In,
            &DataValue::Array(vec![DataValue::Int(5), DataValue::Int(1)])
        )
        .unwrap());
        assert!(value_matches(
            &stored,
            QueryOperator::NotIn,
            &DataValue::Array(vec![DataValue::Int(2)])
        )
        .unwrap());

        let ml = DataValue::Object(
            [("eng".to_string(), DataValue::from("Title")), ("fre".to_string(), DataValue::from("Titre"))]
                .into_iter()
                .collect(),
        );
        assert!(value_matches(&ml, QueryOperator::Like, &DataValue::from("titr*")).unwrap());
    }

    #[test]
    fn test_row_matching_and_ordering() {
        let mut rows = vec![
            row(&[("id", DataValue::Int(2)), ("titre", DataValue::from("b"))]),
            row(&[("id", DataValue::Int(1)), ("titre", DataValue::from("a"))]),
            row(&[("id", DataValue::Int(3)), ("titre", DataValue::from("a"))]),
        ];
        let filters = vec![SimpleFilter::new("id", QueryOperator::Ge, DataValue::Int(2))];
        let kept: Vec<&Row> = rows.iter().filter(|r| row_matches(r, &filters).unwrap()).collect();
        assert_eq!(kept.len(), 2);

        sort_rows(&mut rows, &[OrderClause::asc("titre"), OrderClause::desc("id")]);
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        let grouped = group_rows(rows.clone(), &[OrderClause::asc("titre")]);
        assert_eq!(grouped.len(), 2);

        let page = paginate(rows, 1, Some(1));
        assert_eq!(page[0]["id"], DataValue::Int(1));
    }
}
