//! 过滤器准备与带过滤器的查询基础
//!
//! 用户过滤器经过规范化、字段校验和值转换后分为普通过滤器与关系过滤器。
//! 引用其他数据源的关系过滤器被改写为子查询，执行时合并为 `field in [uids]`。

use super::{
    LeGetQuery, GetOptions, LeQuery, QueryFilter, QueryOperator, RelationalFilter, SimpleFilter,
};
use crate::datahandlers::DataHandler;
use crate::error::{LodelError, LodelResult};
use crate::leapi::{LeClass, LeModel};
use crate::types::DataValue;
use rat_logger::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 按字段处理器转换过滤器的值
///
/// `in`/`not in` 接受数组或逗号分隔的文本，逐项转换；`like` 的值保持为字符串
fn cast_filter_value(
    handler: &dyn DataHandler,
    operator: QueryOperator,
    value: &DataValue,
) -> LodelResult<DataValue> {
    if operator.is_like() {
        return Ok(match value {
            DataValue::String(s) => DataValue::String(s.clone()),
            other => DataValue::String(other.to_string()),
        });
    }
    if operator.is_list() {
        let items: Vec<DataValue> = match value {
            DataValue::Array(items) => items.clone(),
            DataValue::String(s) => s
                .split(',')
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .map(|part| DataValue::String(part.to_string()))
                .collect(),
            other => vec![other.clone()],
        };
        return items
            .iter()
            .map(|item| handler.check_data_value(item))
            .collect::<LodelResult<Vec<_>>>()
            .map(DataValue::Array);
    }
    handler.check_data_value(value)
}

/// 准备过滤器
///
/// 所有无效的过滤器汇总为一个 `DataCheckErrors` 错误。普通过滤器去重并保持首次出现的顺序。
pub fn prepare_filters(
    model: &LeModel,
    target: &LeClass,
    filters: &[QueryFilter],
) -> LodelResult<(Vec<SimpleFilter>, Vec<RelationalFilter>)> {
    let mut errors: Vec<(String, LodelError)> = Vec::new();
    let mut simple: Vec<SimpleFilter> = Vec::new();
    let mut relational: Vec<RelationalFilter> = Vec::new();

    for filter in filters {
        let key = filter.key();
        let (field_spec, operator, value) = match filter {
            QueryFilter::Text(text) => match super::split_filter(text) {
                Ok((field, op, value)) => (field, op, DataValue::String(value)),
                Err(e) => {
                    errors.push((key, e));
                    continue;
                }
            },
            QueryFilter::Triple(field, op, value) => match QueryOperator::from_str(op) {
                Ok(op) => (field.trim().to_string(), op, value.clone()),
                Err(e) => {
                    errors.push((key, e));
                    continue;
                }
            },
        };

        let parts: Vec<&str> = field_spec.split('.').collect();
        let (field, ref_field) = match parts.as_slice() {
            [field] => (*field, None),
            [field, ref_field] => (*field, Some(*ref_field)),
            _ => {
                errors.push((
                    key,
                    crate::lodel_error!(
                        query,
                        format!("过滤器字段 '{}' 只能包含一个 '.'", field_spec)
                    ),
                ));
                continue;
            }
        };

        let handler = match target.field(field) {
            Ok(handler) => handler,
            Err(e) => {
                errors.push((key, e));
                continue;
            }
        };

        if ref_field.is_some() && !handler.is_reference() {
            errors.push((
                key,
                crate::lodel_error!(
                    query,
                    format!("字段 '{}' 不是引用字段，不能使用 '{}'", field, field_spec)
                ),
            ));
            continue;
        }

        if handler.is_reference() {
            match prepare_relational(model, field, handler.as_ref(), ref_field, operator, &value) {
                Ok(filter) => relational.push(filter),
                Err(e) => errors.push((key, e)),
            }
            continue;
        }

        match cast_filter_value(handler.as_ref(), operator, &value) {
            Ok(value) => {
                let prepared = SimpleFilter::new(field, operator, value);
                if !simple.contains(&prepared) {
                    simple.push(prepared);
                }
            }
            Err(e) => errors.push((key, e)),
        }
    }

    if !errors.is_empty() {
        return Err(LodelError::DataCheckErrors {
            message: crate::i18n::t("error.prepare_filters"),
            errors,
        });
    }
    Ok((simple, relational))
}

fn prepare_relational(
    model: &LeModel,
    field: &str,
    handler: &dyn DataHandler,
    ref_field: Option<&str>,
    operator: QueryOperator,
    value: &DataValue,
) -> LodelResult<RelationalFilter> {
    let linked: Vec<Arc<LeClass>> = handler
        .linked_classes()
        .iter()
        .map(|name| model.class(name))
        .collect::<LodelResult<_>>()?;
    if linked.is_empty() {
        return Err(crate::lodel_error!(
            query,
            format!("引用字段 '{}' 没有可引用的类", field)
        ));
    }

    let ref_field = match ref_field {
        Some(ref_field) => ref_field.to_string(),
        None => {
            let uid_names: BTreeSet<&str> = linked
                .iter()
                .filter_map(|lc| lc.uid().first().map(|s| s.as_str()))
                .collect();
            if uid_names.len() != 1 {
                return Err(crate::lodel_error!(
                    runtime,
                    format!(
                        "被引用的类使用不同名称的标识字段 {:?}，无法确定关系过滤器使用的字段",
                        uid_names
                    )
                ));
            }
            uid_names.iter().next().map(|s| s.to_string()).unwrap_or_default()
        }
    };

    let referenced: Vec<&Arc<LeClass>> = linked.iter().filter(|lc| lc.has_field(&ref_field)).collect();
    let first = referenced.first().ok_or_else(|| {
        crate::lodel_error!(
            query,
            format!("被引用的类中没有名为 '{}' 的字段", ref_field)
        )
    })?;
    if referenced
        .iter()
        .any(|lc| lc.datasource_name() != first.datasource_name())
    {
        return Err(crate::lodel_error!(
            query,
            format!("字段 '{}' 引用的类位于不同的数据源", field)
        ));
    }

    let value = cast_filter_value(first.field(&ref_field)?.as_ref(), operator, value)?;
    Ok(RelationalFilter {
        field: field.to_string(),
        references: referenced
            .iter()
            .map(|lc| (lc.name().to_string(), ref_field.clone()))
            .collect(),
        operator,
        value,
    })
}

/// 跨数据源关系过滤器改写出的子查询
#[derive(Debug)]
struct Subquery {
    field: String,
    queries: Vec<LeGetQuery>,
}

/// 带过滤器的查询基础
#[derive(Debug)]
pub struct LeFilteredQuery {
    model: LeModel,
    target: Arc<LeClass>,
    filters: Vec<SimpleFilter>,
    rel_filters: Vec<RelationalFilter>,
    subqueries: Vec<Subquery>,
}

impl LeFilteredQuery {
    pub fn new(model: &LeModel, target: Arc<LeClass>) -> Self {
        Self {
            model: model.clone(),
            target,
            filters: Vec::new(),
            rel_filters: Vec::new(),
            subqueries: Vec::new(),
        }
    }

    pub fn model(&self) -> &LeModel {
        &self.model
    }

    pub fn target(&self) -> &Arc<LeClass> {
        &self.target
    }

    /// 准备后的普通过滤器（不含子查询结果）
    pub fn filters(&self) -> &[SimpleFilter] {
        &self.filters
    }

    /// 在目标数据源内执行的关系过滤器
    pub fn relational_filters(&self) -> &[RelationalFilter] {
        &self.rel_filters
    }

    /// 子查询数量
    pub fn subquery_count(&self) -> usize {
        self.subqueries.iter().map(|s| s.queries.len()).sum()
    }

    /// 设置过滤器
    ///
    /// 只要关系过滤器有一个引用位于其他数据源，整个过滤器就改写为子查询
    pub fn set_query_filter(&mut self, filters: &[QueryFilter]) -> LodelResult<()> {
        let (simple, relational) = prepare_filters(&self.model, &self.target, filters)?;
        let mut inline = Vec::new();
        let mut subqueries = Vec::new();

        for rfilter in relational {
            let mut foreign = false;
            for (class_name, _) in &rfilter.references {
                if self.model.class(class_name)?.datasource_name() != self.target.datasource_name() {
                    foreign = true;
                }
            }
            if !foreign {
                inline.push(rfilter);
                continue;
            }

            let mut queries = Vec::new();
            for (class_name, ref_field) in &rfilter.references {
                let class = self.model.class(class_name)?;
                let uid_field = class.uid().first().cloned().ok_or_else(|| {
                    crate::lodel_error!(query, format!("类 {} 没有标识字段", class_name))
                })?;
                let options = GetOptions {
                    field_list: Some(vec![uid_field]),
                    ..GetOptions::default()
                };
                let filter = QueryFilter::Triple(
                    ref_field.clone(),
                    rfilter.operator.as_str().to_string(),
                    rfilter.value.clone(),
                );
                queries.push(LeGetQuery::new(&self.model, class, &[filter], options)?);
            }
            debug!(
                "关系过滤器 {} 引用其他数据源，改写为 {} 个子查询",
                rfilter.field,
                queries.len()
            );
            subqueries.push(Subquery {
                field: rfilter.field,
                queries,
            });
        }

        self.filters = simple;
        self.rel_filters = inline;
        self.subqueries = subqueries;
        Ok(())
    }

    /// 执行子查询并返回合并后的普通过滤器
    ///
    /// 查询对象自身的过滤器状态不受影响，可以重复执行
    pub async fn merged_filters(&self) -> LodelResult<Vec<SimpleFilter>> {
        let mut merged = self.filters.clone();
        for subquery in &self.subqueries {
            let mut uids: Vec<DataValue> = Vec::new();
            for query in &subquery.queries {
                let uid_field = query.target().uid().first().cloned().unwrap_or_default();
                for row in query.execute(None).await? {
                    if let Some(uid) = row.get(&uid_field) {
                        if !uids.contains(uid) {
                            uids.push(uid.clone());
                        }
                    }
                }
            }
            merged.push(SimpleFilter::new(
                &subquery.field,
                QueryOperator::In,
                DataValue::Array(uids),
            ));
        }
        Ok(merged)
    }
}

impl std::fmt::Display for LeFilteredQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<LeFilteredQuery target={}", self.target.name())?;
        for filter in &self.filters {
            write!(f, " ({} {} {})", filter.field, filter.operator, filter.value)?;
        }
        for filter in &self.rel_filters {
            write!(f, " ({} {} {} via {:?})", filter.field, filter.operator, filter.value, filter.references)?;
        }
        if !self.subqueries.is_empty() {
            write!(f, " subqueries={}", self.subquery_count())?;
        }
        write!(f, ">")
    }
}
