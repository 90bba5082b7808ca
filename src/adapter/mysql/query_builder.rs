//! MySQL查询构建器
//!
//! 根据 [`MysqlSchema`] 的表布局生成带 `?` 占位符的SQL语句，参数按出现顺序
//! 收集。关系过滤器和多值字段上的过滤器以子查询表达。

use super::schema::{FieldStorage, MysqlSchema, RELATION_TABLE};
use crate::adapter::backref::{referenced_uids, BackrefAction, BackrefUpdate};
use crate::adapter::SelectQuery;
use crate::error::LodelResult;
use crate::leapi::query::{QueryOperator, RelationalFilter, SimpleFilter, SortDirection};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::{DataValue, MlString};

/// MySQL 在只有 OFFSET 时要求的 LIMIT 上限
const NO_LIMIT: &str = "18446744073709551615";

/// 一条SQL语句及其参数
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<DataValue>,
}

impl SqlStatement {
    fn new(sql: String, params: Vec<DataValue>) -> Self {
        Self { sql, params }
    }
}

/// 获取查询的执行计划
///
/// 主查询只返回列字段，多语言字段与多值引用字段需按标识再查询附属表和关系表
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub statement: SqlStatement,
    /// 主查询返回的字段
    pub columns: Vec<String>,
    /// 以JSON文本存储的字段
    pub json_fields: Vec<String>,
    /// (字段, 附属表)
    pub mlstring_fields: Vec<(String, String)>,
    /// (字段, nature)
    pub relation_fields: Vec<(String, String)>,
}

/// 一次查询构建中的表与连接
struct Scope<'a> {
    class: &'a LeClass,
    root: String,
    joins: Vec<String>,
}

impl<'a> Scope<'a> {
    fn new(class: &'a LeClass) -> Self {
        Self {
            class,
            root: MysqlSchema::root_table(class),
            joins: Vec::new(),
        }
    }
}

/// 拆出否定操作符对应的肯定形式
fn split_negation(operator: QueryOperator) -> (bool, QueryOperator) {
    match operator {
        QueryOperator::Ne => (true, QueryOperator::Eq),
        QueryOperator::NotIn => (true, QueryOperator::In),
        QueryOperator::NotLike => (true, QueryOperator::Like),
        other => (false, other),
    }
}

fn list_items(value: &DataValue) -> Vec<DataValue> {
    match value {
        DataValue::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// MySQL查询构建器
#[derive(Default)]
pub struct MysqlQueryBuilder {
    schema: MysqlSchema,
}

impl MysqlQueryBuilder {
    pub fn new() -> Self {
        Self {
            schema: MysqlSchema::new(),
        }
    }

    pub fn schema(&self) -> &MysqlSchema {
        &self.schema
    }

    fn uid_name(class: &LeClass) -> LodelResult<&str> {
        class
            .uid()
            .first()
            .map(|s| s.as_str())
            .ok_or_else(|| crate::lodel_error!(datasource, format!("类 {} 没有标识字段", class.name())))
    }

    /// 字段对应的列，必要时加入连接
    fn column(&self, scope: &mut Scope<'_>, field: &str) -> LodelResult<String> {
        match MysqlSchema::storage(scope.class, field)? {
            FieldStorage::Column { table } | FieldStorage::Json { table } => {
                if table != scope.root && !scope.joins.contains(&table) {
                    scope.joins.push(table.clone());
                }
                self.schema.qualified(&table, field)
            }
            _ => Err(crate::lodel_error!(
                query,
                format!("字段 '{}' 不是数据列，不能用于此处", field)
            )),
        }
    }

    fn uid_column(&self, scope: &Scope<'_>) -> LodelResult<String> {
        self.schema.qualified(&scope.root, Self::uid_name(scope.class)?)
    }

    fn from_clause(&self, scope: &Scope<'_>) -> LodelResult<String> {
        let mut sql = format!("FROM {}", self.schema.quote(&scope.root)?);
        for table in &scope.joins {
            let on = scope
                .class
                .uid()
                .iter()
                .map(|uid| {
                    Ok(format!(
                        "{} = {}",
                        self.schema.qualified(&scope.root, uid)?,
                        self.schema.qualified(table, uid)?
                    ))
                })
                .collect::<LodelResult<Vec<_>>>()?;
            sql.push_str(&format!(
                " LEFT JOIN {} ON {}",
                self.schema.quote(table)?,
                on.join(" AND ")
            ));
        }
        Ok(sql)
    }

    /// 单列条件
    fn scalar_condition(
        column: &str,
        operator: QueryOperator,
        value: &DataValue,
        params: &mut Vec<DataValue>,
    ) -> String {
        match operator {
            QueryOperator::Eq if value.is_null() => format!("{} IS NULL", column),
            QueryOperator::Ne if value.is_null() => format!("{} IS NOT NULL", column),
            QueryOperator::In | QueryOperator::NotIn => {
                let items = list_items(value);
                if items.is_empty() {
                    return if operator == QueryOperator::In {
                        "0 = 1".to_string()
                    } else {
                        "1 = 1".to_string()
                    };
                }
                let sql = format!(
                    "{} {} ({})",
                    column,
                    operator.as_str().to_uppercase(),
                    placeholders(items.len())
                );
                params.extend(items);
                sql
            }
            QueryOperator::Like | QueryOperator::NotLike => {
                let pattern = match value {
                    DataValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                params.push(DataValue::String(pattern.replace('*', "%")));
                format!("{} {} ?", column, operator.as_str().to_uppercase())
            }
            _ => {
                params.push(value.clone());
                format!("{} {} ?", column, operator.as_str())
            }
        }
    }

    fn filter_condition(
        &self,
        scope: &mut Scope<'_>,
        filter: &SimpleFilter,
        params: &mut Vec<DataValue>,
    ) -> LodelResult<String> {
        match MysqlSchema::storage(scope.class, &filter.field)? {
            FieldStorage::Column { .. } | FieldStorage::Json { .. } => {
                let column = self.column(scope, &filter.field)?;
                Ok(Self::scalar_condition(&column, filter.operator, &filter.value, params))
            }
            FieldStorage::MlString { table } => {
                let (negated, operator) = split_negation(filter.operator);
                let uid_column = self.uid_column(scope)?;
                let uid_name = Self::uid_name(scope.class)?;
                let value_column = self.schema.qualified(&table, "value")?;
                let condition = Self::scalar_condition(&value_column, operator, &filter.value, params);
                Ok(format!(
                    "{} {}IN (SELECT {} FROM {} WHERE {})",
                    uid_column,
                    if negated { "NOT " } else { "" },
                    self.schema.qualified(&table, uid_name)?,
                    self.schema.quote(&table)?,
                    condition
                ))
            }
            FieldStorage::Relation { nature } => {
                let (negated, operator) = split_negation(filter.operator);
                let uid_column = self.uid_column(scope)?;
                params.push(DataValue::String(nature));
                let subordinate = self.schema.qualified(RELATION_TABLE, "id_subordinate")?;
                let condition = Self::scalar_condition(&subordinate, operator, &filter.value, params);
                Ok(format!(
                    "{} {}IN (SELECT {} FROM {} WHERE {} = ? AND {})",
                    uid_column,
                    if negated { "NOT " } else { "" },
                    self.schema.qualified(RELATION_TABLE, "id_superior")?,
                    self.schema.quote(RELATION_TABLE)?,
                    self.schema.qualified(RELATION_TABLE, "nature")?,
                    condition
                ))
            }
        }
    }

    /// 按子类标识限制为目标类及其子类
    fn type_condition(&self, scope: &mut Scope<'_>, params: &mut Vec<DataValue>) -> LodelResult<Option<String>> {
        let Some(identifier) = scope.class.subclass_identifier_field() else {
            return Ok(None);
        };
        let column = self.column(scope, identifier)?;
        let names = scope
            .class
            .concrete_descendants()
            .iter()
            .map(|name| DataValue::String(name.clone()))
            .collect();
        Ok(Some(Self::scalar_condition(
            &column,
            QueryOperator::In,
            &DataValue::Array(names),
            params,
        )))
    }

    /// 返回满足过滤器的对象标识的子查询
    fn uid_subselect(
        &self,
        class: &LeClass,
        filters: &[SimpleFilter],
        params: &mut Vec<DataValue>,
    ) -> LodelResult<String> {
        let mut scope = Scope::new(class);
        let mut conditions = Vec::new();
        for filter in filters {
            conditions.push(self.filter_condition(&mut scope, filter, params)?);
        }
        if let Some(condition) = self.type_condition(&mut scope, params)? {
            conditions.push(condition);
        }
        let mut sql = format!("SELECT {} {}", self.uid_column(&scope)?, self.from_clause(&scope)?);
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        Ok(sql)
    }

    fn relational_condition(
        &self,
        model: &LeModel,
        scope: &mut Scope<'_>,
        filter: &RelationalFilter,
        params: &mut Vec<DataValue>,
    ) -> LodelResult<String> {
        let storage = MysqlSchema::storage(scope.class, &filter.field)?;
        let subselect = |params: &mut Vec<DataValue>, class_name: &str, ref_field: &str| -> LodelResult<String> {
            let referenced = model.class(class_name)?;
            self.uid_subselect(
                &referenced,
                &[SimpleFilter::new(ref_field, filter.operator, filter.value.clone())],
                params,
            )
        };

        match storage {
            FieldStorage::Column { .. } => {
                let column = self.column(scope, &filter.field)?;
                let mut parts = Vec::new();
                for (class_name, ref_field) in &filter.references {
                    parts.push(format!("{} IN ({})", column, subselect(params, class_name, ref_field)?));
                }
                Ok(format!("({})", parts.join(" OR ")))
            }
            FieldStorage::Relation { nature } => {
                let uid_column = self.uid_column(scope)?;
                params.push(DataValue::String(nature));
                let subordinate = self.schema.qualified(RELATION_TABLE, "id_subordinate")?;
                let mut parts = Vec::new();
                for (class_name, ref_field) in &filter.references {
                    parts.push(format!("{} IN ({})", subordinate, subselect(params, class_name, ref_field)?));
                }
                Ok(format!(
                    "{} IN (SELECT {} FROM {} WHERE {} = ? AND ({}))",
                    uid_column,
                    self.schema.qualified(RELATION_TABLE, "id_superior")?,
                    self.schema.quote(RELATION_TABLE)?,
                    self.schema.qualified(RELATION_TABLE, "nature")?,
                    parts.join(" OR ")
                ))
            }
            _ => Err(crate::lodel_error!(
                query,
                format!("字段 '{}' 不支持关系过滤器", filter.field)
            )),
        }
    }

    /// 构建获取查询
    pub fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<SelectPlan> {
        let mut scope = Scope::new(class);
        let mut fields: Vec<String> = if query.field_list.is_empty() {
            class.fieldnames(true)
        } else {
            query.field_list.clone()
        };
        for uid in class.uid() {
            if !fields.contains(uid) {
                fields.push(uid.clone());
            }
        }

        let mut plan = SelectPlan {
            statement: SqlStatement::new(String::new(), Vec::new()),
            columns: Vec::new(),
            json_fields: Vec::new(),
            mlstring_fields: Vec::new(),
            relation_fields: Vec::new(),
        };
        let mut select_exprs = Vec::new();
        for field in &fields {
            match MysqlSchema::storage(class, field)? {
                FieldStorage::Column { .. } => {
                    select_exprs.push(format!("{} AS {}", self.column(&mut scope, field)?, self.schema.quote(field)?));
                    plan.columns.push(field.clone());
                }
                FieldStorage::Json { .. } => {
                    select_exprs.push(format!("{} AS {}", self.column(&mut scope, field)?, self.schema.quote(field)?));
                    plan.columns.push(field.clone());
                    plan.json_fields.push(field.clone());
                }
                FieldStorage::MlString { table } => plan.mlstring_fields.push((field.clone(), table)),
                FieldStorage::Relation { nature } => plan.relation_fields.push((field.clone(), nature)),
            }
        }

        let mut params = Vec::new();
        let mut conditions = Vec::new();
        for filter in &query.filters {
            conditions.push(self.filter_condition(&mut scope, filter, &mut params)?);
        }
        for filter in &query.relational_filters {
            conditions.push(self.relational_condition(model, &mut scope, filter, &mut params)?);
        }
        if let Some(condition) = self.type_condition(&mut scope, &mut params)? {
            conditions.push(condition);
        }

        let mut tail = String::new();
        if !query.group.is_empty() {
            let columns = query
                .group
                .iter()
                .map(|clause| self.column(&mut scope, &clause.field))
                .collect::<LodelResult<Vec<_>>>()?;
            tail.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }
        if !query.order.is_empty() {
            let mut columns = Vec::new();
            for clause in &query.order {
                let direction = match clause.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                columns.push(format!("{} {}", self.column(&mut scope, &clause.field)?, direction));
            }
            tail.push_str(&format!(" ORDER BY {}", columns.join(", ")));
        }
        match (query.limit, query.offset) {
            (Some(limit), _) => {
                tail.push_str(" LIMIT ?");
                params.push(DataValue::Int(limit as i64));
            }
            (None, offset) if offset > 0 => tail.push_str(&format!(" LIMIT {}", NO_LIMIT)),
            _ => {}
        }
        if query.offset > 0 {
            tail.push_str(" OFFSET ?");
            params.push(DataValue::Int(query.offset as i64));
        }

        let mut sql = format!("SELECT {} {}", select_exprs.join(", "), self.from_clause(&scope)?);
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        sql.push_str(&tail);
        plan.statement = SqlStatement::new(sql, params);
        Ok(plan)
    }

    /// 读取多语言附属表
    pub fn select_mlstring(&self, class: &LeClass, table: &str, uids: &[DataValue]) -> LodelResult<SqlStatement> {
        let uid_name = Self::uid_name(class)?;
        Ok(SqlStatement::new(
            format!(
                "SELECT {} AS {}, {}, {} FROM {} WHERE {} IN ({})",
                self.schema.quote(uid_name)?,
                self.schema.quote("uid")?,
                self.schema.quote("lang")?,
                self.schema.quote("value")?,
                self.schema.quote(table)?,
                self.schema.quote(uid_name)?,
                placeholders(uids.len())
            ),
            uids.to_vec(),
        ))
    }

    /// 把附属表的行 (标识, 语言, 文本) 按对象还原为多语言字符串
    pub fn collect_mlstrings(
        records: impl IntoIterator<Item = (DataValue, String, Option<String>)>,
    ) -> Vec<(DataValue, MlString)> {
        let mut values: Vec<(DataValue, MlString)> = Vec::new();
        for (uid, lang, text) in records {
            let position = match values.iter().position(|(u, _)| u.loose_eq(&uid)) {
                Some(position) => position,
                None => {
                    values.push((uid, MlString::new()));
                    values.len() - 1
                }
            };
            values[position].1.set(&lang, &text.unwrap_or_default());
        }
        values
    }

    /// 读取关系表，按排序号排列
    pub fn select_relations(&self, nature: &str, uids: &[DataValue]) -> LodelResult<SqlStatement> {
        let mut params = vec![DataValue::String(nature.to_string())];
        params.extend(uids.iter().cloned());
        Ok(SqlStatement::new(
            format!(
                "SELECT {}, {} FROM {} WHERE {} = ? AND {} IN ({}) ORDER BY {}, {}",
                self.schema.quote("id_superior")?,
                self.schema.quote("id_subordinate")?,
                self.schema.quote(RELATION_TABLE)?,
                self.schema.quote("nature")?,
                self.schema.quote("id_superior")?,
                placeholders(uids.len()),
                self.schema.quote("id_superior")?,
                self.schema.quote("rank")?
            ),
            params,
        ))
    }

    fn column_value(class: &LeClass, field: &str, datas: &Row) -> LodelResult<DataValue> {
        let value = datas.get(field).cloned().unwrap_or(DataValue::Null);
        Ok(match MysqlSchema::storage(class, field)? {
            FieldStorage::Json { .. } if !value.is_null() => DataValue::String(value.to_json_string()?),
            _ => value,
        })
    }

    /// 关系表只记录第一个标识列
    fn superior(uid: &[DataValue]) -> LodelResult<&DataValue> {
        uid.first()
            .ok_or_else(|| crate::lodel_error!(datasource, "缺少对象标识"))
    }

    fn uid_values(class: &LeClass, datas: &Row) -> Vec<DataValue> {
        class
            .uid()
            .iter()
            .map(|uid| datas.get(uid).cloned().unwrap_or(DataValue::Null))
            .collect()
    }

    fn uid_condition(&self, class: &LeClass, uid: &[DataValue], params: &mut Vec<DataValue>) -> LodelResult<String> {
        let parts = class
            .uid()
            .iter()
            .map(|name| Ok(format!("{} = ?", self.schema.quote(name)?)))
            .collect::<LodelResult<Vec<_>>>()?;
        params.extend(uid.iter().cloned());
        Ok(parts.join(" AND "))
    }

    fn insert_statement(&self, table: &str, columns: &[String], values: Vec<DataValue>) -> LodelResult<SqlStatement> {
        let quoted = columns
            .iter()
            .map(|c| self.schema.quote(c))
            .collect::<LodelResult<Vec<_>>>()?;
        Ok(SqlStatement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.schema.quote(table)?,
                quoted.join(", "),
                placeholders(values.len())
            ),
            values,
        ))
    }

    fn mlstring_inserts(&self, class: &LeClass, table: &str, uid: &[DataValue], value: &DataValue) -> LodelResult<Vec<SqlStatement>> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        let mut columns: Vec<String> = class.uid().to_vec();
        columns.push("lang".to_string());
        columns.push("value".to_string());
        MlString::from_data_value(value)?
            .iter()
            .map(|(lang, text)| {
                let mut values = uid.to_vec();
                values.push(DataValue::String(lang.clone()));
                values.push(DataValue::String(text.clone()));
                self.insert_statement(table, &columns, values)
            })
            .collect()
    }

    fn relation_inserts(&self, nature: &str, superior: &DataValue, value: &DataValue) -> LodelResult<Vec<SqlStatement>> {
        let columns = ["id_superior", "id_subordinate", "nature", "rank"].map(String::from);
        referenced_uids(Some(value))
            .into_iter()
            .enumerate()
            .map(|(rank, subordinate)| {
                self.insert_statement(
                    RELATION_TABLE,
                    &columns,
                    vec![
                        superior.clone(),
                        subordinate,
                        DataValue::String(nature.to_string()),
                        DataValue::Int(rank as i64),
                    ],
                )
            })
            .collect()
    }

    /// 插入一个具体类对象：根表在前，然后是各类表、多语言行和关系行
    pub fn insert(&self, class: &LeClass, datas: &Row) -> LodelResult<Vec<SqlStatement>> {
        let uid = Self::uid_values(class, datas);
        let mut statements = Vec::new();

        for (owner, table) in MysqlSchema::tables_of(class) {
            let mut columns: Vec<String> = class.uid().to_vec();
            let mut values = uid.clone();
            for (name, _) in MysqlSchema::declared_columns(class, &owner) {
                if !datas.contains_key(name) {
                    continue;
                }
                columns.push(name.clone());
                values.push(Self::column_value(class, name, datas)?);
            }
            statements.push(self.insert_statement(&table, &columns, values)?);
        }

        for (name, _) in class.fields() {
            let Some(value) = datas.get(name) else {
                continue;
            };
            match MysqlSchema::storage(class, name)? {
                FieldStorage::MlString { table } => {
                    statements.extend(self.mlstring_inserts(class, &table, &uid, value)?)
                }
                FieldStorage::Relation { nature } => {
                    statements.extend(self.relation_inserts(&nature, Self::superior(&uid)?, value)?)
                }
                _ => {}
            }
        }
        Ok(statements)
    }

    /// 按标识更新一个对象，只涉及 `datas` 中出现的字段
    pub fn update(&self, class: &LeClass, uid: &[DataValue], datas: &Row) -> LodelResult<Vec<SqlStatement>> {
        let mut per_table: Vec<(String, Vec<String>)> = Vec::new();
        let mut statements = Vec::new();
        let mut tail = Vec::new();

        for (name, _) in class.fields() {
            if class.uid().contains(name) {
                continue;
            }
            let Some(value) = datas.get(name) else {
                continue;
            };
            match MysqlSchema::storage(class, name)? {
                FieldStorage::Column { table } | FieldStorage::Json { table } => {
                    match per_table.iter_mut().find(|(t, _)| *t == table) {
                        Some((_, fields)) => fields.push(name.clone()),
                        None => per_table.push((table, vec![name.clone()])),
                    }
                }
                FieldStorage::MlString { table } => {
                    let mut params = Vec::new();
                    let condition = self.uid_condition(class, uid, &mut params)?;
                    tail.push(SqlStatement::new(
                        format!("DELETE FROM {} WHERE {}", self.schema.quote(&table)?, condition),
                        params,
                    ));
                    tail.extend(self.mlstring_inserts(class, &table, uid, value)?);
                }
                FieldStorage::Relation { nature } => {
                    tail.push(SqlStatement::new(
                        format!(
                            "DELETE FROM {} WHERE {} = ? AND {} = ?",
                            self.schema.quote(RELATION_TABLE)?,
                            self.schema.quote("id_superior")?,
                            self.schema.quote("nature")?
                        ),
                        vec![Self::superior(uid)?.clone(), DataValue::String(nature.clone())],
                    ));
                    tail.extend(self.relation_inserts(&nature, Self::superior(uid)?, value)?);
                }
            }
        }

        for (table, fields) in per_table {
            let mut params = Vec::new();
            let mut sets = Vec::new();
            for field in &fields {
                sets.push(format!("{} = ?", self.schema.quote(field)?));
                params.push(Self::column_value(class, field, datas)?);
            }
            let condition = self.uid_condition(class, uid, &mut params)?;
            statements.push(SqlStatement::new(
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    self.schema.quote(&table)?,
                    sets.join(", "),
                    condition
                ),
                params,
            ));
        }
        statements.extend(tail);
        Ok(statements)
    }

    /// 删除一个具体类对象的全部数据，`with_relations` 时同时删除涉及它的关系行
    pub fn delete(&self, class: &LeClass, uid: &[DataValue], with_relations: bool) -> LodelResult<Vec<SqlStatement>> {
        let mut statements = Vec::new();
        for (name, _) in class.fields() {
            if let FieldStorage::MlString { table } = MysqlSchema::storage(class, name)? {
                let mut params = Vec::new();
                let condition = self.uid_condition(class, uid, &mut params)?;
                statements.push(SqlStatement::new(
                    format!("DELETE FROM {} WHERE {}", self.schema.quote(&table)?, condition),
                    params,
                ));
            }
        }
        if with_relations {
            statements.push(SqlStatement::new(
                format!(
                    "DELETE FROM {} WHERE {} = ? OR {} = ?",
                    self.schema.quote(RELATION_TABLE)?,
                    self.schema.quote("id_superior")?,
                    self.schema.quote("id_subordinate")?
                ),
                vec![Self::superior(uid)?.clone(), Self::superior(uid)?.clone()],
            ));
        }
        for (_, table) in MysqlSchema::tables_of(class).into_iter().rev() {
            let mut params = Vec::new();
            let condition = self.uid_condition(class, uid, &mut params)?;
            statements.push(SqlStatement::new(
                format!("DELETE FROM {} WHERE {}", self.schema.quote(&table)?, condition),
                params,
            ));
        }
        Ok(statements)
    }

    /// 反向引用更新对应的语句
    pub fn backref_statements(&self, model: &LeModel, updates: &[BackrefUpdate]) -> LodelResult<Vec<SqlStatement>> {
        let mut statements = Vec::new();
        for update in updates {
            let class = model.class(&update.class)?;
            let uid_name = Self::uid_name(&class)?;
            match MysqlSchema::storage(&class, &update.field)? {
                FieldStorage::Relation { nature } => {
                    let relation = self.schema.quote(RELATION_TABLE)?;
                    let match_clause = format!(
                        "{} = ? AND {} = ? AND {} = ?",
                        self.schema.quote("id_superior")?,
                        self.schema.quote("id_subordinate")?,
                        self.schema.quote("nature")?
                    );
                    let keys = vec![
                        update.uid.clone(),
                        update.value.clone(),
                        DataValue::String(nature),
                    ];
                    match update.action {
                        BackrefAction::Add => {
                            let mut params = keys.clone();
                            params.extend(keys);
                            statements.push(SqlStatement::new(
                                format!(
                                    "INSERT INTO {} ({}, {}, {}, {}) SELECT ?, ?, ?, 0 FROM DUAL WHERE NOT EXISTS (SELECT 1 FROM {} WHERE {})",
                                    relation,
                                    self.schema.quote("id_superior")?,
                                    self.schema.quote("id_subordinate")?,
                                    self.schema.quote("nature")?,
                                    self.schema.quote("rank")?,
                                    relation,
                                    match_clause
                                ),
                                params,
                            ));
                        }
                        BackrefAction::Remove => statements.push(SqlStatement::new(
                            format!("DELETE FROM {} WHERE {}", relation, match_clause),
                            keys,
                        )),
                        _ => {
                            return Err(crate::lodel_error!(
                                datasource,
                                format!("多值字段 {}.{} 不能整体设置", update.class, update.field)
                            ));
                        }
                    }
                }
                FieldStorage::Column { table } => {
                    let table = self.schema.quote(&table)?;
                    let field = self.schema.quote(&update.field)?;
                    let uid_column = self.schema.quote(uid_name)?;
                    statements.push(match update.action {
                        BackrefAction::Set => SqlStatement::new(
                            format!("UPDATE {} SET {} = ? WHERE {} = ?", table, field, uid_column),
                            vec![update.value.clone(), update.uid.clone()],
                        ),
                        BackrefAction::Unset => SqlStatement::new(
                            format!(
                                "UPDATE {} SET {} = NULL WHERE {} = ? AND {} = ?",
                                table, field, uid_column, field
                            ),
                            vec![update.uid.clone(), update.value.clone()],
                        ),
                        _ => {
                            return Err(crate::lodel_error!(
                                datasource,
                                format!("单值字段 {}.{} 不能加入或移除元素", update.class, update.field)
                            ));
                        }
                    });
                }
                _ => {
                    return Err(crate::lodel_error!(
                        datasource,
                        format!("字段 {}.{} 不能作为反向引用", update.class, update.field)
                    ));
                }
            }
        }
        Ok(statements)
    }

    /// 下一个数字标识
    pub fn next_id(&self, class: &LeClass) -> LodelResult<SqlStatement> {
        Ok(SqlStatement::new(
            format!(
                "SELECT COALESCE(MAX({}), 0) + 1 AS {} FROM {}",
                self.schema.quote(Self::uid_name(class)?)?,
                self.schema.quote("next_id")?,
                self.schema.quote(&MysqlSchema::root_table(class))?
            ),
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DatasourceRegistry;
    use crate::config::dummy_config;
    use crate::datahandlers::DataHandlerRegistry;
    use crate::editorial_model::sample_model;
    use crate::leapi::query::OrderClause;
    use std::collections::HashMap;

    async fn model() -> LeModel {
        let registry = DatasourceRegistry::new(HashMap::from([(
            "default".to_string(),
            dummy_config(false),
        )]));
        LeModel::build(sample_model("default"), &DataHandlerRegistry::new(), &registry)
            .await
            .unwrap()
    }

    fn row(pairs: &[(&str, DataValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_insert_spreads_over_hierarchy_tables() {
        let model = model().await;
        let numero = model.class("Numero").unwrap();
        let statements = MysqlQueryBuilder::new()
            .insert(
                &numero,
                &row(&[
                    ("lodel_id", DataValue::Int(1)),
                    ("class_id", DataValue::from("Publication")),
                    ("type_id", DataValue::from("Numero")),
                    ("titre", DataValue::from("FooBar")),
                ]),
            )
            .unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO `object` (`lodel_id`, `class_id`, `type_id`) VALUES (?, ?, ?)"
        );
        assert_eq!(
            statements[0].params,
            vec![DataValue::Int(1), DataValue::from("Publication"), DataValue::from("Numero")]
        );
        assert_eq!(
            statements[1].sql,
            "INSERT INTO `class_publication` (`lodel_id`, `titre`) VALUES (?, ?)"
        );
        assert_eq!(statements[1].params, vec![DataValue::Int(1), DataValue::from("FooBar")]);
    }

    #[tokio::test]
    async fn test_insert_writes_satellite_rows() {
        let model = model().await;
        let article = model.class("Article").unwrap();
        let mut resume = MlString::new();
        resume.set("fre", "Bonjour");
        let statements = MysqlQueryBuilder::new()
            .insert(
                &article,
                &row(&[("lodel_id", DataValue::Int(3)), ("resume", resume.to_data_value())]),
            )
            .unwrap();

        let last = statements.last().unwrap();
        assert_eq!(
            last.sql,
            "INSERT INTO `class_textes_resume` (`lodel_id`, `lang`, `value`) VALUES (?, ?, ?)"
        );
        assert_eq!(
            last.params,
            vec![DataValue::Int(3), DataValue::from("fre"), DataValue::from("Bonjour")]
        );

        let numero = model.class("Numero").unwrap();
        let statements = MysqlQueryBuilder::new()
            .insert(
                &numero,
                &row(&[("lodel_id", DataValue::Int(4)), ("articles", DataValue::from(vec![3_i64, 5]))]),
            )
            .unwrap();
        let relations: Vec<_> = statements
            .iter()
            .filter(|s| s.sql.starts_with("INSERT INTO `relation`"))
            .collect();
        assert_eq!(relations.len(), 2);
        assert_eq!(
            relations[1].params,
            vec![
                DataValue::Int(4),
                DataValue::Int(5),
                DataValue::from("Numero.articles"),
                DataValue::Int(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_satellite_rows_rebuild_mlstring() {
        let model = model().await;
        let article = model.class("Article").unwrap();
        let mut resume = MlString::new();
        resume.set("fre", "Bonjour");
        resume.set("eng", "Hello");
        let builder = MysqlQueryBuilder::new();

        let mut records = Vec::new();
        for (uid, ml) in [(3_i64, &resume), (4, &MlString::with_default("Other"))] {
            let statements = builder
                .insert(&article, &row(&[("lodel_id", DataValue::Int(uid)), ("resume", ml.to_data_value())]))
                .unwrap();
            for statement in statements
                .iter()
                .filter(|s| s.sql.starts_with("INSERT INTO `class_textes_resume`"))
            {
                let lang = match &statement.params[1] {
                    DataValue::String(lang) => lang.clone(),
                    other => panic!("语言列类型错误: {:?}", other),
                };
                let text = match &statement.params[2] {
                    DataValue::String(text) => Some(text.clone()),
                    _ => None,
                };
                records.push((statement.params[0].clone(), lang, text));
            }
        }
        assert_eq!(records.len(), 3);

        let rebuilt = MysqlQueryBuilder::collect_mlstrings(records);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0], (DataValue::Int(3), resume));
        assert_eq!(rebuilt[1].1.get("eng"), Some("Other"));
    }

    #[tokio::test]
    async fn test_select_joins_and_filters() {
        let model = model().await;
        let article = model.class("Article").unwrap();
        let query = SelectQuery {
            filters: vec![
                SimpleFilter::new("lodel_id", QueryOperator::Eq, DataValue::Int(42)),
                SimpleFilter::new("soustitre", QueryOperator::Eq, DataValue::from("foobar")),
            ],
            ..SelectQuery::default()
        };
        let plan = MysqlQueryBuilder::new().select(&model, &article, &query).unwrap();
        let sql = &plan.statement.sql;

        assert!(sql.contains("FROM `object` LEFT JOIN"));
        assert!(sql.contains("LEFT JOIN `class_textes` ON `object`.`lodel_id` = `class_textes`.`lodel_id`"));
        assert!(sql.contains(
            "WHERE `object`.`lodel_id` = ? AND `class_textes`.`soustitre` = ? AND `object`.`type_id` IN (?)"
        ));
        assert_eq!(
            plan.statement.params,
            vec![DataValue::Int(42), DataValue::from("foobar"), DataValue::from("Article")]
        );
        assert_eq!(
            plan.mlstring_fields,
            vec![("resume".to_string(), "class_textes_resume".to_string())]
        );
        assert!(plan.columns.contains(&"author".to_string()));
    }

    #[tokio::test]
    async fn test_select_abstract_class_and_pagination() {
        let model = model().await;
        let textes = model.class("Textes").unwrap();
        let query = SelectQuery {
            field_list: vec!["titre".to_string()],
            filters: vec![
                SimpleFilter::new("titre", QueryOperator::NotLike, DataValue::from("foo*")),
                SimpleFilter::new("soustitre", QueryOperator::Eq, DataValue::Null),
                SimpleFilter::new("lodel_id", QueryOperator::In, DataValue::Array(vec![])),
            ],
            order: vec![OrderClause::desc("titre")],
            offset: 5,
            ..SelectQuery::default()
        };
        let plan = MysqlQueryBuilder::new().select(&model, &textes, &query).unwrap();
        let sql = &plan.statement.sql;

        assert!(sql.starts_with("SELECT `class_textes`.`titre` AS `titre`, `object`.`lodel_id` AS `lodel_id`"));
        assert!(sql.contains("`class_textes`.`titre` NOT LIKE ?"));
        assert!(sql.contains("`class_textes`.`soustitre` IS NULL"));
        assert!(sql.contains("0 = 1"));
        assert!(sql.ends_with(" ORDER BY `class_textes`.`titre` DESC LIMIT 18446744073709551615 OFFSET ?"));
        assert_eq!(
            plan.statement.params,
            vec![DataValue::from("foo%"), DataValue::from("Article"), DataValue::Int(5)]
        );
    }

    #[tokio::test]
    async fn test_relational_filter_becomes_subselect() {
        let model = model().await;
        let article = model.class("Article").unwrap();
        let query = SelectQuery {
            field_list: vec!["titre".to_string()],
            relational_filters: vec![RelationalFilter {
                field: "author".to_string(),
                references: vec![("Person".to_string(), "lastname".to_string())],
                operator: QueryOperator::Eq,
                value: DataValue::from("Doe"),
            }],
            ..SelectQuery::default()
        };
        let plan = MysqlQueryBuilder::new().select(&model, &article, &query).unwrap();

        assert!(plan.statement.sql.contains(
            "(`class_article`.`author` IN (SELECT `object`.`lodel_id` FROM `object` LEFT JOIN `class_person`"
        ));
        assert!(plan.statement.sql.contains("`class_person`.`lastname` = ?"));
        assert_eq!(
            plan.statement.params,
            vec![DataValue::from("Doe"), DataValue::from("Person"), DataValue::from("Article")]
        );
    }

    #[tokio::test]
    async fn test_delete_and_backref_statements() {
        let model = model().await;
        let numero = model.class("Numero").unwrap();
        let builder = MysqlQueryBuilder::new();

        let statements = builder.delete(&numero, &[DataValue::Int(7)], true).unwrap();
        let sqls: Vec<&str> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sqls,
            vec![
                "DELETE FROM `relation` WHERE `id_superior` = ? OR `id_subordinate` = ?",
                "DELETE FROM `class_publication` WHERE `lodel_id` = ?",
                "DELETE FROM `object` WHERE `lodel_id` = ?",
            ]
        );

        let updates = vec![
            BackrefUpdate {
                class: "Person".to_string(),
                uid: DataValue::Int(2),
                field: "linked_texts".to_string(),
                action: BackrefAction::Add,
                value: DataValue::Int(9),
            },
            BackrefUpdate {
                class: "Article".to_string(),
                uid: DataValue::Int(9),
                field: "author".to_string(),
                action: BackrefAction::Unset,
                value: DataValue::Int(2),
            },
        ];
        let statements = builder.backref_statements(&model, &updates).unwrap();
        assert!(statements[0].sql.contains("FROM DUAL WHERE NOT EXISTS"));
        assert_eq!(statements[0].params.len(), 6);
        assert_eq!(
            statements[1].sql,
            "UPDATE `class_article` SET `author` = NULL WHERE `lodel_id` = ? AND `author` = ?"
        );

        let invalid = BackrefUpdate {
            action: BackrefAction::Set,
            ..updates[0].clone()
        };
        assert!(builder.backref_statements(&model, &[invalid]).is_err());
    }

    #[tokio::test]
    async fn test_next_id() {
        let model = model().await;
        let person = model.class("Person").unwrap();
        assert_eq!(
            MysqlQueryBuilder::new().next_id(&person).unwrap().sql,
            "SELECT COALESCE(MAX(`lodel_id`), 0) + 1 AS `next_id` FROM `object`"
        );
    }
}
