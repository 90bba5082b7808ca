//! MySQL数据源
//!
//! 基于sqlx连接池执行 [`MysqlQueryBuilder`] 生成的语句，多语句写操作在同一事务中完成

use super::query_builder::{MysqlQueryBuilder, SelectPlan, SqlStatement};
use super::schema::{FieldStorage, MysqlSchema};
use crate::adapter::backref::{plan_backref_updates, ObjectChange};
use crate::adapter::{Datasource, SelectQuery};
use crate::error::{LodelError, LodelResult};
use crate::leapi::query::{QueryOperator, RelationalFilter, SimpleFilter};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::{ConnectionConfig, DataValue};
use async_trait::async_trait;
use rat_logger::{debug, info, warn};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, Pool, Row as _, Transaction};

fn driver_error(context: &str, err: sqlx::Error) -> LodelError {
    crate::lodel_error!(datasource, format!("{}: {}", context, err))
}

/// MySQL数据源
pub struct MysqlDatasource {
    name: String,
    pool: Pool<MySql>,
    builder: MysqlQueryBuilder,
}

impl MysqlDatasource {
    /// 建立连接池
    pub async fn connect(name: &str, connection: &ConnectionConfig) -> LodelResult<Self> {
        let ConnectionConfig::MySQL {
            host,
            port,
            database,
            max_connections,
            ..
        } = connection
        else {
            return Err(crate::lodel_error!(config, "MySQL数据源的连接配置类型不匹配"));
        };
        let uri = connection
            .connection_uri()
            .ok_or_else(|| crate::lodel_error!(config, "无法生成MySQL连接URI"))?;

        info!("连接MySQL数据源 {}: {}:{}/{}", name, host, port, database);
        let pool = MySqlPoolOptions::new()
            .max_connections(*max_connections)
            .connect(&uri)
            .await
            .map_err(|e| {
                crate::lodel_error!(
                    datasource,
                    crate::i18n::tf("error.connection", &[("message", &e.to_string())])
                )
            })?;

        Ok(Self {
            name: name.to_string(),
            pool,
            builder: MysqlQueryBuilder::new(),
        })
    }

    /// 创建模型中属于本数据源的全部表和触发器
    pub async fn create_schema(&self, model: &LeModel) -> LodelResult<()> {
        let statements = self.builder.schema().create_statements(model, &self.name)?;
        for sql in &statements {
            let result = sqlx::query::<MySql>(sql).execute(&self.pool).await;
            match result {
                Ok(_) => debug!("[{}] {}", self.name, sql),
                // 触发器没有 IF NOT EXISTS 语法，重复创建时报错
                Err(e) if sql.starts_with("CREATE TRIGGER") => {
                    warn!("[{}] 跳过触发器: {}", self.name, e)
                }
                Err(e) => return Err(driver_error("建表失败", e)),
            }
        }
        info!("[{}] 已创建 {} 条表结构语句", self.name, statements.len());
        Ok(())
    }

    async fn fetch(&self, statement: &SqlStatement) -> LodelResult<Vec<MySqlRow>> {
        Self::prepare(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| driver_error("执行MySQL查询失败", e))
    }

    async fn execute_all(
        tx: &mut Transaction<'_, MySql>,
        statements: &[SqlStatement],
    ) -> LodelResult<u64> {
        let mut affected = 0;
        for statement in statements {
            let result = Self::prepare(statement)
                .execute(&mut **tx)
                .await
                .map_err(|e| driver_error("执行MySQL语句失败", e))?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    async fn begin(&self) -> LodelResult<Transaction<'_, MySql>> {
        self.pool
            .begin()
            .await
            .map_err(|e| driver_error("开始事务失败", e))
    }

    async fn commit(tx: Transaction<'_, MySql>) -> LodelResult<()> {
        tx.commit().await.map_err(|e| driver_error("提交事务失败", e))
    }

    /// 本数据源是否有字段存放在关系表中
    fn uses_relation(&self, model: &LeModel) -> bool {
        model
            .classes()
            .filter(|class| class.datasource_name() == self.name)
            .any(|class| {
                class.fields().any(|(name, _)| {
                    matches!(
                        MysqlSchema::storage(class, name),
                        Ok(FieldStorage::Relation { .. })
                    )
                })
            })
    }

    fn uid_of(class: &LeClass, row: &Row) -> Vec<DataValue> {
        class
            .uid()
            .iter()
            .map(|uid| row.get(uid).cloned().unwrap_or(DataValue::Null))
            .collect()
    }

    fn uid_filters(class: &LeClass, uid: &[DataValue]) -> Vec<SimpleFilter> {
        class
            .uid()
            .iter()
            .zip(uid)
            .map(|(name, value)| SimpleFilter::new(name, QueryOperator::Eq, value.clone()))
            .collect()
    }

    /// 读取多语言和关系字段并并入结果行
    async fn load_satellites(
        &self,
        class: &LeClass,
        plan: &SelectPlan,
        rows: &mut [Row],
    ) -> LodelResult<()> {
        let Some(uid_name) = class.uid().first() else {
            return Ok(());
        };
        let uids: Vec<DataValue> = rows
            .iter()
            .filter_map(|row| row.get(uid_name).cloned())
            .collect();
        if uids.is_empty() {
            return Ok(());
        }

        for (field, table) in &plan.mlstring_fields {
            let statement = self.builder.select_mlstring(class, table, &uids)?;
            let mut records = Vec::new();
            for record in self.fetch(&statement).await? {
                let uid = Self::safe_read_integer(&record, "uid")?;
                let lang: String = record.try_get("lang").map_err(|e| driver_error("读取多语言行失败", e))?;
                let text: Option<String> = record.try_get("value").map_err(|e| driver_error("读取多语言行失败", e))?;
                records.push((uid, lang, text));
            }
            let values = MysqlQueryBuilder::collect_mlstrings(records);
            for row in rows.iter_mut() {
                let value = row
                    .get(uid_name)
                    .and_then(|uid| values.iter().find(|(u, _)| u.loose_eq(uid)))
                    .map(|(_, ml)| ml.to_data_value())
                    .unwrap_or(DataValue::Null);
                row.insert(field.clone(), value);
            }
        }

        for (field, nature) in &plan.relation_fields {
            let statement = self.builder.select_relations(nature, &uids)?;
            let mut linked: Vec<(DataValue, Vec<DataValue>)> = Vec::new();
            for record in self.fetch(&statement).await? {
                let superior = Self::safe_read_integer(&record, "id_superior")?;
                let subordinate = Self::safe_read_integer(&record, "id_subordinate")?;
                match linked.iter_mut().find(|(u, _)| u.loose_eq(&superior)) {
                    Some((_, items)) => items.push(subordinate),
                    None => linked.push((superior, vec![subordinate])),
                }
            }
            for row in rows.iter_mut() {
                let items = row
                    .get(uid_name)
                    .and_then(|uid| linked.iter().find(|(u, _)| u.loose_eq(uid)))
                    .map(|(_, items)| items.clone())
                    .unwrap_or_default();
                row.insert(field.clone(), DataValue::Array(items));
            }
        }
        Ok(())
    }

    /// 匹配对象在其具体类下的完整数据
    async fn resolve_objects(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<Vec<(std::sync::Arc<LeClass>, Row)>> {
        let target = model.class(class.name())?;
        let query = SelectQuery {
            filters: filters.to_vec(),
            relational_filters: relational_filters.to_vec(),
            ..Default::default()
        };
        let rows = self.select(model, class, &query).await?;
        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            let concrete = model.concrete_class_of(&target, &row)?;
            if concrete.name() == class.name() {
                objects.push((concrete, row));
                continue;
            }
            let uid = Self::uid_of(class, &row);
            let query = SelectQuery {
                filters: Self::uid_filters(&concrete, &uid),
                ..Default::default()
            };
            let full = self.select(model, &concrete, &query).await?.into_iter().next().unwrap_or(row);
            objects.push((concrete, full));
        }
        Ok(objects)
    }
}

#[async_trait]
impl Datasource for MysqlDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<Vec<Row>> {
        let plan = self.builder.select(model, class, query)?;
        let records = self.fetch(&plan.statement).await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let mut row = Row::new();
            for column in &plan.columns {
                let handler = class.field(column)?;
                let json = plan.json_fields.contains(column);
                row.insert(
                    column.clone(),
                    Self::read_value(record, column, handler.base_type(), json)?,
                );
            }
            rows.push(row);
        }
        self.load_satellites(class, &plan, &mut rows).await?;
        debug!("[{}] {} 查询返回 {} 行", self.name, class.name(), rows.len());
        Ok(rows)
    }

    async fn insert(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
        let uid = Self::uid_of(class, &datas);
        let mut statements = self.builder.insert(class, &datas)?;
        let first_uid = uid.first().cloned().unwrap_or(DataValue::Null);
        let updates = plan_backref_updates(
            model,
            class,
            &[ObjectChange {
                uid: first_uid.clone(),
                before: None,
                after: Some(datas),
            }],
        )?;
        statements.extend(self.builder.backref_statements(model, &updates)?);

        let mut tx = self.begin().await?;
        Self::execute_all(&mut tx, &statements).await?;
        Self::commit(tx).await?;
        debug!("[{}] 插入 {}({})", self.name, class.name(), first_uid);
        Ok(first_uid)
    }

    async fn insert_multi(&self, model: &LeModel, class: &LeClass, datas: Vec<Row>) -> LodelResult<Vec<DataValue>> {
        let mut statements = Vec::new();
        let mut uids = Vec::with_capacity(datas.len());
        for row in datas {
            let uid = Self::uid_of(class, &row).first().cloned().unwrap_or(DataValue::Null);
            statements.extend(self.builder.insert(class, &row)?);
            let updates = plan_backref_updates(
                model,
                class,
                &[ObjectChange {
                    uid: uid.clone(),
                    before: None,
                    after: Some(row),
                }],
            )?;
            statements.extend(self.builder.backref_statements(model, &updates)?);
            uids.push(uid);
        }

        let mut tx = self.begin().await?;
        Self::execute_all(&mut tx, &statements).await?;
        Self::commit(tx).await?;
        Ok(uids)
    }

    async fn update(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
        datas: &Row,
    ) -> LodelResult<u64> {
        let objects = self.resolve_objects(model, class, filters, relational_filters).await?;
        if objects.is_empty() {
            return Ok(0);
        }

        let mut statements = Vec::new();
        for (concrete, before) in &objects {
            let uid = Self::uid_of(concrete, before);
            statements.extend(self.builder.update(concrete, &uid, datas)?);

            let mut after = before.clone();
            for (k, v) in datas {
                after.insert(k.clone(), v.clone());
            }
            let updates = plan_backref_updates(
                model,
                concrete,
                &[ObjectChange {
                    uid: uid.first().cloned().unwrap_or(DataValue::Null),
                    before: Some(before.clone()),
                    after: Some(after),
                }],
            )?;
            statements.extend(self.builder.backref_statements(model, &updates)?);
        }

        let mut tx = self.begin().await?;
        Self::execute_all(&mut tx, &statements).await?;
        Self::commit(tx).await?;
        debug!("[{}] 更新 {} 个 {} 对象", self.name, objects.len(), class.name());
        Ok(objects.len() as u64)
    }

    async fn delete(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<u64> {
        let objects = self.resolve_objects(model, class, filters, relational_filters).await?;
        if objects.is_empty() {
            return Ok(0);
        }

        let with_relations = self.uses_relation(model);
        let mut statements = Vec::new();
        for (concrete, before) in &objects {
            let uid = Self::uid_of(concrete, before);
            let updates = plan_backref_updates(
                model,
                concrete,
                &[ObjectChange {
                    uid: uid.first().cloned().unwrap_or(DataValue::Null),
                    before: Some(before.clone()),
                    after: None,
                }],
            )?;
            statements.extend(self.builder.backref_statements(model, &updates)?);
            statements.extend(self.builder.delete(concrete, &uid, with_relations)?);
        }

        let mut tx = self.begin().await?;
        Self::execute_all(&mut tx, &statements).await?;
        Self::commit(tx).await?;
        debug!("[{}] 删除 {} 个 {} 对象", self.name, objects.len(), class.name());
        Ok(objects.len() as u64)
    }

    async fn new_numeric_id(&self, _model: &LeModel, class: &LeClass) -> LodelResult<i64> {
        let statement = self.builder.next_id(class)?;
        let records = self.fetch(&statement).await?;
        let value = match records.first() {
            Some(record) => Self::safe_read_integer(record, "next_id")?,
            None => DataValue::Int(1),
        };
        value
            .as_i64()
            .ok_or_else(|| crate::lodel_error!(datasource, format!("无效的标识值 {}", value)))
    }
}
