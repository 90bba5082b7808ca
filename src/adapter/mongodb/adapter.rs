//! MongoDB数据源
//!
//! 每个具体类一个集合，集合名即类名。抽象类的查询分发到所有具体子类的集合，
//! 合并后在内存中排序、分组和分页。

use super::query_builder::MongoQueryBuilder;
use super::utils::{bson_to_data_value, data_value_to_bson, document_to_row, row_to_document};
use crate::adapter::backref::{plan_backref_updates, BackrefAction, BackrefUpdate, ObjectChange};
use crate::adapter::matcher::{group_rows, paginate, project, sort_rows};
use crate::adapter::{Datasource, SelectQuery};
use crate::error::{LodelError, LodelResult};
use crate::leapi::query::{RelationalFilter, SimpleFilter};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::{ConnectionConfig, DataValue};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOneOptions;
use mongodb::{Client, Collection, Database};
use rat_logger::{debug, info, warn};

fn driver_error(context: &str, err: mongodb::error::Error) -> LodelError {
    crate::lodel_error!(datasource, format!("{}: {}", context, err))
}

fn uid_name(class: &LeClass) -> LodelResult<&str> {
    class
        .uid()
        .first()
        .map(|s| s.as_str())
        .ok_or_else(|| crate::lodel_error!(datasource, format!("类 {} 没有标识字段", class.name())))
}

/// MongoDB数据源
pub struct MongoDatasource {
    name: String,
    db: Database,
    builder: MongoQueryBuilder,
}

impl MongoDatasource {
    pub async fn connect(name: &str, connection: &ConnectionConfig) -> LodelResult<Self> {
        let ConnectionConfig::MongoDB { host, port, database, .. } = connection else {
            return Err(crate::lodel_error!(config, "MongoDB数据源的连接配置类型不匹配"));
        };
        let uri = connection
            .connection_uri()
            .ok_or_else(|| crate::lodel_error!(config, "无法生成MongoDB连接URI"))?;

        info!("连接MongoDB数据源 {}: {}:{}/{}", name, host, port, database);
        let client = Client::with_uri_str(&uri)
            .await
            .map_err(|e| {
                crate::lodel_error!(
                    datasource,
                    crate::i18n::tf("error.connection", &[("message", &e.to_string())])
                )
            })?;

        Ok(Self {
            name: name.to_string(),
            db: client.database(database),
            builder: MongoQueryBuilder::new(),
        })
    }

    fn collection(&self, class_name: &str) -> LodelResult<Collection<Document>> {
        self.builder.validate(class_name)?;
        Ok(self.db.collection::<Document>(class_name))
    }

    async fn aggregate(&self, class_name: &str, pipeline: Vec<Document>) -> LodelResult<Vec<Row>> {
        debug!("[{}] {} 聚合管道: {:?}", self.name, class_name, pipeline);
        let cursor = self
            .collection(class_name)?
            .aggregate(pipeline, None)
            .await
            .map_err(|e| driver_error("MongoDB查询失败", e))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| driver_error("读取MongoDB游标失败", e))?;
        Ok(documents.iter().map(document_to_row).collect())
    }

    /// 在类的每个具体子类集合中执行更新，直到有文档匹配
    async fn update_in_hierarchy(&self, class: &LeClass, filter: &Document, change: &Document) -> LodelResult<bool> {
        for concrete in class.concrete_descendants() {
            let result = self
                .collection(concrete)?
                .update_one(filter.clone(), change.clone(), None)
                .await
                .map_err(|e| driver_error("MongoDB更新失败", e))?;
            if result.matched_count > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn apply_backrefs(&self, model: &LeModel, updates: &[BackrefUpdate]) -> LodelResult<()> {
        for update in updates {
            let class = model.class(&update.class)?;
            let uid_field = uid_name(&class)?;
            self.builder.validate(&update.field)?;
            let field = update.field.as_str();
            let uid = data_value_to_bson(&update.uid);
            let value = data_value_to_bson(&update.value);

            let found = match update.action {
                BackrefAction::Add => {
                    // `$addToSet` 不能作用于空值，字段还不是数组时直接设置
                    let appended = self
                        .update_in_hierarchy(
                            &class,
                            &doc! { uid_field: uid.clone(), field: { "$type": "array" } },
                            &doc! { "$addToSet": { field: value.clone() } },
                        )
                        .await?;
                    appended
                        || self
                            .update_in_hierarchy(
                                &class,
                                &doc! { uid_field: uid },
                                &doc! { "$set": { field: [value] } },
                            )
                            .await?
                }
                BackrefAction::Remove => {
                    self.update_in_hierarchy(&class, &doc! { uid_field: uid }, &doc! { "$pull": { field: value } })
                        .await?
                }
                BackrefAction::Set => {
                    self.update_in_hierarchy(&class, &doc! { uid_field: uid }, &doc! { "$set": { field: value } })
                        .await?
                }
                BackrefAction::Unset => {
                    self.update_in_hierarchy(
                        &class,
                        &doc! { uid_field: uid, field: value },
                        &doc! { "$set": { field: Bson::Null } },
                    )
                    .await?
                }
            };
            if found {
                debug!("[{}] 反向引用更新 {}({}).{} {:?}", self.name, update.class, update.uid, update.field, update.action);
            } else if update.action != BackrefAction::Unset {
                warn!("[{}] 反向引用目标 {}({}) 不存在", self.name, update.class, update.uid);
            }
        }
        Ok(())
    }

    fn uid_in(uid_field: &str, rows: &[Row]) -> Document {
        let uids: Vec<Bson> = rows
            .iter()
            .map(|row| data_value_to_bson(row.get(uid_field).unwrap_or(&DataValue::Null)))
            .collect();
        doc! { uid_field: { "$in": uids } }
    }

    fn changes(uid_field: &str, befores: Vec<Row>, datas: Option<&Row>) -> Vec<ObjectChange> {
        befores
            .into_iter()
            .map(|before| {
                let after = datas.map(|datas| {
                    let mut after = before.clone();
                    for (k, v) in datas {
                        after.insert(k.clone(), v.clone());
                    }
                    after
                });
                ObjectChange {
                    uid: before.get(uid_field).cloned().unwrap_or(DataValue::Null),
                    before: Some(before),
                    after,
                }
            })
            .collect()
    }

    /// 每个具体子类集合中匹配的完整文档
    async fn matching(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<Vec<(String, Vec<Row>)>> {
        let mut found = Vec::new();
        for concrete in class.concrete_descendants() {
            let pipeline = self.builder.pipeline(model, filters, relational_filters, &[], &[], None)?;
            let rows = self.aggregate(concrete, pipeline).await?;
            if !rows.is_empty() {
                found.push((concrete.clone(), rows));
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl Datasource for MongoDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<Vec<Row>> {
        let concretes = class.concrete_descendants();
        // 只有一个集合且不分组时排序和分页交给服务端
        let in_server = concretes.len() == 1 && query.group.is_empty();

        let mut rows = Vec::new();
        for concrete in concretes {
            let pipeline = if in_server {
                self.builder.pipeline(
                    model,
                    &query.filters,
                    &query.relational_filters,
                    &query.order,
                    &query.field_list,
                    Some((query.offset, query.limit)),
                )?
            } else {
                self.builder.pipeline(model, &query.filters, &query.relational_filters, &[], &[], None)?
            };
            rows.extend(self.aggregate(concrete, pipeline).await?);
        }
        if in_server {
            return Ok(rows);
        }

        sort_rows(&mut rows, &query.order);
        let rows = group_rows(rows, &query.group);
        let rows = paginate(rows, query.offset, query.limit);
        Ok(rows.iter().map(|row| project(row, &query.field_list)).collect())
    }

    async fn insert(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
        let uid = datas.get(uid_name(class)?).cloned().unwrap_or(DataValue::Null);
        self.collection(class.name())?
            .insert_one(row_to_document(&datas), None)
            .await
            .map_err(|e| driver_error("MongoDB插入失败", e))?;

        let updates = plan_backref_updates(
            model,
            class,
            &[ObjectChange {
                uid: uid.clone(),
                before: None,
                after: Some(datas),
            }],
        )?;
        self.apply_backrefs(model, &updates).await?;
        debug!("[{}] 插入 {}({})", self.name, class.name(), uid);
        Ok(uid)
    }

    async fn insert_multi(&self, model: &LeModel, class: &LeClass, datas: Vec<Row>) -> LodelResult<Vec<DataValue>> {
        if datas.is_empty() {
            return Ok(Vec::new());
        }
        let uid_field = uid_name(class)?;
        self.collection(class.name())?
            .insert_many(datas.iter().map(row_to_document), None)
            .await
            .map_err(|e| driver_error("MongoDB批量插入失败", e))?;

        let changes: Vec<ObjectChange> = datas
            .into_iter()
            .map(|row| ObjectChange {
                uid: row.get(uid_field).cloned().unwrap_or(DataValue::Null),
                before: None,
                after: Some(row),
            })
            .collect();
        let updates = plan_backref_updates(model, class, &changes)?;
        self.apply_backrefs(model, &updates).await?;
        Ok(changes.into_iter().map(|c| c.uid).collect())
    }

    async fn update(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
        datas: &Row,
    ) -> LodelResult<u64> {
        let mut updated = 0u64;
        for (concrete_name, befores) in self.matching(model, class, filters, relational_filters).await? {
            let concrete = model.class(&concrete_name)?;
            let uid_field = uid_name(&concrete)?;
            if !datas.is_empty() {
                self.collection(&concrete_name)?
                    .update_many(
                        Self::uid_in(uid_field, &befores),
                        doc! { "$set": row_to_document(datas) },
                        None,
                    )
                    .await
                    .map_err(|e| driver_error("MongoDB更新失败", e))?;
            }
            updated += befores.len() as u64;
            let changes = Self::changes(uid_field, befores, Some(datas));
            let updates = plan_backref_updates(model, &concrete, &changes)?;
            self.apply_backrefs(model, &updates).await?;
        }
        Ok(updated)
    }

    async fn delete(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<u64> {
        let mut deleted = 0u64;
        for (concrete_name, befores) in self.matching(model, class, filters, relational_filters).await? {
            let concrete = model.class(&concrete_name)?;
            let uid_field = uid_name(&concrete)?;
            let result = self
                .collection(&concrete_name)?
                .delete_many(Self::uid_in(uid_field, &befores), None)
                .await
                .map_err(|e| driver_error("MongoDB删除失败", e))?;
            deleted += result.deleted_count;
            let changes = Self::changes(uid_field, befores, None);
            let updates = plan_backref_updates(model, &concrete, &changes)?;
            self.apply_backrefs(model, &updates).await?;
        }
        Ok(deleted)
    }

    async fn new_numeric_id(&self, model: &LeModel, class: &LeClass) -> LodelResult<i64> {
        let root = model.class(class.root())?;
        let uid_field = uid_name(&root)?;
        let mut max = 0i64;
        for concrete in root.concrete_descendants() {
            let options = FindOneOptions::builder().sort(doc! { uid_field: -1 }).build();
            let last = self
                .collection(concrete)?
                .find_one(doc! {}, options)
                .await
                .map_err(|e| driver_error("MongoDB查询失败", e))?;
            let value = last
                .as_ref()
                .and_then(|doc| doc.get(uid_field))
                .map(bson_to_data_value)
                .and_then(|v| v.as_i64());
            if let Some(value) = value {
                max = max.max(value);
            }
        }
        Ok(max + 1)
    }
}
