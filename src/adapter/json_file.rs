//! JSON 文件数据源
//!
//! 进程内的文档存储，每个具体类一个集合。配置了路径时每次写操作后把整个
//! 存储写入 JSON 文件（先写临时文件再替换），打开时重新加载。
//! 过滤、排序、分组和分页都在内存中完成，反向引用通过 [`super::backref`] 维护。

use super::backref::{apply_backref_update, plan_backref_updates, BackrefUpdate, ObjectChange};
use super::matcher::{group_rows, paginate, project, row_matches, sort_rows, value_matches};
use super::{Datasource, SelectQuery};
use crate::error::LodelResult;
use crate::leapi::query::{QueryOperator, RelationalFilter, SimpleFilter};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::{ConnectionConfig, DataValue};
use async_trait::async_trait;
use parking_lot::RwLock;
use rat_logger::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    collections: HashMap<String, Vec<Row>>,
    last_id: i64,
}

fn uid_field(class: &LeClass) -> LodelResult<&str> {
    class
        .uid()
        .first()
        .map(|s| s.as_str())
        .ok_or_else(|| crate::lodel_error!(datasource, format!("类 {} 没有标识字段", class.name())))
}

impl Store {
    /// 把关系过滤器解析为 `field in [uids]`
    fn resolve_relational(
        &self,
        model: &LeModel,
        filters: &[RelationalFilter],
    ) -> LodelResult<Vec<SimpleFilter>> {
        let mut resolved = Vec::with_capacity(filters.len());
        for filter in filters {
            let mut uids: Vec<DataValue> = Vec::new();
            for (class_name, ref_field) in &filter.references {
                let referenced = model.class(class_name)?;
                let uid_name = uid_field(&referenced)?;
                for concrete in referenced.concrete_descendants() {
                    for row in self.collections.get(concrete).into_iter().flatten() {
                        let stored = row.get(ref_field).unwrap_or(&DataValue::Null);
                        if value_matches(stored, filter.operator, &filter.value)? {
                            if let Some(uid) = row.get(uid_name) {
                                if !uids.contains(uid) {
                                    uids.push(uid.clone());
                                }
                            }
                        }
                    }
                }
            }
            resolved.push(SimpleFilter::new(
                &filter.field,
                QueryOperator::In,
                DataValue::Array(uids),
            ));
        }
        Ok(resolved)
    }

    /// 匹配行的位置 (具体类名, 下标)
    fn matching(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<Vec<(String, usize)>> {
        let mut all_filters = filters.to_vec();
        all_filters.extend(self.resolve_relational(model, relational_filters)?);

        let mut positions = Vec::new();
        for concrete in class.concrete_descendants() {
            for (i, row) in self.collections.get(concrete).into_iter().flatten().enumerate() {
                if row_matches(row, &all_filters)? {
                    positions.push((concrete.clone(), i));
                }
            }
        }
        Ok(positions)
    }

    fn apply_backrefs(&mut self, model: &LeModel, updates: &[BackrefUpdate]) -> LodelResult<()> {
        for update in updates {
            let class = model.class(&update.class)?;
            let uid_name = uid_field(&class)?.to_string();
            let mut found = false;
            for concrete in class.concrete_descendants() {
                let Some(rows) = self.collections.get_mut(concrete) else {
                    continue;
                };
                if let Some(row) = rows
                    .iter_mut()
                    .find(|r| r.get(&uid_name).is_some_and(|v| v.loose_eq(&update.uid)))
                {
                    if apply_backref_update(row, update) {
                        debug!("反向引用更新 {}({}).{} {:?}", concrete, update.uid, update.field, update.action);
                    }
                    found = true;
                    break;
                }
            }
            if !found {
                warn!("反向引用目标 {}({}) 不存在", update.class, update.uid);
            }
        }
        Ok(())
    }

    fn bump_last_id(&mut self, uid: &DataValue) {
        if let DataValue::Int(id) = uid {
            self.last_id = self.last_id.max(*id);
        }
    }
}

/// JSON 文件数据源
pub struct JsonFileDatasource {
    name: String,
    path: Option<PathBuf>,
    store: RwLock<Store>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileDatasource {
    /// 只保存在内存中的存储
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            store: RwLock::new(Store::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 按连接配置打开存储，文件存在时加载其内容
    pub async fn open(name: &str, connection: &ConnectionConfig) -> LodelResult<Self> {
        let path = match connection {
            ConnectionConfig::JsonFile { path } => path.clone(),
            _ => {
                return Err(crate::lodel_error!(
                    config,
                    "JSON文件数据源的连接配置类型不匹配"
                ));
            }
        };
        let Some(path) = path else {
            info!("JSON文件数据源 {} 仅保存在内存中", name);
            return Ok(Self::in_memory(name));
        };

        let path = PathBuf::from(path);
        let store = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let store: Store = serde_json::from_str(&content).map_err(|e| {
                crate::lodel_error!(
                    datasource,
                    format!("无法解析JSON文件 {}: {}", path.display(), e)
                )
            })?;
            info!(
                "加载JSON文件数据源 {}: {} 个集合",
                path.display(),
                store.collections.len()
            );
            store
        } else {
            Store::default()
        };

        Ok(Self {
            name: name.to_string(),
            path: Some(path),
            store: RwLock::new(store),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// 写入文件，未配置路径时不做任何事
    async fn persist(&self) -> LodelResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let content = {
            let store = self.store.read();
            serde_json::to_string_pretty(&*store)?
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("JSON文件数据源 {} 已写入 {}", self.name, path.display());
        Ok(())
    }

    fn insert_row(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
        let uid = datas
            .get(uid_field(class)?)
            .cloned()
            .unwrap_or(DataValue::Null);
        let updates = plan_backref_updates(
            model,
            class,
            &[ObjectChange {
                uid: uid.clone(),
                before: None,
                after: Some(datas.clone()),
            }],
        )?;

        let mut store = self.store.write();
        store.bump_last_id(&uid);
        store
            .collections
            .entry(class.name().to_string())
            .or_default()
            .push(datas);
        store.apply_backrefs(model, &updates)?;
        Ok(uid)
    }
}

#[async_trait]
impl Datasource for JsonFileDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery) -> LodelResult<Vec<Row>> {
        let mut rows: Vec<Row> = {
            let store = self.store.read();
            store
                .matching(model, class, &query.filters, &query.relational_filters)?
                .into_iter()
                .filter_map(|(concrete, i)| store.collections.get(&concrete).and_then(|r| r.get(i)).cloned())
                .collect()
        };
        sort_rows(&mut rows, &query.order);
        let rows = group_rows(rows, &query.group);
        let rows = paginate(rows, query.offset, query.limit);
        Ok(rows.iter().map(|row| project(row, &query.field_list)).collect())
    }

    async fn insert(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue> {
        let uid = self.insert_row(model, class, datas)?;
        self.persist().await?;
        debug!("[{}] 插入 {}({})", self.name, class.name(), uid);
        Ok(uid)
    }

    async fn insert_multi(&self, model: &LeModel, class: &LeClass, datas: Vec<Row>) -> LodelResult<Vec<DataValue>> {
        let mut uids = Vec::with_capacity(datas.len());
        for row in datas {
            uids.push(self.insert_row(model, class, row)?);
        }
        self.persist().await?;
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
        let updated = {
            let mut store = self.store.write();
            let positions = store.matching(model, class, filters, relational_filters)?;
            let mut changes: Vec<(String, ObjectChange)> = Vec::new();
            for (concrete, i) in &positions {
                let concrete_class = model.class(concrete)?;
                let uid_name = uid_field(&concrete_class)?.to_string();
                let Some(row) = store.collections.get_mut(concrete).and_then(|r| r.get_mut(*i)) else {
                    continue;
                };
                let before = row.clone();
                for (k, v) in datas {
                    row.insert(k.clone(), v.clone());
                }
                changes.push((
                    concrete.clone(),
                    ObjectChange {
                        uid: row.get(&uid_name).cloned().unwrap_or(DataValue::Null),
                        before: Some(before),
                        after: Some(row.clone()),
                    },
                ));
            }
            for (concrete, change) in &changes {
                let concrete_class = model.class(concrete)?;
                let updates = plan_backref_updates(model, &concrete_class, std::slice::from_ref(change))?;
                store.apply_backrefs(model, &updates)?;
            }
            changes.len() as u64
        };
        if updated > 0 {
            self.persist().await?;
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
        let deleted = {
            let mut store = self.store.write();
            let positions = store.matching(model, class, filters, relational_filters)?;
            let mut by_class: HashMap<String, Vec<usize>> = HashMap::new();
            for (concrete, i) in positions {
                by_class.entry(concrete).or_default().push(i);
            }

            let mut deleted = 0u64;
            for (concrete, indexes) in by_class {
                let concrete_class = model.class(&concrete)?;
                let uid_name = uid_field(&concrete_class)?.to_string();
                let Some(rows) = store.collections.get_mut(&concrete) else {
                    continue;
                };
                let mut removed = Vec::new();
                let mut index = 0usize;
                rows.retain(|row| {
                    let keep = !indexes.contains(&index);
                    index += 1;
                    if !keep {
                        removed.push(row.clone());
                    }
                    keep
                });
                let changes: Vec<ObjectChange> = removed
                    .into_iter()
                    .map(|row| ObjectChange {
                        uid: row.get(&uid_name).cloned().unwrap_or(DataValue::Null),
                        before: Some(row),
                        after: None,
                    })
                    .collect();
                deleted += changes.len() as u64;
                let updates = plan_backref_updates(model, &concrete_class, &changes)?;
                store.apply_backrefs(model, &updates)?;
            }
            deleted
        };
        if deleted > 0 {
            self.persist().await?;
        }
        Ok(deleted)
    }

    async fn new_numeric_id(&self, _model: &LeModel, _class: &LeClass) -> LodelResult<i64> {
        let mut store = self.store.write();
        store.last_id += 1;
        Ok(store.last_id)
    }
}
