//! 数据源模块
//!
//! 提供统一的数据源操作接口，屏蔽不同存储后端的实现差异。每个方法都接收
//! 运行时模型和目标类，适配器据此解析被引用的类。

use crate::error::LodelResult;
use crate::leapi::query::{OrderClause, RelationalFilter, SimpleFilter};
use crate::leapi::{LeClass, LeModel, Row};
use crate::types::{DataValue, DatasourceConfig, DatasourceKind};
use async_trait::async_trait;
use dashmap::DashMap;
use rat_logger::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

pub mod backref;
mod dummy;
mod json_file;
pub mod matcher;
pub mod mysql;
#[cfg(feature = "mongodb-support")]
pub mod mongodb;

pub use backref::{plan_backref_updates, BackrefAction, BackrefUpdate, ObjectChange};
pub use dummy::DummyDatasource;
pub use json_file::JsonFileDatasource;
#[cfg(feature = "mongodb-support")]
pub use self::mongodb::MongoDatasource;
#[cfg(feature = "mysql-support")]
pub use mysql::MysqlDatasource;
pub use mysql::{MysqlQueryBuilder, MysqlSchema, SqlStatement};

/// 获取查询交给数据源的参数
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub field_list: Vec<String>,
    pub filters: Vec<SimpleFilter>,
    pub relational_filters: Vec<RelationalFilter>,
    pub order: Vec<OrderClause>,
    pub group: Vec<OrderClause>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// 数据源trait，定义统一的数据操作接口
#[async_trait]
pub trait Datasource: Send + Sync {
    /// 数据源名称
    fn name(&self) -> &str;

    /// 查询数据
    async fn select(&self, model: &LeModel, class: &LeClass, query: &SelectQuery)
        -> LodelResult<Vec<Row>>;

    /// 插入一行，返回新对象的标识
    async fn insert(&self, model: &LeModel, class: &LeClass, datas: Row) -> LodelResult<DataValue>;

    /// 批量插入
    async fn insert_multi(
        &self,
        model: &LeModel,
        class: &LeClass,
        datas: Vec<Row>,
    ) -> LodelResult<Vec<DataValue>> {
        let mut uids = Vec::with_capacity(datas.len());
        for row in datas {
            uids.push(self.insert(model, class, row).await?);
        }
        Ok(uids)
    }

    /// 更新匹配的数据，返回更新的行数
    async fn update(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
        datas: &Row,
    ) -> LodelResult<u64>;

    /// 删除匹配的数据，返回删除的行数
    async fn delete(
        &self,
        model: &LeModel,
        class: &LeClass,
        filters: &[SimpleFilter],
        relational_filters: &[RelationalFilter],
    ) -> LodelResult<u64>;

    /// 为类层级分配一个新的数字标识
    async fn new_numeric_id(&self, model: &LeModel, class: &LeClass) -> LodelResult<i64>;
}

/// 一个数据源的只读与读写实例
#[derive(Clone)]
pub struct DatasourceHandles {
    pub ro: Arc<dyn Datasource>,
    /// 只读配置下为 None
    pub rw: Option<Arc<dyn Datasource>>,
}

/// 根据配置创建数据源实例
pub async fn create_datasource(
    name: &str,
    config: &DatasourceConfig,
) -> LodelResult<Arc<dyn Datasource>> {
    if config.connection.kind() != config.kind {
        return Err(crate::lodel_error!(
            config,
            format!(
                "数据源 {} 的类型 {} 与连接配置 {} 不匹配",
                name,
                config.kind.as_str(),
                config.connection.kind().as_str()
            )
        ));
    }
    match config.kind {
        DatasourceKind::Dummy => Ok(Arc::new(DummyDatasource::new(name))),
        DatasourceKind::JsonFile => Ok(Arc::new(
            JsonFileDatasource::open(name, &config.connection).await?,
        )),
        #[cfg(feature = "mysql-support")]
        DatasourceKind::MySQL => Ok(Arc::new(
            MysqlDatasource::connect(name, &config.connection).await?,
        )),
        #[cfg(feature = "mongodb-support")]
        DatasourceKind::MongoDB => Ok(Arc::new(
            MongoDatasource::connect(name, &config.connection).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(crate::lodel_error!(
            config,
            format!("不支持的数据源类型 {} (可能需要启用相应的feature)", other.as_str())
        )),
    }
}

/// 数据源注册表
///
/// 每个数据源名称只创建一个实例，只读与读写句柄共享该实例
pub struct DatasourceRegistry {
    configs: HashMap<String, DatasourceConfig>,
    instances: DashMap<String, (Arc<dyn Datasource>, bool)>,
}

impl DatasourceRegistry {
    pub fn new(configs: HashMap<String, DatasourceConfig>) -> Self {
        Self {
            configs,
            instances: DashMap::new(),
        }
    }

    /// 直接注册一个已创建的数据源实例
    pub fn register(&self, name: &str, datasource: Arc<dyn Datasource>, read_only: bool) {
        info!("注册数据源实例: {} (只读: {})", name, read_only);
        self.instances
            .insert(name.to_string(), (datasource, read_only));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        for entry in self.instances.iter() {
            if !names.contains(entry.key()) {
                names.push(entry.key().clone());
            }
        }
        names.sort();
        names
    }

    /// 获取数据源句柄，首次访问时按配置创建实例
    pub async fn get(&self, name: &str) -> LodelResult<DatasourceHandles> {
        if let Some(entry) = self.instances.get(name) {
            let (datasource, read_only) = entry.value();
            return Ok(Self::handles(datasource.clone(), *read_only));
        }

        let config = self.configs.get(name).ok_or_else(|| {
            crate::lodel_error!(config, crate::i18n::tf("error.datasource_not_found", &[("name", name)]))
        })?;
        debug!("创建数据源实例: {} ({})", name, config.kind.as_str());
        let created = create_datasource(name, config).await?;
        let entry = self
            .instances
            .entry(name.to_string())
            .or_insert((created, config.read_only));
        let (datasource, read_only) = entry.value();
        Ok(Self::handles(datasource.clone(), *read_only))
    }

    fn handles(datasource: Arc<dyn Datasource>, read_only: bool) -> DatasourceHandles {
        DatasourceHandles {
            rw: if read_only { None } else { Some(datasource.clone()) },
            ro: datasource,
        }
    }
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionConfig;

    fn dummy_config(read_only: bool) -> DatasourceConfig {
        DatasourceConfig {
            kind: DatasourceKind::Dummy,
            read_only,
            connection: ConnectionConfig::Dummy,
        }
    }

    #[tokio::test]
    async fn test_registry_shares_instance_between_handles() {
        let mut configs = HashMap::new();
        configs.insert("default".to_string(), dummy_config(false));
        configs.insert("archive".to_string(), dummy_config(true));
        let registry = DatasourceRegistry::new(configs);

        let handles = registry.get("default").await.unwrap();
        let rw = handles.rw.expect("读写实例");
        assert!(Arc::ptr_eq(&handles.ro, &rw));

        let again = registry.get("default").await.unwrap();
        assert!(Arc::ptr_eq(&handles.ro, &again.ro));

        let archive = registry.get("archive").await.unwrap();
        assert!(archive.rw.is_none());
        assert_eq!(archive.ro.name(), "archive");
    }

    #[tokio::test]
    async fn test_registry_rejects_unknown_and_mismatched() {
        let registry = DatasourceRegistry::default();
        assert!(registry.get("nope").await.is_err());

        let bad = DatasourceConfig {
            kind: DatasourceKind::MySQL,
            read_only: false,
            connection: ConnectionConfig::Dummy,
        };
        assert!(create_datasource("bad", &bad).await.is_err());
    }
}
