//! rat_lodel - 编辑内容管理ORM库
//!
//! 以编辑模型描述内容类型（类的继承层级、字段及其数据处理器），在运行时编译为
//! [`LeModel`]，通过获取/插入/更新/删除查询操作 MySQL、MongoDB、JSON文件等数据源。
//! 日志系统由调用者自行初始化，可使用 [`logging::init_logger`]。

pub mod adapter;
pub mod config;
pub mod datahandlers;
pub mod editorial_model;
pub mod error;
pub mod i18n;
pub mod leapi;
pub mod logging;
pub mod security;
pub mod types;

pub use adapter::{Datasource, DatasourceHandles, DatasourceRegistry, SelectQuery};
pub use config::{
    dummy_config, json_file_config, mongodb_config, mysql_config, AppConfig, AppConfigBuilder,
    DatasourceConfigBuilder, LodelConfig, LodelConfigBuilder, LogLevel, LoggingConfig,
    LoggingConfigBuilder,
};
pub use datahandlers::{DataHandler, DataHandlerRegistry};
pub use editorial_model::{EditorialModel, EmClass, EmField};
pub use error::{LodelError, LodelResult};
pub use leapi::{
    GetOptions, LeClass, LeDeleteQuery, LeFilteredQuery, LeGetQuery, LeInsertQuery, LeModel,
    LeObject, LeQuery, LeUpdateQuery, OrderClause, QueryFilter, QueryOperator, Row,
    SortDirection,
};
pub use types::{ConnectionConfig, DataValue, DatasourceConfig, DatasourceKind, MlString};

use rat_logger::info;

/// 初始化rat_lodel库
///
/// 注册错误消息的多语言翻译，日志系统由调用者自行初始化
pub fn init() {
    i18n::ErrorMessageI18n::init();
}

/// 按配置加载编辑模型、创建数据源注册表并编译运行时模型
pub async fn bootstrap(config: &LodelConfig) -> LodelResult<LeModel> {
    let em = EditorialModel::from_file(&config.editorial_model)?;
    let handlers = DataHandlerRegistry::new();
    let datasources = DatasourceRegistry::new(config.datasources.clone());
    let model = LeModel::build(em, &handlers, &datasources).await?;
    info!(
        "{} 启动完成，编辑模型 {} 共 {} 个类",
        config.app.name,
        model.name(),
        model.classes().count()
    );
    Ok(model)
}

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
