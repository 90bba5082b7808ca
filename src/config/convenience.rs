//! # 便利配置函数模块
//!
//! 常用数据源配置的简写，内部仍通过 `DatasourceConfig::builder()` 验证

use crate::error::LodelResult;
use crate::types::{ConnectionConfig, DatasourceConfig, DatasourceKind};

/// 创建MySQL数据源配置
///
/// # 参数
///
/// * `host` - 主机地址
/// * `port` - 端口号
/// * `database` - 数据库名
/// * `username` - 用户名
/// * `password` - 密码
/// * `max_connections` - 连接池最大连接数
pub fn mysql_config<S: Into<String>>(
    host: S,
    port: u16,
    database: S,
    username: S,
    password: S,
    max_connections: u32,
) -> LodelResult<DatasourceConfig> {
    DatasourceConfig::builder()
        .kind(DatasourceKind::MySQL)
        .read_only(false)
        .connection(ConnectionConfig::MySQL {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            max_connections,
        })
        .build()
}

/// 创建MongoDB数据源配置
///
/// # 参数
///
/// * `host` - 主机地址
/// * `port` - 端口号
/// * `database` - 数据库名
/// * `username` - 用户名（可选）
/// * `password` - 密码（可选）
pub fn mongodb_config<S: Into<String>>(
    host: S,
    port: u16,
    database: S,
    username: Option<String>,
    password: Option<String>,
) -> LodelResult<DatasourceConfig> {
    DatasourceConfig::builder()
        .kind(DatasourceKind::MongoDB)
        .read_only(false)
        .connection(ConnectionConfig::MongoDB {
            host: host.into(),
            port,
            database: database.into(),
            username,
            password,
            auth_source: None,
        })
        .build()
}

/// 创建JSON文件数据源配置，`path` 为 None 时仅保存在内存中
pub fn json_file_config(path: Option<String>, read_only: bool) -> LodelResult<DatasourceConfig> {
    DatasourceConfig::builder()
        .kind(DatasourceKind::JsonFile)
        .read_only(read_only)
        .connection(ConnectionConfig::JsonFile { path })
        .build()
}

/// 空数据源配置
pub fn dummy_config(read_only: bool) -> DatasourceConfig {
    DatasourceConfig {
        kind: DatasourceKind::Dummy,
        read_only,
        connection: ConnectionConfig::Dummy,
    }
}
