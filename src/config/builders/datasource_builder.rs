//! # 数据源配置构建器模块
//!
//! 提供数据源配置的构建器实现，支持链式调用和严格验证

use crate::error::LodelResult;
use crate::types::{ConnectionConfig, DatasourceConfig, DatasourceKind};
use rat_logger::info;

/// 数据源配置构建器
///
/// 类型、只读标志和连接配置都必须显式设置
#[derive(Debug)]
pub struct DatasourceConfigBuilder {
    kind: Option<DatasourceKind>,
    read_only: Option<bool>,
    connection: Option<ConnectionConfig>,
}

impl DatasourceConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            kind: None,
            read_only: None,
            connection: None,
        }
    }

    /// 设置数据源类型
    pub fn kind(mut self, kind: DatasourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// 设置是否只读
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// 设置连接配置
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }

    /// 构建数据源配置
    ///
    /// # 错误
    ///
    /// 配置项未设置、类型与连接配置不一致或连接参数无效时返回错误
    pub fn build(self) -> LodelResult<DatasourceConfig> {
        let kind = self
            .kind
            .ok_or_else(|| crate::lodel_error!(config, "数据源类型必须设置"))?;
        let read_only = self
            .read_only
            .ok_or_else(|| crate::lodel_error!(config, "只读标志必须设置"))?;
        let connection = self
            .connection
            .ok_or_else(|| crate::lodel_error!(config, "连接配置必须设置"))?;

        if connection.kind() != kind {
            return Err(crate::lodel_error!(
                config,
                format!(
                    "数据源类型 {} 与连接配置 {} 不匹配",
                    kind.as_str(),
                    connection.kind().as_str()
                )
            ));
        }

        match &connection {
            ConnectionConfig::MySQL {
                host,
                database,
                max_connections,
                ..
            } => {
                if host.is_empty() || database.is_empty() {
                    return Err(crate::lodel_error!(config, "MySQL主机和数据库名不能为空"));
                }
                if *max_connections == 0 {
                    return Err(crate::lodel_error!(config, "最大连接数不能为零"));
                }
            }
            ConnectionConfig::MongoDB { host, database, .. } => {
                if host.is_empty() || database.is_empty() {
                    return Err(crate::lodel_error!(config, "MongoDB主机和数据库名不能为空"));
                }
            }
            ConnectionConfig::JsonFile { path: Some(path) } if path.is_empty() => {
                return Err(crate::lodel_error!(config, "JSON文件路径不能为空"));
            }
            _ => {}
        }

        info!("创建数据源配置: 类型={}, 只读={}", kind.as_str(), read_only);
        Ok(DatasourceConfig {
            kind,
            read_only,
            connection,
        })
    }
}

impl Default for DatasourceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_must_match_connection() {
        let err = DatasourceConfig::builder()
            .kind(DatasourceKind::MySQL)
            .read_only(false)
            .connection(ConnectionConfig::Dummy)
            .build();
        assert!(err.is_err());

        let config = DatasourceConfig::builder()
            .kind(DatasourceKind::JsonFile)
            .read_only(true)
            .connection(ConnectionConfig::JsonFile { path: None })
            .build()
            .unwrap();
        assert!(config.read_only);
    }

    #[test]
    fn test_missing_items_are_rejected() {
        assert!(DatasourceConfig::builder().kind(DatasourceKind::Dummy).build().is_err());
        assert!(DatasourceConfig::builder()
            .kind(DatasourceKind::JsonFile)
            .read_only(false)
            .connection(ConnectionConfig::JsonFile { path: Some(String::new()) })
            .build()
            .is_err());
    }
}
