//! # 配置管理模块 - 核心配置类型
//!
//! 配置文件可以是TOML或JSON格式，按扩展名区分

use crate::error::{LodelError, LodelResult};
use crate::types::DatasourceConfig;
use rat_logger::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 全局配置
///
/// 应用信息、日志、编辑模型文件位置以及所有数据源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LodelConfig {
    /// 应用配置
    pub app: AppConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 编辑模型文件路径
    pub editorial_model: PathBuf,
    /// 数据源配置映射 (名称 -> 配置)
    pub datasources: HashMap<String, DatasourceConfig>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 应用名称
    pub name: String,
    /// 是否启用调试模式
    pub debug: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否输出到控制台
    pub console: bool,
    /// 日志文件路径
    pub file_path: Option<PathBuf>,
    /// 日志文件最大大小（字节）
    pub max_file_size: u64,
    /// 保留的日志文件数量
    pub max_files: u32,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

impl LodelConfig {
    /// 创建全局配置构建器
    pub fn builder() -> super::builders::LodelConfigBuilder {
        super::builders::LodelConfigBuilder::new()
    }

    /// 从配置文件加载配置
    ///
    /// # 参数
    ///
    /// * `config_path` - 配置文件路径，`.toml` 按TOML解析，其余按JSON解析
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> LodelResult<Self> {
        let content = std::fs::read_to_string(config_path.as_ref()).map_err(LodelError::IoError)?;

        let config: LodelConfig = if is_toml(config_path.as_ref()) {
            toml::from_str(&content)
                .map_err(|e| crate::lodel_error!(config, format!("解析TOML配置文件失败: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| crate::lodel_error!(config, format!("解析JSON配置文件失败: {}", e)))?
        };

        info!("从文件加载配置: {:?}", config_path.as_ref());
        Ok(config)
    }

    /// 保存配置到文件
    ///
    /// # 参数
    ///
    /// * `config_path` - 配置文件路径
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> LodelResult<()> {
        let content = if is_toml(config_path.as_ref()) {
            toml::to_string_pretty(self)
                .map_err(|e| crate::lodel_error!(config, format!("序列化TOML配置失败: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| crate::lodel_error!(config, format!("序列化JSON配置失败: {}", e)))?
        };

        std::fs::write(config_path.as_ref(), content).map_err(LodelError::IoError)?;

        info!("保存配置到文件: {:?}", config_path.as_ref());
        Ok(())
    }

    /// 获取指定名称的数据源配置
    pub fn datasource(&self, name: &str) -> LodelResult<&DatasourceConfig> {
        self.datasources
            .get(name)
            .ok_or_else(|| crate::lodel_error!(config, format!("找不到数据源配置: {}", name)))
    }
}

impl AppConfig {
    /// 创建应用配置构建器
    pub fn builder() -> super::builders::AppConfigBuilder {
        super::builders::AppConfigBuilder::new()
    }
}

impl LoggingConfig {
    /// 创建日志配置构建器
    pub fn builder() -> super::builders::LoggingConfigBuilder {
        super::builders::LoggingConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dummy_config;

    fn sample() -> LodelConfig {
        LodelConfig::builder()
            .app(AppConfig::builder().name("lodel").debug(false).build().unwrap())
            .logging(
                LoggingConfig::builder()
                    .level(LogLevel::Info)
                    .console(true)
                    .file_path(None::<PathBuf>)
                    .max_file_size(1024 * 1024)
                    .max_files(3)
                    .build()
                    .unwrap(),
            )
            .editorial_model("em.toml")
            .add_datasource("default", dummy_config(false))
            .build()
            .unwrap()
    }

    #[test]
    fn test_save_and_load_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample();

        for file in ["lodel.toml", "lodel.json"] {
            let path = dir.path().join(file);
            config.save_to_file(&path).unwrap();
            let loaded = LodelConfig::from_file(&path).unwrap();
            assert_eq!(loaded.app.name, "lodel");
            assert_eq!(loaded.logging.level, LogLevel::Info);
            assert_eq!(loaded.editorial_model, PathBuf::from("em.toml"));
            assert!(!loaded.datasource("default").unwrap().read_only);
            assert!(loaded.datasource("missing").is_err());
        }
    }
}
