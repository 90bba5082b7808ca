//! # 全局配置构建器模块

use crate::config::core::{AppConfig, LodelConfig, LoggingConfig};
use crate::error::LodelResult;
use crate::types::DatasourceConfig;
use rat_logger::info;
use std::collections::HashMap;
use std::path::PathBuf;

/// 全局配置构建器
///
/// 至少需要一个数据源，编辑模型中的类按名称引用它们
#[derive(Debug)]
pub struct LodelConfigBuilder {
    app: Option<AppConfig>,
    logging: Option<LoggingConfig>,
    editorial_model: Option<PathBuf>,
    datasources: HashMap<String, DatasourceConfig>,
}

impl LodelConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            app: None,
            logging: None,
            editorial_model: None,
            datasources: HashMap::new(),
        }
    }

    /// 设置应用配置
    pub fn app(mut self, app: AppConfig) -> Self {
        self.app = Some(app);
        self
    }

    /// 设置日志配置
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// 设置编辑模型文件路径
    pub fn editorial_model<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.editorial_model = Some(path.into());
        self
    }

    /// 添加数据源配置
    ///
    /// # 参数
    ///
    /// * `name` - 数据源名称
    /// * `config` - 数据源配置
    pub fn add_datasource<S: Into<String>>(mut self, name: S, config: DatasourceConfig) -> Self {
        self.datasources.insert(name.into(), config);
        self
    }

    /// 构建全局配置
    ///
    /// # 错误
    ///
    /// 如果任何必需的配置项未设置，将返回错误
    pub fn build(self) -> LodelResult<LodelConfig> {
        let app = self
            .app
            .ok_or_else(|| crate::lodel_error!(config, "应用配置必须设置"))?;
        let logging = self
            .logging
            .ok_or_else(|| crate::lodel_error!(config, "日志配置必须设置"))?;
        let editorial_model = self
            .editorial_model
            .ok_or_else(|| crate::lodel_error!(config, "编辑模型路径必须设置"))?;

        if self.datasources.is_empty() {
            return Err(crate::lodel_error!(config, "至少需要配置一个数据源"));
        }
        if self.datasources.keys().any(|name| name.trim().is_empty()) {
            return Err(crate::lodel_error!(config, "数据源名称不能为空"));
        }

        info!(
            "创建全局配置: 应用={}, 数据源数量={}",
            app.name,
            self.datasources.len()
        );
        Ok(LodelConfig {
            app,
            logging,
            editorial_model,
            datasources: self.datasources,
        })
    }
}

impl Default for LodelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
