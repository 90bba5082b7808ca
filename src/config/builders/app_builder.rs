//! # 应用配置构建器模块
//!
//! 提供应用配置的构建器实现，支持链式调用和严格验证

use crate::config::core::AppConfig;
use crate::error::LodelResult;
use rat_logger::info;

/// 应用配置构建器
#[derive(Debug)]
pub struct AppConfigBuilder {
    name: Option<String>,
    debug: Option<bool>,
}

impl AppConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            name: None,
            debug: None,
        }
    }

    /// 设置应用名称
    ///
    /// # 参数
    ///
    /// * `name` - 应用名称
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置调试模式
    ///
    /// # 参数
    ///
    /// * `debug` - 是否启用调试模式
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// 构建应用配置
    ///
    /// # 错误
    ///
    /// 如果任何必需的配置项未设置，将返回错误
    pub fn build(self) -> LodelResult<AppConfig> {
        let name = self
            .name
            .ok_or_else(|| crate::lodel_error!(config, "应用名称必须设置"))?;
        let debug = self
            .debug
            .ok_or_else(|| crate::lodel_error!(config, "调试模式必须设置"))?;

        if name.trim().is_empty() {
            return Err(crate::lodel_error!(config, "应用名称不能为空"));
        }

        info!("创建应用配置: 名称={}, 调试={}", name, debug);
        Ok(AppConfig { name, debug })
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
