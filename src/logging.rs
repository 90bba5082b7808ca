//! 日志初始化辅助
//!
//! 库本身从不初始化日志器，只通过 rat_logger 的宏输出。此函数供应用和测试按
//! [`LoggingConfig`] 构建日志器。

use crate::config::{LogLevel, LoggingConfig};
use crate::error::LodelResult;
use rat_logger::handler::term::TermConfig;
use rat_logger::{FileConfig, LevelFilter, LoggerBuilder};

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// 按配置初始化全局日志器
///
/// 控制台与文件输出可同时启用；两者都未启用时返回配置错误
pub fn init_logger(config: &LoggingConfig) -> LodelResult<()> {
    if !config.console && config.file_path.is_none() {
        return Err(crate::lodel_error!(config, "日志至少需要一个输出目标"));
    }

    let mut builder = LoggerBuilder::new().with_level(config.level.into());
    if config.console {
        builder = builder.add_terminal_with_config(TermConfig::default());
    }
    if let Some(path) = &config.file_path {
        builder = builder.add_file(FileConfig {
            log_dir: path.clone(),
            max_file_size: config.max_file_size,
            max_compressed_files: config.max_files as usize,
            ..Default::default()
        });
    }
    builder
        .init_global_logger()
        .map_err(|e| crate::lodel_error!(config, format!("初始化日志失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(console: bool) -> LoggingConfig {
        LoggingConfig {
            level: LogLevel::Warn,
            console,
            file_path: None,
            max_file_size: 1024,
            max_files: 1,
        }
    }

    #[test]
    fn test_init_logger() {
        assert!(init_logger(&config(false)).is_err());
        // 全局日志器在进程内只初始化这一次
        init_logger(&config(true)).unwrap();
    }
}
