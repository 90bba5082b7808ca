//! 错误类型定义模块
//!
//! 统一的错误分类：字段级和过滤器级的检查会累积错误，最终抛出一个聚合错误，
//! 数据源层的驱动错误原样向上传递

use thiserror::Error;

/// rat_lodel 结果类型
pub type LodelResult<T> = Result<T, LodelError>;

/// 聚合错误中的单条记录 (键, 错误)
pub type ErrorEntry = (String, LodelError);

/// rat_lodel 错误类型
#[derive(Error, Debug)]
pub enum LodelError {
    /// LeApi 通用错误
    #[error("LeApi错误: {message}")]
    ApiError { message: String },

    /// LeApi 聚合错误
    #[error("{message}{}", format_error_list(.errors))]
    ApiErrors {
        message: String,
        errors: Vec<ErrorEntry>,
    },

    /// 数据检查错误
    #[error("数据检查失败: {message}")]
    DataCheckError { message: String },

    /// 数据检查聚合错误（每个失败字段或过滤器一条）
    #[error("{message}{}", format_error_list(.errors))]
    DataCheckErrors {
        message: String,
        errors: Vec<ErrorEntry>,
    },

    /// 查询构造错误
    #[error("查询错误: {message}")]
    QueryError { message: String },

    /// 查询聚合错误
    #[error("{message}{}", format_error_list(.errors))]
    QueryErrors {
        message: String,
        errors: Vec<ErrorEntry>,
    },

    /// 数据处理器级别的字段验证错误
    #[error("字段验证失败: {field} - {message}")]
    FieldValidation { field: String, message: String },

    /// 无法解析的过滤器字符串
    #[error("过滤器 '{filter}' 无效")]
    InvalidFilter { filter: String },

    /// 类中不存在该字段
    #[error("类 {class} 中不存在字段 '{field}'")]
    UnknownField { class: String, field: String },

    /// 运行时错误（循环构造、引用类不一致等）
    #[error("运行时错误: {message}")]
    Runtime { message: String },

    /// 不可恢复的错误
    #[error("致命错误: {message}")]
    Fatal { message: String },

    /// 对只读数据源执行写操作
    #[error("数据源 '{datasource}' 为只读")]
    ReadOnlyDatasource { datasource: String },

    /// 数据源（驱动）错误
    #[error("数据源错误: {message}")]
    DatasourceError { message: String },

    /// 配置错误
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// 编辑模型错误
    #[error("编辑模型错误: {message}")]
    ModelError { message: String },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    /// IO 错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_error_list(errors: &[ErrorEntry]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let mut out = String::from(":");
    for (key, err) in errors {
        out.push_str(&format!("\n\t{}: {}", key, err));
    }
    out
}

impl LodelError {
    /// 获取聚合错误中的子错误列表，非聚合错误返回空切片
    pub fn errors(&self) -> &[ErrorEntry] {
        match self {
            LodelError::ApiErrors { errors, .. }
            | LodelError::DataCheckErrors { errors, .. }
            | LodelError::QueryErrors { errors, .. } => errors,
            _ => &[],
        }
    }

    /// 聚合错误中是否包含指定键
    pub fn has_error_for(&self, key: &str) -> bool {
        self.errors().iter().any(|(k, _)| k == key)
    }

    /// 是否为聚合错误
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            LodelError::ApiErrors { .. }
                | LodelError::DataCheckErrors { .. }
                | LodelError::QueryErrors { .. }
        )
    }
}

impl From<serde_json::Error> for LodelError {
    fn from(err: serde_json::Error) -> Self {
        LodelError::SerializationError {
            message: err.to_string(),
        }
    }
}

/// 快速构造错误的宏
#[macro_export]
macro_rules! lodel_error {
    (api, $msg:expr) => {
        $crate::error::LodelError::ApiError { message: $msg.to_string() }
    };
    (data_check, $msg:expr) => {
        $crate::error::LodelError::DataCheckError { message: $msg.to_string() }
    };
    (query, $msg:expr) => {
        $crate::error::LodelError::QueryError { message: $msg.to_string() }
    };
    (field, $field:expr, $msg:expr) => {
        $crate::error::LodelError::FieldValidation {
            field: $field.to_string(),
            message: $msg.to_string(),
        }
    };
    (runtime, $msg:expr) => {
        $crate::error::LodelError::Runtime { message: $msg.to_string() }
    };
    (fatal, $msg:expr) => {
        $crate::error::LodelError::Fatal { message: $msg.to_string() }
    };
    (datasource, $msg:expr) => {
        $crate::error::LodelError::DatasourceError { message: $msg.to_string() }
    };
    (config, $msg:expr) => {
        $crate::error::LodelError::ConfigError { message: $msg.to_string() }
    };
    (model, $msg:expr) => {
        $crate::error::LodelError::ModelError { message: $msg.to_string() }
    };
    (serialization, $msg:expr) => {
        $crate::error::LodelError::SerializationError { message: $msg.to_string() }
    };
}
