//! 题库分类错误类型定义
//!
//! 本模块定义分类操作的错误类型和结果类型别名。
//! 所有错误都会中止当前操作，事务内的部分写入会回滚到 SAVEPOINT。

use thiserror::Error;

use super::category_errors;

/// 分类操作结果类型别名
pub type QbankResult<T> = Result<T, QbankError>;

/// 题库分类错误类型
#[derive(Debug, Error)]
pub enum QbankError {
    /// 输入校验失败（空名称、非法 scope 等），未做任何修改
    #[error("Invalid argument '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// 父分类所在 scope 与请求的 scope 不一致
    #[error("SCOPE_MISMATCH: parent {parent_id} belongs to scope {parent_scope_id}, requested scope {requested_scope_id}")]
    ScopeMismatch {
        parent_id: i64,
        parent_scope_id: i64,
        requested_scope_id: i64,
    },

    /// 分类不存在
    #[error("CATEGORY_NOT_FOUND: {category_id}")]
    NotFound { category_id: i64 },

    /// 权限检查失败（由权限服务产生，原样向上传播）
    #[error("PERMISSION_DENIED: '{capability}' required on scope {scope_id}")]
    Permission { scope_id: i64, capability: String },

    /// 会话密钥校验失败
    #[error("INVALID_SESSION_KEY")]
    InvalidSessionKey,

    /// 分类下仍有题目，且未指定迁移目标
    #[error("CATEGORY_HAS_ITEMS: {category_id} still owns {item_count} items")]
    HasItems { category_id: i64, item_count: usize },

    /// 不能删除或移走 scope 内唯一的根分类
    #[error("LAST_CATEGORY: {category_id} is the only top-level category of scope {scope_id}")]
    LastCategory { category_id: i64, scope_id: i64 },

    /// 无效的目标位置（自身或子孙节点）
    #[error("INVALID_PARENT: {category_id} -> {target_id} - {reason}")]
    InvalidParent {
        category_id: i64,
        target_id: i64,
        reason: String,
    },

    /// 无效状态（移动会话等场景）
    #[error("INVALID_STATE: {message}")]
    InvalidState { message: String },

    /// 数据库错误
    #[error("Database error: {0}")]
    Database(String),

    /// 连接池错误
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),

    /// 配置加载错误
    #[error("Config error: {0}")]
    Config(String),

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QbankError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        QbankError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(category_id: i64) -> Self {
        QbankError::NotFound { category_id }
    }

    /// 稳定的错误码，供展示层映射本地化文案
    pub fn code(&self) -> &'static str {
        match self {
            QbankError::Validation { .. } => category_errors::VALIDATION,
            QbankError::ScopeMismatch { .. } => category_errors::SCOPE_MISMATCH,
            QbankError::NotFound { .. } => category_errors::NOT_FOUND,
            QbankError::Permission { .. } => category_errors::PERMISSION_DENIED,
            QbankError::InvalidSessionKey => category_errors::INVALID_SESSION_KEY,
            QbankError::HasItems { .. } => category_errors::HAS_ITEMS,
            QbankError::LastCategory { .. } => category_errors::LAST_CATEGORY,
            QbankError::InvalidParent { .. } => category_errors::INVALID_PARENT,
            QbankError::InvalidState { .. } => category_errors::INVALID_STATE,
            QbankError::Database(_)
            | QbankError::Pool(_)
            | QbankError::Io(_)
            | QbankError::Config(_)
            | QbankError::Serialization(_) => category_errors::INTERNAL,
        }
    }

    /// 是否为业务规则拒绝（而非基础设施故障）
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            QbankError::HasItems { .. }
                | QbankError::LastCategory { .. }
                | QbankError::InvalidParent { .. }
                | QbankError::ScopeMismatch { .. }
        )
    }
}

// 从标准错误类型转换
impl From<std::io::Error> for QbankError {
    fn from(err: std::io::Error) -> Self {
        QbankError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for QbankError {
    fn from(err: rusqlite::Error) -> Self {
        QbankError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for QbankError {
    fn from(err: r2d2::Error) -> Self {
        QbankError::Pool(err.to_string())
    }
}

impl From<config::ConfigError> for QbankError {
    fn from(err: config::ConfigError) -> Self {
        QbankError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for QbankError {
    fn from(err: serde_json::Error) -> Self {
        QbankError::Serialization(err.to_string())
    }
}

// 转换为 String（用于命令行输出）
impl From<QbankError> for String {
    fn from(err: QbankError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QbankError::not_found(42);
        assert_eq!(err.to_string(), "CATEGORY_NOT_FOUND: 42");

        let err = QbankError::validation("name", "cannot be empty");
        assert_eq!(err.to_string(), "Invalid argument 'name': cannot be empty");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QbankError::LastCategory {
                category_id: 1,
                scope_id: 2
            }
            .code(),
            "LAST_CATEGORY"
        );
        assert_eq!(
            QbankError::HasItems {
                category_id: 1,
                item_count: 3
            }
            .code(),
            "CATEGORY_HAS_ITEMS"
        );
        assert_eq!(QbankError::Database("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_to_string() {
        let err = QbankError::Database("connection failed".to_string());
        let s: String = err.into();
        assert_eq!(s, "Database error: connection failed");
    }

    #[test]
    fn test_business_rule_classification() {
        assert!(QbankError::HasItems {
            category_id: 1,
            item_count: 1
        }
        .is_business_rule());
        assert!(!QbankError::InvalidSessionKey.is_business_rule());
    }
}
