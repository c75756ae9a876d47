//! Qbank 题库分类模块
//!
//! 本模块实现题库分类树（question categories）的增删改查与排序移动。
//!
//! ## 核心概念
//! - **scope**：分类所属的上下文（课程、模块等），由外部系统提供，这里只是一个整数 ID
//! - **邻接表**：每个分类只记录 `parent_id`（0 表示根级），树在读取时按 ID 组装
//! - **同级排序**：同一 `(scope_id, parent_id)` 下的 `sort_order` 始终连续为 `1..N`
//!
//! ## 模块结构
//! ```text
//! qbank/
//! ├── mod.rs           - 模块注册和 re-export
//! ├── types.rs         - 核心类型定义
//! ├── error.rs         - 错误类型
//! ├── database.rs      - QbankDatabase 连接池管理
//! ├── hooks.rs         - 外部协作方（权限、会话、题目迁移、自动命名）
//! ├── reorder.rs       - 排序计划（纯函数）
//! ├── service.rs       - CategoryService 业务入口
//! ├── move_session.rs  - 移动会话状态机
//! └── repos/           - 各表 CRUD
//! ```

pub mod database;
pub mod error;
pub mod hooks;
pub mod move_session;
pub mod reorder;
pub mod repos;
pub mod service;
pub mod types;

pub use database::{QbankDatabase, QbankDatabaseStats, QbankPool, QbankPooledConnection};
pub use error::{QbankError, QbankResult};
pub use hooks::{
    AcceptAnySession, AllowAll, AutoNamingHook, ItemMigrationHook, PermissionChecker,
    ScopeAllowList, SessionGuard, StaticSessionKey, MANAGE_CATEGORY_CAPABILITY,
};
pub use move_session::{MoveSession, MoveState};
pub use reorder::{MovePlan, Placement, SortAssignment};
pub use repos::{QbankCategoryRepo, SqliteQuestionStore};
pub use service::CategoryService;
pub use types::*;

// ============================================================================
// 分类相关常量
// ============================================================================

/// 分类名称最大长度（字符数）
pub const MAX_CATEGORY_NAME_LENGTH: usize = 255;

/// 根级分类的 parent_id
pub const ROOT_PARENT_ID: i64 = 0;

// ============================================================================
// 分类错误码
// ============================================================================

/// 分类相关错误码
pub mod category_errors {
    /// 输入校验失败
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    /// 父分类与 scope 不一致
    pub const SCOPE_MISMATCH: &str = "SCOPE_MISMATCH";
    /// 分类不存在
    pub const NOT_FOUND: &str = "CATEGORY_NOT_FOUND";
    /// 无权限
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    /// 会话密钥无效
    pub const INVALID_SESSION_KEY: &str = "INVALID_SESSION_KEY";
    /// 分类下仍有题目
    pub const HAS_ITEMS: &str = "CATEGORY_HAS_ITEMS";
    /// scope 内最后一个根分类
    pub const LAST_CATEGORY: &str = "LAST_CATEGORY";
    /// 无效的目标父分类
    pub const INVALID_PARENT: &str = "INVALID_PARENT";
    /// 无效状态
    pub const INVALID_STATE: &str = "INVALID_STATE";
    /// 内部错误
    pub const INTERNAL: &str = "INTERNAL_ERROR";
}
