//! 外部协作方接口
//!
//! 分类服务本身不实现权限、会话校验和题目存储，只在这些接缝处调用 trait：
//! - `PermissionChecker`: 在源/目标 scope 上检查管理分类的能力
//! - `SessionGuard`: 任何写操作之前校验会话密钥
//! - `ItemMigrationHook`: 统计/迁移分类下的题目（在调用方事务内执行）
//! - `AutoNamingHook`: 分类改名后重新生成派生题目的名称
//!
//! 默认的题目存储实现见 `repos::question_repo::SqliteQuestionStore`。

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use super::error::{QbankError, QbankResult};
use super::types::{QuestionCategory, RequestContext};

/// 管理分类所需的能力名
pub const MANAGE_CATEGORY_CAPABILITY: &str = "moodle/question:managecategory";

// ============================================================================
// 权限
// ============================================================================

pub trait PermissionChecker: Send + Sync {
    /// 无权限时返回 `QbankError::Permission`
    fn require_manage_categories(&self, ctx: &RequestContext, scope_id: i64) -> QbankResult<()>;
}

/// 放行所有请求
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn require_manage_categories(&self, _ctx: &RequestContext, _scope_id: i64) -> QbankResult<()> {
        Ok(())
    }
}

/// 只允许列表内的 scope
#[derive(Debug, Clone, Default)]
pub struct ScopeAllowList {
    scopes: HashSet<i64>,
}

impl ScopeAllowList {
    pub fn new(scopes: impl IntoIterator<Item = i64>) -> Self {
        Self {
            scopes: scopes.into_iter().collect(),
        }
    }
}

impl PermissionChecker for ScopeAllowList {
    fn require_manage_categories(&self, _ctx: &RequestContext, scope_id: i64) -> QbankResult<()> {
        if self.scopes.contains(&scope_id) {
            Ok(())
        } else {
            Err(QbankError::Permission {
                scope_id,
                capability: MANAGE_CATEGORY_CAPABILITY.to_string(),
            })
        }
    }
}

// ============================================================================
// 会话
// ============================================================================

pub trait SessionGuard: Send + Sync {
    /// 会话密钥无效时返回 `QbankError::InvalidSessionKey`
    fn confirm_session_key(&self, ctx: &RequestContext) -> QbankResult<()>;
}

/// 不校验会话密钥
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnySession;

impl SessionGuard for AcceptAnySession {
    fn confirm_session_key(&self, _ctx: &RequestContext) -> QbankResult<()> {
        Ok(())
    }
}

/// 与固定密钥比较
#[derive(Debug, Clone)]
pub struct StaticSessionKey(String);

impl StaticSessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl SessionGuard for StaticSessionKey {
    fn confirm_session_key(&self, ctx: &RequestContext) -> QbankResult<()> {
        if !ctx.session_key.is_empty() && ctx.session_key == self.0 {
            Ok(())
        } else {
            Err(QbankError::InvalidSessionKey)
        }
    }
}

// ============================================================================
// 题目
// ============================================================================

/// 题目迁移钩子
///
/// 所有方法接收调用方的连接，写操作与分类变更处于同一事务。
pub trait ItemMigrationHook: Send + Sync {
    /// 分类下的顶层题目数
    fn count_items(&self, conn: &Connection, category_id: i64) -> QbankResult<usize>;

    /// 仍引用该分类的全部记录数（含子题目），删除前以此判断分类是否为空
    fn count_owned_rows(&self, conn: &Connection, category_id: i64) -> QbankResult<usize> {
        self.count_items(conn, category_id)
    }

    /// 批量统计
    fn item_counts(
        &self,
        conn: &Connection,
        category_ids: &[i64],
    ) -> QbankResult<HashMap<i64, usize>> {
        let mut counts = HashMap::with_capacity(category_ids.len());
        for id in category_ids {
            counts.insert(*id, self.count_items(conn, *id)?);
        }
        Ok(counts)
    }

    /// 把 `from` 下的题目移到 `to`，返回移动数量
    fn move_items(&self, conn: &Connection, from: i64, to: i64) -> QbankResult<usize>;

    /// 分类换 scope 后迁移其题目拥有的资源
    fn move_category_to_scope(
        &self,
        conn: &Connection,
        category_id: i64,
        old_scope_id: i64,
        new_scope_id: i64,
    ) -> QbankResult<()>;
}

/// 自动命名钩子
pub trait AutoNamingHook: Send + Sync {
    /// 分类改名后刷新引用它的派生题目名称，返回更新数量
    fn refresh_derived_names(
        &self,
        conn: &Connection,
        category: &QuestionCategory,
    ) -> QbankResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_static_session_key() {
        let guard = StaticSessionKey::new("s3cret");
        assert!(guard
            .confirm_session_key(&RequestContext::new(1, "s3cret"))
            .is_ok());
        assert_matches!(
            guard.confirm_session_key(&RequestContext::new(1, "nope")),
            Err(QbankError::InvalidSessionKey)
        );
        assert_matches!(
            StaticSessionKey::new("").confirm_session_key(&RequestContext::new(1, "")),
            Err(QbankError::InvalidSessionKey)
        );
    }

    #[test]
    fn test_scope_allow_list() {
        let checker = ScopeAllowList::new([1, 2]);
        let ctx = RequestContext::default();
        assert!(checker.require_manage_categories(&ctx, 2).is_ok());
        assert_matches!(
            checker.require_manage_categories(&ctx, 3),
            Err(QbankError::Permission { scope_id: 3, .. })
        );
    }
}
