//! 移动会话
//!
//! 编辑页面上"选中一个分类，再点击目标位置"的交互状态，只存在于内存中。
//!
//! ```text
//! Idle ──start(id)──▶ Selected(id) ──finish(target)──▶ Idle
//!                          │  ▲
//!                          │  └── start(other) 替换选中项 / finish 失败保持选中
//!                          └──cancel──▶ Idle
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{QbankError, QbankResult};
use super::service::CategoryService;
use super::types::{MoveTarget, QuestionCategory, RequestContext};

/// 移动会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum MoveState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Selected { moved_id: i64 },
}

/// 单个编辑会话的移动状态机
#[derive(Debug, Clone, Default)]
pub struct MoveSession {
    state: MoveState,
}

impl MoveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    /// 当前选中的分类（供展示层高亮、隐藏自身子树的目标链接）
    pub fn selected(&self) -> Option<i64> {
        match self.state {
            MoveState::Idle => None,
            MoveState::Selected { moved_id } => Some(moved_id),
        }
    }

    /// 选中待移动的分类，已有选中项时替换
    pub fn start(
        &mut self,
        service: &CategoryService,
        ctx: &RequestContext,
        moved_id: i64,
    ) -> QbankResult<()> {
        service.confirm_session(ctx)?;
        service.get_category(moved_id)?;

        if let MoveState::Selected { moved_id: previous } = self.state {
            debug!(
                "[Qbank::MoveSession] Replacing selection {} with {}",
                previous, moved_id
            );
        }
        self.state = MoveState::Selected { moved_id };
        Ok(())
    }

    /// 把选中的分类移动到目标位置
    ///
    /// 成功后回到 Idle；失败时保持选中，便于选择其他目标。
    pub fn finish(
        &mut self,
        service: &CategoryService,
        ctx: &RequestContext,
        target: MoveTarget,
    ) -> QbankResult<QuestionCategory> {
        service.confirm_session(ctx)?;
        let moved_id = self.selected().ok_or_else(|| QbankError::InvalidState {
            message: "No category selected for move".to_string(),
        })?;

        match service.move_to(ctx, moved_id, target) {
            Ok(moved) => {
                self.state = MoveState::Idle;
                info!(
                    "[Qbank::MoveSession] Finished moving category {} ({:?})",
                    moved_id, target
                );
                Ok(moved)
            }
            Err(e) => {
                warn!(
                    "[Qbank::MoveSession] Move of category {} failed, keeping selection: {}",
                    moved_id, e
                );
                Err(e)
            }
        }
    }

    /// 取消移动，不修改数据
    pub fn cancel(&mut self, service: &CategoryService, ctx: &RequestContext) -> QbankResult<()> {
        service.confirm_session(ctx)?;
        self.state = MoveState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qbank::database::QbankDatabase;
    use crate::qbank::hooks::StaticSessionKey;
    use crate::qbank::types::NewCategory;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup_service() -> (TempDir, CategoryService) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = QbankDatabase::new(temp_dir.path()).expect("Failed to create database");
        let service = CategoryService::new(Arc::new(db))
            .with_session_guard(Arc::new(StaticSessionKey::new("sesskey")));
        (temp_dir, service)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(2, "sesskey")
    }

    #[test]
    fn test_finish_while_idle_fails() {
        let (_temp_dir, service) = setup_service();
        let mut session = MoveSession::new();
        assert_matches!(
            session.finish(&service, &ctx(), MoveTarget::ScopeRoot { scope_id: 1 }),
            Err(QbankError::InvalidState { .. })
        );
    }

    #[test]
    fn test_start_requires_existing_category_and_session() {
        let (_temp_dir, service) = setup_service();
        let a = service.create(&ctx(), &NewCategory::root(1, "A")).unwrap();
        let mut session = MoveSession::new();

        assert_matches!(
            session.start(&service, &ctx(), 99),
            Err(QbankError::NotFound { .. })
        );
        assert_matches!(
            session.start(&service, &RequestContext::new(2, "wrong"), a.id),
            Err(QbankError::InvalidSessionKey)
        );
        assert_eq!(session.selected(), None);

        session.start(&service, &ctx(), a.id).unwrap();
        assert_eq!(session.selected(), Some(a.id));
    }

    #[test]
    fn test_finish_moves_and_resets() {
        let (_temp_dir, service) = setup_service();
        let a = service.create(&ctx(), &NewCategory::root(1, "A")).unwrap();
        let b = service.create(&ctx(), &NewCategory::root(1, "B")).unwrap();

        let mut session = MoveSession::new();
        session.start(&service, &ctx(), a.id).unwrap();
        let moved = session
            .finish(&service, &ctx(), MoveTarget::Into { parent_id: b.id })
            .unwrap();
        assert_eq!(moved.parent_id, b.id);
        assert_eq!(session.state(), MoveState::Idle);
    }

    #[test]
    fn test_failed_finish_keeps_selection() {
        let (_temp_dir, service) = setup_service();
        let a = service.create(&ctx(), &NewCategory::root(1, "A")).unwrap();
        service.create(&ctx(), &NewCategory::root(1, "B")).unwrap();

        let mut session = MoveSession::new();
        session.start(&service, &ctx(), a.id).unwrap();
        assert_matches!(
            session.finish(&service, &ctx(), MoveTarget::Into { parent_id: a.id }),
            Err(QbankError::InvalidParent { .. })
        );
        assert_eq!(session.selected(), Some(a.id));

        session.cancel(&service, &ctx()).unwrap();
        assert_eq!(session.selected(), None);
    }
}
