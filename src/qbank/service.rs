//! 题库分类服务
//!
//! 提供分类的业务逻辑处理：
//! - 创建 / 重命名 / 重新挂载 / 删除
//! - 迁移题目后删除
//! - 三种移动：成为 scope 第一个根分类、放到参照分类之后、成为父分类第一个子分类
//! - 读取：单个分类、scope 列表、子分类、嵌套树、可选父分类
//!
//! 每个写操作都在一个 SAVEPOINT 内完成：先校验会话密钥，再检查源/目标 scope 的权限，
//! 任一步失败都回滚，不留下部分写入。

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::database::QbankDatabase;
use super::error::{QbankError, QbankResult};
use super::hooks::{
    AcceptAnySession, AllowAll, AutoNamingHook, ItemMigrationHook, PermissionChecker,
    SessionGuard,
};
use super::reorder::{self, Placement};
use super::repos::{with_savepoint, QbankCategoryRepo, SqliteQuestionStore};
use super::types::{
    CategoryTree, CategoryTreeNode, MoveTarget, NewCategory, QuestionCategory, RequestContext,
    UpdateCategory,
};
use super::{MAX_CATEGORY_NAME_LENGTH, ROOT_PARENT_ID};

// ============================================================================
// 服务结构
// ============================================================================

/// 题库分类服务
pub struct CategoryService {
    db: Arc<QbankDatabase>,
    permissions: Arc<dyn PermissionChecker>,
    session: Arc<dyn SessionGuard>,
    items: Arc<dyn ItemMigrationHook>,
    naming: Arc<dyn AutoNamingHook>,
}

/// 解析后的移动目的地
struct Destination {
    parent_id: i64,
    scope_id: i64,
    placement: Placement,
}

fn validate_name(name: &str) -> QbankResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(QbankError::validation("name", "Category name must not be empty"));
    }
    if trimmed.chars().count() > MAX_CATEGORY_NAME_LENGTH {
        return Err(QbankError::validation(
            "name",
            format!(
                "Category name must not exceed {} characters",
                MAX_CATEGORY_NAME_LENGTH
            ),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_scope(scope_id: i64) -> QbankResult<()> {
    if scope_id <= 0 {
        return Err(QbankError::validation(
            "scope_id",
            format!("Scope id must be positive, got {}", scope_id),
        ));
    }
    Ok(())
}

impl CategoryService {
    /// 创建服务实例
    ///
    /// 默认放行所有权限与会话，题目存储使用同库的 `questions` 表。
    pub fn new(db: Arc<QbankDatabase>) -> Self {
        let store = Arc::new(SqliteQuestionStore);
        Self {
            db,
            permissions: Arc::new(AllowAll),
            session: Arc::new(AcceptAnySession),
            items: store.clone(),
            naming: store,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_session_guard(mut self, session: Arc<dyn SessionGuard>) -> Self {
        self.session = session;
        self
    }

    pub fn with_item_hook(mut self, items: Arc<dyn ItemMigrationHook>) -> Self {
        self.items = items;
        self
    }

    pub fn with_naming_hook(mut self, naming: Arc<dyn AutoNamingHook>) -> Self {
        self.naming = naming;
        self
    }

    pub fn database(&self) -> &Arc<QbankDatabase> {
        &self.db
    }

    /// 校验会话密钥（移动会话也使用）
    pub fn confirm_session(&self, ctx: &RequestContext) -> QbankResult<()> {
        self.session.confirm_session_key(ctx)
    }

    /// 检查源 scope 与（不同时）目标 scope 的管理权限
    fn require_scopes(
        &self,
        ctx: &RequestContext,
        source_scope: i64,
        target_scope: i64,
    ) -> QbankResult<()> {
        self.permissions.require_manage_categories(ctx, source_scope)?;
        if target_scope != source_scope {
            self.permissions.require_manage_categories(ctx, target_scope)?;
        }
        Ok(())
    }

    fn fill_item_counts(
        &self,
        conn: &Connection,
        mut categories: Vec<QuestionCategory>,
    ) -> QbankResult<Vec<QuestionCategory>> {
        let ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
        let counts = self.items.item_counts(conn, &ids)?;
        for category in categories.iter_mut() {
            category.item_count = counts.get(&category.id).copied().unwrap_or(0);
        }
        Ok(categories)
    }

    fn load_with_count(&self, conn: &Connection, id: i64) -> QbankResult<QuestionCategory> {
        let mut category = QbankCategoryRepo::require_category_with_conn(conn, id)?;
        category.item_count = self.items.count_items(conn, id)?;
        Ok(category)
    }

    // ========================================================================
    // 创建 / 更新 / 删除
    // ========================================================================

    /// 创建分类，追加到同级集合末尾
    pub fn create(&self, ctx: &RequestContext, new: &NewCategory) -> QbankResult<QuestionCategory> {
        self.confirm_session(ctx)?;
        let name = validate_name(&new.name)?;
        validate_scope(new.scope_id)?;
        self.permissions.require_manage_categories(ctx, new.scope_id)?;

        let conn = self.db.get_conn_safe()?;
        with_savepoint(&conn, "qbank_service_create", |conn| {
            if new.parent_id != ROOT_PARENT_ID {
                let parent = QbankCategoryRepo::require_category_with_conn(conn, new.parent_id)?;
                if parent.scope_id != new.scope_id {
                    return Err(QbankError::ScopeMismatch {
                        parent_id: parent.id,
                        parent_scope_id: parent.scope_id,
                        requested_scope_id: new.scope_id,
                    });
                }
            }

            let params = NewCategory {
                name,
                description: new.description.clone(),
                ..new.clone()
            };
            let created = QbankCategoryRepo::create_category_with_conn(conn, &params)?;
            info!(
                "[Qbank::Service] User {} created category {} '{}'",
                ctx.user_id, created.id, created.name
            );
            Ok(created)
        })
    }

    /// 重命名 / 重新挂载分类
    ///
    /// scope 内唯一的根分类只更新名称与描述，父分类与 scope 的变化被忽略。
    pub fn update(
        &self,
        ctx: &RequestContext,
        update: &UpdateCategory,
    ) -> QbankResult<QuestionCategory> {
        self.confirm_session(ctx)?;
        let name = validate_name(&update.name)?;

        let conn = self.db.get_conn_safe()?;
        with_savepoint(&conn, "qbank_service_update", |conn| {
            let existing = QbankCategoryRepo::require_category_with_conn(conn, update.id)?;
            self.permissions
                .require_manage_categories(ctx, existing.scope_id)?;

            let mut parent_id = update.parent_id;
            let mut scope_id = update.scope_id;
            let relocating = (scope_id, parent_id) != existing.sibling_key();
            if relocating && QbankCategoryRepo::is_only_root_with_conn(conn, &existing)? {
                warn!(
                    "[Qbank::Service] Category {} is the only top-level category of scope {}, ignoring move to scope {} parent {}",
                    existing.id, existing.scope_id, scope_id, parent_id
                );
                parent_id = existing.parent_id;
                scope_id = existing.scope_id;
            }

            if (scope_id, parent_id) != existing.sibling_key() {
                if parent_id == ROOT_PARENT_ID {
                    validate_scope(scope_id)?;
                } else {
                    let parent = QbankCategoryRepo::require_category_with_conn(conn, parent_id)?;
                    if parent.scope_id != scope_id {
                        return Err(QbankError::ScopeMismatch {
                            parent_id: parent.id,
                            parent_scope_id: parent.scope_id,
                            requested_scope_id: scope_id,
                        });
                    }
                    if QbankCategoryRepo::is_in_subtree_with_conn(conn, existing.id, parent.id)? {
                        return Err(QbankError::InvalidParent {
                            category_id: existing.id,
                            target_id: parent.id,
                            reason: "Cannot move a category into itself or its descendants"
                                .to_string(),
                        });
                    }
                }
                self.permissions.require_manage_categories(ctx, scope_id)?;
            }

            let renamed = name != existing.name;
            if renamed || update.description != existing.description {
                QbankCategoryRepo::update_details_with_conn(
                    conn,
                    existing.id,
                    &name,
                    &update.description,
                )?;
            }

            let same_set = (scope_id, parent_id) == existing.sibling_key();
            let placement = match (update.sort_order, same_set) {
                (Some(position), _) => Some(Placement::At(position)),
                (None, false) => Some(Placement::Last),
                (None, true) => None,
            };
            if let Some(placement) = placement {
                self.relocate(
                    conn,
                    &existing,
                    Destination {
                        parent_id,
                        scope_id,
                        placement,
                    },
                )?;
            }

            let updated = self.load_with_count(conn, existing.id)?;
            if renamed {
                self.naming.refresh_derived_names(conn, &updated)?;
            }
            info!(
                "[Qbank::Service] User {} updated category {}",
                ctx.user_id, updated.id
            );
            Ok(updated)
        })
    }

    /// 删除分类（无题目时）
    ///
    /// 子分类拼接到被删分类在父级中的位置。
    pub fn delete(&self, ctx: &RequestContext, id: i64) -> QbankResult<()> {
        self.confirm_session(ctx)?;

        let conn = self.db.get_conn_safe()?;
        with_savepoint(&conn, "qbank_service_delete", |conn| {
            let category = self.check_deletable(ctx, conn, id)?;
            let item_count = self.items.count_owned_rows(conn, id)?;
            if item_count > 0 {
                return Err(QbankError::HasItems {
                    category_id: id,
                    item_count,
                });
            }
            let reparented = QbankCategoryRepo::delete_category_with_conn(conn, &category)?;
            info!(
                "[Qbank::Service] User {} deleted category {} ({} children reparented)",
                ctx.user_id, id, reparented
            );
            Ok(())
        })
    }

    /// 把题目迁移到 `destination_id` 后删除分类，返回迁移的题目数
    pub fn move_items_and_delete(
        &self,
        ctx: &RequestContext,
        id: i64,
        destination_id: i64,
    ) -> QbankResult<usize> {
        self.confirm_session(ctx)?;
        if destination_id == id {
            return Err(QbankError::validation(
                "destination_id",
                "Destination category must differ from the deleted category",
            ));
        }

        let conn = self.db.get_conn_safe()?;
        with_savepoint(&conn, "qbank_service_move_items_delete", |conn| {
            let category = self.check_deletable(ctx, conn, id)?;
            let destination = QbankCategoryRepo::require_category_with_conn(conn, destination_id)?;
            if destination.scope_id != category.scope_id {
                self.permissions
                    .require_manage_categories(ctx, destination.scope_id)?;
            }

            let moved = self.items.move_items(conn, id, destination_id)?;
            let remaining = self.items.count_owned_rows(conn, id)?;
            if remaining > 0 {
                return Err(QbankError::HasItems {
                    category_id: id,
                    item_count: remaining,
                });
            }
            QbankCategoryRepo::delete_category_with_conn(conn, &category)?;
            info!(
                "[Qbank::Service] User {} moved {} items {} -> {} and deleted {}",
                ctx.user_id, moved, id, destination_id, id
            );
            Ok(moved)
        })
    }

    /// 删除前的公共检查：存在、权限、非 scope 内唯一根分类
    fn check_deletable(
        &self,
        ctx: &RequestContext,
        conn: &Connection,
        id: i64,
    ) -> QbankResult<QuestionCategory> {
        let category = QbankCategoryRepo::require_category_with_conn(conn, id)?;
        self.permissions
            .require_manage_categories(ctx, category.scope_id)?;
        if QbankCategoryRepo::is_only_root_with_conn(conn, &category)? {
            return Err(QbankError::LastCategory {
                category_id: id,
                scope_id: category.scope_id,
            });
        }
        Ok(category)
    }

    // ========================================================================
    // 移动
    // ========================================================================

    /// 成为 `scope_id` 的第一个根分类
    pub fn move_to_scope_root(
        &self,
        ctx: &RequestContext,
        id: i64,
        scope_id: i64,
    ) -> QbankResult<QuestionCategory> {
        self.move_to(ctx, id, MoveTarget::ScopeRoot { scope_id })
    }

    /// 放到 `reference_id` 之后（同一父分类下）
    pub fn move_after(
        &self,
        ctx: &RequestContext,
        id: i64,
        reference_id: i64,
    ) -> QbankResult<QuestionCategory> {
        self.move_to(ctx, id, MoveTarget::After { reference_id })
    }

    /// 成为 `parent_id` 的第一个子分类
    pub fn move_into(
        &self,
        ctx: &RequestContext,
        id: i64,
        parent_id: i64,
    ) -> QbankResult<QuestionCategory> {
        self.move_to(ctx, id, MoveTarget::Into { parent_id })
    }

    /// 按目标类型移动分类
    pub fn move_to(
        &self,
        ctx: &RequestContext,
        id: i64,
        target: MoveTarget,
    ) -> QbankResult<QuestionCategory> {
        self.confirm_session(ctx)?;
        if let MoveTarget::ScopeRoot { scope_id } = target {
            validate_scope(scope_id)?;
        }

        let conn = self.db.get_conn_safe()?;
        with_savepoint(&conn, "qbank_service_move", |conn| {
            let moved = QbankCategoryRepo::require_category_with_conn(conn, id)?;
            let destination = self.resolve_target(conn, &moved, target)?;

            if (destination.scope_id, destination.parent_id) != moved.sibling_key()
                && QbankCategoryRepo::is_only_root_with_conn(conn, &moved)?
            {
                return Err(QbankError::LastCategory {
                    category_id: moved.id,
                    scope_id: moved.scope_id,
                });
            }
            self.require_scopes(ctx, moved.scope_id, destination.scope_id)?;

            self.relocate(conn, &moved, destination)?;
            let result = self.load_with_count(conn, id)?;
            info!(
                "[Qbank::Service] User {} moved category {} ({:?}) -> scope {} parent {} position {}",
                ctx.user_id, id, target, result.scope_id, result.parent_id, result.sort_order
            );
            Ok(result)
        })
    }

    /// 解析移动目标，拒绝自身及子孙节点
    fn resolve_target(
        &self,
        conn: &Connection,
        moved: &QuestionCategory,
        target: MoveTarget,
    ) -> QbankResult<Destination> {
        let (reference, placement) = match target {
            MoveTarget::ScopeRoot { scope_id } => {
                return Ok(Destination {
                    parent_id: ROOT_PARENT_ID,
                    scope_id,
                    placement: Placement::First,
                });
            }
            MoveTarget::After { reference_id } => {
                (reference_id, Placement::After(reference_id))
            }
            MoveTarget::Into { parent_id } => (parent_id, Placement::First),
        };

        let reference = QbankCategoryRepo::require_category_with_conn(conn, reference)?;
        if QbankCategoryRepo::is_in_subtree_with_conn(conn, moved.id, reference.id)? {
            return Err(QbankError::InvalidParent {
                category_id: moved.id,
                target_id: reference.id,
                reason: "Cannot move a category relative to itself or its descendants"
                    .to_string(),
            });
        }

        Ok(match placement {
            Placement::After(_) => Destination {
                parent_id: reference.parent_id,
                scope_id: reference.scope_id,
                placement,
            },
            _ => Destination {
                parent_id: reference.id,
                scope_id: reference.scope_id,
                placement,
            },
        })
    }

    /// 计划并落库一次移动；scope 变化时对子树每个分类调用题目迁移钩子
    fn relocate(
        &self,
        conn: &Connection,
        moved: &QuestionCategory,
        destination: Destination,
    ) -> QbankResult<()> {
        let old_siblings =
            QbankCategoryRepo::list_siblings_with_conn(conn, moved.scope_id, moved.parent_id)?;
        let new_siblings = if (destination.scope_id, destination.parent_id) == moved.sibling_key()
        {
            old_siblings.clone()
        } else {
            QbankCategoryRepo::list_siblings_with_conn(
                conn,
                destination.scope_id,
                destination.parent_id,
            )?
        };

        let plan = reorder::plan_move(
            moved,
            &old_siblings,
            &new_siblings,
            destination.parent_id,
            destination.scope_id,
            destination.placement,
        )?;
        if plan.is_noop(moved) {
            debug!(
                "[Qbank::Service] Category {} already at requested position",
                moved.id
            );
            return Ok(());
        }

        let rescoped = QbankCategoryRepo::apply_move_plan_with_conn(conn, &plan)?;
        for category_id in &rescoped {
            self.items.move_category_to_scope(
                conn,
                *category_id,
                moved.scope_id,
                plan.new_scope_id,
            )?;
        }
        Ok(())
    }

    // ========================================================================
    // 读取
    // ========================================================================

    /// 获取分类（含题目数）
    pub fn get_category(&self, id: i64) -> QbankResult<QuestionCategory> {
        let conn = self.db.get_conn_safe()?;
        self.load_with_count(&conn, id)
    }

    /// scope 内全部分类，按 (parent_id, sort_order) 排序
    pub fn list_by_scope(&self, scope_id: i64) -> QbankResult<Vec<QuestionCategory>> {
        let conn = self.db.get_conn_safe()?;
        let categories = QbankCategoryRepo::list_by_scope_with_conn(&conn, scope_id)?;
        self.fill_item_counts(&conn, categories)
    }

    /// scope 内的根分类
    pub fn list_roots(&self, scope_id: i64) -> QbankResult<Vec<QuestionCategory>> {
        let conn = self.db.get_conn_safe()?;
        let roots = QbankCategoryRepo::list_siblings_with_conn(&conn, scope_id, ROOT_PARENT_ID)?;
        self.fill_item_counts(&conn, roots)
    }

    /// 直接子分类
    pub fn list_children(&self, parent_id: i64) -> QbankResult<Vec<QuestionCategory>> {
        let conn = self.db.get_conn_safe()?;
        QbankCategoryRepo::require_category_with_conn(&conn, parent_id)?;
        let children = QbankCategoryRepo::list_children_with_conn(&conn, parent_id)?;
        self.fill_item_counts(&conn, children)
    }

    /// scope 的嵌套分类树
    pub fn category_tree(&self, scope_id: i64) -> QbankResult<Vec<CategoryTreeNode>> {
        let categories = self.list_by_scope(scope_id)?;
        Ok(CategoryTree::new(categories).to_nodes())
    }

    /// 编辑表单可选的父分类：同 scope 内除自身及子孙外的全部分类
    pub fn viable_parents(&self, id: i64) -> QbankResult<Vec<QuestionCategory>> {
        let conn = self.db.get_conn_safe()?;
        let category = QbankCategoryRepo::require_category_with_conn(&conn, id)?;
        let tree = CategoryTree::new(QbankCategoryRepo::list_by_scope_with_conn(
            &conn,
            category.scope_id,
        )?);

        let mut parents = Vec::new();
        for root in tree.children_of(ROOT_PARENT_ID) {
            for candidate in tree.subtree_ids(root.id) {
                if tree.is_in_subtree(id, candidate) {
                    continue;
                }
                if let Some(node) = tree.get(candidate) {
                    parents.push(node.clone());
                }
            }
        }
        self.fill_item_counts(&conn, parents)
    }
}
