//! 题库分类表 CRUD 操作
//!
//! 提供分类邻接表的管理，包括：
//! - 分类 CRUD 操作
//! - 同级集合查询与重新编号
//! - 递归子树查询（scope 级联）
//!
//! ## 核心方法
//! - `apply_move_plan_with_conn`: 落库 `reorder::plan_move` 的结果
//! - `delete_category_with_conn`: 子节点拼接到被删节点的位置后删除
//! - `get_subtree_ids_with_conn`: 递归获取分类及子孙分类 ID

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::qbank::error::{QbankError, QbankResult};
use crate::qbank::reorder::{self, MovePlan, SortAssignment};
use crate::qbank::repos::with_savepoint;
use crate::qbank::types::{NewCategory, QuestionCategory};
use crate::qbank::ROOT_PARENT_ID;

const CATEGORY_COLUMNS: &str =
    "id, parent_id, scope_id, name, description, sort_order, stamp, created_at, updated_at";

/// 题库分类表 Repo
pub struct QbankCategoryRepo;

fn map_category_row(row: &Row<'_>) -> rusqlite::Result<QuestionCategory> {
    Ok(QuestionCategory {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        scope_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        sort_order: row.get(5)?,
        stamp: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        item_count: 0,
    })
}

/// 逐条写入排序赋值
///
/// 只改 sort_order，不触碰 parent_id / scope_id。
fn execute_sort_assignments(
    conn: &Connection,
    assignments: &[SortAssignment],
    now: i64,
) -> QbankResult<usize> {
    if assignments.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare_cached(
        "UPDATE question_categories SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
    )?;
    let mut total_affected = 0usize;
    for assignment in assignments {
        total_affected += stmt.execute(params![assignment.sort_order, now, assignment.id])?;
    }

    Ok(total_affected)
}

impl QbankCategoryRepo {
    // ========================================================================
    // 分类 CRUD
    // ========================================================================

    /// 创建分类（追加到同级末尾）
    ///
    /// 父分类存在性与 scope 一致性由服务层校验。
    pub fn create_category_with_conn(
        conn: &Connection,
        new: &NewCategory,
    ) -> QbankResult<QuestionCategory> {
        let now = chrono::Utc::now().timestamp_millis();
        let sort_order = Self::next_sort_order_with_conn(conn, new.scope_id, new.parent_id)?;
        let stamp = QuestionCategory::generate_stamp();

        conn.execute(
            r#"
            INSERT INTO question_categories (parent_id, scope_id, name, description, sort_order, stamp, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                new.parent_id,
                new.scope_id,
                new.name,
                new.description,
                sort_order,
                stamp,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();

        info!(
            "[Qbank::CategoryRepo] Created category {} in scope {} (parent {}, sort_order {})",
            id, new.scope_id, new.parent_id, sort_order
        );

        Ok(QuestionCategory {
            id,
            parent_id: new.parent_id,
            scope_id: new.scope_id,
            name: new.name.clone(),
            description: new.description.clone(),
            sort_order,
            stamp,
            created_at: now,
            updated_at: now,
            item_count: 0,
        })
    }

    /// 获取分类
    pub fn get_category_with_conn(
        conn: &Connection,
        id: i64,
    ) -> QbankResult<Option<QuestionCategory>> {
        let category = conn
            .query_row(
                &format!(
                    "SELECT {} FROM question_categories WHERE id = ?1",
                    CATEGORY_COLUMNS
                ),
                params![id],
                map_category_row,
            )
            .optional()?;
        Ok(category)
    }

    /// 获取分类，不存在时返回 `NotFound`
    pub fn require_category_with_conn(conn: &Connection, id: i64) -> QbankResult<QuestionCategory> {
        Self::get_category_with_conn(conn, id)?.ok_or_else(|| QbankError::not_found(id))
    }

    /// 更新名称与描述
    pub fn update_details_with_conn(
        conn: &Connection,
        id: i64,
        name: &str,
        description: &str,
    ) -> QbankResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let affected = conn.execute(
            "UPDATE question_categories SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, description, now, id],
        )?;
        if affected == 0 {
            return Err(QbankError::not_found(id));
        }
        debug!("[Qbank::CategoryRepo] Updated details of category {}", id);
        Ok(())
    }

    /// 删除分类：子分类拼接到被删分类原来的位置，然后删除记录
    ///
    /// 返回被重新挂载的子分类数。题目检查由服务层负责。
    pub fn delete_category_with_conn(
        conn: &Connection,
        category: &QuestionCategory,
    ) -> QbankResult<usize> {
        with_savepoint(conn, "qbank_category_delete_tx", |conn| {
            let now = chrono::Utc::now().timestamp_millis();
            let children = Self::list_children_with_conn(conn, category.id)?;
            let parent_siblings =
                Self::list_siblings_with_conn(conn, category.scope_id, category.parent_id)?;

            let assignments = reorder::splice_children(&parent_siblings, category.id, &children);

            // 1. 子分类挂到祖父级
            let moved_children = conn.execute(
                "UPDATE question_categories SET parent_id = ?1, updated_at = ?2 WHERE parent_id = ?3",
                params![category.parent_id, now, category.id],
            )?;

            // 2. 删除分类本身
            let affected = conn.execute(
                "DELETE FROM question_categories WHERE id = ?1",
                params![category.id],
            )?;
            if affected == 0 {
                return Err(QbankError::not_found(category.id));
            }

            // 3. 祖父级集合重新编号
            execute_sort_assignments(conn, &assignments, now)?;

            info!(
                "[Qbank::CategoryRepo] Deleted category {} ({} children reparented to {})",
                category.id, moved_children, category.parent_id
            );
            Ok(moved_children)
        })
    }

    // ========================================================================
    // 列表查询
    // ========================================================================

    /// 列出 scope 内全部分类（按 parent_id, sort_order）
    pub fn list_by_scope_with_conn(
        conn: &Connection,
        scope_id: i64,
    ) -> QbankResult<Vec<QuestionCategory>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM question_categories WHERE scope_id = ?1 ORDER BY parent_id ASC, sort_order ASC, id ASC",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map(params![scope_id], map_category_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "[Qbank::CategoryRepo] list_by_scope({}): {} categories",
            scope_id,
            categories.len()
        );
        Ok(categories)
    }

    /// 列出同级集合 `(scope_id, parent_id)`
    pub fn list_siblings_with_conn(
        conn: &Connection,
        scope_id: i64,
        parent_id: i64,
    ) -> QbankResult<Vec<QuestionCategory>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM question_categories WHERE scope_id = ?1 AND parent_id = ?2 ORDER BY sort_order ASC, id ASC",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map(params![scope_id, parent_id], map_category_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// 列出直接子分类
    pub fn list_children_with_conn(
        conn: &Connection,
        parent_id: i64,
    ) -> QbankResult<Vec<QuestionCategory>> {
        if parent_id == ROOT_PARENT_ID {
            return Err(QbankError::validation(
                "parent_id",
                "root level is per scope, list roots by scope instead",
            ));
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM question_categories WHERE parent_id = ?1 ORDER BY sort_order ASC, id ASC",
            CATEGORY_COLUMNS
        ))?;
        let categories = stmt
            .query_map(params![parent_id], map_category_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// scope 内根分类数量
    pub fn count_roots_with_conn(conn: &Connection, scope_id: i64) -> QbankResult<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM question_categories WHERE scope_id = ?1 AND parent_id = ?2",
            params![scope_id, ROOT_PARENT_ID],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 是否为所在 scope 唯一的根分类
    pub fn is_only_root_with_conn(conn: &Connection, category: &QuestionCategory) -> QbankResult<bool> {
        if !category.is_root() {
            return Ok(false);
        }
        Ok(Self::count_roots_with_conn(conn, category.scope_id)? <= 1)
    }

    /// 同级集合的下一个编号（max + 1）
    pub fn next_sort_order_with_conn(
        conn: &Connection,
        scope_id: i64,
        parent_id: i64,
    ) -> QbankResult<i64> {
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) FROM question_categories WHERE scope_id = ?1 AND parent_id = ?2",
            params![scope_id, parent_id],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    // ========================================================================
    // 递归查询
    // ========================================================================

    /// 递归获取分类及其所有子孙分类的 ID（包含起始分类）
    pub fn get_subtree_ids_with_conn(conn: &Connection, id: i64) -> QbankResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM question_categories WHERE id = ?1
                UNION
                SELECT c.id FROM question_categories c JOIN subtree s ON c.parent_id = s.id
            )
            SELECT id FROM subtree
            "#,
        )?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        debug!(
            "[Qbank::CategoryRepo] get_subtree_ids: {} -> {} categories",
            id,
            ids.len()
        );
        Ok(ids)
    }

    /// `candidate` 是否为 `ancestor` 本身或其子孙
    pub fn is_in_subtree_with_conn(
        conn: &Connection,
        ancestor: i64,
        candidate: i64,
    ) -> QbankResult<bool> {
        Ok(Self::get_subtree_ids_with_conn(conn, ancestor)?.contains(&candidate))
    }

    // ========================================================================
    // 排序与移动
    // ========================================================================

    /// 落库移动计划
    ///
    /// 被移动节点的 parent/scope/sort_order、受影响兄弟的 sort_order，
    /// 以及 scope 变化时整棵子树的 scope_id 在同一个 SAVEPOINT 内写入。
    /// 返回 scope 被改写的分类 ID（未换 scope 时为空）。
    pub fn apply_move_plan_with_conn(conn: &Connection, plan: &MovePlan) -> QbankResult<Vec<i64>> {
        with_savepoint(conn, "qbank_category_move_tx", |conn| {
            let now = chrono::Utc::now().timestamp_millis();

            let affected = conn.execute(
                "UPDATE question_categories SET parent_id = ?1, scope_id = ?2, sort_order = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    plan.new_parent_id,
                    plan.new_scope_id,
                    plan.moved_sort_order,
                    now,
                    plan.moved_id
                ],
            )?;
            if affected == 0 {
                return Err(QbankError::not_found(plan.moved_id));
            }

            let renumbered = execute_sort_assignments(conn, &plan.assignments, now)?;

            let mut rescoped = Vec::new();
            if plan.scope_changed {
                rescoped = Self::get_subtree_ids_with_conn(conn, plan.moved_id)?;
                conn.execute(
                    r#"
                    WITH RECURSIVE subtree(id) AS (
                        SELECT id FROM question_categories WHERE id = ?1
                        UNION
                        SELECT c.id FROM question_categories c JOIN subtree s ON c.parent_id = s.id
                    )
                    UPDATE question_categories SET scope_id = ?2, updated_at = ?3
                    WHERE id IN (SELECT id FROM subtree)
                    "#,
                    params![plan.moved_id, plan.new_scope_id, now],
                )?;
            }

            info!(
                "[Qbank::CategoryRepo] Moved category {} to scope {} parent {} at {} ({} siblings renumbered, {} rescoped)",
                plan.moved_id,
                plan.new_scope_id,
                plan.new_parent_id,
                plan.moved_sort_order,
                renumbered,
                rescoped.len()
            );
            Ok(rescoped)
        })
    }
}

// ============================================================================
// 单元测试
// ============================================================================
