//! 默认题目存储
//!
//! `questions` 表上的 `ItemMigrationHook` / `AutoNamingHook` 实现。
//! 题目数只统计顶层题目（`parent_id = 0` 或 `parent_id = id`），子题目跟随父题目迁移。
//! 删除前的检查使用 `count_owned_rows`，任何仍引用该分类的记录都会阻止删除。

use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::qbank::database::QbankDatabase;
use crate::qbank::error::QbankResult;
use crate::qbank::hooks::{AutoNamingHook, ItemMigrationHook};
use crate::qbank::types::{QuestionCategory, QuestionItem};

/// 随机题的题型标识
pub const RANDOM_QTYPE: &str = "random";

const TOP_LEVEL_FILTER: &str = "(parent_id = 0 OR parent_id = id)";

fn map_question_row(row: &Row<'_>) -> rusqlite::Result<QuestionItem> {
    Ok(QuestionItem {
        id: row.get(0)?,
        category_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        qtype: row.get(4)?,
        question_text: row.get(5)?,
    })
}

/// 随机题的派生名称
///
/// `question_text` 为 `"1"` 时表示同时抽取子分类。
pub fn random_question_name(category_name: &str, include_subcategories: bool) -> String {
    if include_subcategories {
        format!("Random ({} and subcategories)", category_name)
    } else {
        format!("Random ({})", category_name)
    }
}

/// SQLite 题目存储
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteQuestionStore;

impl SqliteQuestionStore {
    /// 插入题目（导入与测试使用），返回新 ID
    pub fn insert_question_with_conn(
        conn: &Connection,
        category_id: i64,
        scope_id: i64,
        name: &str,
        qtype: &str,
        question_text: &str,
    ) -> QbankResult<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            r#"
            INSERT INTO questions (category_id, parent_id, scope_id, name, qtype, question_text, updated_at)
            VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![category_id, scope_id, name, qtype, question_text, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 插入子题目
    ///
    /// 子题目通常与父题目同分类，导入的数据里也可能分属不同分类。
    pub fn insert_child_question_with_conn(
        conn: &Connection,
        parent_id: i64,
        category_id: i64,
        scope_id: i64,
        name: &str,
        qtype: &str,
    ) -> QbankResult<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            r#"
            INSERT INTO questions (category_id, parent_id, scope_id, name, qtype, question_text, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, '', ?6)
            "#,
            params![category_id, parent_id, scope_id, name, qtype, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 列出分类下的全部题目（含子题目）
    pub fn list_questions_by_category(
        db: &QbankDatabase,
        category_id: i64,
    ) -> QbankResult<Vec<QuestionItem>> {
        let conn = db.get_conn_safe()?;
        Self::list_questions_by_category_with_conn(&conn, category_id)
    }

    pub fn list_questions_by_category_with_conn(
        conn: &Connection,
        category_id: i64,
    ) -> QbankResult<Vec<QuestionItem>> {
        let mut stmt = conn.prepare(
            "SELECT id, category_id, parent_id, name, qtype, question_text FROM questions WHERE category_id = ?1 ORDER BY id ASC",
        )?;
        let questions = stmt
            .query_map(params![category_id], map_question_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(questions)
    }

    /// 题目所在 scope
    pub fn question_scope_with_conn(conn: &Connection, question_id: i64) -> QbankResult<i64> {
        let scope_id = conn.query_row(
            "SELECT scope_id FROM questions WHERE id = ?1",
            params![question_id],
            |row| row.get(0),
        )?;
        Ok(scope_id)
    }
}

impl ItemMigrationHook for SqliteQuestionStore {
    fn count_items(&self, conn: &Connection, category_id: i64) -> QbankResult<usize> {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM questions WHERE category_id = ?1 AND {}",
                TOP_LEVEL_FILTER
            ),
            params![category_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_owned_rows(&self, conn: &Connection, category_id: i64) -> QbankResult<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM questions WHERE category_id = ?1",
            params![category_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn move_items(&self, conn: &Connection, from: i64, to: i64) -> QbankResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let top_level_ids: Vec<i64> = {
            let mut stmt = conn.prepare(&format!(
                "SELECT id FROM questions WHERE category_id = ?1 AND {}",
                TOP_LEVEL_FILTER
            ))?;
            let ids = stmt
                .query_map(params![from], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            ids
        };

        // 目标分类的 scope 决定题目新的 scope
        let target_scope: i64 = conn.query_row(
            "SELECT scope_id FROM question_categories WHERE id = ?1",
            params![to],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare_cached(
            "UPDATE questions SET category_id = ?1, scope_id = ?2, updated_at = ?3 WHERE id = ?4 OR parent_id = ?4",
        )?;
        for id in &top_level_ids {
            stmt.execute(params![to, target_scope, now, id])?;
        }

        // 父题目在其他分类的子题目
        let stragglers = conn.execute(
            "UPDATE questions SET category_id = ?1, scope_id = ?2, updated_at = ?3 WHERE category_id = ?4",
            params![to, target_scope, now, from],
        )?;

        info!(
            "[Qbank::QuestionStore] Moved {} top-level questions ({} detached sub-questions) from category {} to {}",
            top_level_ids.len(),
            stragglers,
            from,
            to
        );
        Ok(top_level_ids.len())
    }

    fn move_category_to_scope(
        &self,
        conn: &Connection,
        category_id: i64,
        old_scope_id: i64,
        new_scope_id: i64,
    ) -> QbankResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let affected = conn.execute(
            "UPDATE questions SET scope_id = ?1, updated_at = ?2 WHERE category_id = ?3",
            params![new_scope_id, now, category_id],
        )?;
        debug!(
            "[Qbank::QuestionStore] Category {} questions rescoped {} -> {} ({} rows)",
            category_id, old_scope_id, new_scope_id, affected
        );
        Ok(())
    }
}

impl AutoNamingHook for SqliteQuestionStore {
    fn refresh_derived_names(
        &self,
        conn: &Connection,
        category: &QuestionCategory,
    ) -> QbankResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut renamed = 0usize;
        for (flag, include_subcategories) in [("0", false), ("1", true)] {
            renamed += conn.execute(
                "UPDATE questions SET name = ?1, updated_at = ?2 WHERE category_id = ?3 AND qtype = ?4 AND question_text = ?5",
                params![
                    random_question_name(&category.name, include_subcategories),
                    now,
                    category.id,
                    RANDOM_QTYPE,
                    flag
                ],
            )?;
        }
        if renamed > 0 {
            debug!(
                "[Qbank::QuestionStore] Renamed {} random questions of category {}",
                renamed, category.id
            );
        }
        Ok(renamed)
    }
}
