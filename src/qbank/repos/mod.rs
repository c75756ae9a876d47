//! Qbank Repo 模块
//!
//! 提供各表的 CRUD 操作。
//! 所有 Repo 方法提供 `_with_conn` 版本，供服务层在同一连接、同一事务内组合调用。
//!
//! ## 模块结构
//! - `category_repo`: 分类表 CRUD + 同级编号 + 子树查询
//! - `question_repo`: 默认题目存储（题目迁移、自动命名钩子的 SQLite 实现）

pub mod category_repo;
pub mod question_repo;

pub use category_repo::QbankCategoryRepo;
pub use question_repo::SqliteQuestionStore;

use rusqlite::Connection;

use super::error::QbankResult;

/// 在命名 SAVEPOINT 内执行 `f`，失败时回滚到该 SAVEPOINT
///
/// SAVEPOINT 可嵌套，服务层和 Repo 层可以各自包一层。
pub(crate) fn with_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> QbankResult<T>
where
    F: FnOnce(&Connection) -> QbankResult<T>,
{
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {}", name))?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0};",
                name
            ));
            Err(e)
        }
    }
}
