//! Qbank 数据库管理模块
//!
//! 提供题库分类的独立 SQLite 数据库初始化和管理功能。
//! 使用 r2d2 连接池，支持并发访问。
//!
//! ## 设计原则
//! - **单一数据库**：使用单个 `qbank.db`
//! - **幂等建表**：打开时执行 `CREATE TABLE IF NOT EXISTS`，重复打开无副作用
//! - **连接池管理**：使用 r2d2 管理连接池

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{QbankError, QbankResult};
use crate::config::QbankConfig;

/// 数据库文件名
const DATABASE_FILENAME: &str = "qbank.db";

/// 当前 Schema 版本
pub const CURRENT_SCHEMA_VERSION: u32 = 20241016;

/// 默认最大连接数
const DEFAULT_POOL_MAX_SIZE: u32 = 8;

/// 默认 busy_timeout（毫秒）
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// SQLite 连接池类型
pub type QbankPool = Pool<SqliteConnectionManager>;

/// SQLite 池化连接类型
pub type QbankPooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY NOT NULL
);

CREATE TABLE IF NOT EXISTS question_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL DEFAULT 0,
    scope_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    sort_order INTEGER NOT NULL DEFAULT 1,
    stamp TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_question_categories_siblings
    ON question_categories(scope_id, parent_id, sort_order);
CREATE INDEX IF NOT EXISTS idx_question_categories_parent
    ON question_categories(parent_id);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL REFERENCES question_categories(id),
    parent_id INTEGER NOT NULL DEFAULT 0,
    scope_id INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    qtype TEXT NOT NULL,
    question_text TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_questions_category ON questions(category_id);
"#;

/// Qbank 数据库管理器
///
/// 管理分类模块的独立 SQLite 数据库文件（`qbank.db`）。
/// 支持：
/// - r2d2 连接池管理
/// - 幂等建表
/// - WAL 模式提升并发性能
pub struct QbankDatabase {
    /// 数据库连接池
    pool: QbankPool,
    /// 数据库文件路径
    db_path: PathBuf,
}

impl QbankDatabase {
    /// 使用默认连接池参数创建数据库管理器
    ///
    /// # Arguments
    /// * `data_dir` - 数据目录路径，数据库文件位于 `data_dir/databases/qbank.db`
    pub fn new(data_dir: &Path) -> QbankResult<Self> {
        Self::open(data_dir, DEFAULT_POOL_MAX_SIZE, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// 按配置创建数据库管理器
    pub fn from_config(config: &QbankConfig) -> QbankResult<Self> {
        Self::open(
            &config.data_dir,
            config.pool_max_size,
            config.busy_timeout_ms,
        )
    }

    fn open(data_dir: &Path, max_size: u32, busy_timeout_ms: u64) -> QbankResult<Self> {
        info!(
            "[Qbank::Database] Initializing qbank database in: {}",
            data_dir.display()
        );

        // 确保 databases 目录存在
        let databases_dir = data_dir.join("databases");
        if let Err(e) = fs::create_dir_all(&databases_dir) {
            error!(
                "[Qbank::Database] Failed to create databases directory: {}",
                e
            );
            return Err(QbankError::Io(format!(
                "Failed to create databases directory: {}",
                e
            )));
        }

        let db_path = databases_dir.join(DATABASE_FILENAME);
        let pool = Self::build_pool(&db_path, max_size, busy_timeout_ms)?;

        let db = Self {
            pool,
            db_path,
        };
        db.initialize_schema()?;

        info!(
            "[Qbank::Database] Qbank database initialized successfully: {}",
            db.db_path.display()
        );

        Ok(db)
    }

    /// 构建连接池
    fn build_pool(db_path: &Path, max_size: u32, busy_timeout_ms: u64) -> QbankResult<QbankPool> {
        debug!(
            "[Qbank::Database] Building connection pool for: {}",
            db_path.display()
        );

        let busy_timeout = busy_timeout_ms as i64;
        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            // 使用 WAL 模式提升并发性能
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            // 设置 busy_timeout 避免无界等待
            conn.pragma_update(None, "busy_timeout", busy_timeout)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(max_size.max(1)) // SQLite 单写者模型下无需太多连接
            .connection_timeout(Duration::from_secs(5))
            .max_lifetime(Some(Duration::from_secs(1800)))
            .idle_timeout(Some(Duration::from_secs(600)))
            .build(manager)
            .map_err(|e| QbankError::Pool(format!("Failed to create connection pool: {}", e)))?;

        Ok(pool)
    }

    /// 幂等建表并记录 schema 版本
    fn initialize_schema(&self) -> QbankResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![CURRENT_SCHEMA_VERSION],
        )?;
        debug!(
            "[Qbank::Database] Schema ready (version {})",
            CURRENT_SCHEMA_VERSION
        );
        Ok(())
    }

    /// 获取数据库连接
    pub fn get_conn(&self) -> QbankResult<QbankPooledConnection> {
        self.pool
            .get()
            .map_err(|e| QbankError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// 获取数据库连接（连接池繁忙时重试最多 3 次，指数退避）
    pub fn get_conn_safe(&self) -> QbankResult<QbankPooledConnection> {
        const MAX_RETRIES: usize = 3;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match self.pool.get() {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!(
                            "[Qbank::Database] get_conn_safe: succeeded on retry attempt {}",
                            attempt
                        );
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(
                        "[Qbank::Database] get_conn_safe: attempt {} failed: {}",
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);

                    if attempt < MAX_RETRIES - 1 {
                        let backoff_ms = 50u64 << attempt;
                        std::thread::sleep(Duration::from_millis(backoff_ms));
                    }
                }
            }
        }

        error!(
            "[Qbank::Database] get_conn_safe: all {} attempts failed",
            MAX_RETRIES
        );
        Err(QbankError::Pool(format!(
            "Failed to get connection after {} retries: {}",
            MAX_RETRIES,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    /// 获取数据库文件路径
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 获取数据库统计信息（单次查询获取所有计数）
    pub fn get_statistics(&self) -> QbankResult<QbankDatabaseStats> {
        let conn = self.get_conn()?;

        let (category_count, scope_count, question_count, schema_version) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM question_categories) AS category_count,
                (SELECT COUNT(DISTINCT scope_id) FROM question_categories) AS scope_count,
                (SELECT COUNT(*) FROM questions) AS question_count,
                (SELECT COALESCE(MAX(version), 0) FROM schema_version) AS schema_version",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            },
        )?;

        Ok(QbankDatabaseStats {
            category_count: category_count as u64,
            scope_count: scope_count as u64,
            question_count: question_count as u64,
            schema_version,
        })
    }
}

/// Qbank 数据库统计信息
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QbankDatabaseStats {
    /// 分类数量
    pub category_count: u64,
    /// 含分类的 scope 数量
    pub scope_count: u64,
    /// 题目数量
    pub question_count: u64,
    /// Schema 版本
    pub schema_version: u32,
}

// ============================================================================
// 单元测试
// ============================================================================
