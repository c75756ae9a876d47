//! 运行配置
//!
//! 加载顺序（后者覆盖前者）：
//! 1. 内置默认值
//! 2. `config/qbank.toml`（可选）
//! 3. 环境变量 `QBANK_*`（`.env` 会先被 dotenvy 载入），嵌套字段用 `__` 分隔

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::qbank::error::QbankResult;

const CONFIG_FILE: &str = "config/qbank";
const ENV_PREFIX: &str = "QBANK";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QbankConfig {
    /// 数据目录，数据库位于 `<data_dir>/databases/qbank.db`
    pub data_dir: PathBuf,
    /// 连接池最大连接数
    pub pool_max_size: u32,
    /// SQLite busy_timeout（毫秒）
    pub busy_timeout_ms: u64,
    /// 默认日志过滤表达式（`RUST_LOG` 优先）
    pub log_filter: String,
    /// 固定会话密钥；为空时不校验
    pub session_key: Option<String>,
}

impl Default for QbankConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            pool_max_size: 8,
            busy_timeout_ms: 5000,
            log_filter: "info".to_string(),
            session_key: None,
        }
    }
}

impl QbankConfig {
    pub fn from_env_and_file() -> QbankResult<Self> {
        dotenvy::dotenv().ok();
        Self::load(Path::new(&format!("{}.toml", CONFIG_FILE)))
    }

    /// 从指定 TOML 文件（存在时）和环境变量加载
    pub fn load(file: &Path) -> QbankResult<Self> {
        let defaults = config::Config::try_from(&QbankConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if file.exists() {
            debug!("[Qbank::Config] Loading config file: {}", file.display());
            builder = builder.add_source(config::File::from(file));
        }
        let loaded = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: QbankConfig = loaded.try_deserialize()?;
        debug!(
            "[Qbank::Config] data_dir={}, pool_max_size={}, busy_timeout_ms={}",
            cfg.data_dir.display(),
            cfg.pool_max_size,
            cfg.busy_timeout_ms
        );
        Ok(cfg)
    }
}
