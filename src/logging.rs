//! tracing 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者；`RUST_LOG` 存在时优先于传入的默认过滤表达式。
///
/// 重复调用是安全的，已安装时直接返回 false。
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
