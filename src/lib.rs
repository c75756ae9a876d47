// Qbank library entry
// 题库分类树的存储、排序移动与业务服务；bin 目标通过 stdin JSON 调用。

pub mod config;
pub mod logging;
pub mod qbank;

pub use config::QbankConfig;
pub use qbank::{CategoryService, MoveSession, QbankDatabase, QbankError, QbankResult};
