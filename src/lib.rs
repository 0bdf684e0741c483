//! 本地目录与 FTP 服务器之间的单向同步
//!
//! 流程：两侧分别扫描成目录树 → 比较生成动作计划 → 先建目录、再并发传输和隔离。

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::Settings;
pub use core::{Direction, SyncConfig, SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
