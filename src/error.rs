//! 同步过程中的错误类型

use crate::storage::EntryKind;
use thiserror::Error;

/// 同步错误
///
/// `Listing`、`KindConflict`、`DirectoryCreate` 和 `Config` 会中止整个运行；
/// `Transfer` 只影响单个动作，记录到报告的失败列表后继续执行。
#[derive(Debug, Error)]
pub enum SyncError {
    /// 列目录失败
    #[error("listing {path:?} on {storage} failed: {cause}")]
    Listing {
        storage: String,
        path: String,
        cause: anyhow::Error,
    },

    /// 同一路径在一侧是文件、另一侧是目录
    #[error("{path:?} is a {source_kind} in source but a {destination_kind} in destination")]
    KindConflict {
        path: String,
        source_kind: EntryKind,
        destination_kind: EntryKind,
    },

    /// 目标目录创建失败
    #[error("creating directory {path:?} failed: {cause}")]
    DirectoryCreate { path: String, cause: anyhow::Error },

    /// 单个文件传输或移动失败
    #[error("{path}: {cause}")]
    Transfer { path: String, cause: anyhow::Error },

    /// 配置无效
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// 是否需要中止整个运行
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Transfer { .. })
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
