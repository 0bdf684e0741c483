pub mod ftp;
pub mod local;
#[cfg(test)]
pub(crate) mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ftp::FtpStorage;
pub use local::LocalStorage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, mkdir, rename 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 条目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// 单层目录列表中的一个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    /// 目录恒为 0
    pub size: u64,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }
}

/// 存储抽象接口
///
/// 本地目录和 FTP 服务器都实现这一接口，路径一律相对于存储根目录，
/// 使用 `/` 分隔，空字符串表示根目录本身。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出目录的直接子条目（不递归）
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个文件，父目录必须已存在
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// 创建目录（含中间目录），已存在时不报错
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 删除文件
    async fn delete(&self, path: &str) -> Result<()>;

    /// 移动文件，目标的父目录不存在时自动创建
    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        if let Some(parent) = parent_path(to) {
            self.create_dir(parent).await?;
        }
        let data = self.read(from).await?;
        self.write(to, data).await?;
        self.delete(from).await
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 拼接相对路径
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// 取相对路径的父目录，根目录下的条目返回 None
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// 写入用的临时文件路径，与目标同目录
///
/// 隐藏文件名加随机后缀，不会与树中已有的条目或并发写入的其他文件重名。
pub fn temp_path(path: &str) -> String {
    let (parent, name) = match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    };
    let temp_name = format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple());
    join_path(parent, &temp_name)
}

/// 根据配置创建本地存储和远程存储
pub async fn create_storages(
    settings: &crate::config::Settings,
) -> Result<(Arc<dyn Storage>, Arc<dyn Storage>)> {
    let local_dir = settings
        .local_directory
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Local storage requires localDirectory"))?;
    tracing::info!("初始化本地存储: {}", local_dir);
    let local = Arc::new(LocalStorage::new(local_dir)) as Arc<dyn Storage>;

    let ftp = &settings.ftp;
    let host = ftp
        .host
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("FTP storage requires host"))?;
    tracing::info!(
        "初始化FTP存储: host={}:{}, root={:?}",
        host,
        ftp.port,
        ftp.directory
    );
    let remote = Arc::new(FtpStorage::new(
        host,
        ftp.port,
        ftp.username.as_deref(),
        ftp.password.as_deref(),
        ftp.directory.clone(),
    )?) as Arc<dyn Storage>;

    Ok((local, remote))
}
