use super::{parent_path, temp_path, DirEntry, Storage};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    /// 根目录不会在这里创建，是否创建由同步引擎根据方向决定
    pub fn new(path: &str) -> Self {
        let base_path = PathBuf::from(path);
        let name = format!("local:{}", path);
        Self { base_path, name }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve_path(path);

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || -> Result<Vec<DirEntry>> {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(false)
            {
                let entry = entry?;
                let Some(name) = entry.file_name().to_str() else {
                    debug!("跳过非 UTF-8 文件名: {:?}", entry.path());
                    continue;
                };

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    entries.push(DirEntry::dir(name));
                } else if file_type.is_file() {
                    let metadata = entry.metadata()?;
                    entries.push(DirEntry::file(name, metadata.len()));
                } else {
                    debug!("跳过特殊文件: {:?}", entry.path());
                }
            }
            Ok(entries)
        })
        .await?
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve_path(path)).await?;
        Ok(data)
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let full_path = self.resolve_path(path);

        // 使用同目录的临时文件写入，然后原子重命名
        let temp = self.resolve_path(&temp_path(path));
        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &full_path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.resolve_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        if let Some(parent) = parent_path(to) {
            self.create_dir(parent).await?;
        }
        fs::rename(self.resolve_path(from), self.resolve_path(to)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
