use super::{parent_path, DirEntry, EntryKind, Storage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

pub struct FtpStorage {
    operator: Operator,
    name: String,
}

impl FtpStorage {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        root: Option<String>,
    ) -> Result<Self> {
        use opendal::services::Ftp;

        let endpoint = format!("ftp://{}:{}", host, port);
        let mut builder = Ftp::default().endpoint(&endpoint);

        if let Some(user) = username {
            builder = builder.user(user);
        }
        if let Some(pass) = password {
            builder = builder.password(pass);
        }
        if let Some(ref r) = root {
            builder = builder.root(r);
        }

        // 添加超时层，避免单个挂起的连接无限阻塞
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!(
            "{}{}",
            endpoint,
            root.as_deref()
                .map(|r| format!("/{}", r.trim_start_matches('/')))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }

    /// opendal 要求目录路径以 `/` 结尾
    fn dir_path(path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", path)
        }
    }
}

#[async_trait]
impl Storage for FtpStorage {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = Self::dir_path(path);
        let this_dir = dir.trim_matches('/');

        let mut lister = self
            .operator
            .lister_with(&dir)
            .metakey(Metakey::ContentLength | Metakey::Mode)
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            let entry_path = entry.path().trim_matches('/');

            // 部分服务会把目录自身也列出来
            if entry_path == this_dir {
                continue;
            }

            let name = entry_path.rsplit('/').next().unwrap_or(entry_path);
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }

            let meta = entry.metadata();
            if meta.is_dir() {
                entries.push(DirEntry::dir(name));
            } else {
                entries.push(DirEntry {
                    name: name.to_string(),
                    kind: EntryKind::File,
                    size: meta.content_length(),
                });
            }
        }

        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = self.operator.read(path).await?;
        Ok(data.to_vec())
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        // opendal 的 FTP 写入先上传到 `<path>.<uuid>`，关闭时再 RNFR/RNTO 到目标路径，
        // 上传中断时目标文件保持原样
        self.operator.write(path, data).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.operator.create_dir(&Self::dir_path(path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.operator.delete(path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        if let Some(parent) = parent_path(to) {
            self.create_dir(parent).await?;
        }

        if self.operator.info().full_capability().rename {
            self.operator.rename(from, to).await?;
        } else {
            // 服务未声明 rename 能力时退化为复制后删除
            let data = self.operator.read(from).await?;
            self.operator.write(to, data).await?;
            self.operator.delete(from).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
