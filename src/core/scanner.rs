use crate::error::{SyncError, SyncResult};
use crate::storage::{join_path, EntryKind, Storage};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

/// 树中的一个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// 相对于同步根目录的路径
    pub relative_path: String,
    pub kind: EntryKind,
    /// 仅文件有意义，目录恒为 0
    pub size: u64,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 一侧存储的完整递归快照
///
/// 深度优先，目录总是排在其所有后代之前。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dir()).count()
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// 不进入也不输出的相对路径（如隔离目录）
    pub excluded: Vec<String>,
}

/// 目录树扫描器
pub struct TreeScanner {
    config: ScanConfig,
}

impl TreeScanner {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.config.excluded.iter().any(|p| p == path)
    }

    /// 递归扫描存储，任何一层列目录失败都会使整个扫描失败
    pub async fn walk(&self, storage: &dyn Storage) -> SyncResult<Tree> {
        info!("开始扫描存储: {}", storage.name());

        let mut entries = Vec::new();
        self.walk_dir(storage, String::new(), &mut entries).await?;
        let tree = Tree::new(entries);

        info!(
            "扫描完成: {} 个文件, {} 个目录",
            tree.file_count(),
            tree.len() - tree.file_count()
        );
        Ok(tree)
    }

    fn walk_dir<'a>(
        &'a self,
        storage: &'a dyn Storage,
        dir: String,
        out: &'a mut Vec<TreeEntry>,
    ) -> BoxFuture<'a, SyncResult<()>> {
        async move {
            let mut children = storage.list(&dir).await.map_err(|cause| SyncError::Listing {
                storage: storage.name().to_string(),
                path: dir.clone(),
                cause,
            })?;
            children.sort_by(|a, b| a.name.cmp(&b.name));

            for child in children {
                let path = join_path(&dir, &child.name);
                if self.is_excluded(&path) {
                    debug!("排除: {}", path);
                    continue;
                }

                match child.kind {
                    EntryKind::Directory => {
                        out.push(TreeEntry::dir(path.clone()));
                        self.walk_dir(storage, path, out).await?;
                    }
                    EntryKind::File => out.push(TreeEntry::file(path, child.size)),
                }
            }
            Ok(())
        }
        .boxed()
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{Faults, MemoryStorage};

    fn sample() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.put("b.txt", b"bb");
        storage.put("a/x.txt", b"xxx");
        storage.put("a/deep/y.txt", b"y");
        storage.mkdir("empty");
        storage
    }

    #[tokio::test]
    async fn test_walk_orders_dirs_before_children() {
        let tree = TreeScanner::new().walk(&sample()).await.unwrap();

        assert_eq!(
            tree.entries(),
            &[
                TreeEntry::dir("a"),
                TreeEntry::dir("a/deep"),
                TreeEntry::file("a/deep/y.txt", 1),
                TreeEntry::file("a/x.txt", 3),
                TreeEntry::file("b.txt", 2),
                TreeEntry::dir("empty"),
            ]
        );
    }

    #[tokio::test]
    async fn test_every_file_has_parent_entry() {
        let tree = TreeScanner::new().walk(&sample()).await.unwrap();
        for (i, entry) in tree.iter().enumerate() {
            if let Some((parent, _)) = entry.relative_path.rsplit_once('/') {
                let pos = tree
                    .iter()
                    .position(|e| e.relative_path == parent && e.is_dir())
                    .expect("parent missing");
                assert!(pos < i);
            }
        }
    }

    #[tokio::test]
    async fn test_excluded_subtree_is_skipped() {
        let storage = sample();
        storage.put("old/a/x.txt", b"stale");
        let scanner = TreeScanner::with_config(ScanConfig {
            excluded: vec!["old".to_string()],
        });

        let tree = scanner.walk(&storage).await.unwrap();
        assert!(tree.iter().all(|e| !e.relative_path.starts_with("old")));
        assert_eq!(tree.file_count(), 3);
    }

    #[tokio::test]
    async fn test_nested_listing_failure_aborts_walk() {
        let mut faults = Faults::default();
        faults.list.insert("a/deep".to_string());
        let storage = MemoryStorage::with_faults(faults);
        storage.put("a/deep/y.txt", b"y");
        storage.put("z.txt", b"z");

        let err = TreeScanner::new().walk(&storage).await.unwrap_err();
        match err {
            SyncError::Listing { path, .. } => assert_eq!(path, "a/deep"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_root() {
        let tree = TreeScanner::new().walk(&MemoryStorage::new()).await.unwrap();
        assert!(tree.is_empty());
    }
}
