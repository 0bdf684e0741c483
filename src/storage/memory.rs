//! 内存存储，测试中代替 FTP 服务器

use super::{parent_path, DirEntry, Storage};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// 注入的故障
#[derive(Default)]
pub struct Faults {
    pub list: HashSet<String>,
    pub read: HashSet<String>,
    pub write: HashSet<String>,
    pub create_dir: HashSet<String>,
    /// 读取这些路径时 panic
    pub panic: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    pub faults: Faults,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            state: Mutex::new(State::default()),
            faults,
        }
    }

    /// 写入文件并补全所有父目录
    pub fn put(&self, path: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let mut parent = parent_path(path);
        while let Some(p) = parent {
            state.dirs.insert(p.to_string());
            parent = parent_path(p);
        }
        state.files.insert(path.to_string(), data.to_vec());
    }

    pub fn mkdir(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let mut current = Some(path);
        while let Some(p) = current {
            state.dirs.insert(p.to_string());
            current = parent_path(p);
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    fn dir_exists(state: &State, path: &str) -> bool {
        path.is_empty() || state.dirs.contains(path)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        if self.faults.list.contains(path) {
            return Err(anyhow!("injected list failure: {}", path));
        }
        let state = self.state.lock().unwrap();
        if !Self::dir_exists(&state, path) {
            return Err(anyhow!("no such directory: {}", path));
        }

        let is_child = |p: &str| parent_path(p).unwrap_or("") == path;
        let mut entries: Vec<DirEntry> = state
            .dirs
            .iter()
            .filter(|d| is_child(d.as_str()))
            .map(|d| DirEntry::dir(d.rsplit('/').next().unwrap_or(d.as_str())))
            .collect();
        entries.extend(
            state
                .files
                .iter()
                .filter(|(f, _)| is_child(f.as_str()))
                .map(|(f, data)| {
                    let name = f.rsplit('/').next().unwrap_or(f.as_str());
                    DirEntry::file(name, data.len() as u64)
                }),
        );
        // 故意打乱顺序，扫描器必须自行排序
        entries.reverse();
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        if self.faults.panic.contains(path) {
            panic!("injected panic: {}", path);
        }
        if self.faults.read.contains(path) {
            return Err(anyhow!("injected read failure: {}", path));
        }
        self.get(path).ok_or_else(|| anyhow!("no such file: {}", path))
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        if self.faults.write.contains(path) {
            return Err(anyhow!("injected write failure: {}", path));
        }
        let mut state = self.state.lock().unwrap();
        if !Self::dir_exists(&state, parent_path(path).unwrap_or("")) {
            return Err(anyhow!("parent directory missing: {}", path));
        }
        state.files.insert(path.to_string(), data);
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        if self.faults.create_dir.contains(path) {
            return Err(anyhow!("injected mkdir failure: {}", path));
        }
        if !path.is_empty() {
            self.mkdir(path);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.state.lock().unwrap().files.remove(path);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::join_path;

    #[tokio::test]
    async fn test_default_rename_moves_file() {
        let storage = MemoryStorage::new();
        storage.put("a/b.txt", b"data");

        storage.rename("a/b.txt", &join_path("old", "a/b.txt")).await.unwrap();

        assert!(storage.get("a/b.txt").is_none());
        assert_eq!(storage.get("old/a/b.txt").unwrap(), b"data");
        assert!(storage.has_dir("old/a"));
    }
}
