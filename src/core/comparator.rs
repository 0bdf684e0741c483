use crate::core::scanner::{Tree, TreeEntry};
use crate::error::{SyncError, SyncResult};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 在目标端创建目录
    CreateDir { path: String },
    /// 从源复制文件到目标
    Transfer { path: String, size: u64 },
    /// 把只存在于目标端的文件移入隔离目录
    Quarantine { path: String },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::CreateDir { path }
            | SyncAction::Transfer { path, .. }
            | SyncAction::Quarantine { path } => path,
        }
    }
}

/// 有序的动作计划
///
/// 所有 `CreateDir` 排在最前，且保持扫描顺序（父目录先于子目录）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    actions: Vec<SyncAction>,
    skipped: usize,
}

impl ActionPlan {
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 目录创建阶段
    pub fn directory_phase(&self) -> &[SyncAction] {
        let split = self.phase_split();
        &self.actions[..split]
    }

    /// 传输和隔离阶段
    pub fn work_phase(&self) -> &[SyncAction] {
        let split = self.phase_split();
        &self.actions[split..]
    }

    fn phase_split(&self) -> usize {
        self.actions
            .iter()
            .position(|a| !matches!(a, SyncAction::CreateDir { .. }))
            .unwrap_or(self.actions.len())
    }

    /// 统计动作
    pub fn summary(&self) -> ActionSummary {
        let mut summary = ActionSummary {
            skip_count: self.skipped,
            ..Default::default()
        };

        for action in &self.actions {
            match action {
                SyncAction::CreateDir { .. } => summary.create_count += 1,
                SyncAction::Transfer { size, .. } => {
                    summary.transfer_count += 1;
                    summary.transfer_bytes += size;
                }
                SyncAction::Quarantine { .. } => summary.quarantine_count += 1,
            }
        }

        summary
    }
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub create_count: usize,
    pub transfer_count: usize,
    pub transfer_bytes: u64,
    pub quarantine_count: usize,
    pub skip_count: usize,
}

/// 比较源树和目标树，生成动作计划
pub struct Reconciler;

impl Reconciler {
    pub fn reconcile(source: &Tree, dest: &Tree) -> SyncResult<ActionPlan> {
        let dest_index: HashMap<&str, &TreeEntry> = dest
            .iter()
            .map(|e| (e.relative_path.as_str(), e))
            .collect();

        let mut creates = Vec::new();
        let mut work = Vec::new();
        let mut skipped = 0;

        for src in source {
            let path = src.relative_path.as_str();

            match dest_index.get(path) {
                Some(dst) if dst.kind != src.kind => {
                    return Err(SyncError::KindConflict {
                        path: path.to_string(),
                        source_kind: src.kind,
                        destination_kind: dst.kind,
                    });
                }
                Some(_) if src.is_dir() => {}
                None if src.is_dir() => creates.push(SyncAction::CreateDir {
                    path: path.to_string(),
                }),
                // 仅比较大小，大小相同但内容不同的文件不会被发现
                Some(dst) if dst.size == src.size => {
                    skipped += 1;
                }
                Some(dst) => {
                    debug!("文件大小不同: {} (src={}, dst={})", path, src.size, dst.size);
                    work.push(SyncAction::Transfer {
                        path: path.to_string(),
                        size: src.size,
                    });
                }
                None => work.push(SyncAction::Transfer {
                    path: path.to_string(),
                    size: src.size,
                }),
            }
        }

        let source_paths: HashSet<&str> =
            source.iter().map(|e| e.relative_path.as_str()).collect();
        work.extend(
            dest.iter()
                .filter(|e| !e.is_dir() && !source_paths.contains(e.relative_path.as_str()))
                .map(|e| SyncAction::Quarantine {
                    path: e.relative_path.clone(),
                }),
        );

        creates.extend(work);
        Ok(ActionPlan {
            actions: creates,
            skipped,
        })
    }
}
