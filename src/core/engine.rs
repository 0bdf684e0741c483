use crate::core::comparator::{ActionPlan, ActionSummary, Reconciler};
use crate::core::executor::{ExecutionStats, Failure, TransferExecutor};
use crate::core::scanner::{ScanConfig, TreeScanner};
use crate::error::{SyncError, SyncResult};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// 同步方向
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 远程为源，本地为目标
    #[default]
    Down,
    /// 本地为源，远程为目标
    Up,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Down => write!(f, "down"),
            Direction::Up => write!(f, "up"),
        }
    }
}

/// 同步配置，单次运行期间不变
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 源根目录（用于日志和报告）
    pub source_root: String,
    /// 目标根目录
    pub destination_root: String,
    pub direction: Direction,
    /// 并行工作者数量，至少为 1
    pub concurrency: usize,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试基础延迟（毫秒）
    pub retry_base_delay_ms: u64,
    /// 隔离目录名，相对于目标根目录
    pub quarantine_dir: String,
    /// 只生成计划，不执行
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_root: String::new(),
            destination_root: String::new(),
            direction: Direction::Down,
            concurrency: 1,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            quarantine_dir: "old".to_string(),
            dry_run: false,
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub direction: Direction,
    pub source_root: String,
    pub destination_root: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub dry_run: bool,
    pub planned: ActionSummary,
    pub created: u64,
    pub transferred: u64,
    pub bytes_transferred: u64,
    pub quarantined: u64,
    pub skipped: u64,
    pub failed: Vec<Failure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 按方向确定源和目标后运行同步
    pub async fn run(
        &self,
        local: Arc<dyn Storage>,
        remote: Arc<dyn Storage>,
    ) -> SyncResult<SyncReport> {
        let (source, dest) = match self.config.direction {
            Direction::Down => (remote, local),
            Direction::Up => (local, remote),
        };
        self.run_between(source, dest).await
    }

    /// 运行同步任务
    pub async fn run_between(
        &self,
        source: Arc<dyn Storage>,
        dest: Arc<dyn Storage>,
    ) -> SyncResult<SyncReport> {
        if self.config.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("sync", run = %run_id, direction = %self.config.direction);
        self.sync(run_id, source, dest).instrument(span).await
    }

    async fn sync(
        &self,
        run_id: String,
        source: Arc<dyn Storage>,
        dest: Arc<dyn Storage>,
    ) -> SyncResult<SyncReport> {
        let started_at = chrono::Utc::now();
        info!(
            "开始同步: {} -> {} (并发 {})",
            source.name(),
            dest.name(),
            self.config.concurrency
        );

        // 目标根目录不存在时自动创建
        if let Err(e) = dest.create_dir("").await {
            warn!("创建目标根目录失败（继续扫描）: {:#}", e);
        }

        let scanner = TreeScanner::with_config(ScanConfig {
            excluded: vec![self.config.quarantine_dir.clone()],
        });
        let source_tree = scanner.walk(source.as_ref()).await?;
        let dest_tree = scanner.walk(dest.as_ref()).await?;
        debug!(
            "扫描完成: 源 {} 条目, 目标 {} 条目",
            source_tree.len(),
            dest_tree.len()
        );

        let plan = Reconciler::reconcile(&source_tree, &dest_tree)?;
        let planned = plan.summary();
        info!(
            "比较完成: {} 个目录, {} 个传输 ({} 字节), {} 个隔离, {} 个跳过",
            planned.create_count,
            planned.transfer_count,
            planned.transfer_bytes,
            planned.quarantine_count,
            planned.skip_count
        );

        let stats = if self.config.dry_run {
            Self::log_plan(&plan);
            ExecutionStats::default()
        } else {
            TransferExecutor::new(self.config.clone(), source.clone(), dest.clone())
                .execute(&plan)
                .await?
        };

        info!(
            "同步完成: 创建 {}, 传输 {}, 隔离 {}, 失败 {}",
            stats.created,
            stats.transferred,
            stats.quarantined,
            stats.failed.len()
        );

        Ok(SyncReport {
            run_id,
            direction: self.config.direction,
            source_root: self.config.source_root.clone(),
            destination_root: self.config.destination_root.clone(),
            started_at,
            finished_at: chrono::Utc::now(),
            dry_run: self.config.dry_run,
            skipped: planned.skip_count as u64,
            planned,
            created: stats.created,
            transferred: stats.transferred,
            bytes_transferred: stats.bytes_transferred,
            quarantined: stats.quarantined,
            failed: stats.failed,
        })
    }

    fn log_plan(plan: &ActionPlan) {
        for action in plan.actions() {
            info!("[dry-run] {:?}", action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{Faults, MemoryStorage};

    fn engine(direction: Direction) -> SyncEngine {
        SyncEngine::new(SyncConfig {
            direction,
            concurrency: 3,
            max_retries: 0,
            retry_base_delay_ms: 1,
            ..SyncConfig::default()
        })
    }

    #[tokio::test]
    async fn test_down_then_idempotent() {
        let remote = Arc::new(MemoryStorage::new());
        remote.put("a/c.txt", &[0; 20]);
        remote.put("top.txt", b"hello");
        let local = Arc::new(MemoryStorage::new());
        local.put("a/b.txt", &[0; 10]);

        let engine = engine(Direction::Down);
        let report = engine.run(local.clone(), remote.clone()).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.created, 0);
        assert_eq!(report.transferred, 2);
        assert_eq!(report.quarantined, 1);
        assert_eq!(local.get("a/c.txt").unwrap().len(), 20);
        assert_eq!(local.get("old/a/b.txt").unwrap().len(), 10);
        assert!(local.get("a/b.txt").is_none());

        let second = engine.run(local.clone(), remote.clone()).await.unwrap();
        assert_eq!(second.planned, ActionSummary {
            skip_count: 2,
            ..ActionSummary::default()
        });
    }

    #[tokio::test]
    async fn test_up_direction_writes_remote() {
        let remote = Arc::new(MemoryStorage::new());
        let local = Arc::new(MemoryStorage::new());
        local.put("docs/readme.md", b"# hi");

        let report = engine(Direction::Up)
            .run(local.clone(), remote.clone())
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.transferred, 1);
        assert_eq!(remote.get("docs/readme.md").unwrap(), b"# hi");
        assert!(local.get("docs/readme.md").is_some());
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let remote = Arc::new(MemoryStorage::new());
        remote.put("x/y.txt", b"y");
        let local = Arc::new(MemoryStorage::new());

        let engine = SyncEngine::new(SyncConfig {
            dry_run: true,
            ..SyncConfig::default()
        });
        let report = engine.run(local.clone(), remote).await.unwrap();

        assert_eq!(report.planned.transfer_count, 1);
        assert_eq!(report.planned.create_count, 1);
        assert_eq!(report.transferred, 0);
        assert!(local.file_paths().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_before_execution() {
        let remote = Arc::new(MemoryStorage::new());
        remote.put("f.txt", b"f");
        let local = Arc::new(MemoryStorage::with_faults(Faults {
            list: [String::new()].into_iter().collect(),
            ..Faults::default()
        }));

        let err = engine(Direction::Down)
            .run(local.clone(), remote)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Listing { .. }));
        assert!(local.file_paths().is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let engine = SyncEngine::new(SyncConfig {
            concurrency: 0,
            ..SyncConfig::default()
        });
        let err = engine
            .run(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
