//! 动作执行器
//!
//! 先在单个任务里按顺序创建全部目录，全部确认成功后才启动传输工作者；
//! 传输和隔离动作之间没有顺序要求，由固定数量的工作者从共享队列中领取。

use crate::core::comparator::{ActionPlan, SyncAction};
use crate::core::engine::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::storage::{join_path, Storage};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 单个失败的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub path: String,
    pub error: String,
}

/// 执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub created: u64,
    pub transferred: u64,
    pub quarantined: u64,
    pub bytes_transferred: u64,
    /// 按计划顺序排列
    pub failed: Vec<Failure>,
}

/// 单次运行的共享状态，工作者之间只共享这里的计数器和失败列表
#[derive(Default)]
pub struct RunContext {
    created: AtomicU64,
    transferred: AtomicU64,
    quarantined: AtomicU64,
    bytes_transferred: AtomicU64,
    next: AtomicUsize,
    failures: Mutex<Vec<(usize, Failure)>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record_failure(&self, index: usize, failure: Failure) {
        self.failures.lock().await.push((index, failure));
    }

    async fn stats(&self) -> ExecutionStats {
        let mut failures = self.failures.lock().await.clone();
        failures.sort_by_key(|(index, _)| *index);

        ExecutionStats {
            created: self.created.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            failed: failures.into_iter().map(|(_, f)| f).collect(),
        }
    }
}

/// 指数退避延迟，溢出时取上限
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2_u64.saturating_pow(attempt))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// 传输执行器
pub struct TransferExecutor {
    config: SyncConfig,
    source: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
}

impl TransferExecutor {
    pub fn new(config: SyncConfig, source: Arc<dyn Storage>, dest: Arc<dyn Storage>) -> Self {
        Self {
            config,
            source,
            dest,
        }
    }

    /// 执行计划
    ///
    /// 目录创建失败立即返回错误；单个文件的失败只记录在结果中。
    pub async fn execute(&self, plan: &ActionPlan) -> SyncResult<ExecutionStats> {
        let ctx = Arc::new(RunContext::new());

        self.run_directory_phase(plan.directory_phase(), &ctx).await?;
        self.run_work_phase(plan.work_phase(), &ctx).await;

        Ok(ctx.stats().await)
    }

    async fn run_directory_phase(&self, actions: &[SyncAction], ctx: &RunContext) -> SyncResult<()> {
        for action in actions {
            let path = action.path();
            debug!("创建目录: {}", path);
            self.dest
                .create_dir(path)
                .await
                .map_err(|cause| SyncError::DirectoryCreate {
                    path: path.to_string(),
                    cause,
                })?;
            ctx.created.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn run_work_phase(&self, actions: &[SyncAction], ctx: &Arc<RunContext>) {
        if actions.is_empty() {
            return;
        }

        let queue: Arc<[SyncAction]> = actions.to_vec().into();
        let workers = self.config.concurrency.max(1).min(queue.len());
        debug!("启动 {} 个工作者处理 {} 个动作", workers, queue.len());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let ctx = ctx.clone();
            let source = self.source.clone();
            let dest = self.dest.clone();
            let config = self.config.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = ctx.next.fetch_add(1, Ordering::Relaxed);
                    let Some(action) = queue.get(index) else {
                        break;
                    };

                    // 动作内部 panic 时也要记入失败列表，否则报告会显示成功
                    let result = AssertUnwindSafe(Self::execute_action_with_retry(
                        action,
                        source.as_ref(),
                        dest.as_ref(),
                        &config,
                    ))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        error!("{} 执行时 panic: {}", action.path(), panic_message(&*payload));
                        Err(SyncError::Transfer {
                            path: action.path().to_string(),
                            cause: anyhow::anyhow!("panicked: {}", panic_message(&*payload)),
                        })
                    });

                    match result {
                        Ok(bytes) => match action {
                            SyncAction::Transfer { .. } => {
                                ctx.transferred.fetch_add(1, Ordering::Relaxed);
                                ctx.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
                            }
                            SyncAction::Quarantine { .. } => {
                                ctx.quarantined.fetch_add(1, Ordering::Relaxed);
                            }
                            SyncAction::CreateDir { .. } => {}
                        },
                        Err(e) => {
                            let error = match &e {
                                SyncError::Transfer { cause, .. } => format!("{:#}", cause),
                                other => other.to_string(),
                            };
                            let failure = Failure {
                                path: action.path().to_string(),
                                error,
                            };
                            ctx.record_failure(index, failure).await;
                        }
                    }
                }
                debug!("工作者 {} 退出", worker_id);
            }));
        }

        // 等待所有工作者完成
        for handle in handles {
            if let Err(e) = handle.await {
                error!("工作者异常退出: {}", e);
            }
        }
    }

    /// 带重试的动作执行，返回传输的字节数
    async fn execute_action_with_retry(
        action: &SyncAction,
        source: &dyn Storage,
        dest: &dyn Storage,
        config: &SyncConfig,
    ) -> SyncResult<u64> {
        let mut attempt = 0;
        loop {
            match Self::execute_action(action, source, dest, &config.quarantine_dir).await {
                Ok(bytes) => return Ok(bytes),
                Err(cause) if attempt < config.max_retries => {
                    let delay = backoff_delay_ms(config.retry_base_delay_ms, attempt);
                    warn!(
                        "{} 失败，{}ms 后重试 ({}/{}): {:#}",
                        action.path(),
                        delay,
                        attempt + 1,
                        config.max_retries,
                        cause
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(cause) => {
                    error!("{} 最终失败: {:#}", action.path(), cause);
                    return Err(SyncError::Transfer {
                        path: action.path().to_string(),
                        cause,
                    });
                }
            }
        }
    }

    /// 执行单个动作
    async fn execute_action(
        action: &SyncAction,
        source: &dyn Storage,
        dest: &dyn Storage,
        quarantine_dir: &str,
    ) -> anyhow::Result<u64> {
        match action {
            SyncAction::Transfer { path, size } => {
                info!("传输: {} ({} 字节)", path, size);
                let data = source.read(path).await?;
                let bytes = data.len() as u64;
                dest.write(path, data).await?;
                debug!("  写入完成: {} ({} 字节)", path, bytes);
                Ok(bytes)
            }
            SyncAction::Quarantine { path } => {
                let target = join_path(quarantine_dir, path);
                info!("隔离: {} -> {}", path, target);
                dest.rename(path, &target).await?;
                Ok(0)
            }
            SyncAction::CreateDir { path } => {
                dest.create_dir(path).await?;
                Ok(0)
            }
        }
    }
}
