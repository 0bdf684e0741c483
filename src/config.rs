//! 应用配置模块
//!
//! 配置文件为 JSON，缺失的字段取默认值；连接信息还可以通过环境变量
//! （或当前目录下的 `.env` 文件）补全，文件中的值优先。

use crate::core::{Direction, SyncConfig};
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// FTP 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// 服务器上的同步根目录
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_port() -> u16 {
    21
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            username: None,
            password: None,
            directory: None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSettings {
    /// 是否写日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志文件目录，不设置时只输出到终端
    #[serde(default)]
    pub dir: Option<String>,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            dir: None,
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl LogSettings {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub local_directory: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: String,
    #[serde(default)]
    pub ftp: FtpSettings,
    #[serde(default)]
    pub log: LogSettings,
}

fn default_concurrency() -> usize {
    1
}

/// 重试次数上限，指数退避的延迟在此范围内不会溢出
pub const MAX_RETRIES_LIMIT: u32 = 16;

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_quarantine_dir() -> String {
    "old".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_directory: None,
            direction: Direction::default(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            quarantine_dir: default_quarantine_dir(),
            ftp: FtpSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// 从配置文件加载，不提供文件时全部取默认值
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::Config(format!("invalid settings file {}: {}", path.display(), e))
        })
    }

    /// 用环境变量补全未设置的字段
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fill(&mut self.local_directory, lookup("LOCAL_DIRECTORY"));
        fill(&mut self.ftp.directory, lookup("FTP_DIRECTORY"));
        fill(&mut self.ftp.host, lookup("FTP_HOST"));
        fill(&mut self.ftp.username, lookup("FTP_USER"));
        fill(&mut self.ftp.password, lookup("FTP_PASS"));

        if self.ftp.port == default_port() {
            if let Some(port) = lookup("FTP_PORT").and_then(|p| p.parse().ok()) {
                self.ftp.port = port;
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> SyncResult<()> {
        if self.local_directory.as_deref().map_or(true, str::is_empty) {
            return Err(SyncError::Config("localDirectory is required".into()));
        }
        if self.ftp.host.as_deref().map_or(true, str::is_empty) {
            return Err(SyncError::Config("ftp.host is required".into()));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(SyncError::Config(format!(
                "maxRetries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }
        let quarantine = self.quarantine_dir.as_str();
        if quarantine.is_empty() || quarantine.contains(['/', '\\']) || quarantine == "." || quarantine == ".." {
            return Err(SyncError::Config(format!(
                "quarantineDir must be a single directory name, got {:?}",
                quarantine
            )));
        }
        Ok(())
    }

    /// 生成单次运行的同步配置
    pub fn sync_config(&self, dry_run: bool) -> SyncConfig {
        let local = self.local_directory.clone().unwrap_or_default();
        let remote = format!(
            "ftp://{}:{}/{}",
            self.ftp.host.as_deref().unwrap_or_default(),
            self.ftp.port,
            self.ftp.directory.as_deref().unwrap_or_default().trim_start_matches('/')
        );
        let (source_root, destination_root) = match self.direction {
            Direction::Down => (remote, local),
            Direction::Up => (local, remote),
        };

        SyncConfig {
            source_root,
            destination_root,
            direction: self.direction,
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            quarantine_dir: self.quarantine_dir.clone(),
            dry_run,
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.is_empty());
    }
}
