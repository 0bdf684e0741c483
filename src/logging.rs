//! 日志模块 - 提供带大小上限的日志文件

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE_NAME: &str = "ftpsync.log";

struct Inner {
    writer: Option<BufWriter<File>>,
    written: u64,
}

/// 带大小限制的日志写入器
///
/// 超过上限时当前文件改名为 `ftpsync.log.old`（覆盖旧备份），然后重新打开。
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    inner: Arc<Mutex<Inner>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE_NAME);
        let max_size = u64::from(max_size_mb.max(1)) * 1024 * 1024;

        let existing = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        if existing > max_size {
            Self::rotate(&file_path)?;
        }
        let written = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        let writer = Self::open(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            inner: Arc::new(Mutex::new(Inner {
                writer: Some(writer),
                written,
            })),
        })
    }

    #[cfg(test)]
    fn with_max_bytes(log_dir: &Path, max_size: u64) -> io::Result<Self> {
        let mut writer = Self::new(log_dir, 1)?;
        writer.max_size = max_size;
        Ok(writer)
    }

    fn open(file_path: &Path) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(BufWriter::new(file))
    }

    /// 轮转日志文件
    fn rotate(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // 日志写入失败不应让程序崩溃，锁中毒时继续使用内部数据
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_locked(&self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();

        if inner.written + buf.len() as u64 > self.max_size && inner.written > 0 {
            if let Some(mut w) = inner.writer.take() {
                let _ = w.flush();
            }
            Self::rotate(&self.file_path)?;
            inner.writer = Some(Self::open(&self.file_path)?);
            inner.written = 0;
        }

        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("log writer not available"))?;
        let n = writer.write(buf)?;
        writer.flush()?;
        inner.written += n as u64;
        Ok(n)
    }
}

/// 日志写入器句柄
pub struct LogWriter {
    target: SizeRotatingWriter,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.target.write_locked(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.target.lock().writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            target: self.clone(),
        }
    }
}
