use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// 按工作线程划分的错误日志, 每个线程一个文件: {dir}/worker-{index}.log
#[derive(Debug, Clone)]
pub struct ErrorLog {
    dir: PathBuf,
}

impl ErrorLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, worker: usize) -> PathBuf {
        self.dir.join(format!("worker-{}.log", worker))
    }

    /// 追加一行错误记录; 写日志本身失败只打印警告
    pub async fn record(&self, worker: usize, job: &str, error: &str) {
        let line = format!(
            "{} [worker {}] {}: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            worker,
            job,
            error
        );

        if let Err(e) = self.append(worker, &line).await {
            warn!("写入错误日志失败 {}: {}", self.path_for(worker).display(), e);
        }
    }

    async fn append(&self, worker: usize, line: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(worker))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
