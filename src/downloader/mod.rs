use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::common::client::HttpClient;
use crate::common::error_log::ErrorLog;
use crate::common::transport::Transport;
use self::core::JobRunner;
use error::DownloadError;
use models::{DownloaderConfig, ImageMetadata, MetadataHistory};
use pool::{Completion, WorkerPool};
use progress::ProgressTable;
use task::Job;

pub mod core;
pub mod counter;
pub mod error;
pub mod models;
pub mod pool;
pub mod progress;
pub mod task;

/// 下载器门面: 持有线程池、进度表和元数据历史
pub struct Downloader {
    config: Arc<DownloaderConfig>,
    pool: WorkerPool<Job>,
    progress: Arc<ProgressTable>,
    history: Option<Arc<MetadataHistory>>,
}

impl Downloader {
    /// 使用 reqwest 客户端创建下载器, 需在 tokio 运行时内调用
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::from_config(&config)?;
        Self::with_transport(config, Arc::new(client))
    }

    pub fn with_transport(
        config: DownloaderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let config = Arc::new(config);

        let progress = Arc::new(ProgressTable::new(config.workers));
        let history = config
            .use_metadata
            .then(|| Arc::new(MetadataHistory::new()));
        let error_log = config
            .error_log
            .then(|| ErrorLog::new(config.output_dir.join("logs")));

        let runner = JobRunner::new(
            Arc::clone(&config),
            transport,
            Arc::clone(&progress),
            history.clone(),
            error_log,
        );
        let pool = WorkerPool::new(config.workers, Arc::new(runner));

        info!(
            "下载器已启动: {} 个工作线程, 输出目录 {}",
            config.workers,
            config.output_dir.display()
        );

        Ok(Self {
            config,
            pool,
            progress,
            history,
        })
    }

    /// 下载列表页中的所有图片
    pub fn download_page(&self, page_id: u32) -> Result<(), DownloadError> {
        if page_id == 0 {
            return Err(DownloadError::InvalidPageId(page_id));
        }
        self.submit(Job::FetchPage { page_id })
    }

    /// 下载单张图片, path 相对输出目录且不含扩展名
    pub fn download_image(&self, src: &str, path: impl Into<PathBuf>) -> Result<(), DownloadError> {
        self.submit(Job::DownloadImage {
            src: src.to_string(),
            path: path.into(),
        })
    }

    /// 比直接下载多一次详情页请求, 但能拿到标题和日期
    pub fn download_image_with_metadata(
        &self,
        url: &str,
        path_format: &str,
    ) -> Result<(), DownloadError> {
        self.submit(Job::FetchMetadataThenDownload {
            url: url.to_string(),
            path_format: path_format.to_string(),
        })
    }

    pub fn submit(&self, job: Job) -> Result<(), DownloadError> {
        self.pool.submit(job).map(|_| ())
    }

    pub fn submit_with(&self, job: Job, on_complete: Completion) -> Result<(), DownloadError> {
        self.pool.submit_with(job, Some(on_complete)).map(|_| ())
    }

    /// 阻塞直到所有任务(包括链式提交的子任务)结束, 单个任务失败不会导致返回错误
    pub async fn wait(&self) {
        self.pool.wait().await;
    }

    /// 停止下载: 丢弃排队中的任务, 执行中的任务继续跑完。返回丢弃的任务数
    pub fn stop(&self) -> usize {
        let discarded = self.pool.cancel_all();
        info!("下载器已停止, 丢弃 {} 个排队任务", discarded);
        discarded
    }

    /// 停止并等待所有工作线程退出
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    pub fn queue_depth(&self) -> usize {
        self.pool.queue_depth()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub fn progress_snapshot(&self) -> Vec<f32> {
        self.progress.snapshot()
    }

    /// 未启用元数据时返回 None
    pub fn metadata_history(&self) -> Option<Vec<ImageMetadata>> {
        self.history.as_ref().map(|h| h.snapshot())
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}
