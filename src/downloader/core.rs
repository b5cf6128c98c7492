use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::error::DownloadError;
use super::models::{DownloaderConfig, MetadataHistory};
use super::pool::{JobExecutor, JobResult, WorkerContext};
use super::progress::{ProgressSlot, ProgressTable};
use super::task::Job;
use crate::common::error_log::ErrorLog;
use crate::common::transport::Transport;
use crate::parser::{self, utils::FormatTool};

/// 三类任务的执行体, 由线程池按任务类型分发
pub struct JobRunner {
    config: Arc<DownloaderConfig>,
    transport: Arc<dyn Transport>,
    progress: Arc<ProgressTable>,
    history: Option<Arc<MetadataHistory>>,
    error_log: Option<ErrorLog>,
    // 正在写入的目标文件
    in_use: DashSet<PathBuf>,
}

#[async_trait]
impl JobExecutor<Job> for JobRunner {
    async fn execute(&self, job: Job, ctx: &WorkerContext<Job>) -> JobResult {
        let worker = ctx.worker_index();
        let description = job.to_string();
        debug!(worker, kind = job.kind(), "执行任务: {}", description);

        let result = match job {
            Job::FetchPage { page_id } => self.fetch_page(page_id, ctx).await,
            Job::DownloadImage { src, path } => self.download_image(&src, &path, worker).await,
            Job::FetchMetadataThenDownload { url, path_format } => {
                self.fetch_metadata(&url, &path_format, ctx).await
            }
        };

        if let (Err(e), Some(log)) = (&result, &self.error_log) {
            log.record(worker, &description, &e.to_string()).await;
        }
        result
    }
}

impl JobRunner {
    pub fn new(
        config: Arc<DownloaderConfig>,
        transport: Arc<dyn Transport>,
        progress: Arc<ProgressTable>,
        history: Option<Arc<MetadataHistory>>,
        error_log: Option<ErrorLog>,
    ) -> Self {
        Self {
            config,
            transport,
            progress,
            history,
            error_log,
            in_use: DashSet::new(),
        }
    }

    // 抓取列表页并为每张图片提交子任务
    async fn fetch_page(&self, page_id: u32, ctx: &WorkerContext<Job>) -> JobResult {
        let url = self.config.page_url(page_id);
        let resp = self.transport.fetch(&url).await?;
        if !resp.is_success() {
            return Err(DownloadError::Http {
                status: resp.status,
                url,
            });
        }

        // 站点会把第 1 页重定向到首页, 页码始终取自任务参数而不是响应地址
        let submitted = if self.config.use_metadata {
            let links = parser::extract_image_links(&resp.body, &resp.url);
            for link in &links {
                ctx.submit(Job::FetchMetadataThenDownload {
                    url: link.clone(),
                    path_format: self.config.path_format.clone(),
                })?;
            }
            links.len()
        } else {
            let srcs = parser::extract_thumbnails(&resp.body, &resp.url);
            let count = srcs.len();
            for (index, src) in srcs.into_iter().enumerate() {
                ctx.submit(Job::DownloadImage {
                    src,
                    path: PathBuf::from(format!("{}p{}i", page_id, index)),
                })?;
            }
            count
        };

        info!(
            worker = ctx.worker_index(),
            "📄 列表页 {} 解析完成, 提交 {} 个任务", page_id, submitted
        );
        Ok(())
    }

    // 抓取详情页, 记录元数据后提交下载任务
    async fn fetch_metadata(
        &self,
        url: &str,
        path_format: &str,
        ctx: &WorkerContext<Job>,
    ) -> JobResult {
        let resp = self.transport.fetch(url).await?;
        if !resp.is_success() {
            return Err(DownloadError::Http {
                status: resp.status,
                url: url.to_string(),
            });
        }

        let metadata = parser::extract_metadata(&resp.body, &resp.url)?;
        let path = FormatTool::format_path(path_format, &metadata.title, &metadata.date);
        let src = metadata.src.clone();
        debug!("详情页 {}: 标题 {}, 日期 {}", url, metadata.title, metadata.date);

        if let Some(history) = &self.history {
            history.push(metadata);
        }

        ctx.submit(Job::DownloadImage {
            src,
            path: PathBuf::from(path),
        })?;
        Ok(())
    }

    async fn download_image(&self, src: &str, path: &Path, worker: usize) -> JobResult {
        let slot = self.progress.slot(worker);
        slot.reset();

        let target = self.target_path(src, path)?;
        // 同名文件冲突时直接报错, 不覆盖另一个任务正在写的文件
        let _claim = self.claim(&target)?;

        let resp = self.transport.fetch_stream(src).await?;
        if !resp.is_success() {
            return Err(DownloadError::Http {
                status: resp.status,
                url: src.to_string(),
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&target).await?;

        // 无论成功与否都要 flush, 中途失败时保留已写入的部分文件
        let written = self
            .write_blocks(&mut file, resp.body, resp.content_length, slot)
            .await;
        let flushed = file.flush().await;
        let written = written?;
        flushed?;

        slot.finish();
        info!(worker, "✅ 图片下载完成: {} ({} 字节)", target.display(), written);
        Ok(())
    }

    // 按固定块大小写盘, 每写完一块推进一次进度
    async fn write_blocks(
        &self,
        file: &mut tokio::fs::File,
        mut body: BoxStream<'static, Result<Vec<u8>, DownloadError>>,
        content_length: Option<u64>,
        slot: ProgressSlot<'_>,
    ) -> Result<u64, DownloadError> {
        let block_size = self.config.block_size;
        let mut pending: Vec<u8> = Vec::with_capacity(block_size * 2);
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            pending.extend_from_slice(&chunk?);
            let mut offset = 0;
            while pending.len() - offset >= block_size {
                file.write_all(&pending[offset..offset + block_size]).await?;
                offset += block_size;
                written += block_size as u64;
                advance(slot, block_size, content_length);
            }
            // 只搬移不足一块的剩余部分
            pending.drain(..offset);
        }

        if !pending.is_empty() {
            file.write_all(&pending).await?;
            written += pending.len() as u64;
            advance(slot, pending.len(), content_length);
        }
        Ok(written)
    }

    // {output_dir}/{path}{.ext}
    fn target_path(&self, src: &str, path: &Path) -> Result<PathBuf, DownloadError> {
        // 标题和日期来自远端页面, 不能让它们把文件写到输出目录之外
        if !is_contained(path) {
            return Err(DownloadError::InvalidPath(path.to_path_buf()));
        }
        let extension = FormatTool::extension_of(src)?;
        let mut target = self.config.output_dir.join(path).into_os_string();
        target.push(extension);
        Ok(PathBuf::from(target))
    }

    fn claim(&self, target: &Path) -> Result<PathClaim<'_>, DownloadError> {
        if !self.in_use.insert(target.to_path_buf()) {
            return Err(DownloadError::FileCollision(target.to_path_buf()));
        }
        Ok(PathClaim {
            in_use: &self.in_use,
            path: target.to_path_buf(),
        })
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn advance(slot: ProgressSlot<'_>, block: usize, content_length: Option<u64>) {
    // 没有 Content-Length 时不汇报中间进度, 结束时直接置 100
    if let Some(total) = content_length.filter(|t| *t > 0) {
        slot.advance((100.0 * block as f64 / total as f64) as f32);
    }
}

// 目标路径占用标记, 任务结束时释放
struct PathClaim<'a> {
    in_use: &'a DashSet<PathBuf>,
    path: PathBuf,
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        self.in_use.remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_must_stay_under_output_dir() {
        assert!(is_contained(Path::new("2024-01-01_Lake")));
        assert!(is_contained(Path::new("sub/dir/Lake")));
        assert!(is_contained(Path::new("./Lake")));

        assert!(!is_contained(Path::new("")));
        assert!(!is_contained(Path::new("/abs")));
        assert!(!is_contained(Path::new("../x")));
        assert!(!is_contained(Path::new("a/../../x")));
    }
}
