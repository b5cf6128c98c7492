use std::fmt;
use std::path::PathBuf;

/// 提交到线程池的任务, 提交后不可修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    // 抓取列表页, 再为页内每张图片提交子任务
    FetchPage { page_id: u32 },
    // 下载单张图片, path 不含扩展名
    DownloadImage { src: String, path: PathBuf },
    // 先抓取图片详情页拿到元数据, 再提交下载任务
    FetchMetadataThenDownload { url: String, path_format: String },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::FetchPage { .. } => "fetch_page",
            Job::DownloadImage { .. } => "download_image",
            Job::FetchMetadataThenDownload { .. } => "fetch_metadata",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::FetchPage { page_id } => write!(f, "列表页 {}", page_id),
            Job::DownloadImage { src, path } => write!(f, "图片 {} -> {}", src, path.display()),
            Job::FetchMetadataThenDownload { url, .. } => write!(f, "详情页 {}", url),
        }
    }
}
