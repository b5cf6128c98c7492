use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::error::DownloadError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

// 从详情页解析出来的图片信息, 创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub title: String,
    pub date: String,
    pub src: String,
}

/// 已下载图片元数据的历史记录, 多个工作线程并发追加
#[derive(Debug, Default)]
pub struct MetadataHistory {
    entries: Mutex<Vec<ImageMetadata>>,
}

impl MetadataHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, metadata: ImageMetadata) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metadata);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<ImageMetadata> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 下载器配置, 构造后不可修改
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    // 列表页地址前缀, 页面地址为 {base_url}/{page_id}
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    pub use_metadata: bool,
    // %t 替换为标题, %d 替换为日期
    pub path_format: String,
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub block_size: usize,
    pub workers: usize,
    // 是否为每个工作线程写错误日志文件
    pub error_log: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string());

        Self {
            base_url: "https://windows10spotlight.com/page".to_string(),
            headers,
            use_metadata: true,
            path_format: "%t".to_string(),
            output_dir: PathBuf::from("./imgs/"),
            request_timeout_secs: 5,
            block_size: 4096,
            workers: default_workers(),
            error_log: false,
        }
    }
}

impl DownloaderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DownloadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            DownloadError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.base_url.trim().is_empty() {
            return Err(DownloadError::InvalidConfig("base_url 不能为空".to_string()));
        }
        if self.workers == 0 {
            return Err(DownloadError::InvalidConfig("workers 必须大于 0".to_string()));
        }
        if self.block_size == 0 {
            return Err(DownloadError::InvalidConfig("block_size 必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_url(&self, page_id: u32) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), page_id)
    }
}

// 与常见线程池默认值一致: min(32, cpu + 4)
fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 4).min(32)
}
