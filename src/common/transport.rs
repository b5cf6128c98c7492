use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::downloader::error::DownloadError;

/// 普通 GET 请求的响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    // 重定向之后的最终地址
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 流式 GET 请求的响应
pub struct HttpStream {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Vec<u8>, DownloadError>>,
}

impl HttpStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 传输能力; 请求头和超时由实现方在构造时固定
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<HttpResponse, DownloadError>;

    async fn fetch_stream(&self, url: &str) -> Result<HttpStream, DownloadError>;
}
