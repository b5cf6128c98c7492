use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{
    Client, ClientBuilder,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue},
};
use tracing::{debug, warn};

use super::transport::{HttpResponse, HttpStream, Transport};
use crate::downloader::error::DownloadError;
use crate::downloader::models::DownloaderConfig;

// 基于 reqwest 的 HTTP 客户端, 默认请求头和超时在构造时固定
// 超时只针对连接和单次读取的空闲时间, 大图持续有数据到达时不会被中断
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub inner: Client,
}

impl HttpClient {
    pub fn new(headers: &BTreeMap<String, String>, timeout: Duration) -> Result<Self, DownloadError> {
        let inner = ClientBuilder::new()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .default_headers(Self::build_headers(headers))
            .build()?;
        Ok(Self { inner })
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Self::new(&config.headers, config.request_timeout())
    }

    pub fn build_headers(extra: &BTreeMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        for (name, value) in extra {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("忽略无效的请求头: {}: {}", name, value),
            }
        }
        headers
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch(&self, url: &str) -> Result<HttpResponse, DownloadError> {
        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        debug!("GET {} -> {}", url, status);

        let final_url = resp.url().to_string();
        let body = resp.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            url: final_url,
            body,
        })
    }

    async fn fetch_stream(&self, url: &str) -> Result<HttpStream, DownloadError> {
        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        let content_length = resp.content_length();
        debug!("GET(stream) {} -> {}, Content-Length: {:?}", url, status, content_length);

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(DownloadError::from))
            .boxed();

        Ok(HttpStream {
            status: status.as_u16(),
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::USER_AGENT;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // 每 interval 发送一个字节的本地 HTTP 服务
    async fn trickle_server(body: &'static [u8], interval: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for byte in body {
                tokio::time::sleep(interval).await;
                // 客户端超时断开后停止发送
                if socket.write_all(&[*byte]).await.is_err() || socket.flush().await.is_err() {
                    return;
                }
            }
        });
        format!("http://{}/slow.jpg", addr)
    }

    #[tokio::test]
    async fn slow_but_steady_body_is_not_cut_off() {
        let url = trickle_server(b"0123456789", Duration::from_millis(300)).await;
        let client = HttpClient::new(&BTreeMap::new(), Duration::from_secs(1)).unwrap();

        let resp = client.fetch_stream(&url).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_length, Some(10));

        let mut received = Vec::new();
        let mut body = resp.body;
        while let Some(chunk) = body.next().await {
            received.extend(chunk.unwrap());
        }
        assert_eq!(received, b"0123456789");
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let url = trickle_server(b"01", Duration::from_secs(3)).await;
        let client = HttpClient::new(&BTreeMap::new(), Duration::from_millis(500)).unwrap();

        let resp = client.fetch_stream(&url).await.unwrap();
        let mut body = resp.body;
        let mut failed = false;
        while let Some(chunk) = body.next().await {
            if chunk.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn custom_headers_override_defaults() {
        let mut extra = BTreeMap::new();
        extra.insert("User-Agent".to_string(), "spotlightdl-test".to_string());
        extra.insert("bad header".to_string(), "x".to_string());

        let headers = HttpClient::build_headers(&extra);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "spotlightdl-test");
        assert!(headers.contains_key(ACCEPT));
        assert_eq!(headers.len(), 3);
    }
}
