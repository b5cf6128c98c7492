pub mod common;
pub mod downloader;
pub mod parser;

pub use common::transport::{HttpResponse, HttpStream, Transport};
pub use downloader::Downloader;
pub use downloader::error::DownloadError;
pub use downloader::models::{DownloaderConfig, ImageMetadata};
pub use downloader::task::Job;
