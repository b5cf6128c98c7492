use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP错误: 状态码 {status}, URL: {url}")]
    Http { status: u16, url: String },

    #[error("网络请求失败: {0}")]
    Transport(String),

    #[error("页面结构异常: 期望 {expected} 个 `{selector}`, 实际找到 {found} 个")]
    MalformedPage {
        selector: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("元素 `{selector}` 缺少属性 `{attribute}`")]
    MissingAttribute {
        selector: &'static str,
        attribute: &'static str,
    },

    // 同一路径正被另一个未完成的下载任务占用
    #[error("目标文件冲突: {0} 正在被其他任务写入")]
    FileCollision(PathBuf),

    // 路径为绝对路径或包含 `..`, 会落到输出目录之外
    #[error("无效的保存路径: {0}")]
    InvalidPath(PathBuf),

    #[error("线程池已关闭, 无法提交新任务")]
    PoolClosed,

    #[error("任务在开始前被取消")]
    Cancelled,

    #[error("任务执行时发生 panic")]
    JobPanicked,

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("无效的页码: {0}")]
    InvalidPageId(u32),

    #[error("无效的配置: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for DownloadError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DownloadError::Transport(format!("请求超时: {}", error))
        } else {
            DownloadError::Transport(error.to_string())
        }
    }
}
