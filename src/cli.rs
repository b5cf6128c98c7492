use clap::Parser;
use std::path::PathBuf;

use spotlight_downloader::DownloaderConfig;

/// 壁纸站点图片下载器
#[derive(Parser, Debug)]
#[command(name = "spotlightdl")]
#[command(version = "0.1")]
#[command(about = "并发下载壁纸站点列表页中的图片", long_about = None)]
pub struct Cli {
    /// 列表页地址前缀, 页面地址为 {URL}/{页码}
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub url: Option<String>,

    /// 起始页码
    #[arg(long, value_name = "PAGE", default_value_t = 1)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub start_page: u32,

    /// 下载的页数
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub pages: u32,

    /// 工作线程数
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// 图片保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// 文件名格式
    #[arg(long, value_name = "FORMAT")]
    #[arg(help = "文件名格式: %t=标题, %d=日期, 如: %d_%t")]
    pub format: Option<String>,

    /// 不抓取详情页, 直接按缩略图下载 (文件名为 {页码}p{序号}i)
    #[arg(long)]
    pub no_metadata: bool,

    /// 请求超时 (秒)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// 写盘块大小 (字节)
    #[arg(long, value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// 自定义 User-Agent
    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    /// 为每个工作线程写错误日志 ({DIR}/logs/worker-N.log)
    #[arg(long)]
    pub error_log: bool,

    /// JSON 配置文件, 命令行参数优先
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 用命令行参数覆盖配置
    pub fn apply(&self, mut config: DownloaderConfig) -> DownloaderConfig {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(format) = &self.format {
            config.path_format = format.clone();
        }
        if self.no_metadata {
            config.use_metadata = false;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(ua) = &self.user_agent {
            config.headers.insert("User-Agent".to_string(), ua.clone());
        }
        if self.error_log {
            config.error_log = true;
        }
        config
    }
}
