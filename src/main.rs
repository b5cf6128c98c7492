use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, info};

use spotlight_downloader::common::logger::PrettyLogger;
use spotlight_downloader::{Downloader, DownloaderConfig};

mod cli;
mod display;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = cli::Cli::parse();

    // 初始化日志; 默认只输出警告, 终端留给进度条
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    let base = match &args.config {
        Some(path) => DownloaderConfig::from_json_file(path)?,
        None => DownloaderConfig::default(),
    };
    let config = args.apply(base);
    debug!("配置: {:?}", config);

    PrettyLogger::title("spotlightdl");
    PrettyLogger::job_info("站点", &config.base_url);
    PrettyLogger::job_info("输出目录", config.output_dir.display().to_string());
    PrettyLogger::job_info(
        "页码",
        format!(
            "{} - {}",
            args.start_page,
            args.start_page.saturating_add(args.pages.saturating_sub(1))
        ),
    );
    PrettyLogger::job_info("工作线程", config.workers.to_string());

    let started = Instant::now();
    let downloader = match Downloader::new(config) {
        Ok(downloader) => downloader,
        Err(e) => {
            PrettyLogger::error(format!("创建下载器失败: {}", e));
            return Err(e.into());
        }
    };
    for page_id in args.start_page..args.start_page.saturating_add(args.pages) {
        downloader.download_page(page_id)?;
    }
    PrettyLogger::success(format!("已提交 {} 个列表页", args.pages));

    let display = display::ProgressDisplay::new(downloader.worker_count())?;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = downloader.wait() => break,
            _ = ticker.tick() => {
                display.update(
                    &downloader.progress_snapshot(),
                    downloader.queue_depth(),
                    downloader.in_flight(),
                );
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                let discarded = downloader.stop();
                PrettyLogger::warning(format!(
                    "^C 已收到, 丢弃 {} 个排队任务, 等待进行中的任务结束...",
                    discarded
                ));
            }
        }
    }

    display.finish();
    downloader.shutdown().await;
    info!("所有工作线程已退出");

    let mut summary = vec![format!("耗时: {:.2}s", started.elapsed().as_secs_f64())];
    if let Some(history) = downloader.metadata_history() {
        summary.push(format!("记录图片: {} 张", history.len()));
    }
    if interrupted {
        PrettyLogger::warning("下载被中断");
        for line in summary {
            PrettyLogger::info(line);
        }
    } else {
        PrettyLogger::completion_summary(summary);
    }
    Ok(())
}
