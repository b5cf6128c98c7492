use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 每个工作线程一个进度条, 外加一行队列状态; 只读取下载器暴露的快照
pub struct ProgressDisplay {
    multi: MultiProgress,
    worker_bars: Vec<ProgressBar>,
    status: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(workers: usize) -> anyhow::Result<Self> {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{prefix:>10} [{bar:30.cyan/blue}] {pos:>3}%")?
            .progress_chars("#>-");

        let worker_bars = (0..workers)
            .map(|i| {
                let pb = multi.add(ProgressBar::new(100));
                pb.set_style(style.clone());
                pb.set_prefix(format!("线程 {}", i));
                pb
            })
            .collect();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);

        Ok(Self {
            multi,
            worker_bars,
            status,
        })
    }

    pub fn update(&self, snapshot: &[f32], queue_depth: usize, in_flight: usize) {
        for (pb, progress) in self.worker_bars.iter().zip(snapshot) {
            pb.set_position(progress.round() as u64);
        }
        self.status
            .set_message(format!("队列中任务: {}  进行中任务: {}", queue_depth, in_flight));
        self.status.tick();
    }

    pub fn finish(&self) {
        for pb in &self.worker_bars {
            pb.finish_and_clear();
        }
        self.status.finish_and_clear();
        let _ = self.multi.clear();
    }
}
