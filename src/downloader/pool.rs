use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::counter::{TaskCounter, TaskCredit};
use super::error::DownloadError;

pub type JobResult = Result<(), DownloadError>;

/// 任务结束回调, 在任务体结束之后、计数减一之前调用
pub type Completion = Box<dyn FnOnce(&JobResult) + Send + 'static>;

/// 线程池执行任务的入口, 由使用方实现
#[async_trait]
pub trait JobExecutor<J: Send + 'static>: Send + Sync + 'static {
    async fn execute(&self, job: J, ctx: &WorkerContext<J>) -> JobResult;
}

/// 任务执行时的上下文: 当前工作线程编号, 以及向同一线程池提交子任务的句柄
pub struct WorkerContext<J: Send + 'static> {
    index: usize,
    pool: PoolHandle<J>,
}

impl<J: Send + 'static> WorkerContext<J> {
    pub fn worker_index(&self) -> usize {
        self.index
    }

    /// 提交子任务; 子任务的计数在父任务减一之前就已加上
    pub fn submit(&self, job: J) -> Result<u64, DownloadError> {
        self.pool.submit(job)
    }

    pub fn pool(&self) -> &PoolHandle<J> {
        &self.pool
    }
}

struct QueuedJob<J> {
    id: u64,
    job: J,
    on_complete: Option<Completion>,
    credit: TaskCredit,
}

impl<J> QueuedJob<J> {
    // 先回调, 再释放计数凭证
    fn complete(on_complete: Option<Completion>, credit: TaskCredit, result: &JobResult) {
        if let Some(cb) = on_complete {
            if std::panic::catch_unwind(AssertUnwindSafe(|| cb(result))).is_err() {
                error!("任务结束回调发生 panic");
            }
        }
        drop(credit);
    }
}

struct QueueState<J> {
    jobs: VecDeque<QueuedJob<J>>,
    closed: bool,
}

struct PoolShared<J> {
    state: Mutex<QueueState<J>>,
    available: Notify,
    shutdown: CancellationToken,
    counter: Arc<TaskCounter>,
    next_id: AtomicU64,
}

impl<J> PoolShared<J> {
    fn lock_state(&self) -> MutexGuard<'_, QueueState<J>> {
        // 锁内不会调用外部代码, 中毒时数据仍然一致
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn next_job(&self) -> Option<QueuedJob<J>> {
        loop {
            // 先登记等待再检查队列, 避免错过两者之间的唤醒
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock_state();
                if state.closed {
                    return None;
                }
                if let Some(job) = state.jobs.pop_front() {
                    return Some(job);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }
}

/// 线程池的共享句柄, 可克隆后在任意任务中提交
pub struct PoolHandle<J> {
    shared: Arc<PoolShared<J>>,
}

impl<J> Clone for PoolHandle<J> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J: Send + 'static> PoolHandle<J> {
    pub fn submit(&self, job: J) -> Result<u64, DownloadError> {
        self.submit_with(job, None)
    }

    /// 提交任务并附带结束回调, 回调无论成功失败都只调用一次
    pub fn submit_with(&self, job: J, on_complete: Option<Completion>) -> Result<u64, DownloadError> {
        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(DownloadError::PoolClosed);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        // 入队与加一在同一把锁内完成, cancel_all 之后不会再有任务混进来
        let credit = self.shared.counter.acquire();
        state.jobs.push_back(QueuedJob {
            id,
            job,
            on_complete,
            credit,
        });
        drop(state);

        self.shared.available.notify_one();
        Ok(id)
    }

    /// 已提交但尚未开始执行的任务数
    pub fn queue_depth(&self) -> usize {
        self.shared.lock_state().jobs.len()
    }

    /// 排队中与执行中的任务总数
    pub fn in_flight(&self) -> usize {
        self.shared.counter.count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_state().closed
    }

    /// 停止接收新任务并丢弃排队中的任务, 执行中的任务继续跑完。
    /// 被丢弃任务的回调以 `Cancelled` 调用。返回丢弃的任务数。
    pub fn cancel_all(&self) -> usize {
        let discarded: Vec<QueuedJob<J>> = {
            let mut state = self.shared.lock_state();
            state.closed = true;
            state.jobs.drain(..).collect()
        };
        self.shared.shutdown.cancel();

        let count = discarded.len();
        if count > 0 {
            warn!("已丢弃 {} 个未开始的任务", count);
        }
        for queued in discarded {
            QueuedJob::<J>::complete(queued.on_complete, queued.credit, &Err(DownloadError::Cancelled));
        }
        count
    }

    /// 等待所有已提交任务(包括链式提交的子任务)结束
    pub async fn wait(&self) {
        self.shared.counter.wait().await;
    }
}

/// 固定数量工作线程、共享一个 FIFO 队列的线程池
pub struct WorkerPool<J: Send + 'static> {
    handle: PoolHandle<J>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// 需在 tokio 运行时内调用
    pub fn new(worker_count: usize, executor: Arc<dyn JobExecutor<J>>) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
            shutdown: CancellationToken::new(),
            counter: Arc::new(TaskCounter::new()),
            next_id: AtomicU64::new(0),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                let executor = Arc::clone(&executor);
                tokio::spawn(run_worker(index, shared, executor))
            })
            .collect();

        Self {
            handle: PoolHandle { shared },
            workers: Mutex::new(workers),
            worker_count,
        }
    }

    pub fn handle(&self) -> PoolHandle<J> {
        self.handle.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn submit(&self, job: J) -> Result<u64, DownloadError> {
        self.handle.submit(job)
    }

    pub fn submit_with(&self, job: J, on_complete: Option<Completion>) -> Result<u64, DownloadError> {
        self.handle.submit_with(job, on_complete)
    }

    pub fn queue_depth(&self) -> usize {
        self.handle.queue_depth()
    }

    pub fn in_flight(&self) -> usize {
        self.handle.in_flight()
    }

    pub fn cancel_all(&self) -> usize {
        self.handle.cancel_all()
    }

    pub async fn wait(&self) {
        self.handle.wait().await;
    }

    /// 关闭线程池并等待所有工作线程退出
    pub async fn shutdown(&self) {
        self.cancel_all();
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for worker in workers {
            if let Err(e) = worker.await {
                error!("工作线程异常退出: {}", e);
            }
        }
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        self.handle.cancel_all();
    }
}

async fn run_worker<J: Send + 'static>(
    index: usize,
    shared: Arc<PoolShared<J>>,
    executor: Arc<dyn JobExecutor<J>>,
) {
    debug!(worker = index, "工作线程启动");
    let ctx = WorkerContext {
        index,
        pool: PoolHandle {
            shared: Arc::clone(&shared),
        },
    };

    while let Some(queued) = shared.next_job().await {
        let QueuedJob {
            id,
            job,
            on_complete,
            credit,
        } = queued;
        debug!(worker = index, job_id = id, "开始执行任务");

        let result = match AssertUnwindSafe(executor.execute(job, &ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DownloadError::JobPanicked),
        };

        if let Err(e) = &result {
            error!(worker = index, job_id = id, "❌ 任务失败: {}", e);
        }
        QueuedJob::<J>::complete(on_complete, credit, &result);
    }

    debug!(worker = index, "工作线程退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    enum TestJob {
        Sleep(u64),
        Fail,
        Panic,
        // 结束前再提交 n 个子任务
        Spawn(usize),
        RecordWorker(Arc<Mutex<HashSet<usize>>>),
    }

    struct TestExecutor {
        executed: AtomicUsize,
    }

    #[async_trait]
    impl JobExecutor<TestJob> for TestExecutor {
        async fn execute(&self, job: TestJob, ctx: &WorkerContext<TestJob>) -> JobResult {
            self.executed.fetch_add(1, Ordering::SeqCst);
            match job {
                TestJob::Sleep(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                }
                TestJob::Fail => Err(DownloadError::Transport("boom".to_string())),
                TestJob::Panic => panic!("job panicked"),
                TestJob::Spawn(n) => {
                    for i in 0..n {
                        ctx.submit(TestJob::Sleep(5 + i as u64))?;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(())
                }
                TestJob::RecordWorker(seen) => {
                    seen.lock().unwrap().insert(ctx.worker_index());
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            }
        }
    }

    fn pool(workers: usize) -> (WorkerPool<TestJob>, Arc<TestExecutor>) {
        let executor = Arc::new(TestExecutor {
            executed: AtomicUsize::new(0),
        });
        (WorkerPool::new(workers, executor.clone()), executor)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn wait_runs_every_completion_callback() {
        use rand::Rng;

        let (pool, executor) = pool(4);
        let completed = Arc::new(AtomicUsize::new(0));
        let delays: Vec<u64> = {
            let mut rng = rand::rng();
            (0..50).map(|_| rng.random_range(0..15)).collect()
        };

        for delay in delays {
            let completed = completed.clone();
            pool.submit_with(
                TestJob::Sleep(delay),
                Some(Box::new(move |_| {
                    completed.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        }

        pool.wait().await;
        assert_eq!(completed.load(Ordering::SeqCst), 50);
        assert_eq!(executor.executed.load(Ordering::SeqCst), 50);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn chained_jobs_keep_wait_blocked() {
        let (pool, executor) = pool(2);
        pool.submit(TestJob::Spawn(5)).unwrap();
        pool.wait().await;
        assert_eq!(executor.executed.load(Ordering::SeqCst), 6);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn callback_may_submit_more_work() {
        let (pool, executor) = pool(1);
        let handle = pool.handle();
        pool.submit_with(
            TestJob::Sleep(1),
            Some(Box::new(move |result| {
                assert!(result.is_ok());
                handle.submit(TestJob::Sleep(10)).unwrap();
            })),
        )
        .unwrap();
        pool.wait().await;
        assert_eq!(executor.executed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_and_panics_still_release_credit() {
        let (pool, _executor) = pool(2);
        let errors = Arc::new(AtomicUsize::new(0));
        for job in [TestJob::Fail, TestJob::Panic, TestJob::Sleep(1)] {
            let errors = errors.clone();
            pool.submit_with(
                job,
                Some(Box::new(move |result| {
                    if result.is_err() {
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                })),
            )
            .unwrap();
        }
        pool.wait().await;
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_all_discards_queue_and_closes() {
        let (pool, executor) = pool(1);
        let cancelled = Arc::new(AtomicUsize::new(0));
        pool.submit(TestJob::Sleep(50)).unwrap();
        for _ in 0..10 {
            let cancelled = cancelled.clone();
            pool.submit_with(
                TestJob::Sleep(1),
                Some(Box::new(move |result| {
                    if matches!(result, Err(DownloadError::Cancelled)) {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                })),
            )
            .unwrap();
        }

        // 等第一个任务开始执行
        tokio::time::sleep(Duration::from_millis(10)).await;
        let discarded = pool.cancel_all();

        assert_eq!(pool.queue_depth(), 0);
        assert!(matches!(pool.submit(TestJob::Sleep(1)), Err(DownloadError::PoolClosed)));
        pool.wait().await;
        assert_eq!(discarded, cancelled.load(Ordering::SeqCst));
        assert!(executor.executed.load(Ordering::SeqCst) <= 11 - discarded);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_index_is_within_bounds() {
        let (pool, _executor) = pool(3);
        let seen = Arc::new(Mutex::new(HashSet::new()));
        for _ in 0..12 {
            pool.submit(TestJob::RecordWorker(seen.clone())).unwrap();
        }
        pool.wait().await;
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|i| *i < 3));
    }
}
