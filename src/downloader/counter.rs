use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// 在途任务计数器
///
/// 提交时加一, 任务(无论成功失败)结束时减一。计数值放在 `watch` 通道里,
/// `wait` 先检查当前值再挂起, 不会错过两者之间发生的减一。
#[derive(Debug)]
pub struct TaskCounter {
    tx: watch::Sender<usize>,
}

impl TaskCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn increment(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    pub fn decrement(&self) {
        self.tx.send_modify(|n| {
            if *n == 0 {
                // 没有配对的 increment, 属于调用方错误
                warn!("任务计数器在 0 时被减一, 忽略");
                return;
            }
            *n -= 1;
        });
    }

    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn is_drained(&self) -> bool {
        self.count() == 0
    }

    /// 阻塞直到计数归零, 没有超时; 需要中断时调用方应先 `stop()`
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由 self 持有, 这里不会收到通道关闭
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// 加一并返回一个凭证, 凭证被丢弃时自动减一
    pub fn acquire(self: &Arc<Self>) -> TaskCredit {
        self.increment();
        TaskCredit {
            counter: Arc::clone(self),
        }
    }
}

impl Default for TaskCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 一个在途任务的计数凭证
///
/// 无论任务正常结束、出错、panic 还是在队列中被丢弃, 凭证都只会释放一次。
#[derive(Debug)]
pub struct TaskCredit {
    counter: Arc<TaskCounter>,
}

impl Drop for TaskCredit {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
