use std::sync::atomic::{AtomicU32, Ordering};

/// 每个工作线程一个进度槽 (0..=100)
///
/// 槽按工作线程编号划分, 只有当前占有该编号的工作线程会写入,
/// 其他线程只读快照。f32 以位模式存进 `AtomicU32`, 读写都不需要锁。
#[derive(Debug)]
pub struct ProgressTable {
    slots: Vec<AtomicU32>,
}

impl ProgressTable {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers).map(|_| AtomicU32::new(0f32.to_bits())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, worker: usize) -> ProgressSlot<'_> {
        ProgressSlot {
            cell: &self.slots[worker],
        }
    }

    pub fn get(&self, worker: usize) -> f32 {
        f32::from_bits(self.slots[worker].load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.slots
            .iter()
            .map(|s| f32::from_bits(s.load(Ordering::Acquire)))
            .collect()
    }
}

/// 单个工作线程的进度句柄
#[derive(Debug, Clone, Copy)]
pub struct ProgressSlot<'a> {
    cell: &'a AtomicU32,
}

impl ProgressSlot<'_> {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.cell.load(Ordering::Acquire))
    }

    pub fn set(&self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        self.cell.store(percent.to_bits(), Ordering::Release);
    }

    pub fn reset(&self) {
        self.set(0.0);
    }

    pub fn finish(&self) {
        self.set(100.0);
    }

    /// 增加进度, 上限 100
    pub fn advance(&self, delta: f32) {
        // 只有持有者写入, 读-改-写无需 CAS
        self.set(self.get() + delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_independent() {
        let table = ProgressTable::new(3);
        table.slot(1).set(42.0);
        assert_eq!(table.snapshot(), vec![0.0, 42.0, 0.0]);
        table.slot(1).reset();
        assert_eq!(table.get(1), 0.0);
    }

    #[test]
    fn advance_is_clamped() {
        let table = ProgressTable::new(1);
        let slot = table.slot(0);
        slot.advance(60.0);
        slot.advance(60.0);
        assert_eq!(slot.get(), 100.0);
        slot.set(-5.0);
        assert_eq!(slot.get(), 0.0);
    }
}
