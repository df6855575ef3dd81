//! 実行中カウンタ（成功・失敗・処理済み）

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub success: usize,
    pub fail: usize,
    pub processed: usize,
}

/// オーケストレーターが所有し、ワーカーへ参照を渡す
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
    total: usize,
}

impl Metrics {
    pub fn new(total: usize) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// 1件完了を記録する。`report` はロック保持中に呼ばれる（進捗表示用）
    pub fn complete<F>(&self, success: bool, report: F) -> Counters
    where
        F: FnOnce(&Counters, usize),
    {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if success {
            counters.success += 1;
        } else {
            counters.fail += 1;
        }
        counters.processed += 1;
        report(&counters, self.total);
        *counters
    }

    pub fn snapshot(&self) -> Counters {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner) = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_complete_counts_once() {
        let metrics = Metrics::new(3);
        let mut seen = Vec::new();
        metrics.complete(true, |c, total| seen.push((c.processed, total)));
        metrics.complete(false, |c, total| seen.push((c.processed, total)));

        assert_eq!(seen, vec![(1, 3), (2, 3)]);
        assert_eq!(
            metrics.snapshot(),
            Counters {
                success: 1,
                fail: 1,
                processed: 2
            }
        );

        metrics.reset();
        assert_eq!(metrics.snapshot(), Counters::default());
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(Metrics::new(400));
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        metrics.complete((i + n) % 2 == 0, |_, _| {});
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }

        let c = metrics.snapshot();
        assert_eq!(c.processed, 400);
        assert_eq!(c.success + c.fail, 400);
    }
}
