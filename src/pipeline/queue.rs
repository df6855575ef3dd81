//! タスクキュー
//!
//! 複数ワーカーから取り出せるFIFO。各アイテムはちょうど1つのワーカーに渡る。
//! `join()` は全アイテムが `mark_done()` されるまで待機する。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::warn;

use super::types::WorkItem;

/// `dequeue` の結果
#[derive(Debug)]
pub enum Dequeued {
    Item(WorkItem),
    /// 停止シグナル
    Stop,
    /// タイムアウト（ポーリング外れ）
    TimedOut,
}

enum Entry {
    Work(WorkItem),
    Stop,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    unfinished: usize,
}

#[derive(Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
    drained: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, item: WorkItem) {
        {
            let mut state = self.lock();
            state.entries.push_back(Entry::Work(item));
            state.unfinished += 1;
        }
        self.available.notify_one();
    }

    /// 停止シグナルを1つ積む（未完了数には数えない）
    pub fn push_stop(&self) {
        self.lock().entries.push_back(Entry::Stop);
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    /// 最大 `wait` だけ待って次の要素を取り出す
    pub async fn dequeue(&self, wait: Duration) -> Dequeued {
        let deadline = Instant::now() + wait;
        loop {
            let entry = self.lock().entries.pop_front();
            match entry {
                Some(Entry::Work(item)) => return Dequeued::Item(item),
                Some(Entry::Stop) => return Dequeued::Stop,
                None => {}
            }

            if timeout_at(deadline, self.available.notified()).await.is_err() {
                return Dequeued::TimedOut;
            }
        }
    }

    pub fn mark_done(&self, item: &WorkItem) {
        let drained = {
            let mut state = self.lock();
            if state.unfinished == 0 {
                warn!("mark_done called more times than enqueued (row {})", item.row_index);
                return;
            }
            state.unfinished -= 1;
            state.unfinished == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// 積まれた全アイテムが完了するまで待機
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }
}
