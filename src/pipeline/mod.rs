//! 複数ブラウザ並列処理のパイプライン
//!
//! タスクキュー・セッションワーカー・結果シンク・オーケストレーター

mod metrics;
mod orchestrator;
mod queue;
mod sink;
mod store;
mod types;
mod worker;

pub use metrics::{Counters, Metrics};
pub use orchestrator::{Orchestrator, RunReport, RunState};
pub use queue::{Dequeued, TaskQueue};
pub use sink::{ErrorRecord, ResultSink};
pub use store::RowStore;
pub use types::{
    is_blank, BookFields, ExtractionResult, Field, PageSnapshot, WorkItem, NOT_FOUND,
};
pub use worker::{fetch_with_retry, Session, SessionWorker, WorkerContext};
