//! オーケストレーター
//!
//! INIT → AWAITING_AUTH → RUNNING → DRAINING → DONE（セットアップ失敗時は FAILED）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::EnrichConfig;
use crate::error::ScraperError;
use crate::shutdown::Shutdown;
use crate::traits::{AuthGate, BlockDetector, BrowserSession, FieldExtractor, SessionLauncher};

use super::metrics::{Counters, Metrics};
use super::queue::TaskQueue;
use super::sink::ResultSink;
use super::store::RowStore;
use super::types::Field;
use super::worker::{Session, SessionWorker, WorkerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Init,
    AwaitingAuth,
    Running,
    Draining,
    Done,
    Failed,
}

/// 実行結果のまとめ
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub total: usize,
    pub counters: Counters,
    pub field_counts: Vec<(Field, usize)>,
    pub error_count: usize,
    pub error_path: Option<PathBuf>,
    pub started_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub interrupted: bool,
    pub abandoned_workers: usize,
}

pub struct Orchestrator<L: SessionLauncher, G: AuthGate> {
    config: EnrichConfig,
    launcher: L,
    gate: G,
    extractor: Arc<dyn FieldExtractor>,
    detector: Arc<dyn BlockDetector>,
    shutdown: Shutdown,
    state: RunState,
}

impl<L: SessionLauncher, G: AuthGate> Orchestrator<L, G> {
    pub fn new(
        config: EnrichConfig,
        launcher: L,
        gate: G,
        extractor: Arc<dyn FieldExtractor>,
        detector: Arc<dyn BlockDetector>,
    ) -> Self {
        Self {
            config,
            launcher,
            gate,
            extractor,
            detector,
            shutdown: Shutdown::new(),
            state: RunState::Init,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        info!("Orchestrator state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<RunReport, ScraperError> {
        let started_at = Local::now();
        let clock = tokio::time::Instant::now();
        self.state = RunState::Init;

        // INIT
        let store = match RowStore::load(&self.config.input_path) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to read input: {}", e);
                self.transition(RunState::Failed);
                return Err(e);
            }
        };
        let items = store.work_items(self.config.limit);
        let output_path = store.path().to_path_buf();

        let mut sessions = match self.open_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                self.transition(RunState::Failed);
                return Err(e);
            }
        };

        // AWAITING_AUTH
        self.transition(RunState::AwaitingAuth);
        if let Err(e) = self.await_auth(&mut sessions).await {
            close_sessions(sessions).await;
            self.transition(RunState::Failed);
            return Err(e);
        }

        // RUNNING
        self.transition(RunState::Running);
        let total = items.len();
        let queue = Arc::new(TaskQueue::new());
        let sink = Arc::new(ResultSink::new(store));
        let metrics = Arc::new(Metrics::new(total));
        metrics.reset();

        for item in items {
            queue.enqueue(item);
        }

        let workers = sessions.len();
        println!("Scraping {} books with {} logged-in browsers", total, workers);
        info!("Starting {} workers for {} items", workers, total);

        let ctx = WorkerContext {
            queue: queue.clone(),
            sink: sink.clone(),
            metrics: metrics.clone(),
            extractor: self.extractor.clone(),
            detector: self.detector.clone(),
            retry: self.config.retry.clone(),
            item_delay: self.config.item_delay,
            poll_interval: self.config.poll_interval,
            shutdown: self.shutdown.clone(),
        };

        let mut handles: JoinSet<Session<L::Session>> = JoinSet::new();
        for session in sessions {
            handles.spawn(SessionWorker::new(session, ctx.clone()).run());
        }

        // 全ワーカーが先に終了した場合もキュー待ちを抜ける
        let mut finished = Vec::with_capacity(workers);
        let interrupted = loop {
            tokio::select! {
                _ = queue.join() => break false,
                _ = self.shutdown.wait() => break true,
                joined = handles.join_next() => match joined {
                    Some(joined) => {
                        warn!("A worker exited while items were still queued");
                        collect_worker(joined, &mut finished);
                    }
                    None => {
                        error!(
                            "All workers exited with {} items unfinished",
                            queue.unfinished()
                        );
                        break false;
                    }
                },
            }
        };
        if interrupted {
            warn!(
                "Interrupted with {} items still pending",
                queue.unfinished()
            );
        }

        // DRAINING
        self.transition(RunState::Draining);
        for _ in 0..handles.len() {
            queue.push_stop();
        }
        let abandoned = drain_workers(handles, &mut finished, self.config.grace_period).await;

        // DONE
        let counters = metrics.snapshot();
        let field_counts = sink.field_counts();
        let error_path = self.config.error_path();
        let error_count = match sink.flush_errors(&error_path) {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to save error records to {}: {}", error_path.display(), e);
                sink.error_count()
            }
        };
        close_sessions(finished).await;
        self.transition(RunState::Done);

        Ok(RunReport {
            output_path,
            total,
            counters,
            field_counts,
            error_count,
            error_path: (error_count > 0).then_some(error_path),
            started_at,
            elapsed_secs: clock.elapsed().as_secs_f64(),
            interrupted,
            abandoned_workers: abandoned,
        })
    }

    /// 1つでも起動に失敗したら、起動済みのものを閉じて中止
    async fn open_sessions(&self) -> Result<Vec<Session<L::Session>>, ScraperError> {
        let mut sessions = Vec::with_capacity(self.config.browsers);
        for id in 1..=self.config.browsers {
            match self.launcher.launch(id).await {
                Ok(browser) => {
                    info!("Browser #{} initialized", id);
                    sessions.push(Session::new(id, browser));
                }
                Err(e) => {
                    error!("Failed to initialize browser #{}: {}", id, e);
                    close_sessions(sessions).await;
                    return Err(e);
                }
            }
        }
        Ok(sessions)
    }

    async fn await_auth(
        &mut self,
        sessions: &mut [Session<L::Session>],
    ) -> Result<(), ScraperError> {
        let ids: Vec<usize> = sessions.iter().map(Session::id).collect();
        tokio::select! {
            ready = self.gate.wait_ready(&ids) => ready?,
            _ = self.shutdown.wait() => return Err(ScraperError::Interrupted),
        }

        for session in sessions.iter_mut() {
            session.mark_authenticated().await?;
        }
        info!("Operator confirmed login for all {} browsers", ids.len());
        Ok(())
    }
}

fn collect_worker<B: BrowserSession>(
    joined: Result<Session<B>, tokio::task::JoinError>,
    finished: &mut Vec<Session<B>>,
) {
    match joined {
        Ok(session) => {
            info!("Worker (browser #{}) stopped", session.id());
            finished.push(session);
        }
        Err(e) => error!("Worker panicked: {}", e),
    }
}

/// 猶予時間内に終わらないワーカーは放置する（強制終了はしない）。放置数を返す
async fn drain_workers<B: BrowserSession + 'static>(
    mut handles: JoinSet<Session<B>>,
    finished: &mut Vec<Session<B>>,
    grace: Duration,
) -> usize {
    let drained = timeout(grace, async {
        while let Some(joined) = handles.join_next().await {
            collect_worker(joined, finished);
        }
    })
    .await;

    if drained.is_ok() {
        return 0;
    }
    let abandoned = handles.len();
    warn!(
        "{} workers did not stop within {:?}, abandoning",
        abandoned, grace
    );
    handles.detach_all();
    abandoned
}

async fn close_sessions<B: BrowserSession>(sessions: Vec<Session<B>>) {
    for session in sessions {
        let id = session.id();
        match session.close().await {
            Ok(()) => info!("Browser #{} closed", id),
            Err(e) => error!("Failed to close browser #{}: {}", id, e),
        }
    }
}
