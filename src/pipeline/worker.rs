//! セッションワーカー
//!
//! 1ワーカー = 1ブラウザセッション。キューから取り出し → 取得・抽出 → 保存 → 完了通知。

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::FutureExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{Jitter, RetryPolicy};
use crate::error::ScraperError;
use crate::shutdown::Shutdown;
use crate::traits::{BlockDetector, BrowserSession, FieldExtractor};

use super::metrics::Metrics;
use super::queue::{Dequeued, TaskQueue};
use super::sink::{ErrorRecord, ResultSink};
use super::types::{BookFields, ExtractionResult, PageSnapshot, WorkItem};

/// 進捗行に出すエラー文の最大文字数
const ERROR_PREVIEW_CHARS: usize = 30;

/// ワーカー1つが専有するブラウザセッション
pub struct Session<B> {
    id: usize,
    browser: B,
    authenticated: bool,
}

impl<B: BrowserSession> Session<B> {
    pub fn new(id: usize, browser: B) -> Self {
        Self {
            id,
            browser,
            authenticated: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// 手動ログイン確認後に呼ぶ
    pub async fn mark_authenticated(&mut self) -> Result<(), ScraperError> {
        self.browser.on_authenticated().await?;
        self.authenticated = true;
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), ScraperError> {
        self.browser.close().await
    }
}

/// 全ワーカーで共有するハンドル
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub sink: Arc<ResultSink>,
    pub metrics: Arc<Metrics>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub detector: Arc<dyn BlockDetector>,
    pub retry: RetryPolicy,
    pub item_delay: Jitter,
    pub poll_interval: Duration,
    pub shutdown: Shutdown,
}

pub struct SessionWorker<B> {
    session: Session<B>,
    ctx: WorkerContext,
}

impl<B: BrowserSession> SessionWorker<B> {
    pub fn new(session: Session<B>, ctx: WorkerContext) -> Self {
        Self { session, ctx }
    }

    /// 停止シグナルを受け取るまでループし、セッションを返す
    pub async fn run(mut self) -> Session<B> {
        let id = self.session.id;
        info!("Worker (browser #{}) started", id);
        if !self.session.is_authenticated() {
            warn!("Browser #{} started without login confirmation", id);
        }

        loop {
            if self.ctx.shutdown.is_shutdown() {
                info!("Worker (browser #{}) stopping on shutdown", id);
                break;
            }

            match self.ctx.queue.dequeue(self.ctx.poll_interval).await {
                Dequeued::TimedOut => continue,
                Dequeued::Stop => {
                    info!("Worker (browser #{}) received stop signal", id);
                    break;
                }
                Dequeued::Item(item) => {
                    let _done = DoneGuard {
                        queue: self.ctx.queue.clone(),
                        item: item.clone(),
                    };
                    self.handle(&item).await;
                }
            }
        }

        info!("Worker (browser #{}) finished", id);
        self.session
    }

    /// 1件の処理。panic しても失敗1件として記録し、ループは継続する
    async fn handle(&mut self, item: &WorkItem) {
        let id = self.session.id;
        let result = match AssertUnwindSafe(self.process(item)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Browser #{} panicked on {}: {}", id, item.url(), message);
                ExtractionResult::failed(item.row_index, format!("worker panicked: {}", message))
            }
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.record(item, &result))) {
            error!(
                "Browser #{} panicked while recording row {}: {}",
                id,
                item.row_index,
                panic_message(payload.as_ref())
            );
        }

        let delay = self.ctx.item_delay.sample();
        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.ctx.shutdown.wait() => {}
        }
    }

    /// 保存 → エラー台帳 → カウンタ・進捗表示
    fn record(&self, item: &WorkItem, result: &ExtractionResult) {
        if let Err(e) = self.ctx.sink.persist(result) {
            error!(
                "Failed to persist row {} ({}): {}",
                item.row_index,
                item.url(),
                e
            );
        }

        if let Some(record) = ErrorRecord::for_result(item, result) {
            self.ctx.sink.record_error(record);
        }

        self.report(item, result);
    }

    /// 取得〜抽出。失敗はすべて ExtractionResult に変換する
    pub async fn process(&mut self, item: &WorkItem) -> ExtractionResult {
        let url = item.url();
        if url.is_empty() {
            return ExtractionResult::failed(item.row_index, "url is empty");
        }

        let outcome = match fetch_with_retry(
            &mut self.session.browser,
            self.ctx.detector.as_ref(),
            &self.ctx.retry,
            self.session.id,
            url,
        )
        .await
        {
            Ok(page) => extract_guarded(self.ctx.extractor.as_ref(), &page),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(fields) => ExtractionResult::from_fields(item.row_index, fields),
            Err(e) => {
                error!("Browser #{} failed to scrape {}: {}", self.session.id, url, e);
                ExtractionResult::failed(item.row_index, e.to_string())
            }
        }
    }

    fn report(&self, item: &WorkItem, result: &ExtractionResult) {
        let id = self.session.id;
        self.ctx.metrics.complete(result.success, |counters, total| {
            if result.success {
                println!(
                    "[browser #{}] [{}/{}] ✓ {}: {}",
                    id,
                    counters.processed,
                    total,
                    item.title(),
                    result.fields.summary()
                );
            } else {
                let detail = result
                    .error
                    .as_deref()
                    .map(|e| {
                        let preview: String = e.chars().take(ERROR_PREVIEW_CHARS).collect();
                        format!(" ({}...)", preview)
                    })
                    .unwrap_or_default();
                println!(
                    "[browser #{}] [{}/{}] ✗ {}{}",
                    id,
                    counters.processed,
                    total,
                    item.title(),
                    detail
                );
            }
        });
    }
}

/// ブロック検出時はバックオフ → トップページでリセット → 再取得。
/// `max_retries` を超えたら Blocked エラー
pub async fn fetch_with_retry<B: BrowserSession + ?Sized>(
    browser: &mut B,
    detector: &dyn BlockDetector,
    policy: &RetryPolicy,
    session_id: usize,
    url: &str,
) -> Result<PageSnapshot, ScraperError> {
    let mut attempt: u32 = 0;
    loop {
        let page = browser.load(url).await?;
        if !detector.is_blocked(&page) {
            return Ok(page);
        }

        warn!("Browser #{} detected a soft block on {}", session_id, url);
        if policy.debug_screenshots {
            if let Some(png) = browser.screenshot().await {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                debug!("Blocked page screenshot: data:image/png;base64,{}", encoded);
            }
        }

        if attempt >= policy.max_retries {
            error!(
                "Browser #{} gave up on {} after {} attempts",
                session_id,
                url,
                attempt + 1
            );
            return Err(ScraperError::Blocked {
                url: url.to_string(),
                attempts: attempt + 1,
            });
        }

        let wait = policy.backoff_for(attempt);
        info!(
            "Browser #{} waiting {:.1}s before retry ({}/{})",
            session_id,
            wait.as_secs_f64(),
            attempt + 1,
            policy.max_retries
        );
        sleep(wait).await;

        browser.reset().await?;
        sleep(policy.reset_wait.sample()).await;
        attempt += 1;
    }
}

/// 処理中の panic でも mark_done を必ず呼ぶ
struct DoneGuard {
    queue: Arc<TaskQueue>,
    item: WorkItem,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.queue.mark_done(&self.item);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// 抽出中の panic も1件の失敗として扱う
fn extract_guarded(
    extractor: &dyn FieldExtractor,
    page: &PageSnapshot,
) -> Result<BookFields, ScraperError> {
    catch_unwind(AssertUnwindSafe(|| extractor.extract(page))).unwrap_or_else(|payload| {
        Err(ScraperError::Extraction(format!(
            "extractor panicked on {}: {}",
            page.url,
            panic_message(payload.as_ref())
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Field;
    use async_trait::async_trait;
    use tokio::time::Instant;

    /// 先頭 `blocked` 回はブロックページを返すスタブ
    struct FlakyBrowser {
        blocked: usize,
        loads: usize,
        resets: usize,
    }

    #[async_trait]
    impl BrowserSession for FlakyBrowser {
        async fn load(&mut self, url: &str) -> Result<PageSnapshot, ScraperError> {
            self.loads += 1;
            let html = if self.loads <= self.blocked { "BLOCKED" } else { "ok" };
            Ok(PageSnapshot::new(url, html))
        }

        async fn reset(&mut self) -> Result<(), ScraperError> {
            self.resets += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            Ok(())
        }
    }

    struct Marker;

    impl BlockDetector for Marker {
        fn is_blocked(&self, page: &PageSnapshot) -> bool {
            page.html.contains("BLOCKED")
        }
    }

    struct Panicky;

    impl FieldExtractor for Panicky {
        fn extract(&self, _page: &PageSnapshot) -> Result<BookFields, ScraperError> {
            panic!("selector exploded")
        }
    }

    struct Fixed;

    impl FieldExtractor for Fixed {
        fn extract(&self, _page: &PageSnapshot) -> Result<BookFields, ScraperError> {
            Ok(BookFields::new().with(Field::Isbn, "9789860000000"))
        }
    }

    fn fixed_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff: Jitter::secs(5, 5),
            reset_wait: Jitter::secs(1, 1),
            debug_screenshots: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_within_limit() {
        let mut browser = FlakyBrowser {
            blocked: 2,
            loads: 0,
            resets: 0,
        };
        let start = Instant::now();
        let page = fetch_with_retry(&mut browser, &Marker, &fixed_policy(), 1, "https://x")
            .await
            .expect("third attempt succeeds");

        assert_eq!(page.html, "ok");
        assert_eq!(browser.loads, 3);
        assert_eq!(browser.resets, 2);
        // 5s*1 + 1s + 5s*2 + 1s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(17) && elapsed < Duration::from_secs(18));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let mut browser = FlakyBrowser {
            blocked: usize::MAX,
            loads: 0,
            resets: 0,
        };
        let err = fetch_with_retry(&mut browser, &Marker, &fixed_policy(), 1, "https://x")
            .await
            .expect_err("always blocked");

        assert!(matches!(err, ScraperError::Blocked { attempts: 3, .. }));
        assert_eq!(browser.loads, 3);
        assert_eq!(browser.resets, 2);
    }

    struct CrashingBrowser;

    #[async_trait]
    impl BrowserSession for CrashingBrowser {
        async fn load(&mut self, url: &str) -> Result<PageSnapshot, ScraperError> {
            if url.ends_with("/crash") {
                panic!("tab crashed");
            }
            Ok(PageSnapshot::new(url, "ok"))
        }

        async fn reset(&mut self) -> Result<(), ScraperError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_survives_browser_panic() {
        use crate::pipeline::RowStore;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("books.csv");
        std::fs::write(&path, "url\nhttps://x/crash\nhttps://x/ok\n").expect("fixture");
        let store = RowStore::load(&path).expect("load");
        let items = store.work_items(None);

        let queue = Arc::new(TaskQueue::new());
        let sink = Arc::new(ResultSink::new(store));
        let metrics = Arc::new(Metrics::new(items.len()));
        for item in items {
            queue.enqueue(item);
        }
        queue.push_stop();

        let ctx = WorkerContext {
            queue: queue.clone(),
            sink: sink.clone(),
            metrics: metrics.clone(),
            extractor: Arc::new(Fixed),
            detector: Arc::new(Marker),
            retry: fixed_policy(),
            item_delay: Jitter::none(),
            poll_interval: Duration::from_secs(1),
            shutdown: Shutdown::new(),
        };
        let session = Session::new(1, CrashingBrowser);
        SessionWorker::new(session, ctx).run().await;

        assert_eq!(queue.unfinished(), 0);
        let counters = metrics.snapshot();
        assert_eq!((counters.success, counters.fail), (1, 1));
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row_index, 0);
        assert!(errors[0].error_reason.contains("tab crashed"));
    }

    #[test]
    fn test_extract_guarded_catches_panic() {
        let page = PageSnapshot::new("https://x", "");
        assert!(matches!(
            extract_guarded(&Panicky, &page),
            Err(ScraperError::Extraction(_))
        ));
        assert!(extract_guarded(&Fixed, &page).is_ok());
    }
}
