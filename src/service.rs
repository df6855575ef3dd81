use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::auth::ConsoleAuthGate;
use crate::bookscom::{BookscomExtractor, ChromeLauncher, ChromeOptions, MarkerBlockDetector};
use crate::config::{EnrichConfig, RetryPolicy, DEFAULT_BROWSERS};
use crate::error::ScraperError;
use crate::pipeline::{Orchestrator, RunReport};
use crate::shutdown::Shutdown;

/// 一括補完リクエスト
#[derive(Debug, Clone)]
pub struct EnrichRequest {
    pub input_path: PathBuf,
    pub browsers: usize,
    pub limit: Option<usize>,
    pub chrome: ChromeOptions,
    pub debug: bool,
}

impl EnrichRequest {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            browsers: DEFAULT_BROWSERS,
            limit: None,
            chrome: ChromeOptions::default(),
            debug: false,
        }
    }

    pub fn with_browsers(mut self, browsers: usize) -> Self {
        self.browsers = browsers;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_chrome(mut self, chrome: ChromeOptions) -> Self {
        self.chrome = chrome;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl From<EnrichRequest> for EnrichConfig {
    fn from(req: EnrichRequest) -> Self {
        EnrichConfig::new(req.input_path)
            .with_browsers(req.browsers)
            .with_limit(req.limit)
            .with_retry(RetryPolicy {
                debug_screenshots: req.debug,
                ..Default::default()
            })
    }
}

/// tower::Serviceを実装した一括補完サービス
#[derive(Debug, Clone, Default)]
pub struct EnrichService {
    shutdown: Shutdown,
}

impl EnrichService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ctrl-C などの停止ハンドルを共有する
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
}

impl Service<EnrichRequest> for EnrichService {
    type Response = RunReport;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EnrichRequest) -> Self::Future {
        info!(
            "一括補完リクエスト受信: input={:?}, browsers={}",
            req.input_path, req.browsers
        );
        let shutdown = self.shutdown.clone();

        Box::pin(async move {
            let chrome = req.chrome.clone().with_debug(req.debug);
            let config: EnrichConfig = req.into();

            let mut orchestrator = Orchestrator::new(
                config,
                ChromeLauncher::new(chrome),
                ConsoleAuthGate::new(),
                Arc::new(BookscomExtractor::new()),
                Arc::new(MarkerBlockDetector::new()),
            )
            .with_shutdown(shutdown);

            let report = orchestrator.run().await?;

            info!(
                "一括補完完了: success={}, fail={}, errors={}",
                report.counters.success, report.counters.fail, report.error_count
            );

            Ok(report)
        })
    }
}
