//! Chrome セッション（chromiumoxide）
//!
//! 手動ログインのため、セッションごとに独立したプロファイルとウィンドウを持つ。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Jitter;
use crate::error::ScraperError;
use crate::pipeline::PageSnapshot;
use crate::traits::{BrowserSession, SessionLauncher};

pub const BOOKSCOM_ROOT_URL: &str = "https://www.books.com.tw/";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// ウィンドウが重ならないように並べる
const WINDOW_POSITIONS: [(u32, u32); 5] = [(0, 0), (800, 0), (0, 500), (800, 500), (400, 250)];

/// navigator.webdriver などの自動化痕跡を隠す
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['zh-TW', 'zh', 'en-US', 'en'] });
    window.chrome = { runtime: {} };
"#;

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub chrome_path: Option<PathBuf>,
    pub root_url: String,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub user_agent: String,
    /// ページ遷移後の待機
    pub page_settle: Jitter,
    pub request_timeout: Duration,
    pub debug: bool,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            root_url: BOOKSCOM_ROOT_URL.to_string(),
            headless: false,
            window_size: (1280, 800),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_settle: Jitter::secs(3, 5),
            request_timeout: Duration::from_secs(60),
            debug: false,
        }
    }
}

impl ChromeOptions {
    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// 明示指定 → CHROME_PATH → CHROMIUM_PATH の順
    fn resolve_chrome_path(&self) -> Option<PathBuf> {
        self.chrome_path.clone().or_else(|| {
            std::env::var("CHROME_PATH")
                .or_else(|_| std::env::var("CHROMIUM_PATH"))
                .ok()
                .map(PathBuf::from)
        })
    }
}

/// セッションごとにChromeを1プロセス起動する
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self, session_id: usize) -> Result<BrowserConfig, ScraperError> {
        let unique_id = format!(
            "{}-{}-{}",
            std::process::id(),
            session_id,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("bookscom-{}", unique_id));

        let (width, height) = self.options.window_size;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(width, height)
            .request_timeout(self.options.request_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", self.options.user_agent));

        if let Some(path) = self.options.resolve_chrome_path() {
            builder = builder.chrome_executable(path);
        }

        if self.options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some((x, y)) = WINDOW_POSITIONS.get(session_id.saturating_sub(1)) {
            builder = builder.arg(format!("--window-position={},{}", x, y));
        }

        if self.options.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self, session_id: usize) -> Result<ChromeSession, ScraperError> {
        info!("Launching browser #{}...", session_id);
        let config = self.browser_config(session_id)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {:?}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("初期スクリプト設定エラー: {}", e)))?;

        let mut session = ChromeSession {
            id: session_id,
            options: self.options.clone(),
            browser,
            page,
            handler_task,
        };

        session.goto(&self.options.root_url).await?;
        sleep(Duration::from_secs(2)).await;
        session
            .set_title(&format!(
                "Books.com.tw - browser #{} (please log in)",
                session_id
            ))
            .await;

        println!("✓ Browser #{} opened", session_id);
        Ok(session)
    }
}

pub struct ChromeSession {
    id: usize,
    options: ChromeOptions,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    pub fn id(&self) -> usize {
        self.id
    }

    async fn goto(&mut self, url: &str) -> Result<(), ScraperError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    /// ウィンドウ識別用。失敗しても処理は続行
    async fn set_title(&self, title: &str) {
        let script = format!("document.title = {:?}", title);
        if let Err(e) = self.page.evaluate(script.as_str()).await {
            debug!("Failed to set window title on browser #{}: {}", self.id, e);
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn load(&mut self, url: &str) -> Result<PageSnapshot, ScraperError> {
        self.goto(url).await?;
        sleep(self.options.page_settle.sample()).await;

        let html = self
            .page
            .content()
            .await
            .map_err(|e| ScraperError::PageContent(format!("{}: {}", url, e)))?;
        Ok(PageSnapshot::new(url, html))
    }

    async fn reset(&mut self) -> Result<(), ScraperError> {
        let root = self.options.root_url.clone();
        debug!("Browser #{} returning to {}", self.id, root);
        self.goto(&root).await
    }

    async fn on_authenticated(&mut self) -> Result<(), ScraperError> {
        self.set_title(&format!("Books.com.tw - browser #{} (scraping...)", self.id))
            .await;
        Ok(())
    }

    async fn screenshot(&self) -> Option<Vec<u8>> {
        match self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Screenshot failed on browser #{}: {}", self.id, e);
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        let result = self.browser.close().await;
        self.handler_task.abort();
        result
            .map(|_| ())
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ終了エラー: {}", e)))
    }
}
