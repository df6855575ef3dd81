//! 博客來 書籍詳細スクレイパーライブラリ
//!
//! - 書籍URLを含むCSVを読み込み、複数のログイン済みブラウザで商品ページを並列取得
//! - ISBN・出版社・譯者・定價・原文書名・出版日期・分類を抽出して元CSVへ書き戻す
//! - ISBN/定價が取れなかった行やエラー行を `<元ファイル名>_error.csv` に記録
//!
//! # 使用例
//!
//! ```rust,ignore
//! use book_detail_scraper::{EnrichRequest, EnrichService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = EnrichService::new();
//!
//!     let request = EnrichRequest::new("./detail_books.csv")
//!         .with_browsers(3)
//!         .with_limit(Some(50));
//!
//!     let report = service.call(request).await.unwrap();
//!     println!("success: {}", report.counters.success);
//! }
//! ```
//!
//! # 独自のブラウザ・抽出器を使う
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use book_detail_scraper::{auth::SignalAuthGate, EnrichConfig, Orchestrator};
//!
//! let mut orchestrator = Orchestrator::new(
//!     EnrichConfig::new("books.csv").with_browsers(2),
//!     MyLauncher::default(),
//!     SignalAuthGate::confirmed(),
//!     Arc::new(MyExtractor),
//!     Arc::new(MyDetector),
//! );
//! let report = orchestrator.run().await?;
//! ```

pub mod auth;
pub mod bookscom;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod shutdown;
pub mod traits;

// 主要な型をリエクスポート
pub use bookscom::{BookscomExtractor, ChromeLauncher, ChromeOptions, MarkerBlockDetector};
pub use config::{EnrichConfig, Jitter, RetryPolicy};
pub use error::ScraperError;
pub use pipeline::{
    BookFields, ExtractionResult, Field, Orchestrator, PageSnapshot, RunReport, RunState,
    WorkItem,
};
pub use service::{EnrichRequest, EnrichService};
pub use shutdown::Shutdown;
pub use traits::{AuthGate, BlockDetector, BrowserSession, FieldExtractor, SessionLauncher};
