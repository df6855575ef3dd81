use async_trait::async_trait;

use crate::error::ScraperError;
use crate::pipeline::{BookFields, PageSnapshot};

/// ログイン済みブラウザ1つ分の操作
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// URLを開いてHTMLを取得
    async fn load(&mut self, url: &str) -> Result<PageSnapshot, ScraperError>;

    /// トップページへ戻ってセッションをリセット
    async fn reset(&mut self) -> Result<(), ScraperError>;

    /// ログイン確認後の通知（ウィンドウタイトル更新など）
    async fn on_authenticated(&mut self) -> Result<(), ScraperError> {
        Ok(())
    }

    /// デバッグ用スクリーンショット（PNG）
    async fn screenshot(&self) -> Option<Vec<u8>> {
        None
    }

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// セッション生成
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: BrowserSession + 'static;

    /// `session_id` は 1 始まり
    async fn launch(&self, session_id: usize) -> Result<Self::Session, ScraperError>;
}

/// 手動ログイン完了の待ち合わせ
#[async_trait]
pub trait AuthGate: Send {
    async fn wait_ready(&mut self, session_ids: &[usize]) -> Result<(), ScraperError>;
}

/// 読み込んだページからフィールドを抽出
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, page: &PageSnapshot) -> Result<BookFields, ScraperError>;
}

/// ソフトブロック（レート制限ページ等）の検出
pub trait BlockDetector: Send + Sync {
    fn is_blocked(&self, page: &PageSnapshot) -> bool;
}
