use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ページ取得エラー: {0}")]
    PageContent(String),

    #[error("接続がブロックされました（{attempts}回試行）: {url}")]
    Blocked { url: String, attempts: u32 },

    #[error("抽出エラー: {0}")]
    Extraction(String),

    #[error("入力ファイルが不正です: {0}")]
    InvalidInput(String),

    #[error("必須カラムがありません: {0}")]
    MissingColumn(String),

    #[error("ログイン確認が中断されました: {0}")]
    AuthAborted(String),

    #[error("ユーザーにより中断されました")]
    Interrupted,

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScraperError {
    /// 実行全体を中止すべきセットアップ段階のエラーか
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            ScraperError::BrowserInit(_)
                | ScraperError::InvalidInput(_)
                | ScraperError::MissingColumn(_)
                | ScraperError::AuthAborted(_)
                | ScraperError::FileIO(_)
                | ScraperError::Csv(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_message_contains_url() {
        let err = ScraperError::Blocked {
            url: "https://www.books.com.tw/products/001".into(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("products/001"));
        assert!(msg.contains('3'));
        assert!(!err.is_setup_failure());
    }

    #[test]
    fn test_setup_failure_classification() {
        assert!(ScraperError::MissingColumn("url".into()).is_setup_failure());
        assert!(ScraperError::BrowserInit("x".into()).is_setup_failure());
        assert!(!ScraperError::Extraction("x".into()).is_setup_failure());
        assert!(!ScraperError::Interrupted.is_setup_failure());
    }
}
