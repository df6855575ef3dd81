//! アクセス制限ページの検出

use crate::pipeline::PageSnapshot;
use crate::traits::BlockDetector;

/// 博客來の制限ページに出る文言
pub const DEFAULT_BLOCK_MARKERS: [&str; 4] = [
    "您的連線暫時異常",
    "Connection is temporarily unavailable",
    "請稍後再試",
    "Please try again later",
];

/// HTML にマーカー文字列が1つでも含まれていればブロックとみなす
#[derive(Debug, Clone)]
pub struct MarkerBlockDetector {
    markers: Vec<String>,
}

impl Default for MarkerBlockDetector {
    fn default() -> Self {
        Self::with_markers(DEFAULT_BLOCK_MARKERS)
    }
}

impl MarkerBlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl BlockDetector for MarkerBlockDetector {
    fn is_blocked(&self, page: &PageSnapshot) -> bool {
        self.markers.iter().any(|m| page.html.contains(m.as_str()))
    }
}
