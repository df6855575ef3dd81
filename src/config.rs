use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

/// ブラウザ（セッション）数の上限
pub const MAX_BROWSERS: usize = 5;
/// ブラウザ（セッション）数の下限
pub const MIN_BROWSERS: usize = 1;
/// ブラウザ数のデフォルト
pub const DEFAULT_BROWSERS: usize = 3;

/// 一様乱数の待機時間 [min, max]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// 待機なし（テスト用）
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// ソフトブロック時のリトライ方針
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 初回試行後の最大リトライ回数
    pub max_retries: u32,
    /// バックオフの基準値。実際の待機は `sample() * (attempt + 1)`
    pub backoff: Jitter,
    /// トップページへ戻った後の待機
    pub reset_wait: Jitter,
    /// ブロック検出時にスクリーンショットをログ出力する
    pub debug_screenshots: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Jitter::secs(5, 10),
            reset_wait: Jitter::secs(5, 8),
            debug_screenshots: false,
        }
    }
}

impl RetryPolicy {
    /// attempt回目（0始まり）のブロック後の待機時間
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.sample() * (attempt + 1)
    }
}

/// 一括補完処理の設定
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub input_path: PathBuf,
    pub browsers: usize,
    /// 処理する最大行数（None で全行）
    pub limit: Option<usize>,
    pub retry: RetryPolicy,
    /// 1件処理ごとのワーカー単位の待機
    pub item_delay: Jitter,
    /// キュー取得のポーリング間隔
    pub poll_interval: Duration,
    /// 停止シグナル送信後、ワーカー終了を待つ時間
    pub grace_period: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            browsers: DEFAULT_BROWSERS,
            limit: None,
            retry: RetryPolicy::default(),
            item_delay: Jitter::secs(5, 10),
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl EnrichConfig {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            ..Default::default()
        }
    }

    /// ブラウザ数は [MIN_BROWSERS, MAX_BROWSERS] に丸める
    pub fn with_browsers(mut self, browsers: usize) -> Self {
        self.browsers = clamp_browsers(browsers);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_item_delay(mut self, delay: Jitter) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// `<元ファイル名>_error.csv`（入力と同じディレクトリ）
    pub fn error_path(&self) -> PathBuf {
        error_path_for(&self.input_path)
    }
}

pub fn clamp_browsers(browsers: usize) -> usize {
    browsers.clamp(MIN_BROWSERS, MAX_BROWSERS)
}

pub fn error_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "detail_books".to_string());
    input.with_file_name(format!("{}_error.csv", stem))
}
