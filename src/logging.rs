//! ログ設定：標準エラー + 日別ファイル `<log_dir>/YYYY/MM/YYYYMMDD.log`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 実行日のログファイルパス
pub fn log_file_path(log_dir: &Path, now: DateTime<Local>) -> PathBuf {
    log_dir
        .join(now.format("%Y").to_string())
        .join(now.format("%m").to_string())
        .join(format!("{}.log", now.format("%Y%m%d")))
}

/// RUST_LOG があればそちらを優先。返り値のガードは終了まで保持すること
pub fn init_logging(level: &str, log_dir: &Path) -> std::io::Result<(WorkerGuard, PathBuf)> {
    let path = log_file_path(log_dir, Local::now());
    let dir = path.parent().unwrap_or(log_dir).to_path_buf();
    std::fs::create_dir_all(&dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scraper.log".to_string());
    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},chromiumoxide=warn", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok((guard, path))
}
