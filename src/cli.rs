use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use book_detail_scraper::config::{DEFAULT_BROWSERS, MAX_BROWSERS, MIN_BROWSERS};

/// 博客來の書籍詳細（ISBN・出版社・譯者・定價など）を複数ブラウザで一括取得し、CSVに書き戻す
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Input CSV (must contain a `url` column). Prompted for when omitted
    #[arg(value_name = "INPUT")]
    pub input: Option<String>,

    /// Number of browsers to open (1-5)
    #[arg(value_name = "BROWSERS", default_value_t = DEFAULT_BROWSERS)]
    pub browsers: usize,

    /// Only process the first N rows
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory for daily log files
    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Chrome/Chromium executable
    #[arg(long, value_name = "FILE")]
    pub chrome_path: Option<PathBuf>,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Log screenshots of blocked pages and verbose Chrome output
    #[arg(long)]
    pub debug: bool,
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Valid levels are: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.limit == Some(0) {
            return Err("limit must be greater than 0".to_string());
        }

        Ok(())
    }

    /// 範囲外なら丸めた値と元の値を返す
    pub fn clamped_browsers(&self) -> (usize, Option<usize>) {
        let clamped = self.browsers.clamp(MIN_BROWSERS, MAX_BROWSERS);
        (clamped, (clamped != self.browsers).then_some(self.browsers))
    }

    /// 引数がなければ標準入力から読む
    pub fn resolve_input(&self) -> io::Result<PathBuf> {
        if let Some(input) = &self.input {
            return Ok(PathBuf::from(strip_quotes(input)));
        }

        print!("Enter the path of the CSV to process: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(PathBuf::from(strip_quotes(&line)))
    }
}

/// ドラッグ&ドロップで付く引用符を外す
pub fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let args = CliArgs::parse_from(["book-detail-scraper", "books.csv", "4", "--limit", "20"]);
        assert_eq!(args.input.as_deref(), Some("books.csv"));
        assert_eq!(args.browsers, 4);
        assert_eq!(args.limit, Some(20));
        assert_eq!(args.clamped_browsers(), (4, None));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["book-detail-scraper"]);
        assert!(args.input.is_none());
        assert_eq!(args.browsers, DEFAULT_BROWSERS);
        assert_eq!(args.log_dir, PathBuf::from("logs"));
        assert!(!args.debug);
    }

    #[test]
    fn test_browser_count_clamped() {
        let args = CliArgs::parse_from(["book-detail-scraper", "books.csv", "12"]);
        assert_eq!(args.clamped_browsers(), (MAX_BROWSERS, Some(12)));
        let args = CliArgs::parse_from(["book-detail-scraper", "books.csv", "0"]);
        assert_eq!(args.clamped_browsers(), (MIN_BROWSERS, Some(0)));
    }

    #[test]
    fn test_invalid_log_level() {
        let args = CliArgs::parse_from(["book-detail-scraper", "books.csv", "--log-level", "loud"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"/data/my books.csv\"\n"), "/data/my books.csv");
        assert_eq!(strip_quotes("'books.csv'"), "books.csv");
        assert_eq!(strip_quotes("  books.csv "), "books.csv");
    }
}
