//! 結果の書き込み先
//!
//! 行ストアとエラー台帳はそれぞれ別のロックで保護する。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::info;

use crate::error::ScraperError;

use super::store::RowStore;
use super::types::{ExtractionResult, Field, WorkItem};

/// エラーCSVの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub url: String,
    pub title: String,
    pub production_id: String,
    pub isbn: String,
    #[serde(rename = "Publisher")]
    pub publisher: String,
    pub fixed_price: String,
    pub translator: String,
    pub original_title: String,
    pub publish_date: String,
    pub category: String,
    pub error_reason: String,
    pub row_index: usize,
}

impl ErrorRecord {
    /// 例外発生、または ISBN・定価のどちらかが N/A の場合のみ記録対象
    pub fn for_result(item: &WorkItem, result: &ExtractionResult) -> Option<Self> {
        let reason = match &result.error {
            Some(error) => error.clone(),
            None => {
                let missing = result.fields.missing_required();
                if missing.is_empty() {
                    return None;
                }
                format!(
                    "missing fields: {}",
                    missing
                        .iter()
                        .map(|f| f.key())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        };

        let fields = &result.fields;
        Some(Self {
            url: item.url().to_string(),
            title: item.title().to_string(),
            production_id: item.get("production_id").unwrap_or_default().to_string(),
            isbn: fields.get(Field::Isbn).to_string(),
            publisher: fields.get(Field::Publisher).to_string(),
            fixed_price: fields.get(Field::FixedPrice).to_string(),
            translator: fields.get(Field::Translator).to_string(),
            original_title: fields.get(Field::OriginalTitle).to_string(),
            publish_date: fields.get(Field::PublishDate).to_string(),
            category: fields.get(Field::Category).to_string(),
            error_reason: reason,
            row_index: item.row_index,
        })
    }
}

pub struct ResultSink {
    store: Mutex<RowStore>,
    ledger: Mutex<Vec<ErrorRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResultSink {
    pub fn new(store: RowStore) -> Self {
        Self {
            store: Mutex::new(store),
            ledger: Mutex::new(Vec::new()),
        }
    }

    /// 行へ書き込み、直ちにファイル全体を保存する
    pub fn persist(&self, result: &ExtractionResult) -> Result<(), ScraperError> {
        let mut store = lock(&self.store);
        store.apply(result)?;
        store.save()
    }

    pub fn record_error(&self, record: ErrorRecord) {
        lock(&self.ledger).push(record);
    }

    pub fn error_count(&self) -> usize {
        lock(&self.ledger).len()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        lock(&self.ledger).clone()
    }

    pub fn field_counts(&self) -> Vec<(Field, usize)> {
        lock(&self.store).field_counts()
    }

    /// エラー台帳をCSVへ保存。空の場合は何もしない
    pub fn flush_errors(&self, path: &Path) -> Result<usize, ScraperError> {
        let records = self.errors();
        if records.is_empty() {
            return Ok(0);
        }

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(b"\xEF\xBB\xBF")?;
        let mut writer = csv::Writer::from_writer(file);
        for record in &records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        info!("Saved {} error records to {}", records.len(), path.display());
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BookFields;
    use std::collections::HashMap;
    use std::fs;

    fn item() -> WorkItem {
        let row = HashMap::from([
            ("url".to_string(), "https://www.books.com.tw/products/0010".to_string()),
            ("title".to_string(), "夜間飛行".to_string()),
            ("production_id".to_string(), "0010".to_string()),
        ]);
        WorkItem::new(0, row)
    }

    fn sink(dir: &tempfile::TempDir) -> (ResultSink, std::path::PathBuf) {
        let path = dir.path().join("books.csv");
        fs::write(&path, "url,title\nhttps://www.books.com.tw/products/0010,夜間飛行\n")
            .expect("fixture");
        (ResultSink::new(RowStore::load(&path).expect("load")), path)
    }

    #[test]
    fn test_error_record_for_missing_required() {
        let result = ExtractionResult::from_fields(
            0,
            BookFields::new().with(Field::Publisher, "新潮社"),
        );
        let record = ErrorRecord::for_result(&item(), &result).expect("record");
        assert_eq!(record.error_reason, "missing fields: isbn, fixed_price");
        assert_eq!(record.publisher, "新潮社");
        assert_eq!(record.production_id, "0010");
    }

    #[test]
    fn test_error_record_prefers_exception() {
        let result = ExtractionResult::failed(0, "boom");
        let record = ErrorRecord::for_result(&item(), &result).expect("record");
        assert_eq!(record.error_reason, "boom");
    }

    #[test]
    fn test_no_error_record_when_required_present() {
        let fields = BookFields::new()
            .with(Field::Isbn, "9789573333333")
            .with(Field::FixedPrice, "320");
        let result = ExtractionResult::from_fields(0, fields);
        assert!(ErrorRecord::for_result(&item(), &result).is_none());
    }

    #[test]
    fn test_persist_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (sink, path) = sink(&dir);
        let result = ExtractionResult::from_fields(
            0,
            BookFields::new()
                .with(Field::Isbn, "9789573333333")
                .with(Field::FixedPrice, "320"),
        );

        sink.persist(&result).expect("first");
        let once = fs::read(&path).expect("read");
        sink.persist(&result).expect("second");
        let twice = fs::read(&path).expect("read");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_flush_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (sink, _) = sink(&dir);
        let error_path = dir.path().join("books_error.csv");

        assert_eq!(sink.flush_errors(&error_path).expect("flush"), 0);
        assert!(!error_path.exists());

        let record = ErrorRecord::for_result(&item(), &ExtractionResult::failed(0, "timeout"))
            .expect("record");
        sink.record_error(record);
        assert_eq!(sink.flush_errors(&error_path).expect("flush"), 1);

        let body = fs::read_to_string(&error_path).expect("read");
        let header = body.trim_start_matches('\u{feff}').lines().next().unwrap_or_default();
        assert_eq!(
            header,
            "url,title,production_id,isbn,Publisher,fixed_price,translator,original_title,publish_date,category,error_reason,row_index"
        );
        assert!(body.contains("timeout"));
    }
}
