//! 行ストア（入力CSVそのもの）
//!
//! 1行 = 1冊。処理結果はこの表に書き戻し、毎回ファイル全体を上書き保存する。

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ScraperError;

use super::types::{is_blank, ExtractionResult, Field, WorkItem, NOT_FOUND};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const URL_COLUMN: &str = "url";

#[derive(Debug, Clone)]
pub struct RowStore {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    production_id_column: Option<String>,
}

impl RowStore {
    /// CSVを読み込み、必要なカラムが無ければ N/A で作成する
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScraperError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ScraperError::InvalidInput(format!(
                "CSVファイルが存在しません: {}",
                path.display()
            )));
        }

        let bytes = fs::read(path)?;
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(body);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        if !headers.iter().any(|h| h == URL_COLUMN) {
            return Err(ScraperError::MissingColumn(URL_COLUMN.into()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() > headers.len() {
                warn!(
                    "Row {} has {} cells but only {} columns; extra cells will be dropped on save",
                    rows.len() + 2,
                    row.len(),
                    headers.len()
                );
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(ScraperError::InvalidInput(format!(
                "有効な書籍データがありません: {}",
                path.display()
            )));
        }

        let production_id_column = headers
            .iter()
            .find(|h| h.to_lowercase().contains("production_id"))
            .cloned();

        let mut store = Self {
            path: path.to_path_buf(),
            headers,
            rows,
            production_id_column,
        };

        for field in Field::ALL {
            if store.ensure_column(field.column()) {
                info!("Created column {}", field.column());
            }
        }

        info!(
            "Loaded {} rows from {} (columns: {:?})",
            store.rows.len(),
            store.path.display(),
            store.headers
        );
        Ok(store)
    }

    /// カラムが無ければ追加し、全行を N/A で埋める
    fn ensure_column(&mut self, column: &str) -> bool {
        if self.column_index(column).is_some() {
            return false;
        }
        self.headers.push(column.to_string());
        for row in &mut self.rows {
            row.push(NOT_FOUND.to_string());
        }
        true
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn production_id_column(&self) -> Option<&str> {
        self.production_id_column.as_deref()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn value(&self, row_index: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row_index).map(|row| row[col].as_str())
    }

    /// 先頭から `limit` 行分の WorkItem を作る
    pub fn work_items(&self, limit: Option<usize>) -> Vec<WorkItem> {
        let take = limit.unwrap_or(self.rows.len()).min(self.rows.len());
        self.rows
            .iter()
            .take(take)
            .enumerate()
            .map(|(idx, row)| {
                let mut source: HashMap<String, String> = self
                    .headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                if let Some(col) = &self.production_id_column {
                    let value = source.get(col).cloned().unwrap_or_default();
                    source.insert("production_id".to_string(), value);
                }
                WorkItem::new(idx, source)
            })
            .collect()
    }

    /// 結果を行へ反映する。既存の有効値は上書きしない
    pub fn apply(&mut self, result: &ExtractionResult) -> Result<(), ScraperError> {
        let indices: Vec<(Field, usize)> = Field::ALL
            .iter()
            .filter_map(|f| self.column_index(f.column()).map(|c| (*f, c)))
            .collect();

        let row = self.rows.get_mut(result.row_index).ok_or_else(|| {
            ScraperError::InvalidInput(format!("行番号が範囲外です: {}", result.row_index))
        })?;

        for (field, col) in indices {
            if is_blank(&row[col]) {
                row[col] = result.fields.get(field).to_string();
            }
        }
        Ok(())
    }

    /// 一時ファイルに書いてから置き換える（BOM付きUTF-8）
    pub fn save(&self) -> Result<(), ScraperError> {
        let tmp_path = tmp_path_for(&self.path);
        {
            let mut file = BufWriter::new(File::create(&tmp_path)?);
            file.write_all(UTF8_BOM)?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// フィールドごとの取得済み件数
    pub fn field_counts(&self) -> Vec<(Field, usize)> {
        Field::ALL
            .iter()
            .map(|f| {
                let count = match self.column_index(f.column()) {
                    Some(col) => self.rows.iter().filter(|r| !is_blank(&r[col])).count(),
                    None => 0,
                };
                (*f, count)
            })
            .collect()
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
