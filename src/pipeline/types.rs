//! パイプライン共通の型定義

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// 「見つからない」を表す値
pub const NOT_FOUND: &str = "N/A";

/// 既存値として扱わないプレースホルダー
const PLACEHOLDERS: [&str; 3] = [NOT_FOUND, "待獲取", "待爬取"];

/// 空・N/A・プレースホルダーのいずれか
pub fn is_blank(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || PLACEHOLDERS.contains(&value)
}

/// 取得対象フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    Isbn,
    Publisher,
    Translator,
    FixedPrice,
    OriginalTitle,
    PublishDate,
    Category,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Isbn,
        Field::Publisher,
        Field::Translator,
        Field::FixedPrice,
        Field::OriginalTitle,
        Field::PublishDate,
        Field::Category,
    ];

    /// エラー記録が必要になる必須フィールド
    pub const REQUIRED: [Field; 2] = [Field::Isbn, Field::FixedPrice];

    /// 行ストア（入力CSV）のカラム名
    pub fn column(self) -> &'static str {
        match self {
            Field::Isbn => "ISBN",
            Field::Publisher => "Publisher",
            Field::Translator => "translator",
            Field::FixedPrice => "fixed_price",
            Field::OriginalTitle => "original_title",
            Field::PublishDate => "publish_date",
            Field::Category => "category",
        }
    }

    /// エラー理由・ログで使うキー
    pub fn key(self) -> &'static str {
        match self {
            Field::Isbn => "isbn",
            other => other.column(),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 1冊分の抽出値。未取得は常に `N/A`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFields {
    values: [String; 7],
}

impl Default for BookFields {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|_| NOT_FOUND.to_string()),
        }
    }
}

impl BookFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    /// 空文字は N/A として保存する
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        self.values[field.index()] = if value.trim().is_empty() {
            NOT_FOUND.to_string()
        } else {
            value
        };
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn is_found(&self, field: Field) -> bool {
        self.get(field) != NOT_FOUND
    }

    pub fn any_found(&self) -> bool {
        Field::ALL.iter().any(|f| self.is_found(*f))
    }

    pub fn missing_required(&self) -> Vec<Field> {
        Field::REQUIRED
            .iter()
            .copied()
            .filter(|f| !self.is_found(*f))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL.iter().map(move |f| (*f, self.get(*f)))
    }

    /// 進捗表示用の「isbn: xxx, Publisher: yyy」形式
    pub fn summary(&self) -> String {
        self.iter()
            .filter(|(_, v)| *v != NOT_FOUND)
            .map(|(f, v)| format!("{}: {}", f, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// キューに積む1行分の仕事
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub row_index: usize,
    pub source_row: HashMap<String, String>,
}

impl WorkItem {
    pub fn new(row_index: usize, source_row: HashMap<String, String>) -> Self {
        Self {
            row_index,
            source_row,
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.source_row.get(column).map(String::as_str)
    }

    pub fn url(&self) -> &str {
        self.get("url").unwrap_or_default().trim()
    }

    pub fn title(&self) -> &str {
        self.get("title").unwrap_or(NOT_FOUND)
    }
}

/// 1件の処理結果
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub row_index: usize,
    pub fields: BookFields,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    /// 1つでも値が取れていれば成功
    pub fn from_fields(row_index: usize, fields: BookFields) -> Self {
        let success = fields.any_found();
        Self {
            row_index,
            fields,
            success,
            error: None,
        }
    }

    pub fn failed(row_index: usize, error: impl Into<String>) -> Self {
        Self {
            row_index,
            fields: BookFields::default(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// ページ取得結果（HTMLスナップショット）
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}
