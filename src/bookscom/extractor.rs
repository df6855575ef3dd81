//! 博客來 商品ページのフィールド抽出
//!
//! フィールドごとに抽出関数のリストを持ち、先頭から順に試して最初に取れた値を使う。

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::ScraperError;
use crate::pipeline::{BookFields, Field, PageSnapshot};
use crate::traits::FieldExtractor;

/// 抽出関数 `(page) -> 値 | 見つからない`
pub type Strategy = fn(&Html) -> Option<String>;

const DETAIL_ITEMS: &str = "div.mod_b.type02_m058 ul li";
const DETAIL_CELLS: &str = "div.mod_b.type02_m058 tbody tr td";
const INFO_ITEMS: &str = "div.type02_p003 li";
const INFO_DIRECT_ITEMS: &str = "div.type02_p003 > ul > li";
const PRICE_ITEMS: &str = "ul.price > li";
const CATEGORY_ITEMS: &str = "div.mod_b.type02_m058 ul.sort li";

const PRICE_LABEL: &str = "定價";
const BUNDLE_PRICE_LABEL: &str = "組合商品原始售價";
const CATEGORY_LABEL: &str = "本書分類：";

static ISBN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ISBN[：:\s]*").expect("valid regex"));
static ISBN_13_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(978|979)\d{10}").expect("valid regex"));
static DIGITS_13: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{13}").expect("valid regex"));
static DIGITS_10: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{10}").expect("valid regex"));
static FOLLOW_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*追蹤.*$").expect("valid regex"));
static TRANSLATOR_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"譯者[：:]\s*(.+)").expect("valid regex"));
static PUBLISHER_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"出版社[：:]\s*").expect("valid regex"));
static DATE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"出版日期[：:]\s*").expect("valid regex"));
static PRICE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d,]+").expect("valid regex"));

pub const ISBN_STRATEGIES: &[Strategy] = &[isbn_from_labeled_item, isbn_from_table, isbn_from_item_text];
pub const TRANSLATOR_STRATEGIES: &[Strategy] =
    &[translator_link_with_colon, translator_link, translator_from_text];
pub const PUBLISHER_STRATEGIES: &[Strategy] = &[publisher_link, publisher_from_text];
pub const PUBLISH_DATE_STRATEGIES: &[Strategy] = &[publish_date_own_text, publish_date_from_text];
pub const PRICE_STRATEGIES: &[Strategy] = &[list_price, bundle_price, price_from_text];
pub const ORIGINAL_TITLE_STRATEGIES: &[Strategy] = &[original_title_exact, original_title_loose];
pub const CATEGORY_STRATEGIES: &[Strategy] = &[category_in_detail, category_anywhere];

pub fn strategies_for(field: Field) -> &'static [Strategy] {
    match field {
        Field::Isbn => ISBN_STRATEGIES,
        Field::Publisher => PUBLISHER_STRATEGIES,
        Field::Translator => TRANSLATOR_STRATEGIES,
        Field::FixedPrice => PRICE_STRATEGIES,
        Field::OriginalTitle => ORIGINAL_TITLE_STRATEGIES,
        Field::PublishDate => PUBLISH_DATE_STRATEGIES,
        Field::Category => CATEGORY_STRATEGIES,
    }
}

/// 全フィールドを抽出
pub fn extract_fields(document: &Html) -> BookFields {
    let mut fields = BookFields::new();
    for field in Field::ALL {
        if let Some(value) = strategies_for(field).iter().find_map(|s| s(document)) {
            debug!("Extracted {}: {}", field, value);
            fields.set(field, value);
        }
    }
    fields
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BookscomExtractor;

impl BookscomExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for BookscomExtractor {
    fn extract(&self, page: &PageSnapshot) -> Result<BookFields, ScraperError> {
        let document = Html::parse_document(&page.html);
        Ok(extract_fields(&document))
    }
}

// ========================================
// 共通ヘルパー
// ========================================

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_in<'a>(element: &ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => element.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// 子孫を含む全テキスト
fn full_text(element: &ElementRef) -> String {
    element.text().collect()
}

/// 直下のテキストノードのみ
fn own_text(element: &ElementRef) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect()
}

fn first_link_text(element: &ElementRef) -> Option<String> {
    select_in(element, "a")
        .first()
        .and_then(|a| normalize(&full_text(a)))
}

/// 全角スペースを半角にしてトリム。空なら None
pub fn normalize(text: &str) -> Option<String> {
    let cleaned = text.replace('\u{3000}', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == crate::pipeline::NOT_FOUND {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn strip_follow(text: &str) -> String {
    FOLLOW_SUFFIX.replace(text, "").into_owned()
}

fn first_line(text: &str) -> Option<String> {
    text.lines().find_map(normalize)
}

/// ISBN-13（978/979始まり）→ 任意の13桁 → 10桁 の順に探す
pub fn extract_isbn(text: &str) -> Option<String> {
    let text = ISBN_LABEL.replace_all(text, "");
    let text = text.trim();
    [&*ISBN_13_PREFIXED, &*DIGITS_13, &*DIGITS_10]
        .iter()
        .find_map(|re| re.find(text).map(|m| m.as_str().to_string()))
}

// ========================================
// ISBN
// ========================================

fn isbn_from_labeled_item(document: &Html) -> Option<String> {
    let item = select(document, DETAIL_ITEMS)
        .into_iter()
        .find(|li| own_text(li).contains("ISBN"))?;
    extract_isbn(&full_text(&item))
}

fn isbn_from_table(document: &Html) -> Option<String> {
    select(document, DETAIL_CELLS)
        .iter()
        .map(own_text)
        .filter(|t| t.contains("978") || t.contains("979"))
        .find_map(|t| extract_isbn(&t))
}

fn isbn_from_item_text(document: &Html) -> Option<String> {
    select(document, DETAIL_ITEMS)
        .iter()
        .map(full_text)
        .filter(|t| t.contains("ISBN"))
        .find_map(|t| extract_isbn(&t))
}

// ========================================
// 譯者・出版社・出版日期
// ========================================

fn labeled_link(document: &Html, css: &str, label: &str) -> Option<String> {
    select(document, css)
        .iter()
        .filter(|li| full_text(li).contains(label))
        .find_map(first_link_text)
}

fn translator_link_with_colon(document: &Html) -> Option<String> {
    labeled_link(document, INFO_ITEMS, "譯者：")
}

fn translator_link(document: &Html) -> Option<String> {
    labeled_link(document, INFO_ITEMS, "譯者")
}

fn translator_from_text(document: &Html) -> Option<String> {
    select(document, INFO_ITEMS).iter().find_map(|li| {
        let text = full_text(li);
        let captured = TRANSLATOR_TEXT.captures(&text)?.get(1)?.as_str().to_string();
        first_line(&strip_follow(&captured))
    })
}

fn publisher_link(document: &Html) -> Option<String> {
    labeled_link(document, INFO_ITEMS, "出版社：")
}

fn publisher_from_text(document: &Html) -> Option<String> {
    select(document, INFO_DIRECT_ITEMS).iter().find_map(|li| {
        let text = full_text(li);
        if !(text.contains("出版社") && text.contains('：')) {
            return None;
        }
        let stripped = PUBLISHER_LABEL.replace(&text, "");
        first_line(&strip_follow(&stripped))
    })
}

fn publish_date_own_text(document: &Html) -> Option<String> {
    let item = select(document, INFO_ITEMS)
        .into_iter()
        .find(|li| full_text(li).contains("出版日期："))?;
    let text = own_text(&item);
    let stripped = DATE_LABEL.replace(text.trim(), "");
    first_line(&stripped)
}

fn publish_date_from_text(document: &Html) -> Option<String> {
    select(document, INFO_DIRECT_ITEMS).iter().find_map(|li| {
        let text = full_text(li);
        if !(text.contains("出版日期") && text.contains('：')) {
            return None;
        }
        first_line(&DATE_LABEL.replace(&text, ""))
    })
}

// ========================================
// 定價
// ========================================

fn price_with_label(document: &Html, label: &str) -> Option<String> {
    select(document, PRICE_ITEMS)
        .iter()
        .filter(|li| own_text(li).contains(label))
        .find_map(|li| select_in(li, "em").first().and_then(|em| normalize(&full_text(em))))
}

fn list_price(document: &Html) -> Option<String> {
    price_with_label(document, PRICE_LABEL)
}

fn bundle_price(document: &Html) -> Option<String> {
    price_with_label(document, BUNDLE_PRICE_LABEL)
}

/// 優惠價は対象外
fn price_from_text(document: &Html) -> Option<String> {
    select(document, PRICE_ITEMS).iter().find_map(|li| {
        let text = full_text(li);
        if !(text.contains(PRICE_LABEL) || text.contains(BUNDLE_PRICE_LABEL)) {
            return None;
        }
        PRICE_DIGITS.find(&text).map(|m| m.as_str().to_string())
    })
}

// ========================================
// 原文書名
// ========================================

fn original_title_exact(document: &Html) -> Option<String> {
    select(document, "div.mod.type02_p002.clearfix h2 a")
        .first()
        .and_then(|a| normalize(&full_text(a)))
}

fn original_title_loose(document: &Html) -> Option<String> {
    select(document, "div[class*='type02_p002'] h2 a")
        .first()
        .and_then(|a| normalize(&full_text(a)))
}

// ========================================
// 分類
// ========================================

/// 「本書分類：」の各行を " > " で連結し、複数行は "; " で連結
fn categories(items: Vec<ElementRef>) -> Option<String> {
    let paths: Vec<String> = items
        .iter()
        .filter(|li| full_text(li).contains(CATEGORY_LABEL))
        .filter_map(|li| {
            let levels: Vec<String> = select_in(li, "a")
                .iter()
                .filter_map(|a| normalize(&full_text(a)))
                .collect();
            (!levels.is_empty()).then(|| levels.join(" > "))
        })
        .collect();
    (!paths.is_empty()).then(|| paths.join("; "))
}

fn category_in_detail(document: &Html) -> Option<String> {
    categories(select(document, CATEGORY_ITEMS))
}

fn category_anywhere(document: &Html) -> Option<String> {
    categories(select(document, "ul.sort li"))
}
