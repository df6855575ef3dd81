//! 博客來（books.com.tw）向けのブラウザ・抽出・ブロック検出

mod detector;
mod extractor;
mod session;

pub use detector::{MarkerBlockDetector, DEFAULT_BLOCK_MARKERS};
pub use extractor::{extract_fields, extract_isbn, strategies_for, BookscomExtractor, Strategy};
pub use session::{ChromeLauncher, ChromeOptions, ChromeSession, BOOKSCOM_ROOT_URL};
