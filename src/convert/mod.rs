//! Pending-item conversion into book artifacts.

mod builder;
mod engine;
mod epub;
mod extractor;

pub use builder::{BookBuilder, ExtractingBookBuilder};
pub use engine::{ConversionEngine, ConversionOutcome};
pub use epub::{BookWriter, Chapter, EpubBookWriter};
pub use extractor::{extract_readable, ContentExtractor, ExtractedArticle, ReadableExtractor};
