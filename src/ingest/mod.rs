//! Candidate link ingestion.

mod engine;
mod frontmatter;
mod parser;

pub use engine::{IngestEngine, IngestReport, IngestSource};
pub use frontmatter::{read_front_matter, FrontMatter};
pub use parser::{parse_links, CaptureEntry, LinkCandidate};
