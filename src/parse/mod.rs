pub mod frontmatter;
pub mod markdown;
pub mod query;

pub use frontmatter::{compose, parse_document, serialize_frontmatter, Document};
pub use markdown::{
    extract_preview, extract_related_project, extract_sections, extract_title, extract_wikilinks,
};
pub use query::{parse_query, ParsedQuery};
