pub mod structs;
pub mod text_serializer;
pub mod news;
pub mod enrichment;
pub mod subtopics;

pub use news::NewsSentinel;
pub use enrichment::Enricher;
