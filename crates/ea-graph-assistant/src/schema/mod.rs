pub mod layers;
pub mod summarizer;

pub use layers::{LayerRule, LayerRules, OTHER_LAYER};
pub use summarizer::{SchemaSummarizer, SchemaSummary, NONE_FOUND, OTHER_INDEX_SAMPLE};
