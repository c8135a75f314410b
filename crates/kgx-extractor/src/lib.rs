//! KGX Extractor - Knowledge graph extraction pipeline
//!
//! Resolves coreferences, splits text into sentences, links entities to a
//! knowledge base and classifies the relation of every ordered entity pair.

pub mod coref;
pub mod entity;
pub mod linker;
pub mod pipeline;
pub mod relation;
pub mod sentence;
pub mod tokenize;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use coref::{rewrite, rewrite_tokens, HttpCorefClient, NoopCoref, RewriteReport};
pub use entity::{strip_punctuation, ClassFilter, SentenceProcessor};
pub use linker::WikifierClient;
pub use pipeline::{
    Collaborators, ExtractionAccumulator, ExtractionPipeline, ExtractionStats, SentenceExtraction,
};
pub use relation::{OpenNreClient, PairExtractor, RuleBasedClassifier, NO_RELATION};
pub use sentence::RuleBasedSplitter;
pub use tokenize::tokenize;
