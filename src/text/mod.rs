//! Text processing modules
//!
//! - Language tags
//! - Text normalization (abbreviations, punctuation, numbers)
//! - Sentence segmentation

mod language;
mod normalizer;
mod segmenter;

pub use language::Language;
pub use normalizer::{
    builtin_table, normalize, Abbreviation, AbbreviationKind, AbbreviationTable, NormalizedText,
    TextNormalizer,
};
pub use segmenter::{segment, Segment, Segmenter, SegmenterConfig};
