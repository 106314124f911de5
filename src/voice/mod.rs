//! Voice Module
//!
//! - Catalog of (language, voice) pairs
//! - Process-wide, reference-counted cache of loaded voice models

pub mod catalog;
pub mod resolver;

pub use catalog::{catalog, Gender, VoiceId, VoiceKey, VOICES_PER_GENDER};
pub use resolver::{CachedVoice, VoiceCacheConfig, VoiceCacheStats, VoiceHandle, VoiceResolver};
