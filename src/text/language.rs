//! Languages understood by the synthesis engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::TtsError;

/// Language tag carried by every request and normalized text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
    Es,
    Pt,
    Ko,
}

impl Language {
    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Es => "es",
            Language::Pt => "pt",
            Language::Ko => "ko",
        }
    }

    /// English name
    pub fn name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "French",
            Language::Es => "Spanish",
            Language::Pt => "Portuguese",
            Language::Ko => "Korean",
        }
    }

    /// All supported languages, in catalog order
    pub fn all() -> &'static [Language] {
        &[
            Language::En,
            Language::Fr,
            Language::Es,
            Language::Pt,
            Language::Ko,
        ]
    }

    /// Comma-separated codes, for error messages
    pub fn codes() -> String {
        Self::all()
            .iter()
            .map(|l| l.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        // Accept region-qualified tags such as "fr-FR" or "en_US"
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        Language::all()
            .iter()
            .copied()
            .find(|l| l.code() == primary)
            .ok_or_else(|| {
                TtsError::invalid(
                    "language",
                    format!("unsupported language '{}' (supported: {})", s, Self::codes()),
                )
            })
    }
}
