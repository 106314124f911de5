//! Voice catalog
//!
//! Ten voice styles (five male, five female); every style speaks every
//! supported language, so the catalog is the full cross product.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Result, TtsError};
use crate::text::Language;

/// Number of voices per gender
pub const VOICES_PER_GENDER: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    fn prefix(&self) -> char {
        match self {
            Gender::Male => 'M',
            Gender::Female => 'F',
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "Male"),
            Gender::Female => write!(f, "Female"),
        }
    }
}

/// Catalog voice id such as `M4` or `F1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoiceId {
    gender: Gender,
    number: u8,
}

impl VoiceId {
    /// Build a catalog voice; `number` is 1-based
    pub fn new(gender: Gender, number: u8) -> Option<Self> {
        (1..=VOICES_PER_GENDER)
            .contains(&number)
            .then_some(Self { gender, number })
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// All catalog voices: M1..M5 then F1..F5
    pub fn all() -> Vec<VoiceId> {
        [Gender::Male, Gender::Female]
            .into_iter()
            .flat_map(|gender| (1..=VOICES_PER_GENDER).map(move |number| VoiceId { gender, number }))
            .collect()
    }

    /// Comma-separated ids, for error messages
    pub fn names() -> String {
        Self::all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse a voice id, rejecting anything outside the catalog
    pub fn parse(s: &str) -> Result<Self> {
        let unsupported = || TtsError::UnsupportedVoice {
            voice: s.to_string(),
            available: Self::names(),
        };

        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let gender = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('M') => Gender::Male,
            Some('F') => Gender::Female,
            _ => return Err(unsupported()),
        };
        let number: u8 = chars.as_str().parse().map_err(|_| unsupported())?;
        Self::new(gender, number).ok_or_else(unsupported)
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.gender.prefix(), self.number)
    }
}

impl FromStr for VoiceId {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VoiceId {
    type Error = TtsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VoiceId> for String {
    fn from(id: VoiceId) -> Self {
        id.to_string()
    }
}

/// Cache key and public endpoint name: one (language, voice) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceKey {
    pub language: Language,
    pub voice: VoiceId,
}

impl VoiceKey {
    pub fn new(language: Language, voice: VoiceId) -> Self {
        Self { language, voice }
    }

    /// Validate raw codes against the catalog
    ///
    /// Unknown languages are invalid parameters; unknown voices are
    /// unsupported voices.
    pub fn from_codes(language: &str, voice: &str) -> Result<Self> {
        let language: Language = language.parse()?;
        let voice = VoiceId::parse(voice)?;
        Ok(Self { language, voice })
    }

    /// Parse an endpoint name such as `fr-M4`
    pub fn from_name(name: &str) -> Result<Self> {
        let (language, voice) = name.trim().split_once('-').ok_or_else(|| {
            TtsError::invalid("voice", format!("expected '<language>-<voice>', got '{}'", name))
        })?;
        Self::from_codes(language, voice)
    }

    /// Endpoint name, e.g. `fr-M4`
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.language, self.voice)
    }
}

/// Every (language, voice) pair, language-major
pub fn catalog() -> Vec<VoiceKey> {
    Language::all()
        .iter()
        .flat_map(|&language| VoiceId::all().into_iter().map(move |voice| VoiceKey::new(language, voice)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_ids() {
        let all = VoiceId::all();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].to_string(), "M1");
        assert_eq!(all[9].to_string(), "F5");
        assert_eq!(VoiceId::names(), "M1, M2, M3, M4, M5, F1, F2, F3, F4, F5");
    }

    #[test]
    fn test_parse_voice() {
        let m4 = VoiceId::parse("M4").unwrap();
        assert_eq!(m4.gender(), Gender::Male);
        assert_eq!(m4.number(), 4);
        assert_eq!(VoiceId::parse("f2").unwrap().to_string(), "F2");
    }

    #[test]
    fn test_unsupported_voice() {
        for bad in ["M9", "M0", "X1", "", "M", "M-1", "F10"] {
            let err = VoiceId::parse(bad).unwrap_err();
            assert_eq!(err.code(), "unsupported_voice", "{bad}");
        }
    }

    #[test]
    fn test_voice_key_codes() {
        let key = VoiceKey::from_codes("fr", "M4").unwrap();
        assert_eq!(key.name(), "fr-M4");
        assert_eq!(VoiceKey::from_name("fr-M4").unwrap(), key);

        assert_eq!(VoiceKey::from_codes("xx", "M4").unwrap_err().code(), "invalid_parameter");
        assert_eq!(VoiceKey::from_codes("en", "M9").unwrap_err().code(), "unsupported_voice");
        assert!(VoiceKey::from_name("M4").is_err());
    }

    #[test]
    fn test_catalog_cross_product() {
        let keys = catalog();
        assert_eq!(keys.len(), 50);
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_serde_voice_id() {
        let json = serde_json::to_string(&VoiceId::parse("F3").unwrap()).unwrap();
        assert_eq!(json, "\"F3\"");
        assert!(serde_json::from_str::<VoiceId>("\"M7\"").is_err());
    }
}
