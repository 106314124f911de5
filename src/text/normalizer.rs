//! Text normalization
//!
//! Normalizes input text before segmentation:
//! - Punctuation normalization (typographic quotes, dashes, ellipsis)
//! - Abbreviation expansion from a per-language table
//! - Optional number-to-words conversion (English)
//! - Whitespace normalization
//!
//! Normalization is pure and never fails. Languages without an abbreviation
//! table pass through untouched.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::language::Language;
use crate::core::error::{Result, TtsError};

/// How an abbreviation behaves at the end of a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbbreviationKind {
    /// Title placed before a name ("Dr.", "M."). Never ends a sentence.
    Prefix,
    /// May close a sentence ("p.m.", "etc."). The full stop is kept when the
    /// next word starts a new sentence.
    Inline,
}

/// One table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    pub token: String,
    pub expansion: String,
    pub kind: AbbreviationKind,
}

impl Abbreviation {
    fn closes_sentence(&self, after: &str) -> bool {
        if self.kind != AbbreviationKind::Inline || !self.token.ends_with('.') {
            return false;
        }
        let after = after.trim_start_matches(CLOSING_MARKS);
        let next_word = after.trim_start();
        if next_word.is_empty() {
            return true;
        }
        after.starts_with(char::is_whitespace)
            && next_word.chars().next().is_some_and(char::is_uppercase)
    }
}

const CLOSING_MARKS: &[char] = &['"', '\'', ')', ']', '}', '»'];

use AbbreviationKind::{Inline, Prefix};

const EN_ABBREVIATIONS: &[(&str, &str, AbbreviationKind)] = &[
    ("Mr.", "Mister", Prefix),
    ("Mrs.", "Missus", Prefix),
    ("Ms.", "Miz", Prefix),
    ("Dr.", "Doctor", Prefix),
    ("Prof.", "Professor", Prefix),
    ("St.", "Saint", Prefix),
    ("Mt.", "Mount", Prefix),
    ("Gen.", "General", Prefix),
    ("Capt.", "Captain", Prefix),
    ("Sgt.", "Sergeant", Prefix),
    ("Rev.", "Reverend", Prefix),
    ("Gov.", "Governor", Prefix),
    ("Sen.", "Senator", Prefix),
    ("vs.", "versus", Prefix),
    ("e.g.", "for example", Prefix),
    ("i.e.", "that is", Prefix),
    ("Jr.", "Junior", Inline),
    ("Sr.", "Senior", Inline),
    ("etc.", "et cetera", Inline),
    ("a.m.", "AM", Inline),
    ("p.m.", "PM", Inline),
    ("A.M.", "AM", Inline),
    ("P.M.", "PM", Inline),
    ("approx.", "approximately", Inline),
    ("Inc.", "Incorporated", Inline),
    ("Ltd.", "Limited", Inline),
    ("Corp.", "Corporation", Inline),
    ("Ave.", "Avenue", Inline),
    ("Blvd.", "Boulevard", Inline),
    ("Rd.", "Road", Inline),
    ("Dept.", "Department", Inline),
];

const FR_ABBREVIATIONS: &[(&str, &str, AbbreviationKind)] = &[
    ("M.", "Monsieur", Prefix),
    ("MM.", "Messieurs", Prefix),
    ("Mme", "Madame", Prefix),
    ("Mmes", "Mesdames", Prefix),
    ("Mlle", "Mademoiselle", Prefix),
    ("Mlles", "Mesdemoiselles", Prefix),
    ("Dr", "Docteur", Prefix),
    ("Dr.", "Docteur", Prefix),
    ("Pr", "Professeur", Prefix),
    ("Pr.", "Professeur", Prefix),
    ("St", "Saint", Prefix),
    ("Ste", "Sainte", Prefix),
    ("p. ex.", "par exemple", Prefix),
    ("c.-à-d.", "c'est-à-dire", Prefix),
    ("cf.", "confer", Prefix),
    ("n°", "numéro", Prefix),
    ("N°", "numéro", Prefix),
    ("1er", "premier", Prefix),
    ("1re", "première", Prefix),
    ("1ère", "première", Prefix),
    ("etc.", "et cetera", Inline),
    ("env.", "environ", Inline),
    ("J.-C.", "Jésus-Christ", Inline),
    ("av. J.-C.", "avant Jésus-Christ", Inline),
    ("apr. J.-C.", "après Jésus-Christ", Inline),
];

static BUILTIN_TABLE: Lazy<Arc<AbbreviationTable>> =
    Lazy::new(|| Arc::new(AbbreviationTable::builtin()));

/// Shared, read-only built-in table
pub fn builtin_table() -> Arc<AbbreviationTable> {
    Arc::clone(&BUILTIN_TABLE)
}

/// Per-language abbreviation table
///
/// Built once (built-ins plus optional overrides) and then shared immutably
/// behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    by_language: HashMap<Language, Vec<Abbreviation>>,
}

/// Entry in an override file: either a bare expansion or a detailed form
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverrideEntry {
    Plain(String),
    Detailed {
        expansion: String,
        #[serde(default)]
        kind: Option<AbbreviationKind>,
    },
}

impl AbbreviationTable {
    /// Empty table; every language passes through
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in English and French tables
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (language, entries) in [(Language::En, EN_ABBREVIATIONS), (Language::Fr, FR_ABBREVIATIONS)] {
            for (token, expansion, kind) in entries {
                table.insert(language, *token, *expansion, *kind);
            }
        }
        table
    }

    /// Add or replace an entry
    pub fn insert(
        &mut self,
        language: Language,
        token: impl Into<String>,
        expansion: impl Into<String>,
        kind: AbbreviationKind,
    ) {
        let token = token.into();
        if token.is_empty() {
            return;
        }
        let entries = self.by_language.entry(language).or_default();
        entries.retain(|e| e.token != token);
        entries.push(Abbreviation {
            token,
            expansion: expansion.into(),
            kind,
        });
        // Longest match first
        entries.sort_by(|a, b| b.token.len().cmp(&a.token.len()).then_with(|| a.token.cmp(&b.token)));
    }

    /// Merge entries from a YAML file keyed by language code
    ///
    /// ```yaml
    /// en:
    ///   "Ave.": Avenue
    ///   "approx.": { expansion: approximately, kind: inline }
    /// es:
    ///   "Sr.": Señor
    /// ```
    pub fn load_overrides<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TtsError::Io {
            message: format!("cannot read abbreviations file: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        let raw: HashMap<String, HashMap<String, OverrideEntry>> =
            serde_yaml::from_str(&content).map_err(|e| TtsError::Config {
                message: format!("invalid abbreviations file: {}", e),
                path: Some(path.to_path_buf()),
            })?;

        let mut count = 0;
        for (code, entries) in raw {
            let language: Language = code.parse().map_err(|_| TtsError::Config {
                message: format!("unknown language '{}' in abbreviations file", code),
                path: Some(path.to_path_buf()),
            })?;
            for (token, entry) in entries {
                let (expansion, kind) = match entry {
                    OverrideEntry::Plain(expansion) => (expansion, Prefix),
                    OverrideEntry::Detailed { expansion, kind } => (expansion, kind.unwrap_or(Prefix)),
                };
                self.insert(language, token, expansion, kind);
                count += 1;
            }
        }
        debug!(path = %path.display(), entries = count, "loaded abbreviation overrides");
        Ok(count)
    }

    /// Entries for a language, longest token first
    pub fn entries(&self, language: Language) -> Option<&[Abbreviation]> {
        self.by_language.get(&language).map(Vec::as_slice)
    }

    pub fn has_language(&self, language: Language) -> bool {
        self.by_language.contains_key(&language)
    }
}

/// Language-tagged text ready for segmentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    language: Language,
}

impl NormalizedText {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text normalizer bound to an abbreviation table
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    table: Arc<AbbreviationTable>,
    /// Spell out English numbers
    expand_numbers: bool,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Normalizer over the built-in table
    pub fn new() -> Self {
        Self::with_table(builtin_table())
    }

    pub fn with_table(table: Arc<AbbreviationTable>) -> Self {
        Self {
            table,
            expand_numbers: false,
        }
    }

    pub fn with_number_expansion(mut self, enabled: bool) -> Self {
        self.expand_numbers = enabled;
        self
    }

    pub fn table(&self) -> &AbbreviationTable {
        &self.table
    }

    /// Normalize input text for a language
    pub fn normalize(&self, raw: &str, language: Language) -> NormalizedText {
        let Some(entries) = self.table.entries(language) else {
            warn!(
                language = %language,
                "no abbreviation table for language, text left unexpanded"
            );
            return NormalizedText::new(raw, language);
        };

        let mut text = normalize_punctuation(raw);
        text = expand_abbreviations(&text, entries);
        if self.expand_numbers && language == Language::En {
            text = normalize_numbers(&text);
        }
        text = normalize_whitespace(&text);

        NormalizedText::new(text, language)
    }
}

/// Normalize with the built-in table
pub fn normalize(raw: &str, language: Language) -> NormalizedText {
    TextNormalizer::new().normalize(raw, language)
}

/// Replace table tokens that stand alone as words
fn expand_abbreviations(text: &str, entries: &[Abbreviation]) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut pos = 0;
    let mut prev: Option<char> = None;

    while pos < text.len() {
        let rest = &text[pos..];
        let at_word_start = prev.map_or(true, |c| !c.is_alphanumeric());

        if at_word_start {
            let matched = entries.iter().find(|e| {
                rest.starts_with(e.token.as_str())
                    && rest[e.token.len()..]
                        .chars()
                        .next()
                        .map_or(true, |c| !c.is_alphanumeric())
            });
            if let Some(entry) = matched {
                let after = &rest[entry.token.len()..];
                out.push_str(&entry.expansion);
                if entry.closes_sentence(after) && !entry.expansion.ends_with(['.', '!', '?']) {
                    out.push('.');
                }
                pos += entry.token.len();
                prev = entry.token.chars().last();
                continue;
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        out.push(c);
        pos += c.len_utf8();
        prev = Some(c);
    }

    out
}

/// Normalize punctuation for TTS
fn normalize_punctuation(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}', '\u{201E}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{2014}', '\u{2013}'], ", ")
        .replace('\u{2026}', "...")
        .replace(['*', '_', '~'], "")
}

/// Collapse whitespace runs, trim, and pull stray commas onto the previous word
fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = true;

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }

    if result.ends_with(' ') {
        result.pop();
    }

    result.replace(" ,", ",")
}

/// Convert numbers to their word representations
fn normalize_numbers(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let after_word = prev.is_some_and(char::is_alphanumeric);
        // A minus sign only counts at the start of a word
        let negative = chars[i] == '-'
            && prev.map_or(true, char::is_whitespace)
            && chars.get(i + 1).is_some_and(char::is_ascii_digit);

        if !after_word && (chars[i].is_ascii_digit() || negative) {
            let start = i;
            if negative {
                i += 1;
            }

            let mut num_str = String::new();
            let mut has_decimal = false;
            while i < chars.len() {
                let c = chars[i];
                let decimal_point = c == '.'
                    && !has_decimal
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit);
                if !c.is_ascii_digit() && !decimal_point {
                    break;
                }
                has_decimal |= decimal_point;
                num_str.push(c);
                i += 1;
            }

            match number_to_words(&num_str, negative) {
                Some(words) => result.push_str(&words),
                None => result.extend(&chars[start..i]),
            }
        } else {
            result.push(chars[i]);
            i += 1;
        }
    }

    result
}

/// Convert a number string to words
fn number_to_words(num_str: &str, negative: bool) -> Option<String> {
    let mut result = String::new();
    if negative {
        result.push_str("negative ");
    }

    match num_str.split_once('.') {
        Some((integer, decimals)) => {
            result.push_str(&integer_to_words(integer.parse().ok()?));
            result.push_str(" point ");
            result.push_str(&digits_to_words(decimals));
        }
        None => result.push_str(&integer_to_words(num_str.parse().ok()?)),
    }

    Some(result)
}

/// Convert integer to words
fn integer_to_words(num: u64) -> String {
    if num == 0 {
        return "zero".to_string();
    }

    const ONES: [&str; 20] = [
        "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
        "eighteen", "nineteen",
    ];
    const TENS: [&str; 10] = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    const SCALES: [(u64, &str); 3] = [
        (1_000_000_000, "billion"),
        (1_000_000, "million"),
        (1_000, "thousand"),
    ];

    let mut n = num;
    let mut parts = Vec::new();

    for (scale, name) in SCALES {
        if n >= scale {
            parts.push(format!("{} {}", integer_to_words(n / scale), name));
            n %= scale;
        }
    }

    if n >= 100 {
        parts.push(format!("{} hundred", ONES[(n / 100) as usize]));
        n %= 100;
    }

    if n >= 20 {
        let (t, o) = ((n / 10) as usize, (n % 10) as usize);
        if o > 0 {
            parts.push(format!("{}-{}", TENS[t], ONES[o]));
        } else {
            parts.push(TENS[t].to_string());
        }
    } else if n > 0 {
        parts.push(ONES[n as usize].to_string());
    }

    parts.join(" ")
}

/// Convert decimal digits to individual words
fn digits_to_words(digits: &str) -> String {
    const DIGITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    digits
        .chars()
        .filter_map(|c| c.to_digit(10).map(|d| DIGITS[d as usize]))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn en(text: &str) -> String {
        normalize(text, Language::En).into_string()
    }

    fn fr(text: &str) -> String {
        normalize(text, Language::Fr).into_string()
    }

    #[test]
    fn test_basic_normalization() {
        assert_eq!(en("Hello, world!"), "Hello, world!");
        assert_eq!(en("  hello   world  "), "hello world");
        assert_eq!(en(""), "");
        assert_eq!(en("   "), "");
    }

    #[test]
    fn test_abbreviation_expansion() {
        assert_eq!(en("Dr. Smith"), "Doctor Smith");
        assert_eq!(en("Mr. Jones and Mrs. Jones"), "Mister Jones and Missus Jones");
        assert_eq!(fr("M. Dupont et Mme Durand"), "Monsieur Dupont et Madame Durand");
        assert_eq!(fr("Mlles Martin"), "Mesdemoiselles Martin");
    }

    #[test]
    fn test_word_boundaries() {
        // "Dr." inside a larger word is left alone
        assert_eq!(en("CDr. test"), "CDr. test");
        assert_eq!(fr("Drôme"), "Drôme");
        assert_eq!(fr("Mmeline"), "Mmeline");
        assert_eq!(fr("Prix"), "Prix");
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(en("dr. who"), "dr. who");
    }

    #[test]
    fn test_inline_abbreviation_keeps_sentence_end() {
        assert_eq!(
            en("Dr. Smith arrived at 5 p.m. Thank you."),
            "Doctor Smith arrived at 5 PM. Thank you."
        );
        assert_eq!(en("Meet at 7 a.m. tomorrow"), "Meet at 7 AM tomorrow");
        assert_eq!(en("apples, pears, etc."), "apples, pears, et cetera.");
        assert_eq!(fr("Né en 52 av. J.-C. Il régna"), "Né en 52 avant Jésus-Christ. Il régna");
    }

    #[test]
    fn test_prefix_abbreviation_never_adds_stop() {
        assert_eq!(en("See e.g. Paris"), "See for example Paris");
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(en("\u{201C}Hi\u{201D} \u{2014} she said\u{2026}"), "\"Hi\", she said...");
        assert_eq!(en("*bold* and _under_"), "bold and under");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Dr. Smith arrived at 5 p.m. Thank you.",
            "  Odd   spacing \u{2014} and dashes , commas ",
            "etc. etc. e.g. i.e.",
            "",
        ];
        for input in inputs {
            let once = en(input);
            assert_eq!(en(&once), once, "not idempotent for {input:?}");
        }
        let once = fr("M. et Mme Dupont, p. ex. le 1er mai, etc.");
        assert_eq!(fr(&once), once);
    }

    #[test]
    fn test_unsupported_language_passthrough() {
        let raw = "  Sr. García   llegó.  ";
        let normalized = normalize(raw, Language::Es);
        assert_eq!(normalized.as_str(), raw);
        assert_eq!(normalized.language(), Language::Es);
    }

    #[test]
    fn test_number_expansion() {
        let normalizer = TextNormalizer::new().with_number_expansion(true);
        let n = |t: &str| normalizer.normalize(t, Language::En).into_string();
        assert_eq!(n("I have 5 apples"), "I have five apples");
        assert_eq!(n("It is -3 degrees"), "It is negative three degrees");
        assert_eq!(n("pi is 3.14"), "pi is three point one four");
        assert_eq!(n("Count to 5."), "Count to five.");
        assert_eq!(n("well-5"), "well-five");
        assert_eq!(n("B52 bomber"), "B52 bomber");
        assert!(n("Population is 5000000").contains("million"));

        // Numbers are only spelled out for English
        let french = normalizer.normalize("J'ai 5 pommes", Language::Fr);
        assert_eq!(french.as_str(), "J'ai 5 pommes");
    }

    #[test]
    fn test_integer_conversion() {
        assert_eq!(integer_to_words(0), "zero");
        assert_eq!(integer_to_words(13), "thirteen");
        assert_eq!(integer_to_words(21), "twenty-one");
        assert_eq!(integer_to_words(123), "one hundred twenty-three");
        assert_eq!(integer_to_words(1000), "one thousand");
        assert_eq!(integer_to_words(2_000_017), "two million seventeen");
    }

    #[test]
    fn test_table_insert_replaces() {
        let mut table = AbbreviationTable::empty();
        table.insert(Language::Es, "Sr.", "Señor", Prefix);
        table.insert(Language::Es, "Sr.", "Senior", Prefix);
        assert_eq!(table.entries(Language::Es).unwrap().len(), 1);
        assert!(!table.has_language(Language::Ko));

        let normalizer = TextNormalizer::with_table(Arc::new(table));
        assert_eq!(normalizer.normalize("Sr. López", Language::Es).as_str(), "Senior López");
    }

    #[test]
    fn test_longest_match_first() {
        let table = AbbreviationTable::builtin();
        let entries = table.entries(Language::Fr).unwrap();
        let pos = |t: &str| entries.iter().position(|e| e.token == t).unwrap();
        assert!(pos("Mmes") < pos("Mme"));
        assert!(pos("av. J.-C.") < pos("J.-C."));
    }

    #[test]
    fn test_load_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "es:\n  \"Sr.\": Señor\n  \"aprox.\": {{ expansion: aproximadamente, kind: inline }}"
        )
        .unwrap();

        let mut table = AbbreviationTable::builtin();
        assert_eq!(table.load_overrides(file.path()).unwrap(), 2);

        let normalizer = TextNormalizer::with_table(Arc::new(table));
        assert_eq!(
            normalizer.normalize("Sr. Ruiz, 5 aprox. Gracias", Language::Es).as_str(),
            "Señor Ruiz, 5 aproximadamente. Gracias"
        );
    }

    #[test]
    fn test_load_overrides_unknown_language() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "de:\n  \"Hr.\": Herr").unwrap();
        let err = AbbreviationTable::empty().load_overrides(file.path()).unwrap_err();
        assert_eq!(err.code(), "config_error");
    }
}
