//! Language identification for incoming messages

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a detection produced no language
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectionError {
    #[error("no text to detect a language from")]
    EmptyInput,

    #[error("language could not be identified")]
    Undetermined,
}

/// Detects the language of a text. Implementations are stateless.
pub trait LanguageDetector: Send + Sync {
    /// Return a language code (ISO 639-1 where one exists)
    fn detect(&self, text: &str) -> Result<String, DetectionError>;
}

/// Language tag carried by each conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum LanguageTag {
    /// Detected language code
    Code(String),
    /// Detection ran and failed
    Unknown,
    /// No detection applies (error replies)
    None,
}

impl LanguageTag {
    pub fn from_detection(result: Result<String, DetectionError>) -> Self {
        match result {
            Ok(code) => LanguageTag::Code(code),
            Err(_) => LanguageTag::Unknown,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            LanguageTag::Code(code) => Some(code),
            _ => None,
        }
    }
}

/// Statistical detector backed by `whatlang`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl WhatlangDetector {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String, DetectionError> {
        if text.trim().is_empty() {
            return Err(DetectionError::EmptyInput);
        }

        let info = whatlang::detect(text).ok_or(DetectionError::Undetermined)?;
        Ok(short_code(info.lang()).to_string())
    }
}

/// Two-letter code for the languages users are expected to write in,
/// the library's three-letter code otherwise.
fn short_code(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;

    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Vie => "vi",
        Lang::Tha => "th",
        Lang::Ind => "id",
        Lang::Hin => "hi",
        Lang::Tel => "te",
        Lang::Tam => "ta",
        Lang::Kan => "kn",
        Lang::Mal => "ml",
        Lang::Mar => "mr",
        Lang::Guj => "gu",
        Lang::Ben => "bn",
        Lang::Urd => "ur",
        Lang::Pan => "pa",
        Lang::Ori => "or",
        Lang::Nep => "ne",
        other => other.code(),
    }
}

/// Display label for a turn's language
pub fn language_label(tag: &LanguageTag) -> String {
    match tag {
        LanguageTag::Code(code) => {
            let name = match code.as_str() {
                "en" => Some("English"),
                "hi" => Some("Hindi"),
                "te" => Some("Telugu"),
                "ta" => Some("Tamil"),
                "kn" => Some("Kannada"),
                "ml" => Some("Malayalam"),
                "mr" => Some("Marathi"),
                "gu" => Some("Gujarati"),
                "bn" => Some("Bengali"),
                "ur" => Some("Urdu"),
                _ => None,
            };
            match name {
                Some(name) => format!("{} ({})", name, code),
                None => code.clone(),
            }
        }
        LanguageTag::Unknown => "Unknown".to_string(),
        LanguageTag::None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_spanish() {
        let detector = WhatlangDetector::new();
        let code = detector
            .detect("Hola, ¿cómo estás? Espero que tengas un buen día y que todo vaya bien en tu trabajo.")
            .unwrap();
        assert_eq!(code, "es");
    }

    #[test]
    fn test_detects_english() {
        let detector = WhatlangDetector::new();
        let code = detector
            .detect("The weather is lovely today and I would like to go for a long walk in the park.")
            .unwrap();
        assert_eq!(code, "en");
    }

    #[test]
    fn test_empty_input_fails() {
        let detector = WhatlangDetector::new();
        assert_eq!(detector.detect("   "), Err(DetectionError::EmptyInput));
    }

    #[test]
    fn test_failure_maps_to_unknown() {
        let tag = LanguageTag::from_detection(Err(DetectionError::Undetermined));
        assert_eq!(tag, LanguageTag::Unknown);
        assert_eq!(tag.code(), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(language_label(&LanguageTag::Code("hi".into())), "Hindi (hi)");
        assert_eq!(language_label(&LanguageTag::Code("es".into())), "es");
        assert_eq!(language_label(&LanguageTag::Unknown), "Unknown");
        assert_eq!(language_label(&LanguageTag::None), "");
    }
}
