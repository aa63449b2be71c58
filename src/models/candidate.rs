use serde::{Deserialize, Serialize};

/// Barcode symbology reported by a decode engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Symbology {
    Code128,
    Ean13,
    Ean8,
    Code39,
    Codabar,
    UpcA,
    UpcE,
    Itf,
    /// Anything else the engine can read, by its engine-side name.
    Other(String),
}

impl Symbology {
    /// The linear symbologies package labels are printed with.
    pub const PACKAGE_SET: [Symbology; 8] = [
        Symbology::Code128,
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::Code39,
        Symbology::Codabar,
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::Itf,
    ];

    /// Map a common engine name (`CODE_128`, `ean13`, `I2of5`, ...) to a symbology.
    pub fn from_engine_name(name: &str) -> Self {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match key.as_str() {
            "CODE128" => Symbology::Code128,
            "EAN13" => Symbology::Ean13,
            "EAN8" => Symbology::Ean8,
            "CODE39" => Symbology::Code39,
            "CODABAR" => Symbology::Codabar,
            "UPCA" => Symbology::UpcA,
            "UPCE" => Symbology::UpcE,
            "ITF" | "I2OF5" | "INTERLEAVED2OF5" => Symbology::Itf,
            _ => Symbology::Other(name.to_string()),
        }
    }
}

/// One frame's decode result, not yet trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecodedCandidate {
    pub raw_text: String,
    pub symbology: Symbology,
    /// Engine-specific confidence, when the engine reports one.
    pub frame_confidence: Option<f32>,
}

impl DecodedCandidate {
    pub fn new(raw_text: impl Into<String>, symbology: Symbology) -> Self {
        Self {
            raw_text: raw_text.into(),
            symbology,
            frame_confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.frame_confidence = Some(confidence);
        self
    }
}
