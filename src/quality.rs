use std::fmt::Display;

/// Coarse output quality requested by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Encoder settings for a quality level. A lower `crf` means higher visual
/// quality and a larger file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityParameters {
    pub crf: u8,
    pub preset: &'static str,
}

impl Quality {
    /// Case-insensitive lookup; anything unrecognised is `Medium`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Quality::Low,
            "high" => Quality::High,
            _ => Quality::Medium,
        }
    }

    pub fn parameters(&self) -> QualityParameters {
        match self {
            Quality::Low => QualityParameters { crf: 28, preset: "fast" },
            Quality::Medium => QualityParameters { crf: 23, preset: "medium" },
            Quality::High => QualityParameters { crf: 18, preset: "slow" },
        }
    }

    pub fn args(&self) -> Vec<String> {
        let p = self.parameters();
        vec![
            String::from("-crf"), p.crf.to_string(),
            String::from("-preset"), String::from(p.preset),
        ]
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}
