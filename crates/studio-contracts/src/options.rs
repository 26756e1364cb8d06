use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const SUPPORTED_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

/// Output aspect ratio, always one of the ratios the image backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio(&'static str);

impl AspectRatio {
    pub const PORTRAIT: Self = Self("9:16");
    pub const LANDSCAPE: Self = Self("16:9");
    pub const SQUARE: Self = Self("1:1");

    /// Parses `W:H` (or `W/H`) and the words portrait, landscape and square.
    ///
    /// Ratios outside the supported set snap to the nearest supported one.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('/', ":");
        match normalized.as_str() {
            "" => return None,
            "portrait" | "tall" => return Some(Self::PORTRAIT),
            "landscape" | "wide" => return Some(Self::LANDSCAPE),
            "square" => return Some(Self::SQUARE),
            _ => {}
        }
        if let Some((name, _)) = SUPPORTED_RATIOS
            .iter()
            .find(|(candidate, _)| *candidate == normalized)
        {
            return Some(Self(*name));
        }

        let (left, right) = normalized.split_once(':')?;
        let left = left.trim().parse::<f64>().ok().filter(|v| *v > 0.0)?;
        let right = right.trim().parse::<f64>().ok().filter(|v| *v > 0.0)?;
        let target = left / right;

        let mut best = SUPPORTED_RATIOS[0].0;
        let mut best_delta = f64::MAX;
        for (name, ratio) in SUPPORTED_RATIOS {
            let delta = (ratio - target).abs();
            if delta < best_delta {
                best = name;
                best_delta = delta;
            }
        }
        tracing::warn!(requested = %raw, snapped = best, "aspect ratio snapped");
        Some(Self(best))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("unsupported aspect ratio '{raw}'"))
    }
}

/// Output resolution tier requested from the image backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[default]
    #[serde(rename = "4K")]
    FourK,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionTier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Self::OneK),
            "2K" => Ok(Self::TwoK),
            "4K" => Ok(Self::FourK),
            _ => Err(format!("unsupported resolution tier '{raw}' (expected 1K, 2K or 4K)")),
        }
    }
}
