//! Closed vocabulary of the signals the two pillars can emit.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ticks::{Parity, PriceColor};

/// Label shown while no pillar has a decision
pub const SCANNING_LABEL: &str = "SCANNING...";

/// Base confidence of a pattern-pillar match before weighting
pub const PATTERN_BASE_CONFIDENCE: f64 = 90.0;

/// Base confidence of a cycling-pillar match before weighting
pub const CYCLING_BASE_CONFIDENCE: f64 = 80.0;

/// Predicted price direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Which pillar produced the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSource {
    Pattern,
    Cycling,
    None,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Pattern => write!(f, "PATTERN"),
            SignalSource::Cycling => write!(f, "CYCLING"),
            SignalSource::None => write!(f, "NONE"),
        }
    }
}

/// Every signal label either pillar can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternId {
    #[serde(rename = "CYCLING: GREEN EVEN STEP UP")]
    CyclingGreenEvenStepUp,
    #[serde(rename = "CYCLING: GREEN ODD STEP UP")]
    CyclingGreenOddStepUp,
    #[serde(rename = "CYCLING: GREEN EVEN REVERSAL")]
    CyclingGreenEvenReversal,
    #[serde(rename = "CYCLING: GREEN ODD REVERSAL")]
    CyclingGreenOddReversal,
    #[serde(rename = "CYCLING: RED EVEN STEP DOWN")]
    CyclingRedEvenStepDown,
    #[serde(rename = "CYCLING: RED ODD STEP DOWN")]
    CyclingRedOddStepDown,
    #[serde(rename = "CYCLING: RED EVEN REVERSAL")]
    CyclingRedEvenReversal,
    #[serde(rename = "CYCLING: RED ODD REVERSAL")]
    CyclingRedOddReversal,
    #[serde(rename = "PATTERN: G-ODD-UP / R-EVEN-UP")]
    GreenOddUpRedEvenUp,
    #[serde(rename = "PATTERN: R-ODD-UP / G-EVEN-UP")]
    RedOddUpGreenEvenUp,
    #[serde(rename = "PATTERN: R-ODD-REV / G-EVEN-UP")]
    RedOddRevGreenEvenUp,
    #[serde(rename = "PATTERN: G-EVEN-REV / R-ODD-UP")]
    GreenEvenRevRedOddUp,
}

impl PatternId {
    pub const ALL: [PatternId; 12] = [
        PatternId::CyclingGreenEvenStepUp,
        PatternId::CyclingGreenOddStepUp,
        PatternId::CyclingGreenEvenReversal,
        PatternId::CyclingGreenOddReversal,
        PatternId::CyclingRedEvenStepDown,
        PatternId::CyclingRedOddStepDown,
        PatternId::CyclingRedEvenReversal,
        PatternId::CyclingRedOddReversal,
        PatternId::GreenOddUpRedEvenUp,
        PatternId::RedOddUpGreenEvenUp,
        PatternId::RedOddRevGreenEvenUp,
        PatternId::GreenEvenRevRedOddUp,
    ];

    /// Cycling label for the current tick's colour and parity and whether
    /// its digit rose against the previous same-class tick.
    pub fn cycling(color: PriceColor, parity: Parity, rising: bool) -> Self {
        use Parity::*;
        use PriceColor::*;
        match (color, parity, rising) {
            (Green, Even, true) => PatternId::CyclingGreenEvenStepUp,
            (Green, Odd, true) => PatternId::CyclingGreenOddStepUp,
            (Green, Even, false) => PatternId::CyclingGreenEvenReversal,
            (Green, Odd, false) => PatternId::CyclingGreenOddReversal,
            (Red, Even, true) => PatternId::CyclingRedEvenStepDown,
            (Red, Odd, true) => PatternId::CyclingRedOddStepDown,
            (Red, Even, false) => PatternId::CyclingRedEvenReversal,
            (Red, Odd, false) => PatternId::CyclingRedOddReversal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatternId::CyclingGreenEvenStepUp => "CYCLING: GREEN EVEN STEP UP",
            PatternId::CyclingGreenOddStepUp => "CYCLING: GREEN ODD STEP UP",
            PatternId::CyclingGreenEvenReversal => "CYCLING: GREEN EVEN REVERSAL",
            PatternId::CyclingGreenOddReversal => "CYCLING: GREEN ODD REVERSAL",
            PatternId::CyclingRedEvenStepDown => "CYCLING: RED EVEN STEP DOWN",
            PatternId::CyclingRedOddStepDown => "CYCLING: RED ODD STEP DOWN",
            PatternId::CyclingRedEvenReversal => "CYCLING: RED EVEN REVERSAL",
            PatternId::CyclingRedOddReversal => "CYCLING: RED ODD REVERSAL",
            PatternId::GreenOddUpRedEvenUp => "PATTERN: G-ODD-UP / R-EVEN-UP",
            PatternId::RedOddUpGreenEvenUp => "PATTERN: R-ODD-UP / G-EVEN-UP",
            PatternId::RedOddRevGreenEvenUp => "PATTERN: R-ODD-REV / G-EVEN-UP",
            PatternId::GreenEvenRevRedOddUp => "PATTERN: G-EVEN-REV / R-ODD-UP",
        }
    }

    pub fn source(&self) -> SignalSource {
        match self {
            PatternId::GreenOddUpRedEvenUp
            | PatternId::RedOddUpGreenEvenUp
            | PatternId::RedOddRevGreenEvenUp
            | PatternId::GreenEvenRevRedOddUp => SignalSource::Pattern,
            _ => SignalSource::Cycling,
        }
    }

    pub fn base_confidence(&self) -> f64 {
        match self.source() {
            SignalSource::Pattern => PATTERN_BASE_CONFIDENCE,
            _ => CYCLING_BASE_CONFIDENCE,
        }
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for PatternId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternId::ALL
            .iter()
            .find(|p| p.label() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown pattern label: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for pattern in PatternId::ALL {
            assert_eq!(pattern.label().parse::<PatternId>().unwrap(), pattern);
        }
        assert!(SCANNING_LABEL.parse::<PatternId>().is_err());
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&PatternId::GreenOddUpRedEvenUp).unwrap();
        assert_eq!(json, "\"PATTERN: G-ODD-UP / R-EVEN-UP\"");
    }

    #[test]
    fn test_sources_and_confidence() {
        assert_eq!(PatternId::CyclingRedOddReversal.source(), SignalSource::Cycling);
        assert_eq!(PatternId::CyclingRedOddReversal.base_confidence(), 80.0);
        assert_eq!(PatternId::RedOddRevGreenEvenUp.source(), SignalSource::Pattern);
        assert_eq!(PatternId::RedOddRevGreenEvenUp.base_confidence(), 90.0);
    }

    #[test]
    fn test_cycling_labels() {
        let p = PatternId::cycling(PriceColor::Green, Parity::Odd, true);
        assert_eq!(p.label(), "CYCLING: GREEN ODD STEP UP");
        let p = PatternId::cycling(PriceColor::Red, Parity::Even, false);
        assert_eq!(p.label(), "CYCLING: RED EVEN REVERSAL");
    }
}
