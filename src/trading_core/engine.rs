//! Decision engine: history + pillars + weights -> one Scene per tick.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::learning::PatternWeights;
use super::patterns::{Direction, PatternId, SignalSource, SCANNING_LABEL};
use super::signals::{cycling_signal, pattern_signal, PillarSignal, CYCLING_MIN_HISTORY};
use super::ticks::{PriceColor, TickHistory};

/// Which pillars may produce decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarConfig {
    pub cycling: bool,
    pub pattern: bool,
}

impl Default for PillarConfig {
    fn default() -> Self {
        Self {
            cycling: true,
            pattern: true,
        }
    }
}

impl PillarConfig {
    /// Exactly one pillar enabled
    pub fn only(pillar: Pillar) -> Self {
        Self {
            cycling: pillar == Pillar::Cycling,
            pattern: pillar == Pillar::Pattern,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Cycling,
    Pattern,
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pillar::Cycling => write!(f, "cycling"),
            Pillar::Pattern => write!(f, "pattern"),
        }
    }
}

/// Order in which rotation mode activates pillars
pub const ROTATION_SEQUENCE: [Pillar; 2] = [Pillar::Cycling, Pillar::Pattern];

/// Read model of the engine's current view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    /// Absent while scanning; serialized as the scanning label
    #[serde(serialize_with = "serialize_pattern_label")]
    pub pattern: Option<PatternId>,
    pub source: SignalSource,
    pub confidence: f64,
    pub decision: Option<Direction>,
}

fn serialize_pattern_label<S>(pattern: &Option<PatternId>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(pattern.map(|p| p.label()).unwrap_or(SCANNING_LABEL))
}

impl Scene {
    pub fn scanning() -> Self {
        Self {
            pattern: None,
            source: SignalSource::None,
            confidence: 0.0,
            decision: None,
        }
    }

    pub fn pattern_label(&self) -> &'static str {
        self.pattern.map(|p| p.label()).unwrap_or(SCANNING_LABEL)
    }

    pub fn has_decision(&self) -> bool {
        self.decision.is_some()
    }
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.decision {
            Some(d) => write!(f, "{} {} ({:.0}%)", d, self.pattern_label(), self.confidence),
            None => write!(f, "{}", self.pattern_label()),
        }
    }
}

/// Owns the tick history and pattern weights.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    history: TickHistory,
    weights: PatternWeights,
    /// Configuration chosen by the operator
    manual: PillarConfig,
    /// Index into ROTATION_SEQUENCE while rotation mode is on
    rotation: Option<usize>,
}

impl DecisionEngine {
    pub fn new(config: PillarConfig) -> Self {
        Self {
            history: TickHistory::new(),
            weights: PatternWeights::new(),
            manual: config,
            rotation: None,
        }
    }

    pub fn push_tick(&mut self, digit: u8, color: PriceColor) {
        self.history.push(digit, color);
    }

    /// Evaluate the current history. `None` until enough ticks are buffered.
    pub fn analyze(&self) -> Option<Scene> {
        if self.history.len() < CYCLING_MIN_HISTORY {
            return None;
        }

        let config = self.active_pillars();
        let signal: Option<PillarSignal> = config
            .pattern
            .then(|| pattern_signal(&self.history))
            .flatten()
            .or_else(|| config.cycling.then(|| cycling_signal(&self.history)).flatten());

        Some(match signal {
            Some(s) => Scene {
                pattern: Some(s.pattern),
                source: s.pattern.source(),
                confidence: self.weights.apply(s.pattern, s.pattern.base_confidence()),
                decision: Some(s.decision),
            },
            None => Scene::scanning(),
        })
    }

    /// Pillars currently allowed to speak
    pub fn active_pillars(&self) -> PillarConfig {
        match self.rotation {
            Some(index) => PillarConfig::only(ROTATION_SEQUENCE[index]),
            None => self.manual,
        }
    }

    /// Replace the manual configuration. Ignored while rotation is on.
    pub fn set_pillars(&mut self, config: PillarConfig) -> bool {
        if self.rotation.is_some() {
            return false;
        }
        self.manual = config;
        true
    }

    pub fn rotation_enabled(&self) -> bool {
        self.rotation.is_some()
    }

    /// Turn rotation on (starting at the first pillar) or off (restoring the
    /// manual configuration).
    pub fn set_rotation(&mut self, enabled: bool) {
        match (enabled, self.rotation) {
            (true, None) => {
                self.rotation = Some(0);
                info!("Pillar rotation ON, active: {}", ROTATION_SEQUENCE[0]);
            }
            (false, Some(_)) => {
                self.rotation = None;
                info!("Pillar rotation OFF");
            }
            _ => {}
        }
    }

    /// Flip to the next pillar in the sequence
    pub fn advance_rotation(&mut self) -> Option<Pillar> {
        let index = self.rotation.as_mut()?;
        *index = (*index + 1) % ROTATION_SEQUENCE.len();
        let pillar = ROTATION_SEQUENCE[*index];
        info!("Pillar rotation -> {}", pillar);
        Some(pillar)
    }

    pub fn active_rotation_pillar(&self) -> Option<Pillar> {
        self.rotation.map(|i| ROTATION_SEQUENCE[i])
    }

    /// Feed a settled trade's outcome back into the weights
    pub fn report_result(&mut self, pattern: PatternId, is_win: bool) -> f64 {
        self.weights.update_weight(pattern, is_win)
    }

    pub fn weights(&self) -> &PatternWeights {
        &self.weights
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    /// Drop buffered ticks. Weights and pillar settings are kept.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PriceColor::{Green as G, Red as R};

    fn engine_with(ticks: &[(u8, PriceColor)], config: PillarConfig) -> DecisionEngine {
        let mut engine = DecisionEngine::new(config);
        for (d, c) in ticks {
            engine.push_tick(*d, *c);
        }
        engine
    }

    // Both pillars match: cycling sees RED EVEN STEP DOWN, pattern sees G-ODD-UP / R-EVEN-UP
    const BOTH: [(u8, PriceColor); 6] = [(5, R), (1, R), (7, G), (9, G), (6, R), (8, R)];

    #[test]
    fn test_no_scene_before_five_ticks() {
        let engine = engine_with(&[(7, G), (9, G), (6, R), (8, R)], PillarConfig::default());
        assert!(engine.analyze().is_none());
    }

    #[test]
    fn test_pattern_preempts_cycling() {
        let engine = engine_with(&BOTH, PillarConfig::default());
        let scene = engine.analyze().unwrap();
        assert_eq!(scene.source, SignalSource::Pattern);
        assert_eq!(scene.pattern, Some(PatternId::GreenOddUpRedEvenUp));
        assert_eq!(scene.decision, Some(Direction::Down));
        assert_eq!(scene.confidence, 90.0);
    }

    #[test]
    fn test_cycling_only() {
        let engine = engine_with(&BOTH, PillarConfig::only(Pillar::Cycling));
        let scene = engine.analyze().unwrap();
        assert_eq!(scene.source, SignalSource::Cycling);
        assert_eq!(scene.pattern, Some(PatternId::CyclingRedEvenStepDown));
        assert_eq!(scene.confidence, 80.0);
    }

    #[test]
    fn test_scene_json_uses_labels() {
        let json = serde_json::to_value(Scene::scanning()).unwrap();
        assert_eq!(json["pattern"], "SCANNING...");
        assert_eq!(json["decision"], serde_json::Value::Null);

        let engine = engine_with(&BOTH, PillarConfig::default());
        let json = serde_json::to_value(engine.analyze().unwrap()).unwrap();
        assert_eq!(json["pattern"], "PATTERN: G-ODD-UP / R-EVEN-UP");
    }

    #[test]
    fn test_reset_history_keeps_weights() {
        let mut engine = engine_with(&BOTH, PillarConfig::only(Pillar::Pattern));
        engine.report_result(PatternId::GreenOddUpRedEvenUp, true);
        engine.reset_history();

        assert!(engine.history().is_empty());
        assert!(engine.analyze().is_none());
        assert!((engine.weights().weight(PatternId::GreenOddUpRedEvenUp) - 1.1).abs() < 1e-9);
        assert_eq!(engine.active_pillars(), PillarConfig::only(Pillar::Pattern));
    }

    #[test]
    fn test_all_pillars_disabled_scans() {
        let config = PillarConfig {
            cycling: false,
            pattern: false,
        };
        let engine = engine_with(&BOTH, config);
        let scene = engine.analyze().unwrap();
        assert_eq!(scene, Scene::scanning());
        assert_eq!(scene.pattern_label(), SCANNING_LABEL);
        assert_eq!(scene.confidence, 0.0);
    }

    #[test]
    fn test_confidence_uses_weights() {
        let mut engine = engine_with(&BOTH, PillarConfig::default());
        engine.report_result(PatternId::GreenOddUpRedEvenUp, false);
        let scene = engine.analyze().unwrap();
        assert!((scene.confidence - 81.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let engine = engine_with(&BOTH, PillarConfig::default());
        assert_eq!(engine.analyze(), engine.analyze());
        let clone = engine.clone();
        assert_eq!(engine.analyze(), clone.analyze());
    }

    #[test]
    fn test_rotation() {
        let mut engine = engine_with(&BOTH, PillarConfig::default());
        engine.set_rotation(true);
        assert_eq!(engine.active_pillars(), PillarConfig::only(Pillar::Cycling));
        assert_eq!(engine.analyze().unwrap().source, SignalSource::Cycling);

        // Manual changes are ignored while rotating
        assert!(!engine.set_pillars(PillarConfig::only(Pillar::Pattern)));

        assert_eq!(engine.advance_rotation(), Some(Pillar::Pattern));
        assert_eq!(engine.analyze().unwrap().source, SignalSource::Pattern);
        assert_eq!(engine.advance_rotation(), Some(Pillar::Cycling));

        engine.set_rotation(false);
        assert_eq!(engine.active_pillars(), PillarConfig::default());
        assert_eq!(engine.advance_rotation(), None);
    }
}
