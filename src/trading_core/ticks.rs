//! Tick observations and the rolling history read by the signal pillars.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Observations kept for pattern detection
pub const HISTORY_CAPACITY: usize = 20;

/// Decimal places assumed when the broker does not report a pip size
pub const DEFAULT_PIP_SIZE: u32 = 3;

/// Direction of a price move relative to the previous tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceColor {
    Green,
    Red,
}

impl PriceColor {
    /// Colour of `quote` against the previous quote. Unchanged prices and the
    /// very first tick count as green.
    pub fn from_move(previous: Option<f64>, quote: f64) -> Self {
        match previous {
            Some(prev) if quote < prev => PriceColor::Red,
            _ => PriceColor::Green,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PriceColor::Green => "GREEN",
            PriceColor::Red => "RED",
        }
    }
}

impl std::fmt::Display for PriceColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of(digit: u8) -> Self {
        if digit % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Parity::Even => "EVEN",
            Parity::Odd => "ODD",
        }
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One (last digit, colour) observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickObservation {
    pub digit: u8,
    pub color: PriceColor,
}

impl TickObservation {
    pub fn new(digit: u8, color: PriceColor) -> Self {
        debug_assert!(digit < 10, "last digit out of range: {}", digit);
        Self { digit, color }
    }

    pub fn parity(&self) -> Parity {
        Parity::of(self.digit)
    }

    pub fn is_even(&self) -> bool {
        self.parity() == Parity::Even
    }

    pub fn is_odd(&self) -> bool {
        self.parity() == Parity::Odd
    }
}

/// Last decimal digit of `quote` when printed with the broker's pip size.
///
/// A pip size of zero is treated like a missing one.
pub fn last_digit(quote: f64, pip_size: Option<u32>) -> u8 {
    let decimals = pip_size.filter(|p| *p > 0).unwrap_or(DEFAULT_PIP_SIZE) as usize;
    format!("{:.*}", decimals, quote)
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0) as u8
}

/// Fixed-capacity FIFO of the most recent observations.
///
/// Digits and colours live in one record so they are always evicted together.
#[derive(Debug, Clone)]
pub struct TickHistory {
    entries: VecDeque<TickObservation>,
}

impl Default for TickHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Append an observation, evicting the oldest beyond capacity
    pub fn push(&mut self, digit: u8, color: PriceColor) {
        self.entries.push_back(TickObservation::new(digit, color));
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<TickObservation> {
        self.entries.back().copied()
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TickObservation> {
        self.entries.iter()
    }

    /// The `N` newest observations, oldest first
    pub fn tail<const N: usize>(&self) -> Option<[TickObservation; N]> {
        if self.entries.len() < N {
            return None;
        }
        let start = self.entries.len() - N;
        let mut out = [TickObservation::new(0, PriceColor::Green); N];
        for (slot, obs) in out.iter_mut().zip(self.entries.range(start..)) {
            *slot = *obs;
        }
        Some(out)
    }

    pub fn digits(&self) -> Vec<u8> {
        self.entries.iter().map(|o| o.digit).collect()
    }

    pub fn colors(&self) -> Vec<PriceColor> {
        self.entries.iter().map(|o| o.color).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Tick record kept for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickData {
    pub id: String,
    pub quote: f64,
    pub last_digit: u8,
    pub color: PriceColor,
    pub epoch: i64,
}
