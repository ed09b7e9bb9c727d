//! Signal pillars
//!
//! Two independent heuristics over the tick history:
//! - Cycling: compares the newest tick with the most recent tick of the
//!   same colour and digit parity
//! - Pattern: matches fixed four-tick signatures of parity, digit steps and
//!   colour context
//!
//! Both are pure functions of the history.

use super::patterns::{Direction, PatternId};
use super::ticks::{PriceColor, TickHistory, TickObservation};

/// Minimum history before the cycling pillar (and the engine) will speak
pub const CYCLING_MIN_HISTORY: usize = 5;

/// Ticks examined by the pattern pillar
pub const PATTERN_WINDOW: usize = 4;

/// A pillar's raw output before weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PillarSignal {
    pub pattern: PatternId,
    pub decision: Direction,
}

/// `b` is two above `a`, wrapping 9→1 and 8→0
pub fn step_up(a: u8, b: u8) -> bool {
    b == a + 2 || (a == 9 && b == 1) || (a == 8 && b == 0)
}

/// `b` is two below `a`, wrapping 1→9 and 0→8
pub fn step_down(a: u8, b: u8) -> bool {
    b + 2 == a || (a == 1 && b == 9) || (a == 0 && b == 8)
}

/// Cycling pillar.
///
/// | colour | digit vs previous | decision |
/// |--------|-------------------|----------|
/// | green  | rising            | UP       |
/// | green  | falling           | DOWN     |
/// | red    | rising            | DOWN     |
/// | red    | falling           | UP       |
pub fn cycling_signal(history: &TickHistory) -> Option<PillarSignal> {
    if history.len() < CYCLING_MIN_HISTORY {
        return None;
    }

    let current = history.latest()?;
    let previous = history
        .iter()
        .rev()
        .skip(1)
        .find(|o| o.color == current.color && o.parity() == current.parity())?;

    let rising = match current.digit.cmp(&previous.digit) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => return None,
    };

    let decision = match (current.color, rising) {
        (PriceColor::Green, true) | (PriceColor::Red, false) => Direction::Up,
        (PriceColor::Green, false) | (PriceColor::Red, true) => Direction::Down,
    };

    Some(PillarSignal {
        pattern: PatternId::cycling(current.color, current.parity(), rising),
        decision,
    })
}

fn any_color(pair: [&TickObservation; 2], color: PriceColor) -> bool {
    pair.iter().any(|o| o.color == color)
}

/// Colour context between two pairs. Permissive: one tick of each pair is
/// enough, so a pair may be mixed.
fn transition(first: [&TickObservation; 2], second: [&TickObservation; 2], from: PriceColor, to: PriceColor) -> bool {
    any_color(first, from) && any_color(second, to)
}

/// Pattern pillar over the four newest ticks. First matching signature wins.
pub fn pattern_signal(history: &TickHistory) -> Option<PillarSignal> {
    let [t1, t2, t3, t4] = history.tail::<PATTERN_WINDOW>()?;
    let first = [&t1, &t2];
    let second = [&t3, &t4];

    let odd_up = t1.is_odd() && t2.is_odd() && step_up(t1.digit, t2.digit);
    let odd_down = t1.is_odd() && t2.is_odd() && step_down(t1.digit, t2.digit);
    let even_down = t1.is_even() && t2.is_even() && step_down(t1.digit, t2.digit);
    let even_up_after = t3.is_even() && t4.is_even() && step_up(t3.digit, t4.digit);
    let odd_up_after = t3.is_odd() && t4.is_odd() && step_up(t3.digit, t4.digit);

    let green_to_red = transition(first, second, PriceColor::Green, PriceColor::Red);
    let red_to_green = transition(first, second, PriceColor::Red, PriceColor::Green);

    let (pattern, decision) = if odd_up && even_up_after && green_to_red {
        (PatternId::GreenOddUpRedEvenUp, Direction::Down)
    } else if odd_up && even_up_after && red_to_green {
        (PatternId::RedOddUpGreenEvenUp, Direction::Up)
    } else if odd_down && even_up_after && red_to_green {
        (PatternId::RedOddRevGreenEvenUp, Direction::Up)
    } else if even_down && odd_up_after && green_to_red {
        (PatternId::GreenEvenRevRedOddUp, Direction::Down)
    } else {
        return None;
    };

    Some(PillarSignal { pattern, decision })
}
