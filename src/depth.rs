//! Depth-aware VWAP
//!
//! Walks one side of a book from the touch, filling a target notional in
//! quote units. All arithmetic is `Decimal`; the partial fill of the last
//! level is exact, so the VWAP never rounds through binary floats.

use rust_decimal::Decimal;

use crate::core::PriceLevel;

/// Result of filling a target notional against one book side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// filled_notional / filled_qty
    pub vwap: Decimal,
    /// Base units consumed
    pub filled_qty: Decimal,
    /// Quote units consumed, equal to the target when fully filled
    pub filled_notional: Decimal,
    /// Book levels walked, including a partially consumed last level
    pub levels_used: usize,
}

/// Fill `target_notional` quote units against `levels`, nearest-to-touch
/// first. Returns `None` when the side cannot cover the target (unfillable)
/// or the target is not positive.
///
/// Callers pass asks when buying and bids when selling; the walk itself is
/// side-agnostic because both sides are ordered best-first.
pub fn vwap(levels: &[PriceLevel], target_notional: Decimal) -> Option<Fill> {
    if target_notional <= Decimal::ZERO {
        return None;
    }

    let mut filled_qty = Decimal::ZERO;
    let mut filled_notional = Decimal::ZERO;

    for (i, level) in levels.iter().enumerate() {
        let remaining = target_notional - filled_notional;
        let level_notional = level.notional();

        if level_notional >= remaining {
            // Partial (or exact) consumption of this level completes the fill
            filled_qty += remaining / level.price;
            filled_notional = target_notional;
            return Some(Fill {
                vwap: filled_notional / filled_qty,
                filled_qty,
                filled_notional,
                levels_used: i + 1,
            });
        }

        filled_qty += level.size;
        filled_notional += level_notional;
    }

    None
}
