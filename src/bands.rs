// ─────────────────────────────────────────────────────────────────────────────
// bands.rs — Band Model
//
// A band is a price/quantity window around a reference price. Buy bands sit
// below the reference; sell bands sit above it. This is a tagged variant
// (Side) over a shared parameter set rather than a base class with virtual
// Includes() — there is exactly one Includes() implementation, dispatching
// on the tag.
// ─────────────────────────────────────────────────────────────────────────────
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Side ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The exchange's numeric side code, matching the original Go
    /// (`maker/maker.go`: `order.Side == 0` is a bid, `== 1` an ask).
    pub fn to_code(self) -> i64 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    /// Resolves a numeric side code to a `Side`, or `None` if the exchange
    /// reported something outside `{0, 1}` (spec.md §4.2 — such orders are
    /// dropped, not fatal).
    pub fn from_code(code: i64) -> Option<Side> {
        match code {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }
}

// ─── Band parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandParams {
    pub min_margin: Decimal,
    pub avg_margin: Decimal,
    pub max_margin: Decimal,
    pub min_amount: Decimal,
    pub avg_amount: Decimal,
    pub max_amount: Decimal,
    pub dust_cutoff: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub side: Side,
    #[serde(flatten)]
    pub params: BandParams,
}

#[derive(Debug, Error, PartialEq)]
pub enum BandError {
    #[error("minMargin ({min_margin}) must be in (0, avgMargin] and avgMargin ({avg_margin}) in (0, 1)")]
    MinMargin { min_margin: Decimal, avg_margin: Decimal },
    #[error("avgMargin ({avg_margin}) must be in [minMargin, maxMargin] and in (0, 1)")]
    AvgMargin { avg_margin: Decimal, max_margin: Decimal },
    #[error("maxMargin ({max_margin}) must be in [avgMargin, 1) and minMargin ({min_margin}) < maxMargin")]
    MaxMargin { min_margin: Decimal, max_margin: Decimal },
    #[error("minAmount ({min_amount}) must be > 0 and <= avgAmount ({avg_amount})")]
    MinAmount { min_amount: Decimal, avg_amount: Decimal },
    #[error("avgAmount ({avg_amount}) must be <= maxAmount ({max_amount})")]
    AvgAmount { avg_amount: Decimal, max_amount: Decimal },
    #[error("dustCutoff ({0}) must be >= 0")]
    DustCutoff(Decimal),
}

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("band validation failed: {0}")]
    Band(#[from] BandError),
    #[error("overlapping bands on the {side:?} side: band #{a} and band #{b}")]
    Overlap { side: Side, a: usize, b: usize },
}

/// Validates a single band's invariants (spec.md §3):
///   0 < min_margin <= avg_margin <= max_margin < 1
///   0 < min_amount <= avg_amount <= max_amount
///   dust_cutoff >= 0
pub fn validate(band: &BandParams) -> Result<(), BandError> {
    let zero = Decimal::ZERO;
    let one = Decimal::ONE;

    if band.min_margin <= zero || band.min_margin > band.avg_margin {
        return Err(BandError::MinMargin { min_margin: band.min_margin, avg_margin: band.avg_margin });
    }
    if band.avg_margin <= zero || band.avg_margin >= one || band.avg_margin > band.max_margin {
        return Err(BandError::AvgMargin { avg_margin: band.avg_margin, max_margin: band.max_margin });
    }
    if band.max_margin <= zero || band.max_margin >= one || band.min_margin >= band.max_margin {
        return Err(BandError::MaxMargin { min_margin: band.min_margin, max_margin: band.max_margin });
    }
    if band.min_amount <= zero || band.min_amount > band.avg_amount {
        return Err(BandError::MinAmount { min_amount: band.min_amount, avg_amount: band.avg_amount });
    }
    if band.avg_amount > band.max_amount {
        return Err(BandError::AvgAmount { avg_amount: band.avg_amount, max_amount: band.max_amount });
    }
    if band.dust_cutoff < zero {
        return Err(BandError::DustCutoff(band.dust_cutoff));
    }
    Ok(())
}

/// Two same-side bands overlap iff their [min_margin, max_margin] intervals
/// overlap under strict inequality on both sides — margins touching at a
/// single boundary value is NOT overlap (spec.md §9, Open Question #1).
fn margins_overlap(a: &BandParams, b: &BandParams) -> bool {
    a.min_margin < b.max_margin && b.min_margin < a.max_margin
}

/// Validates every band in the profile, then checks for same-side overlaps.
pub fn validate_profile(buy_bands: &[BandParams], sell_bands: &[BandParams]) -> Result<(), ProfileError> {
    for band in buy_bands {
        validate(band)?;
    }
    for band in sell_bands {
        validate(band)?;
    }
    if let Some((a, b)) = find_overlap(buy_bands) {
        return Err(ProfileError::Overlap { side: Side::Buy, a, b });
    }
    if let Some((a, b)) = find_overlap(sell_bands) {
        return Err(ProfileError::Overlap { side: Side::Sell, a, b });
    }
    Ok(())
}

fn find_overlap(bands: &[BandParams]) -> Option<(usize, usize)> {
    for i in 0..bands.len() {
        for j in (i + 1)..bands.len() {
            if margins_overlap(&bands[i], &bands[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

impl Band {
    /// Price window for this band given the reference price, endpoints
    /// inclusive. Buy bands sit below `ref_price`; sell bands sit above it.
    pub fn price_window(&self, ref_price: Decimal) -> (Decimal, Decimal) {
        match self.side {
            Side::Buy => (
                apply_margin(ref_price, self.params.max_margin, Side::Buy),
                apply_margin(ref_price, self.params.min_margin, Side::Buy),
            ),
            Side::Sell => (
                apply_margin(ref_price, self.params.min_margin, Side::Sell),
                apply_margin(ref_price, self.params.max_margin, Side::Sell),
            ),
        }
    }

    /// Whether `order_price` falls inside this band's window, endpoints
    /// inclusive.
    pub fn includes(&self, order_price: Decimal, ref_price: Decimal) -> bool {
        let (lo, hi) = self.price_window(ref_price);
        order_price >= lo && order_price <= hi
    }

    /// The target price used when synthesizing a new top-up order.
    pub fn avg_price(&self, ref_price: Decimal) -> Decimal {
        apply_margin(ref_price, self.params.avg_margin, self.side)
    }

    pub fn min_amount(&self) -> Decimal {
        self.params.min_amount
    }

    pub fn avg_amount(&self) -> Decimal {
        self.params.avg_amount
    }

    pub fn max_amount(&self) -> Decimal {
        self.params.max_amount
    }

    pub fn dust_cutoff(&self) -> Decimal {
        self.params.dust_cutoff
    }
}

fn apply_margin(price: Decimal, margin: Decimal, side: Side) -> Decimal {
    match side {
        Side::Buy => price * (Decimal::ONE - margin),
        Side::Sell => price * (Decimal::ONE + margin),
    }
}

/// Sum of `rem_quantity` across a set of orders. Caller must pass orders
/// exclusively of one side — the reconciler enforces this by construction.
pub fn total_amount<'a, I>(orders: I) -> Decimal
where
    I: IntoIterator<Item = &'a crate::orderbook::Order>,
{
    orders.into_iter().map(|o| o.rem_quantity).sum()
}
