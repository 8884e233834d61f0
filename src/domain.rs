// ===============================
// src/domain.rs
// ===============================
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }

/// Best bid/ask (or mid) for a symbol on one venue at a point in time.
/// Replaced wholesale in the book on every update, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub venue: String,
    pub bid_px: Decimal,
    pub ask_px: Decimal,
    pub bid_sz: Decimal,
    pub ask_sz: Decimal,
    /// Feed published a single mid price; bid == ask == mid, sizes zero.
    pub mid_only: bool,
    pub ts_event_ns: i128,
    pub ts_ingest_ns: i128,
}

impl Quote {
    pub fn two_sided(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        bid_px: Decimal,
        ask_px: Decimal,
        bid_sz: Decimal,
        ask_sz: Decimal,
        ts_event_ns: i128,
        ts_ingest_ns: i128,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            bid_px,
            ask_px,
            bid_sz,
            ask_sz,
            mid_only: false,
            ts_event_ns,
            ts_ingest_ns,
        }
    }

    pub fn mid_only(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        mid_px: Decimal,
        ts_event_ns: i128,
        ts_ingest_ns: i128,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            bid_px: mid_px,
            ask_px: mid_px,
            bid_sz: Decimal::ZERO,
            ask_sz: Decimal::ZERO,
            mid_only: true,
            ts_event_ns,
            ts_ingest_ns,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid_px + self.ask_px) / Decimal::TWO
    }
}

/// Price gap between two venues for one symbol. Short-lived: produced by the
/// detector, consumed once by the gate/strategy, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub symbol: String,
    pub buy_venue: String,
    pub buy_px: Decimal,
    pub sell_venue: String,
    pub sell_px: Decimal,
    pub profit_frac: Decimal,
    pub detected_ts_ns: i128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub cl_id: String,
    pub ts_ns: i128,
    pub symbol: String,
    pub venue: String,
    pub side: Side,
    pub qty: Decimal,
    /// None = market order; the simulator fills at its reference price.
    pub limit_px: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueOrder { pub venue: String, pub order: Order }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecStatus { Ack, Filled, Rejected(String) }

impl ExecStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecStatus::Filled | ExecStatus::Rejected(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecReport {
    pub cl_id: String,
    pub symbol: String,
    pub venue: String,
    pub status: ExecStatus,
    pub filled_qty: Decimal,
    pub avg_px: Decimal,
    pub ts_ns: i128,
}

/// Outward event stream (bus topics are the collaborator's concern; we only
/// publish).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Quote(Quote), Opp(ArbOpportunity), Exec(ExecReport), Note(String) }

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_only_quote_collapses_both_sides() {
        let q = Quote::mid_only("BTC", "HYPERLIQUID", dec!(43250.5), 1, 2);
        assert!(q.mid_only);
        assert_eq!(q.bid_px, q.ask_px);
        assert_eq!(q.bid_sz, Decimal::ZERO);
        assert_eq!(q.ask_sz, Decimal::ZERO);
        assert_eq!(q.mid(), dec!(43250.5));
    }

    #[test]
    fn mid_of_two_sided_quote() {
        let q = Quote::two_sided("ETH", "BINANCE", dec!(100), dec!(101), dec!(3), dec!(4), 1, 2);
        assert_eq!(q.mid(), dec!(100.5));
        assert!(!q.mid_only);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ExecStatus::Ack.is_terminal());
        assert!(ExecStatus::Filled.is_terminal());
        assert!(ExecStatus::Rejected("x".into()).is_terminal());
    }
}
