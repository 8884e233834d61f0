// ===============================
// src/gate.rs
// ===============================
//
// Admission policy in front of execution: strategy-level profit floor, age
// cutoff, and at most one in-flight engagement per symbol. `admit` is a
// check-and-insert on `&mut self`, so two opportunities for the same symbol
// can never race past it.
//
use ahash::AHashMap as HashMap;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::ArbOpportunity;

#[derive(Debug, Clone)]
pub struct GateCfg {
    /// Strategy-level floor, independent of the detector's raw threshold.
    pub min_profit: Decimal,
    /// Opportunities strictly older than this are rejected; the exact
    /// boundary is still admitted.
    pub max_age_ns: i128,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateReject {
    #[error("profit {0} below strategy minimum")]
    BelowThreshold(Decimal),
    #[error("opportunity aged {age_ns}ns, max {max_ns}ns")]
    Stale { age_ns: i128, max_ns: i128 },
    #[error("symbol already has an active engagement")]
    AlreadyActive,
}

impl GateReject {
    pub fn reason(&self) -> &'static str {
        match self {
            GateReject::BelowThreshold(_) => "below_threshold",
            GateReject::Stale { .. } => "stale",
            GateReject::AlreadyActive => "already_active",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveArb {
    pub opportunity: ArbOpportunity,
    pub admitted_ts_ns: i128,
}

#[derive(Debug)]
pub struct OpportunityGate {
    cfg: GateCfg,
    active: HashMap<String, ActiveArb>,
}

impl OpportunityGate {
    pub fn new(cfg: GateCfg) -> Self {
        Self { cfg, active: HashMap::new() }
    }

    /// Admits the opportunity and records the engagement, or rejects with a
    /// typed reason. A successful admit makes the symbol busy until
    /// `resolve` (or `close_all`) clears it.
    pub fn admit(&mut self, opp: &ArbOpportunity, now_ns: i128) -> Result<(), GateReject> {
        if opp.profit_frac < self.cfg.min_profit {
            return Err(GateReject::BelowThreshold(opp.profit_frac));
        }

        let age_ns = now_ns - opp.detected_ts_ns;
        if age_ns > self.cfg.max_age_ns {
            return Err(GateReject::Stale { age_ns, max_ns: self.cfg.max_age_ns });
        }

        if self.active.contains_key(&opp.symbol) {
            return Err(GateReject::AlreadyActive);
        }
        self.active.insert(
            opp.symbol.clone(),
            ActiveArb { opportunity: opp.clone(), admitted_ts_ns: now_ns },
        );
        Ok(())
    }

    /// Clears the engagement once its execution reached a terminal outcome.
    pub fn resolve(&mut self, symbol: &str) -> Option<ActiveArb> {
        self.active.remove(symbol)
    }

    pub fn close_all(&mut self) {
        self.active.clear();
    }

    pub fn is_engaged(&self, symbol: &str) -> bool {
        self.active.contains_key(symbol)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg() -> GateCfg {
        GateCfg { min_profit: dec!(0.005), max_age_ns: 5_000_000_000 }
    }

    fn opp(symbol: &str, profit: Decimal, detected_ts_ns: i128) -> ArbOpportunity {
        ArbOpportunity {
            symbol: symbol.to_string(),
            buy_venue: "A".to_string(),
            buy_px: dec!(100),
            sell_venue: "B".to_string(),
            sell_px: dec!(101),
            profit_frac: profit,
            detected_ts_ns,
        }
    }

    #[test]
    fn admits_fresh_profitable_opportunity() {
        let mut gate = OpportunityGate::new(cfg());
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 1_000_000_000).is_ok());
        assert!(gate.is_engaged("BTC"));
        assert_eq!(gate.active_count(), 1);
    }

    #[test]
    fn rejects_below_strategy_minimum() {
        let mut gate = OpportunityGate::new(cfg());
        let err = gate.admit(&opp("BTC", dec!(0.004), 0), 0).unwrap_err();
        assert_eq!(err, GateReject::BelowThreshold(dec!(0.004)));
        assert!(!gate.is_engaged("BTC"));
    }

    #[test]
    fn rejects_stale_even_when_profitable() {
        let mut gate = OpportunityGate::new(cfg());
        // 6s old, well above profit floor
        let err = gate.admit(&opp("BTC", dec!(0.05), 0), 6_000_000_000).unwrap_err();
        assert!(matches!(err, GateReject::Stale { .. }));
    }

    #[test]
    fn age_boundary_is_inclusive() {
        let mut gate = OpportunityGate::new(cfg());
        // exactly max_age old -> still admitted
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 5_000_000_000).is_ok());
        // one nanosecond past -> stale
        let err = gate.admit(&opp("ETH", dec!(0.01), 0), 5_000_000_001).unwrap_err();
        assert!(matches!(err, GateReject::Stale { .. }));
    }

    #[test]
    fn one_engagement_per_symbol() {
        let mut gate = OpportunityGate::new(cfg());
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 0).is_ok());
        let err = gate.admit(&opp("BTC", dec!(0.02), 0), 0).unwrap_err();
        assert_eq!(err, GateReject::AlreadyActive);
        // other symbols are unaffected
        assert!(gate.admit(&opp("ETH", dec!(0.01), 0), 0).is_ok());
    }

    #[test]
    fn resolve_frees_the_symbol() {
        let mut gate = OpportunityGate::new(cfg());
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 0).is_ok());
        let closed = gate.resolve("BTC").unwrap();
        assert_eq!(closed.opportunity.symbol, "BTC");
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 0).is_ok());
    }

    #[test]
    fn close_all_clears_everything() {
        let mut gate = OpportunityGate::new(cfg());
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 0).is_ok());
        assert!(gate.admit(&opp("ETH", dec!(0.01), 0), 0).is_ok());
        gate.close_all();
        assert_eq!(gate.active_count(), 0);
        assert!(gate.admit(&opp("BTC", dec!(0.01), 0), 0).is_ok());
    }
}
