// ===============================
// src/detector.rs
// ===============================
//
// Pairwise cross-venue spread scan over a book snapshot. All price math is
// Decimal; the snapshot arrives venue-sorted so pair order (and therefore
// emission order) is stable for a given book state.
//
use rust_decimal::Decimal;

use crate::domain::{ArbOpportunity, Quote};

#[derive(Debug, Clone)]
pub struct DetectorCfg {
    /// Inclusive: a spread exactly at the threshold qualifies.
    pub profit_threshold: Decimal,
    /// Quotes older than this are left out of the scan.
    pub quote_ttl_ns: i128,
    /// Whether mid-only quotes are tradable for spread purposes.
    pub include_mid_only: bool,
}

#[derive(Debug, Clone)]
pub struct Detector {
    cfg: DetectorCfg,
}

impl Detector {
    pub fn new(cfg: DetectorCfg) -> Self {
        Self { cfg }
    }

    /// All qualifying opportunities for `symbol` over every unordered venue
    /// pair, not just the best one.
    pub fn scan(&self, symbol: &str, quotes: &[Quote], now_ns: i128) -> Vec<ArbOpportunity> {
        let live: Vec<&Quote> = quotes
            .iter()
            .filter(|q| q.symbol == symbol)
            .filter(|q| now_ns - q.ts_ingest_ns <= self.cfg.quote_ttl_ns)
            .filter(|q| self.cfg.include_mid_only || !q.mid_only)
            .collect();
        if live.len() < 2 {
            return Vec::new();
        }

        let mut out = Vec::new();
        for i in 0..live.len() {
            for j in (i + 1)..live.len() {
                if let Some(opp) = self.compare(live[i], live[j], now_ns) {
                    out.push(opp);
                }
            }
        }
        out
    }

    // Buying happens at the ask, selling at the bid (for a mid-only quote
    // both collapse to the mid). Evaluate both orientations of the pair and
    // keep the better one.
    fn compare(&self, a: &Quote, b: &Quote, now_ns: i128) -> Option<ArbOpportunity> {
        let fwd = profit_fraction(a.ask_px, b.bid_px); // buy a, sell b
        let rev = profit_fraction(b.ask_px, a.bid_px); // buy b, sell a

        let (buy, sell, profit) = match (fwd, rev) {
            (Some(f), Some(r)) if r > f => (b, a, r),
            (Some(f), _) => (a, b, f),
            (None, Some(r)) => (b, a, r),
            (None, None) => return None,
        };

        if profit < self.cfg.profit_threshold {
            return None;
        }
        Some(ArbOpportunity {
            symbol: a.symbol.clone(),
            buy_venue: buy.venue.clone(),
            buy_px: buy.ask_px,
            sell_venue: sell.venue.clone(),
            sell_px: sell.bid_px,
            profit_frac: profit,
            detected_ts_ns: now_ns,
        })
    }
}

fn profit_fraction(buy_px: Decimal, sell_px: Decimal) -> Option<Decimal> {
    if buy_px <= Decimal::ZERO {
        return None;
    }
    Some((sell_px - buy_px) / buy_px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn detector(threshold: Decimal) -> Detector {
        Detector::new(DetectorCfg {
            profit_threshold: threshold,
            quote_ttl_ns: 10_000_000_000,
            include_mid_only: true,
        })
    }

    fn mid(venue: &str, px: Decimal) -> Quote {
        Quote::mid_only("SYM", venue, px, 0, 0)
    }

    #[test]
    fn emits_buy_cheap_sell_dear() {
        let quotes = vec![mid("A", dec!(100.00)), mid("B", dec!(100.30))];
        let opps = detector(dec!(0.002)).scan("SYM", &quotes, 0);
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert_eq!(opp.buy_venue, "A");
        assert_eq!(opp.buy_px, dec!(100.00));
        assert_eq!(opp.sell_venue, "B");
        assert_eq!(opp.sell_px, dec!(100.30));
        assert_eq!(opp.profit_frac, dec!(0.003));
    }

    #[test]
    fn same_quotes_higher_threshold_no_opportunity() {
        let quotes = vec![mid("A", dec!(100.00)), mid("B", dec!(100.30))];
        assert!(detector(dec!(0.005)).scan("SYM", &quotes, 0).is_empty());
    }

    #[test]
    fn spread_below_threshold_is_silent() {
        let quotes = vec![mid("A", dec!(100.00)), mid("B", dec!(100.10))];
        assert!(detector(dec!(0.002)).scan("SYM", &quotes, 0).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let quotes = vec![mid("A", dec!(100.0)), mid("B", dec!(100.2))];
        let opps = detector(dec!(0.002)).scan("SYM", &quotes, 0);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].profit_frac, dec!(0.002));
    }

    #[test]
    fn uses_ask_to_buy_and_bid_to_sell() {
        let cheap = Quote::two_sided("SYM", "A", dec!(99.9), dec!(100.0), dec!(1), dec!(1), 0, 0);
        let dear = Quote::two_sided("SYM", "B", dec!(100.5), dec!(100.6), dec!(1), dec!(1), 0, 0);
        let opps = detector(dec!(0.002)).scan("SYM", &[cheap, dear], 0);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].buy_venue, "A");
        assert_eq!(opps[0].buy_px, dec!(100.0)); // A's ask
        assert_eq!(opps[0].sell_px, dec!(100.5)); // B's bid
        assert_eq!(opps[0].profit_frac, dec!(0.005));
    }

    #[test]
    fn single_venue_no_opportunity() {
        assert!(detector(dec!(0.002)).scan("SYM", &[mid("A", dec!(100))], 0).is_empty());
    }

    #[test]
    fn stale_quote_is_excluded() {
        let d = detector(dec!(0.002));
        let mut fresh = mid("A", dec!(100.00));
        fresh.ts_ingest_ns = 11_000_000_000;
        let old = mid("B", dec!(100.30)); // ingested at 0, 11s ago
        assert!(d.scan("SYM", &[fresh, old], 11_000_000_000).is_empty());
    }

    #[test]
    fn mid_only_policy_can_exclude() {
        let d = Detector::new(DetectorCfg {
            profit_threshold: dec!(0.002),
            quote_ttl_ns: 10_000_000_000,
            include_mid_only: false,
        });
        let two_sided = Quote::two_sided("SYM", "A", dec!(99.9), dec!(100.0), dec!(1), dec!(1), 0, 0);
        assert!(d.scan("SYM", &[two_sided.clone(), mid("B", dec!(100.5))], 0).is_empty());

        let dear = Quote::two_sided("SYM", "B", dec!(100.5), dec!(100.6), dec!(1), dec!(1), 0, 0);
        assert_eq!(d.scan("SYM", &[two_sided, dear], 0).len(), 1);
    }

    #[test]
    fn zero_price_guard() {
        let quotes = vec![mid("A", dec!(0)), mid("B", dec!(100))];
        assert!(detector(dec!(0.002)).scan("SYM", &quotes, 0).is_empty());
    }

    #[test]
    fn all_qualifying_pairs_in_stable_order() {
        let quotes = vec![mid("A", dec!(100)), mid("B", dec!(102)), mid("C", dec!(105))];
        let opps = detector(dec!(0.002)).scan("SYM", &quotes, 0);
        let pairs: Vec<(String, String)> = opps
            .iter()
            .map(|o| (o.buy_venue.clone(), o.sell_venue.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
                ("B".to_string(), "C".to_string()),
            ]
        );
    }
}
