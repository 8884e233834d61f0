// ===============================
// src/gateway.rs (simulated venue)
// ===============================
//
// Per-venue execution simulator: synchronous ACK (or explicit rejection for
// an unrecognized venue), then after a fixed processing delay a randomized
// fill/reject outcome with symmetric slippage. The RNG is owned by the
// simulator and seedable, so tests pin every outcome.
//
use ahash::AHashMap as HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::domain::{now_ns, ExecReport, ExecStatus, Order, Side, VenueOrder};
use crate::metrics::EXECS;

pub const REJECT_REASON_MARGIN: &str = "Insufficient margin (simulated rejection)";
pub const REJECT_REASON_VENUE: &str = "unrecognized venue";

#[derive(Debug, Clone)]
pub struct SimCfg {
    pub fill_delay_ms: u64,
    /// Probability of a simulated terminal rejection, 0..1.
    pub reject_prob: f64,
    /// Fills land within limit_px * (1 +/- slippage_band), drawn uniformly.
    pub slippage_band: f64,
    /// Fill price for market orders (no limit attached).
    pub reference_px: Decimal,
    pub seed: Option<u64>,
}

/// Order accepted but not yet resolved. Removed on the terminal outcome.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub cl_id: String,
    pub symbol: String,
    pub venue: String,
    pub side: Side,
    pub qty: Decimal,
    pub limit_px: Option<Decimal>,
    pub submitted_ts_ns: i128,
}

pub struct SimVenue {
    venue: String,
    cfg: SimCfg,
    rng: StdRng,
    pending: HashMap<String, PendingOrder>,
}

impl SimVenue {
    pub fn new(venue: impl Into<String>, cfg: SimCfg) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { venue: venue.into(), cfg, rng, pending: HashMap::new() }
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Step 1 of the lifecycle: synchronous acceptance. Only a venue
    /// mismatch rejects here; everything else ACKs and becomes pending.
    pub fn submit(&mut self, order: &Order, now_ns: i128) -> ExecReport {
        if order.venue != self.venue {
            return self.report(order, ExecStatus::Rejected(REJECT_REASON_VENUE.to_string()), Decimal::ZERO, Decimal::ZERO, now_ns);
        }
        self.pending.insert(
            order.cl_id.clone(),
            PendingOrder {
                cl_id: order.cl_id.clone(),
                symbol: order.symbol.clone(),
                venue: order.venue.clone(),
                side: order.side,
                qty: order.qty,
                limit_px: order.limit_px,
                submitted_ts_ns: now_ns,
            },
        );
        self.report(order, ExecStatus::Ack, Decimal::ZERO, Decimal::ZERO, now_ns)
    }

    /// Step 2: the delayed outcome draw. Terminal either way; the pending
    /// record is gone after this.
    pub fn resolve(&mut self, cl_id: &str, now_ns: i128) -> Option<ExecReport> {
        let po = self.pending.remove(cl_id)?;

        if self.rng.gen::<f64>() < self.cfg.reject_prob {
            return Some(ExecReport {
                cl_id: po.cl_id,
                symbol: po.symbol,
                venue: po.venue,
                status: ExecStatus::Rejected(REJECT_REASON_MARGIN.to_string()),
                filled_qty: Decimal::ZERO,
                avg_px: Decimal::ZERO,
                ts_ns: now_ns,
            });
        }

        let base_px = po.limit_px.unwrap_or(self.cfg.reference_px);
        let slip = if self.cfg.slippage_band > 0.0 {
            self.rng.gen_range(-self.cfg.slippage_band..=self.cfg.slippage_band)
        } else {
            0.0
        };
        let fill_px = base_px * (Decimal::ONE + Decimal::from_f64(slip).unwrap_or(Decimal::ZERO));

        Some(ExecReport {
            cl_id: po.cl_id,
            symbol: po.symbol,
            venue: po.venue,
            status: ExecStatus::Filled,
            filled_qty: po.qty,
            avg_px: fill_px,
            ts_ns: now_ns,
        })
    }

    fn report(&self, order: &Order, status: ExecStatus, filled_qty: Decimal, avg_px: Decimal, ts_ns: i128) -> ExecReport {
        ExecReport {
            cl_id: order.cl_id.clone(),
            symbol: order.symbol.clone(),
            venue: self.venue.clone(),
            status,
            filled_qty,
            avg_px,
            ts_ns,
        }
    }
}

fn status_label(status: &ExecStatus) -> &'static str {
    match status {
        ExecStatus::Ack => "ack",
        ExecStatus::Filled => "filled",
        ExecStatus::Rejected(_) => "rejected",
    }
}

/// One task per simulated venue, consuming its order queue serially:
/// ack -> delay -> outcome.
pub async fn run_venue(
    mut rx: mpsc::Receiver<VenueOrder>,
    exec_tx: mpsc::Sender<ExecReport>,
    mut sim: SimVenue,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let vord = tokio::select! {
            _ = shutdown.changed() => break,
            next = rx.recv() => match next {
                Some(v) => v,
                None => break,
            },
        };
        let o = vord.order;

        let ack = sim.submit(&o, now_ns());
        EXECS.with_label_values(&[status_label(&ack.status), sim.venue()]).inc();
        let terminal = ack.status.is_terminal();
        if exec_tx.send(ack).await.is_err() {
            warn!(venue = %sim.venue(), "exec channel closed");
            break;
        }
        if terminal {
            continue; // rejected at the door, nothing pending
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_millis(sim.cfg.fill_delay_ms)) => {}
        }

        if let Some(outcome) = sim.resolve(&o.cl_id, now_ns()) {
            EXECS.with_label_values(&[status_label(&outcome.status), sim.venue()]).inc();
            debug!(cl_id = %outcome.cl_id, status = ?outcome.status, "order resolved");
            if exec_tx.send(outcome).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg(reject_prob: f64, slippage_band: f64) -> SimCfg {
        SimCfg {
            fill_delay_ms: 0,
            reject_prob,
            slippage_band,
            reference_px: dec!(50000),
            seed: Some(7),
        }
    }

    fn order(cl_id: &str, venue: &str, limit_px: Option<Decimal>) -> Order {
        Order {
            cl_id: cl_id.to_string(),
            ts_ns: 0,
            symbol: "BTC".to_string(),
            venue: venue.to_string(),
            side: Side::Buy,
            qty: dec!(2),
            limit_px,
        }
    }

    #[test]
    fn no_reject_no_slippage_fills_at_limit_exactly() {
        let mut sim = SimVenue::new("BINANCE", cfg(0.0, 0.0));
        let o = order("CL-1", "BINANCE", Some(dec!(97000.10)));

        let ack = sim.submit(&o, 1);
        assert_eq!(ack.status, ExecStatus::Ack);
        assert_eq!(sim.pending_count(), 1);

        let fill = sim.resolve("CL-1", 2).unwrap();
        assert_eq!(fill.status, ExecStatus::Filled);
        assert_eq!(fill.avg_px, dec!(97000.10));
        assert_eq!(fill.filled_qty, dec!(2));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn market_order_fills_at_reference_price() {
        let mut sim = SimVenue::new("BINANCE", cfg(0.0, 0.0));
        sim.submit(&order("CL-2", "BINANCE", None), 1);
        let fill = sim.resolve("CL-2", 2).unwrap();
        assert_eq!(fill.avg_px, dec!(50000));
    }

    #[test]
    fn certain_rejection_reports_margin_reason() {
        let mut sim = SimVenue::new("BINANCE", cfg(1.0, 0.0));
        sim.submit(&order("CL-3", "BINANCE", Some(dec!(100))), 1);
        let outcome = sim.resolve("CL-3", 2).unwrap();
        assert_eq!(outcome.status, ExecStatus::Rejected(REJECT_REASON_MARGIN.to_string()));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn wrong_venue_is_rejected_without_pending() {
        let mut sim = SimVenue::new("BINANCE", cfg(0.0, 0.0));
        let rep = sim.submit(&order("CL-4", "KRAKEN", Some(dec!(100))), 1);
        assert_eq!(rep.status, ExecStatus::Rejected(REJECT_REASON_VENUE.to_string()));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn slippage_stays_inside_the_band() {
        let mut sim = SimVenue::new("BINANCE", cfg(0.0, 0.0005));
        for i in 0..100 {
            let id = format!("CL-{i}");
            sim.submit(&order(&id, "BINANCE", Some(dec!(100))), 1);
            let fill = sim.resolve(&id, 2).unwrap();
            assert!(fill.avg_px >= dec!(99.95), "below band: {}", fill.avg_px);
            assert!(fill.avg_px <= dec!(100.05), "above band: {}", fill.avg_px);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let mut sim = SimVenue::new("BINANCE", cfg(0.05, 0.0005));
            (0..20)
                .map(|i| {
                    let id = format!("CL-{i}");
                    sim.submit(&order(&id, "BINANCE", Some(dec!(100))), 1);
                    sim.resolve(&id, 2).unwrap()
                })
                .map(|r| (r.status.clone(), r.avg_px))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn resolve_unknown_order_is_none() {
        let mut sim = SimVenue::new("BINANCE", cfg(0.0, 0.0));
        assert!(sim.resolve("nope", 1).is_none());
    }

    #[tokio::test]
    async fn venue_task_acks_then_fills() {
        let (ord_tx, ord_rx) = mpsc::channel(8);
        let (exec_tx, mut exec_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sim = SimVenue::new("BINANCE", cfg(0.0, 0.0));
        tokio::spawn(run_venue(ord_rx, exec_tx, sim, shutdown_rx));

        let o = order("CL-9", "BINANCE", Some(dec!(100)));
        ord_tx.send(VenueOrder { venue: "BINANCE".to_string(), order: o }).await.unwrap();

        let ack = exec_rx.recv().await.unwrap();
        assert_eq!(ack.status, ExecStatus::Ack);
        let fill = exec_rx.recv().await.unwrap();
        assert_eq!(fill.status, ExecStatus::Filled);
        assert_eq!(fill.avg_px, dec!(100));
    }
}
