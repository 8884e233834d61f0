// ===============================
// src/strategy.rs
// ===============================
//
// Decision layer between detection and execution: runs every opportunity
// through the gate, sizes the position, submits the paired legs (buy on the
// cheap venue, sell on the dear one) and clears the symbol's engagement once
// both legs are terminal.
//
use ahash::AHashMap as HashMap;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{now_ns, ArbOpportunity, ExecReport, Order, Side, VenueOrder};
use crate::gate::{GateReject, OpportunityGate};
use crate::metrics::{LAT_DETECT_ADMIT, OPPS_ADMITTED, OPPS_REJECTED};

#[derive(Debug, Clone)]
pub struct StrategyCfg {
    /// Notional budget per engagement, in quote currency.
    pub max_position_size: Decimal,
    /// Hard cap on units per leg.
    pub max_units: Decimal,
}

fn position_size(cfg: &StrategyCfg, buy_px: Decimal) -> Decimal {
    if buy_px <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (cfg.max_position_size / buy_px).min(cfg.max_units)
}

fn gen_cl_id(now_ns: i128) -> String {
    format!("ARB-{}-{}", now_ns, rand::thread_rng().gen::<u32>())
}

#[derive(Debug)]
struct Engagement {
    buy_cl: String,
    sell_cl: String,
    buy_done: bool,
    sell_done: bool,
}

impl Engagement {
    fn mark(&mut self, cl_id: &str) {
        if cl_id == self.buy_cl {
            self.buy_done = true;
        } else if cl_id == self.sell_cl {
            self.sell_done = true;
        }
    }

    fn done(&self) -> bool {
        self.buy_done && self.sell_done
    }
}

pub struct Strategy {
    cfg: StrategyCfg,
    gate: OpportunityGate,
    engagements: HashMap<String, Engagement>, // by symbol
    cl_index: HashMap<String, String>,        // cl_id -> symbol
}

impl Strategy {
    pub fn new(cfg: StrategyCfg, gate: OpportunityGate) -> Self {
        Self { cfg, gate, engagements: HashMap::new(), cl_index: HashMap::new() }
    }

    /// Gate + sizing; success hands back the two legs to submit.
    pub fn on_opportunity(
        &mut self,
        opp: &ArbOpportunity,
        now_ns: i128,
    ) -> Result<(Order, Order), GateReject> {
        self.gate.admit(opp, now_ns)?;

        let qty = position_size(&self.cfg, opp.buy_px);
        let buy = Order {
            cl_id: gen_cl_id(now_ns),
            ts_ns: now_ns,
            symbol: opp.symbol.clone(),
            venue: opp.buy_venue.clone(),
            side: Side::Buy,
            qty,
            limit_px: Some(opp.buy_px),
        };
        let sell = Order {
            cl_id: gen_cl_id(now_ns),
            ts_ns: now_ns,
            symbol: opp.symbol.clone(),
            venue: opp.sell_venue.clone(),
            side: Side::Sell,
            qty,
            limit_px: Some(opp.sell_px),
        };

        self.cl_index.insert(buy.cl_id.clone(), opp.symbol.clone());
        self.cl_index.insert(sell.cl_id.clone(), opp.symbol.clone());
        self.engagements.insert(
            opp.symbol.clone(),
            Engagement {
                buy_cl: buy.cl_id.clone(),
                sell_cl: sell.cl_id.clone(),
                buy_done: false,
                sell_done: false,
            },
        );
        Ok((buy, sell))
    }

    /// Terminal leg reports; once both legs land, the symbol is free again.
    pub fn on_exec(&mut self, er: &ExecReport) {
        if !er.status.is_terminal() {
            return;
        }
        let Some(symbol) = self.cl_index.remove(&er.cl_id) else {
            return; // not one of ours
        };
        let Some(eng) = self.engagements.get_mut(&symbol) else {
            return;
        };
        eng.mark(&er.cl_id);
        if eng.done() {
            self.engagements.remove(&symbol);
            self.gate.resolve(&symbol);
            debug!(%symbol, "engagement resolved");
        }
    }

    pub fn close_all(&mut self) {
        self.engagements.clear();
        self.cl_index.clear();
        self.gate.close_all();
    }

    pub fn open_engagements(&self) -> usize {
        self.engagements.len()
    }
}

async fn route(
    gw_txs: &HashMap<String, mpsc::Sender<VenueOrder>>,
    exec_tx: &mpsc::Sender<ExecReport>,
    ord: Order,
) {
    match gw_txs.get(&ord.venue) {
        Some(tx) => {
            let venue = ord.venue.clone();
            let _ = tx.send(VenueOrder { venue, order: ord }).await;
        }
        None => {
            // No gateway for this venue (e.g. an oracle source): explicit
            // rejection so the engagement still resolves.
            warn!(venue = %ord.venue, cl_id = %ord.cl_id, "venue unreachable, rejecting order");
            let _ = exec_tx
                .send(ExecReport {
                    cl_id: ord.cl_id,
                    symbol: ord.symbol,
                    venue: ord.venue,
                    status: crate::domain::ExecStatus::Rejected("venue unreachable".to_string()),
                    filled_qty: Decimal::ZERO,
                    avg_px: Decimal::ZERO,
                    ts_ns: now_ns(),
                })
                .await;
        }
    }
}

pub async fn run(
    mut opp_rx: mpsc::Receiver<ArbOpportunity>,
    mut exec_rx: mpsc::Receiver<ExecReport>,
    gw_txs: HashMap<String, mpsc::Sender<VenueOrder>>,
    exec_tx: mpsc::Sender<ExecReport>,
    cfg: StrategyCfg,
    gate: OpportunityGate,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut strat = Strategy::new(cfg, gate);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                strat.close_all();
                info!("strategy stopped, all engagements closed");
                break;
            }
            Some(opp) = opp_rx.recv() => {
                let now = now_ns();
                match strat.on_opportunity(&opp, now) {
                    Ok((buy, sell)) => {
                        OPPS_ADMITTED.inc();
                        LAT_DETECT_ADMIT.observe((now - opp.detected_ts_ns) as f64 / 1_000_000.0);
                        info!(
                            symbol = %opp.symbol,
                            buy_venue = %buy.venue,
                            sell_venue = %sell.venue,
                            qty = %buy.qty,
                            profit = %opp.profit_frac,
                            "submitting arbitrage legs"
                        );
                        route(&gw_txs, &exec_tx, buy).await;
                        route(&gw_txs, &exec_tx, sell).await;
                    }
                    Err(rej) => {
                        OPPS_REJECTED.with_label_values(&[rej.reason()]).inc();
                        debug!(symbol = %opp.symbol, %rej, "opportunity rejected");
                    }
                }
            }
            Some(er) = exec_rx.recv() => {
                strat.on_exec(&er);
            }
            else => break,
        }
    }
}
