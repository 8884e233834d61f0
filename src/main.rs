// ===============================
// src/main.rs
// ===============================
//
// arb_bot_rust: cross-venue arbitrage engine. Streams quotes from per-venue
// feeds (WebSocket + optional oracle REST poller), normalizes them into a
// shared quote book, detects cross-venue spreads, gates them, and exercises
// a simulated order-acceptance/fill/reject lifecycle against the survivors.
//
mod book;
mod config;
mod detector;
mod domain;
mod feed;
mod feed_rest;
mod gate;
mod gateway;
mod metrics;
mod normalize;
mod posttrade;
mod recorder;
mod strategy;

use ahash::AHashMap as HashMap;
use tokio::{
    select, signal,
    sync::{broadcast, mpsc, watch},
    time::Duration,
};
use tracing::{error, info};

use crate::detector::Detector;
use crate::domain::{ArbOpportunity, Event, ExecReport, Quote, VenueOrder};
use crate::gate::OpportunityGate;
use crate::gateway::SimVenue;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config (fatal on error, not retried) ----
    let cfg = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "configuration error");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(cfg.metrics_port));

    // ---- Human-friendly startup info + export config to metrics ----
    let feed_venues: Vec<&str> = cfg.feeds.iter().map(|f| f.venue.as_str()).collect();
    info!(
        symbols = ?cfg.symbols,
        feeds = ?feed_venues,
        oracle = ?cfg.oracle_url,
        profit_threshold = %cfg.detector.profit_threshold,
        min_profit = %cfg.gate.min_profit,
        sim_venues = ?cfg.sim_venues,
        "startup config"
    );
    for f in &cfg.feeds {
        metrics::CONFIG_FEED.with_label_values(&[&f.venue]).set(1);
    }
    for s in &cfg.symbols {
        metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }

    // ---- Buses ----
    let (quote_tx, quote_rx) = mpsc::channel::<Quote>(4096);
    let (opp_tx, opp_rx) = mpsc::channel::<ArbOpportunity>(1024);
    let (ev_tx, _ev_keepalive) = broadcast::channel::<Event>(8192);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Fan-out ExecReport: gateways -> central -> (posttrade, strategy, bus)
    let (exec_central_tx, mut exec_central_rx) = mpsc::channel::<ExecReport>(4096);
    let (exec_to_post_tx, exec_to_post_rx) = mpsc::channel::<ExecReport>(4096);
    let (exec_to_strat_tx, exec_to_strat_rx) = mpsc::channel::<ExecReport>(4096);
    {
        let ev_tx = ev_tx.clone();
        tokio::spawn(async move {
            while let Some(er) = exec_central_rx.recv().await {
                let _ = ev_tx.send(Event::Exec(er.clone()));
                let _ = exec_to_post_tx.send(er.clone()).await;
                let _ = exec_to_strat_tx.send(er).await;
            }
        });
    }

    // ---- Recorder (optional) ----
    if let Some(path) = cfg.record_file.clone() {
        tokio::spawn(recorder::run(ev_tx.subscribe(), path));
    }

    // ---- Feeds ----
    for fcfg in cfg.feeds.clone() {
        feed::spawn(fcfg, quote_tx.clone(), shutdown_rx.clone());
    }
    if let Some(url) = cfg.oracle_url.clone() {
        tokio::spawn(feed_rest::run(
            url,
            cfg.oracle_poll_secs,
            cfg.symbols.clone(),
            quote_tx.clone(),
            shutdown_rx.clone(),
        ));
    }

    // ---- Quote book + detector (single writer) ----
    let detector = Detector::new(cfg.detector.clone());
    tokio::spawn(book::run(quote_rx, detector, ev_tx.clone(), opp_tx));

    // ---- Simulated venue gateways ----
    let mut gw_txs: HashMap<String, mpsc::Sender<VenueOrder>> = HashMap::new();
    for (i, venue) in cfg.sim_venues.iter().enumerate() {
        let (tx, rx) = mpsc::channel::<VenueOrder>(1024);
        gw_txs.insert(venue.clone(), tx);

        // Offset the seed per venue so seeded runs don't share one stream.
        let mut sim_cfg = cfg.sim.clone();
        sim_cfg.seed = sim_cfg.seed.map(|s| s + i as u64);
        let sim = SimVenue::new(venue.clone(), sim_cfg);
        tokio::spawn(gateway::run_venue(rx, exec_central_tx.clone(), sim, shutdown_rx.clone()));
    }

    // ---- Strategy (gate + paired-leg submission) ----
    let gate = OpportunityGate::new(cfg.gate.clone());
    tokio::spawn(strategy::run(
        opp_rx,
        exec_to_strat_rx,
        gw_txs,
        exec_central_tx.clone(),
        cfg.strategy.clone(),
        gate,
        shutdown_rx.clone(),
    ));

    // ---- Post-trade ----
    tokio::spawn(posttrade::run(exec_to_post_rx));

    // ---- Heartbeat + shutdown ----
    let mut ev_rx = ev_tx.subscribe();
    let mut quote_count: u64 = 0;
    let mut opp_count: u64 = 0;

    loop {
        select! {
            Ok(ev) = ev_rx.recv() => {
                match ev {
                    Event::Quote(_) => quote_count += 1,
                    Event::Opp(_) => opp_count += 1,
                    _ => {}
                }
            },
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                info!(quotes = quote_count, opportunities = opp_count, "heartbeat");
                quote_count = 0;
                opp_count = 0;
            },
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
                // Give feeds/gateways a beat to cancel their sleeps and close.
                tokio::time::sleep(Duration::from_millis(500)).await;
                break;
            }
        }
    }
    info!("stopped");
}
