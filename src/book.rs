// ===============================
// src/book.rs
// ===============================
//
// Last-value quote cache keyed by (symbol, venue), plus the single-writer
// task that owns it: every feed publishes into one mpsc channel, this task
// applies the update and runs the detector on the touched symbol. Readers
// never see a half-written quote because nobody else holds the map.
//
use ahash::AHashMap as HashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::detector::Detector;
use crate::domain::{now_ns, ArbOpportunity, Event, Quote};
use crate::metrics::{OPPS_DETECTED, QUOTES, QUOTES_BY_VENUE};

#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: HashMap<(String, String), Quote>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the previous quote for (symbol, venue) wholesale.
    pub fn put(&mut self, q: Quote) {
        self.quotes.insert((q.symbol.clone(), q.venue.clone()), q);
    }

    /// Snapshot of all venue quotes for `symbol`, sorted by venue so the
    /// detector's pair iteration is stable.
    pub fn get(&self, symbol: &str) -> Vec<Quote> {
        let mut out: Vec<Quote> = self
            .quotes
            .values()
            .filter(|q| q.symbol == symbol)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.venue.cmp(&b.venue));
        out
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

pub async fn run(
    mut quote_rx: mpsc::Receiver<Quote>,
    detector: Detector,
    ev_tx: broadcast::Sender<Event>,
    opp_tx: mpsc::Sender<ArbOpportunity>,
) {
    let mut book = QuoteBook::new();

    while let Some(q) = quote_rx.recv().await {
        QUOTES.inc();
        QUOTES_BY_VENUE.with_label_values(&[&q.symbol, &q.venue]).inc();
        let _ = ev_tx.send(Event::Quote(q.clone()));

        let symbol = q.symbol.clone();
        book.put(q);

        let snapshot = book.get(&symbol);
        for opp in detector.scan(&symbol, &snapshot, now_ns()) {
            OPPS_DETECTED.with_label_values(&[&opp.symbol]).inc();
            debug!(
                symbol = %opp.symbol,
                buy = %opp.buy_venue,
                sell = %opp.sell_venue,
                profit = %opp.profit_frac,
                "opportunity detected"
            );
            let _ = ev_tx.send(Event::Opp(opp.clone()));
            if let Err(e) = opp_tx.send(opp).await {
                warn!(?e, "opportunity channel closed");
                return;
            }
        }
    }
    debug!("quote channel closed, book task stopped");
}
