// ===============================
// src/feed_rest.rs
// ===============================
//
// Polling feed for the oracle gateway: one GET per interval, every price
// source in the snapshot becomes its own venue in the book. Fetch failures
// are logged and polling continues -- same containment rule as the websocket
// feeds.
//
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::domain::{now_ns, Quote};
use crate::normalize;

pub async fn run(
    url: String,
    poll_secs: u64,
    symbols: Vec<String>,
    quote_tx: mpsc::Sender<Quote>,
    mut shutdown: watch::Receiver<bool>,
) {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(30)).build() {
        Ok(c) => c,
        Err(e) => {
            warn!(?e, "oracle http client build failed, poller not started");
            return;
        }
    };
    info!(%url, poll_secs, "oracle poller started");

    loop {
        match fetch(&client, &url, &symbols).await {
            Ok(body) => {
                let quotes = normalize::oracle_snapshot(&body, &symbols, now_ns());
                debug!(count = quotes.len(), "oracle snapshot normalized");
                for q in quotes {
                    if quote_tx.send(q).await.is_err() {
                        warn!("quote channel closed, oracle poller stopping");
                        return;
                    }
                }
            }
            Err(e) => warn!(?e, "oracle fetch failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => {
                info!("oracle poller stopped");
                return;
            }
            _ = sleep(Duration::from_secs(poll_secs)) => {}
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str, symbols: &[String]) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .query(&[
            ("symbols", symbols.join(",")),
            ("provider", "redstone".to_string()),
            ("limit", "1".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}
