// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Quote pipeline --------
pub static QUOTES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("quotes_total", "normalized quotes ingested").unwrap());

pub static QUOTES_BY_VENUE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("quotes_total_by_venue", "normalized quotes per symbol & venue"),
        &["symbol", "venue"],
    )
    .unwrap()
});

// -------- Detection / admission --------
pub static OPPS_DETECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("opportunities_detected_total", "arbitrage opportunities detected"),
        &["symbol"],
    )
    .unwrap()
});

pub static OPPS_ADMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("opportunities_admitted_total", "opportunities past the gate").unwrap()
});

pub static OPPS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("opportunities_rejected_total", "gate rejections by reason"),
        &["reason"],
    )
    .unwrap()
});

// Latency from detection to admission (milliseconds)
pub static LAT_DETECT_ADMIT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "latency_detect_to_admit_ms",
        "Latency from detection to gate admission (ms)",
    ))
    .unwrap()
});

// -------- Execution --------
pub static EXECS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("exec_reports_total", "execution reports"),
        &["status", "venue"],
    )
    .unwrap()
});

// -------- Feed health --------
pub static WS_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("feed_ws_connected", "1 if the venue websocket is connected"),
        &["venue"],
    )
    .unwrap()
});

pub static WS_RECONNECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("feed_ws_reconnects_total", "successful feed reconnects"),
        &["venue"],
    )
    .unwrap()
});

// ---- Config visibility (feeds / symbols) ----
pub static CONFIG_FEED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_feed", "configured feeds (label: venue)"),
        &["venue"],
    )
    .unwrap()
});

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_symbol", "configured symbols (label: symbol)"),
        &["symbol"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(QUOTES.clone())),
        REGISTRY.register(Box::new(QUOTES_BY_VENUE.clone())),
        REGISTRY.register(Box::new(OPPS_DETECTED.clone())),
        REGISTRY.register(Box::new(OPPS_ADMITTED.clone())),
        REGISTRY.register(Box::new(OPPS_REJECTED.clone())),
        REGISTRY.register(Box::new(LAT_DETECT_ADMIT.clone())),
        REGISTRY.register(Box::new(EXECS.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(CONFIG_FEED.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) (tiny HTTP 1.1 responder)
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = TcpListener::bind(&addr)
            .unwrap_or_else(|e| panic!("metrics bind {} failed: {}", addr, e));
        eprintln!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => eprintln!("metrics accept error: {}", e),
            }
        }
    });
}
