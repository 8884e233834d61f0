// ===============================
// src/normalize.rs
// ===============================
//
// Protocol-specific raw message -> canonical Quote. Pure functions: feeds pass
// the ingest timestamp in, replaying a payload yields identical quotes.
// Anything outside the expected schema or symbol universe is skipped, never
// raised -- a bad frame must not tear down a connection.
//
use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::Quote;

// ---- Binance-style bookTicker (two-sided) ----
// {"u":400900217,"s":"BNBUSDT","b":"25.35","B":"31.21","a":"25.36","A":"40.66"}
#[derive(Debug, Deserialize)]
struct BookTickerMsg {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid_px: String,
    #[serde(rename = "B")]
    bid_sz: String,
    #[serde(rename = "a")]
    ask_px: String,
    #[serde(rename = "A")]
    ask_sz: String,
}

pub fn book_ticker(venue: &str, text: &str, universe: &[String], now_ns: i128) -> Option<Quote> {
    let msg: BookTickerMsg = serde_json::from_str(text).ok()?;

    // Wire symbol is the USDT pair; the canonical symbol is the base asset.
    let symbol = msg.symbol.strip_suffix("USDT")?.to_string();
    if !universe.iter().any(|s| *s == symbol) {
        return None;
    }

    let bid_px = Decimal::from_str(&msg.bid_px).ok()?;
    let ask_px = Decimal::from_str(&msg.ask_px).ok()?;
    let bid_sz = Decimal::from_str(&msg.bid_sz).ok()?;
    let ask_sz = Decimal::from_str(&msg.ask_sz).ok()?;

    if bid_px <= Decimal::ZERO || ask_px <= Decimal::ZERO || bid_px > ask_px {
        return None;
    }

    Some(Quote::two_sided(symbol, venue, bid_px, ask_px, bid_sz, ask_sz, now_ns, now_ns))
}

// ---- Hyperliquid-style allMids (mid price only, no sizes) ----
// {"channel":"allMids","data":{"mids":{"BTC":"43250.5","ETH":"2301.2"}}}
#[derive(Debug, Deserialize)]
struct AllMidsMsg {
    channel: String,
    data: AllMidsData,
}

#[derive(Debug, Deserialize)]
struct AllMidsData {
    // BTreeMap keeps the output order deterministic for a given payload.
    mids: BTreeMap<String, String>,
    #[serde(default)]
    time: Option<u64>, // milliseconds when present
}

pub fn all_mids(venue: &str, text: &str, universe: &[String], now_ns: i128) -> Vec<Quote> {
    let msg: AllMidsMsg = match serde_json::from_str::<AllMidsMsg>(text) {
        Ok(m) if m.channel == "allMids" => m,
        _ => return Vec::new(),
    };
    let ts_event = msg.data.time.map(|ms| ms as i128 * 1_000_000).unwrap_or(now_ns);

    let mut out = Vec::new();
    for (symbol, raw) in &msg.data.mids {
        if !universe.iter().any(|s| s == symbol) {
            continue;
        }
        let mid = match Decimal::from_str(raw) {
            Ok(px) if px > Decimal::ZERO => px,
            _ => continue,
        };
        out.push(Quote::mid_only(symbol.clone(), venue, mid, ts_event, now_ns));
    }
    out
}

// ---- Oracle gateway snapshot (REST) ----
// {"BTC":[{"dataPoints":[{"metadata":{"sourceMetadata":{
//     "binance-usdt":{"tradeInfo":{"bidPrice":"97000.1","askPrice":"97000.9"}},
//     "kraken-usd":{"value":97001.3}}}}]}]}
// Every source becomes its own venue.
#[derive(Debug, Deserialize)]
struct OracleEntry {
    #[serde(rename = "dataPoints", default)]
    data_points: Vec<OracleDataPoint>,
}

#[derive(Debug, Deserialize)]
struct OracleDataPoint {
    #[serde(default)]
    metadata: Option<OracleMeta>,
}

#[derive(Debug, Deserialize)]
struct OracleMeta {
    #[serde(rename = "sourceMetadata", default)]
    source_metadata: BTreeMap<String, OracleSource>,
}

#[derive(Debug, Deserialize)]
struct OracleSource {
    #[serde(default)]
    value: Option<Value>,
    #[serde(rename = "tradeInfo", default)]
    trade_info: Option<OracleTradeInfo>,
}

#[derive(Debug, Deserialize)]
struct OracleTradeInfo {
    #[serde(rename = "bidPrice", default)]
    bid_price: Option<Value>,
    #[serde(rename = "askPrice", default)]
    ask_price: Option<Value>,
}

// Prices arrive as strings or bare JSON numbers depending on the source.
fn dec_of(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// `binance-usdt` -> `BINANCE`, `kraken-usd` -> `KRAKEN`.
fn source_venue(source: &str) -> String {
    source
        .strip_suffix("-usdt")
        .or_else(|| source.strip_suffix("-usd"))
        .unwrap_or(source)
        .to_ascii_uppercase()
}

pub fn oracle_snapshot(text: &str, universe: &[String], now_ns: i128) -> Vec<Quote> {
    let payload: BTreeMap<String, Vec<OracleEntry>> = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    for (symbol, entries) in &payload {
        if !universe.iter().any(|s| s == symbol) {
            continue;
        }
        let Some(meta) = entries
            .first()
            .and_then(|e| e.data_points.first())
            .and_then(|dp| dp.metadata.as_ref())
        else {
            continue;
        };

        for (source, data) in &meta.source_metadata {
            let venue = source_venue(source);
            let quote = match &data.trade_info {
                Some(ti) => match (
                    ti.bid_price.as_ref().and_then(dec_of),
                    ti.ask_price.as_ref().and_then(dec_of),
                ) {
                    (Some(bid), Some(ask)) if bid > Decimal::ZERO && bid <= ask => {
                        Quote::two_sided(
                            symbol.clone(),
                            venue,
                            bid,
                            ask,
                            Decimal::ONE,
                            Decimal::ONE,
                            now_ns,
                            now_ns,
                        )
                    }
                    (Some(px), None) | (None, Some(px)) if px > Decimal::ZERO => {
                        Quote::mid_only(symbol.clone(), venue, px, now_ns, now_ns)
                    }
                    _ => continue,
                },
                None => match data.value.as_ref().and_then(dec_of) {
                    Some(px) if px > Decimal::ZERO => {
                        Quote::mid_only(symbol.clone(), venue, px, now_ns, now_ns)
                    }
                    _ => continue,
                },
            };
            out.push(quote);
        }
    }
    out
}
