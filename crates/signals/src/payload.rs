//! Raw JSON payload parsing.
//!
//! Payloads arrive as loosely-typed JSON from data-source adapters. These
//! helpers coerce the parts the engine understands into typed values and
//! report, rather than fail on, anything malformed.

use std::collections::BTreeMap;

use confluence_core::{
    Frame, Liquidation, MarketSnapshot, OrderBook, PositionSide, PriceLevel, Sentiment, Ticker,
    TimeframeRole, Trade, TradeSide, REQUIRED_COLUMNS,
};
use serde_json::Value;

/// Fields every trade record must carry.
pub const TRADE_FIELDS: [&str; 4] = ["price", "size", "side", "time"];

/// Reads a number from a JSON number or numeric string.
#[must_use]
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Reads a positive millisecond timestamp.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    coerce_millis(value).filter(|ts| *ts > 0)
}

/// Parses a candle table in row-record or columnar form.
///
/// Cells that cannot be coerced become `NaN`.
///
/// # Errors
/// Returns a reason if the table is empty, has the wrong shape, or lacks a
/// required column.
pub fn parse_table(value: &Value) -> Result<Frame, String> {
    match value {
        Value::Array(rows) => parse_records(rows),
        Value::Object(columns) => parse_columns(columns),
        _ => Err("table must be a list of rows or an object of columns".to_string()),
    }
}

fn parse_records(rows: &[Value]) -> Result<Frame, String> {
    if rows.is_empty() {
        return Err("table is empty".to_string());
    }
    let first = rows[0]
        .as_object()
        .ok_or_else(|| "rows must be objects".to_string())?;
    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !first.contains_key(**c)) {
        return Err(format!("missing column '{missing}'"));
    }

    let mut frame = Frame::empty();
    let cell = |row: &Value, name: &str| row.get(name).and_then(coerce_number).unwrap_or(f64::NAN);
    for row in rows {
        frame.open.push(cell(row, "open"));
        frame.high.push(cell(row, "high"));
        frame.low.push(cell(row, "low"));
        frame.close.push(cell(row, "close"));
        frame.volume.push(cell(row, "volume"));
    }
    if rows.iter().all(|r| r.get("timestamp").is_some()) {
        frame.timestamp = rows
            .iter()
            .map(|r| r.get("timestamp").and_then(coerce_millis).unwrap_or(0))
            .collect();
    }
    Ok(frame)
}

fn parse_columns(columns: &serde_json::Map<String, Value>) -> Result<Frame, String> {
    let mut parsed: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for name in REQUIRED_COLUMNS {
        let column = columns
            .get(name)
            .ok_or_else(|| format!("missing column '{name}'"))?
            .as_array()
            .ok_or_else(|| format!("column '{name}' is not a list"))?;
        parsed.insert(
            name,
            column
                .iter()
                .map(|v| coerce_number(v).unwrap_or(f64::NAN))
                .collect(),
        );
    }

    let len = parsed.get("close").map_or(0, Vec::len);
    if len == 0 {
        return Err("table is empty".to_string());
    }
    if parsed.values().any(|c| c.len() != len) {
        return Err("columns have different lengths".to_string());
    }

    let mut take = |name: &str| parsed.remove(name).unwrap_or_default();
    let mut frame = Frame {
        open: take("open"),
        high: take("high"),
        low: take("low"),
        close: take("close"),
        volume: take("volume"),
        timestamp: Vec::new(),
    };
    if let Some(ts) = columns.get("timestamp").and_then(Value::as_array) {
        if ts.len() == len {
            frame.timestamp = ts.iter().map(|v| coerce_millis(v).unwrap_or(0)).collect();
        }
    }
    Ok(frame)
}

/// Share of `NaN` cells in the worst required column.
#[must_use]
pub fn worst_nan_ratio(frame: &Frame) -> (f64, &'static str) {
    let len = frame.len();
    if len == 0 {
        return (1.0, "close");
    }
    REQUIRED_COLUMNS
        .iter()
        .map(|name| {
            let nan = frame
                .column(name)
                .map_or(len, |c| c.iter().filter(|v| !v.is_finite()).count());
            (nan as f64 / len as f64, *name)
        })
        .fold((0.0, "close"), |worst, cur| if cur.0 > worst.0 { cur } else { worst })
}

fn parse_level(value: &Value) -> Option<PriceLevel> {
    match value.as_array()?.as_slice() {
        [price, size] => Some(PriceLevel {
            price: coerce_number(price)?,
            size: coerce_number(size)?,
        }),
        _ => None,
    }
}

/// Checks the first `sample` levels of each side, then parses the full book.
///
/// # Errors
/// Returns a reason if the sampled structure is wrong.
pub fn parse_orderbook(value: &Value, sample: usize) -> Result<OrderBook, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "orderbook must be an object".to_string())?;
    let timestamp = obj
        .get("timestamp")
        .and_then(parse_timestamp)
        .ok_or_else(|| "orderbook timestamp missing or invalid".to_string())?;

    let mut sides = Vec::with_capacity(2);
    for side in ["bids", "asks"] {
        let levels = obj
            .get(side)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("orderbook {side} must be a list"))?;
        if let Some(bad) = levels.iter().take(sample).position(|l| parse_level(l).is_none()) {
            return Err(format!("orderbook {side}[{bad}] is not a [price, size] pair"));
        }
        sides.push(levels.iter().filter_map(parse_level).collect::<Vec<_>>());
    }

    let asks = sides.pop().unwrap_or_default();
    let bids = sides.pop().unwrap_or_default();
    Ok(OrderBook {
        bids,
        asks,
        timestamp,
    })
}

fn parse_side(value: &Value) -> Option<TradeSide> {
    match value.as_str()?.trim().to_ascii_lowercase().as_str() {
        "buy" | "b" | "bid" => Some(TradeSide::Buy),
        "sell" | "s" | "ask" => Some(TradeSide::Sell),
        _ => None,
    }
}

fn parse_trade(value: &Value) -> Option<Trade> {
    Some(Trade {
        price: value.get("price").and_then(coerce_number)?,
        size: value.get("size").and_then(coerce_number)?,
        side: value.get("side").and_then(parse_side)?,
        time: value.get("time").and_then(coerce_millis)?,
    })
}

/// Checks the first `sample` trades for the required fields, then parses
/// every trade that is well-formed.
///
/// # Errors
/// Returns a reason if the value is not a list or a sampled trade is bad.
pub fn parse_trades(value: &Value, sample: usize) -> Result<Vec<Trade>, String> {
    let trades = value
        .as_array()
        .ok_or_else(|| "trades must be a list".to_string())?;
    for (i, trade) in trades.iter().take(sample).enumerate() {
        if let Some(field) = TRADE_FIELDS.iter().find(|f| trade.get(**f).is_none()) {
            return Err(format!("trades[{i}] missing '{field}'"));
        }
        if parse_trade(trade).is_none() {
            return Err(format!("trades[{i}] has non-numeric or unknown fields"));
        }
    }
    Ok(trades.iter().filter_map(parse_trade).collect())
}

/// Parses a ticker, ignoring fields that are not numeric.
#[must_use]
pub fn parse_ticker(value: &Value) -> Option<Ticker> {
    value.as_object()?;
    let field = |name: &str| value.get(name).and_then(coerce_number);
    Some(Ticker {
        last: field("last"),
        volume: field("volume"),
        quote_volume: field("quote_volume"),
        high: field("high"),
        low: field("low"),
    })
}

/// Sub-fields a sentiment payload is expected to carry.
pub const SENTIMENT_FIELDS: [&str; 3] = ["funding_rate", "long_short_ratio", "liquidations"];

/// Parses sentiment, returning the names of expected sub-fields that were absent.
#[must_use]
pub fn parse_sentiment(value: &Value) -> Option<(Sentiment, Vec<&'static str>)> {
    let obj = value.as_object()?;
    let missing = SENTIMENT_FIELDS
        .iter()
        .copied()
        .filter(|f| !obj.contains_key(*f))
        .collect();

    let liquidations = obj
        .get("liquidations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let side = match item.get("side")?.as_str()?.to_ascii_lowercase().as_str() {
                        "long" | "buy" => PositionSide::Long,
                        "short" | "sell" => PositionSide::Short,
                        _ => return None,
                    };
                    Some(Liquidation {
                        side,
                        size: item.get("size").and_then(coerce_number)?,
                        time: item.get("time").and_then(coerce_millis).unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let sentiment = Sentiment {
        funding_rate: obj.get("funding_rate").and_then(coerce_number),
        long_short_ratio: obj.get("long_short_ratio").and_then(coerce_number),
        liquidations,
    };
    Some((sentiment, missing))
}

/// Typed view of a payload that passed structural validation.
#[derive(Debug, Clone)]
pub struct ParsedPayload {
    pub symbol: String,
    pub timestamp: i64,
    /// Usable candle tables under their raw labels, in payload order
    pub tables: Vec<(String, Frame)>,
    pub trades: Vec<Trade>,
    pub orderbook: Option<OrderBook>,
    pub ticker: Option<Ticker>,
    pub sentiment: Option<Sentiment>,
}

impl ParsedPayload {
    /// Builds the immutable snapshot handed to indicators.
    #[must_use]
    pub fn into_snapshot(self, frames: BTreeMap<TimeframeRole, Frame>) -> MarketSnapshot {
        MarketSnapshot {
            symbol: self.symbol,
            timestamp: self.timestamp,
            frames,
            trades: self.trades,
            orderbook: self.orderbook,
            ticker: self.ticker,
            sentiment: self.sentiment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_numbers_and_numeric_strings() {
        assert_eq!(coerce_number(&json!(1.5)), Some(1.5));
        assert_eq!(coerce_number(&json!(" 42 ")), Some(42.0));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!(null)), None);
    }

    #[test]
    fn parses_row_records() {
        let table = json!([
            {"open": 1, "high": 2, "low": 0.5, "close": "1.5", "volume": 10, "timestamp": 1000},
            {"open": 1.5, "high": 2, "low": 1, "close": 1.8, "volume": 12, "timestamp": 2000}
        ]);
        let frame = parse_table(&table).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.close, vec![1.5, 1.8]);
        assert_eq!(frame.timestamp, vec![1000, 2000]);
    }

    #[test]
    fn parses_columnar_tables() {
        let table = json!({
            "open": [1, 2], "high": [2, 3], "low": [0, 1], "close": [1.5, "bad"], "volume": [5, 6]
        });
        let frame = parse_table(&table).unwrap();
        assert_eq!(frame.len(), 2);
        assert!(frame.close[1].is_nan());
        assert!(frame.timestamp.is_empty());
    }

    #[test]
    fn rejects_tables_missing_columns() {
        let rows = json!([{"open": 1, "high": 2, "low": 0, "close": 1}]);
        assert_eq!(parse_table(&rows).unwrap_err(), "missing column 'volume'");
        assert!(parse_table(&json!([])).is_err());
        assert!(parse_table(&json!("1m")).is_err());
    }

    #[test]
    fn worst_nan_ratio_reports_column() {
        let frame = Frame {
            open: vec![1.0; 4],
            high: vec![1.0; 4],
            low: vec![1.0; 4],
            close: vec![1.0; 4],
            volume: vec![1.0, f64::NAN, 1.0, 1.0],
            timestamp: vec![],
        };
        assert_eq!(worst_nan_ratio(&frame), (0.25, "volume"));
    }

    #[test]
    fn orderbook_sampled_check() {
        let ob = json!({"bids": [[99, 1], [98, "2"]], "asks": [[101, 1]], "timestamp": 5});
        let book = parse_orderbook(&ob, 5).unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.best_ask(), Some(101.0));

        let bad = json!({"bids": [[99]], "asks": [], "timestamp": 5});
        assert!(parse_orderbook(&bad, 5).is_err());

        let no_ts = json!({"bids": [], "asks": []});
        assert!(parse_orderbook(&no_ts, 5).is_err());
    }

    #[test]
    fn orderbook_levels_beyond_sample_are_skipped_not_fatal() {
        let ob = json!({"bids": [[99, 1], "junk"], "asks": [[101, 1]], "timestamp": 5});
        let book = parse_orderbook(&ob, 1).unwrap();
        assert_eq!(book.bids.len(), 1);
    }

    #[test]
    fn trades_require_fields_in_sample() {
        let ok = json!([{"price": 1, "size": 2, "side": "BUY", "time": 3}]);
        assert_eq!(parse_trades(&ok, 5).unwrap()[0].side, TradeSide::Buy);

        let missing = json!([{"price": 1, "size": 2, "time": 3}]);
        assert_eq!(parse_trades(&missing, 5).unwrap_err(), "trades[0] missing 'side'");
    }

    #[test]
    fn sentiment_reports_missing_fields() {
        let (s, missing) = parse_sentiment(&json!({"funding_rate": 0.0001})).unwrap();
        assert_eq!(s.funding_rate, Some(0.0001));
        assert_eq!(missing, vec!["long_short_ratio", "liquidations"]);
    }
}
