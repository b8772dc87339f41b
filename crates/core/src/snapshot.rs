//! Typed market snapshot consumed by indicator adapters.
//!
//! A `MarketSnapshot` is built once per analysis call from a validated raw
//! payload and is never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::timeframe::TimeframeRole;

/// Columns every candle table must carry.
pub const REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Columnar OHLCV table.
///
/// Cells that could not be parsed are stored as `NaN`; the validator has
/// already rejected tables where that happens too often.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    /// Optional candle open times (ms since epoch)
    #[serde(default)]
    pub timestamp: Vec<i64>,
}

impl Frame {
    /// Creates an empty table carrying all required columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.close.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Looks up a required column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "open" => Some(&self.open),
            "high" => Some(&self.high),
            "low" => Some(&self.low),
            "close" => Some(&self.close),
            "volume" => Some(&self.volume),
            _ => None,
        }
    }

    /// Closes with non-finite cells removed, oldest first.
    #[must_use]
    pub fn finite_closes(&self) -> Vec<f64> {
        self.close.iter().copied().filter(|v| v.is_finite()).collect()
    }

    /// Volumes with non-finite cells removed, oldest first.
    #[must_use]
    pub fn finite_volumes(&self) -> Vec<f64> {
        self.volume.iter().copied().filter(|v| v.is_finite()).collect()
    }

    /// Most recent finite close.
    #[must_use]
    pub fn last_close(&self) -> Option<f64> {
        self.close.iter().rev().copied().find(|v| v.is_finite())
    }

    /// Number of rows where every required column is finite.
    #[must_use]
    pub fn usable_rows(&self) -> usize {
        (0..self.len())
            .filter(|&i| {
                [&self.open, &self.high, &self.low, &self.close, &self.volume]
                    .iter()
                    .all(|col| col.get(i).is_some_and(|v| v.is_finite()))
            })
            .count()
    }
}

/// Order book price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Snapshot of an order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bid levels (highest price first)
    pub bids: Vec<PriceLevel>,
    /// Ask levels (lowest price first)
    pub asks: Vec<PriceLevel>,
    /// Snapshot time (ms since epoch)
    pub timestamp: i64,
}

impl OrderBook {
    /// Depth imbalance over the top `levels`: (bid - ask) / (bid + ask).
    ///
    /// Returns a value in [-1.0, 1.0]; 0.0 when the book is empty.
    #[must_use]
    pub fn imbalance(&self, levels: usize) -> f64 {
        let bid_vol: f64 = self.bids.iter().take(levels).map(|l| l.size).sum();
        let ask_vol: f64 = self.asks.iter().take(levels).map(|l| l.size).sum();
        let total = bid_vol + ask_vol;

        if total <= 0.0 || !total.is_finite() {
            return 0.0;
        }
        (bid_vol - ask_vol) / total
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price between best bid and best ask.
    #[must_use]
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Relative spread in basis points.
    #[must_use]
    pub fn spread_bps(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let mid = (bid + ask) / 2.0;
        (mid > 0.0).then(|| (ask - bid) / mid * 10_000.0)
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "BUY", alias = "Buy", alias = "b")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell", alias = "s")]
    Sell,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
    /// Execution time (ms since epoch)
    pub time: i64,
}

/// 24h ticker summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub quote_volume: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
}

/// Position side of a liquidation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// Forced liquidation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liquidation {
    pub side: PositionSide,
    pub size: f64,
    #[serde(default)]
    pub time: i64,
}

/// Derivatives sentiment inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    #[serde(default)]
    pub funding_rate: Option<f64>,
    #[serde(default)]
    pub long_short_ratio: Option<f64>,
    #[serde(default)]
    pub liquidations: Vec<Liquidation>,
}

/// Everything an indicator adapter may look at for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    /// Snapshot time (ms since epoch)
    pub timestamp: i64,
    /// One table per canonical role
    pub frames: BTreeMap<TimeframeRole, Frame>,
    pub trades: Vec<Trade>,
    pub orderbook: Option<OrderBook>,
    pub ticker: Option<Ticker>,
    pub sentiment: Option<Sentiment>,
}

impl MarketSnapshot {
    /// Creates a snapshot with no market data attached.
    #[must_use]
    pub fn new(symbol: impl Into<String>, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            frames: BTreeMap::new(),
            trades: Vec::new(),
            orderbook: None,
            ticker: None,
            sentiment: None,
        }
    }

    /// Attaches a candle table for a role.
    #[must_use]
    pub fn with_frame(mut self, role: TimeframeRole, frame: Frame) -> Self {
        self.frames.insert(role, frame);
        self
    }

    #[must_use]
    pub fn with_trades(mut self, trades: Vec<Trade>) -> Self {
        self.trades = trades;
        self
    }

    #[must_use]
    pub fn with_orderbook(mut self, orderbook: OrderBook) -> Self {
        self.orderbook = Some(orderbook);
        self
    }

    #[must_use]
    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// Table for a role, if present.
    #[must_use]
    pub fn frame(&self, role: TimeframeRole) -> Option<&Frame> {
        self.frames.get(&role)
    }

    /// Usable row count for a role (0 when absent).
    #[must_use]
    pub fn usable_rows(&self, role: TimeframeRole) -> usize {
        self.frame(role).map_or(0, Frame::usable_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
        OrderBook {
            bids: bids
                .iter()
                .map(|&(price, size)| PriceLevel { price, size })
                .collect(),
            asks: asks
                .iter()
                .map(|&(price, size)| PriceLevel { price, size })
                .collect(),
            timestamp: 0,
        }
    }

    // ============================================
    // Frame Tests
    // ============================================

    #[test]
    fn usable_rows_skips_rows_with_nan() {
        let frame = Frame {
            open: vec![1.0, 1.0, f64::NAN],
            high: vec![2.0, 2.0, 2.0],
            low: vec![0.5, 0.5, 0.5],
            close: vec![1.5, 1.5, 1.5],
            volume: vec![10.0, f64::NAN, 10.0],
            timestamp: vec![],
        };
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.usable_rows(), 1);
    }

    #[test]
    fn last_close_skips_trailing_nan() {
        let frame = Frame {
            close: vec![1.0, 2.0, f64::NAN],
            ..Frame::default()
        };
        assert_eq!(frame.last_close(), Some(2.0));
    }

    #[test]
    fn column_lookup_rejects_unknown_names() {
        let frame = Frame::empty();
        assert!(frame.column("close").is_some());
        assert!(frame.column("vwap").is_none());
    }

    // ============================================
    // OrderBook Tests
    // ============================================

    #[test]
    fn imbalance_positive_when_bid_heavy() {
        let ob = book(&[(99.0, 30.0)], &[(101.0, 10.0)]);
        assert!((ob.imbalance(10) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn imbalance_zero_for_empty_book() {
        let ob = book(&[], &[]);
        assert_eq!(ob.imbalance(10), 0.0);
    }

    #[test]
    fn spread_bps_from_top_of_book() {
        let ob = book(&[(99.0, 1.0)], &[(101.0, 1.0)]);
        assert_eq!(ob.mid_price(), Some(100.0));
        assert!((ob.spread_bps().unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn trade_side_accepts_uppercase() {
        let side: TradeSide = serde_json::from_str("\"BUY\"").unwrap();
        assert_eq!(side, TradeSide::Buy);
    }

    #[test]
    fn snapshot_builder_attaches_frames() {
        let snap = MarketSnapshot::new("BTCUSDT", 1)
            .with_frame(TimeframeRole::Base, Frame::empty());
        assert!(snap.frame(TimeframeRole::Base).is_some());
        assert_eq!(snap.usable_rows(TimeframeRole::Htf), 0);
    }
}
