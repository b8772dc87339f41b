//! Market data validator.
//!
//! Validation runs in two passes:
//!
//! 1. **Structural** ([`MarketDataValidator::validate`]): checks the raw JSON
//!    shape, drops unusable parts in place and parses the rest.
//! 2. **Coverage** ([`MarketDataValidator::assess_coverage`]): asks every
//!    registered indicator whether it can run on the resulting snapshot.
//!
//! The policy leans towards continuing with partial data. Only a payload
//! with no usable timeframe, or one no indicator can use, is rejected.

use confluence_core::{MarketSnapshot, ValidationConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalizer::TimeframeNormalizer;
use crate::payload::{self, ParsedPayload};
use crate::registry::IndicatorRegistry;

/// Overall outcome of validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    /// Usable, but fewer indicators than the degraded threshold can run
    Degraded,
    Invalid,
}

/// Everything the validator found out about one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub verdict: Verdict,
    pub symbol: Option<String>,
    /// True if a synthetic timestamp was injected
    pub timestamp_corrected: bool,
    pub usable_timeframes: Vec<String>,
    pub dropped_timeframes: Vec<String>,
    /// Indicators able to run, once coverage has been assessed
    pub runnable: Vec<String>,
    pub validity_ratio: Option<f64>,
    pub warnings: Vec<String>,
    /// Reason for an `Invalid` verdict
    pub error: Option<String>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            verdict: Verdict::Valid,
            symbol: None,
            timestamp_corrected: false,
            usable_timeframes: Vec::new(),
            dropped_timeframes: Vec::new(),
            runnable: Vec::new(),
            validity_ratio: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// True unless the verdict is `Invalid`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.verdict != Verdict::Invalid
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.verdict == Verdict::Degraded
    }

    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!(symbol = ?self.symbol, "{message}");
        self.warnings.push(message);
    }

    fn reject(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(symbol = ?self.symbol, reason = %reason, "Payload rejected");
        self.verdict = Verdict::Invalid;
        self.error = Some(reason);
    }
}

/// Result of the structural pass.
#[derive(Debug, Clone)]
pub struct StructuralOutcome {
    pub report: ValidationReport,
    /// Present only when the payload passed
    pub parsed: Option<ParsedPayload>,
}

/// Gatekeeper for raw market payloads.
#[derive(Debug, Clone)]
pub struct MarketDataValidator {
    config: ValidationConfig,
    normalizer: TimeframeNormalizer,
}

impl MarketDataValidator {
    #[must_use]
    pub fn new(config: ValidationConfig, normalizer: TimeframeNormalizer) -> Self {
        Self { config, normalizer }
    }

    /// Structural pass over a raw payload.
    ///
    /// Light corrections are applied in place: a missing or invalid
    /// timestamp is replaced with the current time, and unusable
    /// timeframes, order books and trade lists are removed.
    pub fn validate(&self, raw: &mut Value) -> StructuralOutcome {
        let mut report = ValidationReport::new();

        let Some(obj) = raw.as_object_mut() else {
            report.reject("payload is not a JSON object");
            return StructuralOutcome {
                report,
                parsed: None,
            };
        };

        let symbol = match obj.get("symbol").and_then(Value::as_str).map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                report.reject("symbol missing or empty");
                return StructuralOutcome {
                    report,
                    parsed: None,
                };
            }
        };
        report.symbol = Some(symbol.clone());

        let timestamp = match obj.get("timestamp").and_then(payload::parse_timestamp) {
            Some(ts) => ts,
            None => {
                let now = chrono::Utc::now().timestamp_millis();
                obj.insert("timestamp".to_string(), Value::from(now));
                report.timestamp_corrected = true;
                report.warn("timestamp missing or invalid, using current time".to_string());
                now
            }
        };

        let tables = match obj.get_mut("ohlcv").and_then(Value::as_object_mut) {
            Some(ohlcv) => self.check_timeframes(ohlcv, &mut report),
            None => {
                report.reject("ohlcv missing or not an object");
                return StructuralOutcome {
                    report,
                    parsed: None,
                };
            }
        };
        if tables.is_empty() {
            report.reject("no usable timeframe");
            return StructuralOutcome {
                report,
                parsed: None,
            };
        }

        let sample = self.config.sample_size.max(1);

        let orderbook = match present(obj, "orderbook").map(|v| payload::parse_orderbook(v, sample)) {
            None => None,
            Some(Ok(book)) => Some(book),
            Some(Err(reason)) => {
                obj.remove("orderbook");
                report.warn(format!("orderbook dropped: {reason}"));
                None
            }
        };

        let trades = match present(obj, "trades").map(|v| payload::parse_trades(v, sample)) {
            None => Vec::new(),
            Some(Ok(trades)) => trades,
            Some(Err(reason)) => {
                obj.remove("trades");
                report.warn(format!("trades dropped: {reason}"));
                Vec::new()
            }
        };

        let ticker = match present(obj, "ticker").map(payload::parse_ticker) {
            None => None,
            Some(Some(ticker)) => Some(ticker),
            Some(None) => {
                report.warn("ticker ignored: not an object".to_string());
                None
            }
        };

        let sentiment = match present(obj, "sentiment").map(payload::parse_sentiment) {
            None => None,
            Some(Some((sentiment, missing))) => {
                for field in missing {
                    report.warn(format!("sentiment missing '{field}'"));
                }
                Some(sentiment)
            }
            Some(None) => {
                report.warn("sentiment ignored: not an object".to_string());
                None
            }
        };

        tracing::debug!(
            symbol = %symbol,
            timeframes = tables.len(),
            trades = trades.len(),
            has_orderbook = orderbook.is_some(),
            "Structural validation passed"
        );

        StructuralOutcome {
            report,
            parsed: Some(ParsedPayload {
                symbol,
                timestamp,
                tables,
                trades,
                orderbook,
                ticker,
                sentiment,
            }),
        }
    }

    fn check_timeframes(
        &self,
        ohlcv: &mut serde_json::Map<String, Value>,
        report: &mut ValidationReport,
    ) -> Vec<(String, confluence_core::Frame)> {
        let mut usable = Vec::new();
        let mut dropped = Vec::new();

        for (label, table) in ohlcv.iter() {
            if self.normalizer.resolve_label(label).is_none() {
                dropped.push((label.clone(), "unrecognised timeframe label".to_string()));
                continue;
            }
            let frame = match payload::parse_table(table) {
                Ok(frame) => frame,
                Err(reason) => {
                    dropped.push((label.clone(), reason));
                    continue;
                }
            };
            let (ratio, column) = payload::worst_nan_ratio(&frame);
            if ratio >= self.config.max_nan_ratio {
                dropped.push((
                    label.clone(),
                    format!("{:.0}% invalid values in '{column}'", ratio * 100.0),
                ));
                continue;
            }
            usable.push((label.clone(), frame));
        }

        for (label, reason) in dropped {
            ohlcv.remove(&label);
            report.warn(format!("timeframe '{label}' dropped: {reason}"));
            report.dropped_timeframes.push(label);
        }
        report.usable_timeframes = usable.iter().map(|(l, _)| l.clone()).collect();
        usable
    }

    /// Coverage pass: what share of registered indicators can run.
    ///
    /// A ratio of zero makes the payload invalid; a ratio below the
    /// configured degraded threshold passes with a warning.
    pub fn assess_coverage(
        &self,
        report: &mut ValidationReport,
        snapshot: &MarketSnapshot,
        registry: &IndicatorRegistry,
    ) {
        report.runnable = registry
            .iter()
            .filter(|(_, adapter)| adapter.can_run(snapshot))
            .map(|(name, _)| name.to_string())
            .collect();

        let total = registry.len();
        let ratio = if total == 0 {
            0.0
        } else {
            report.runnable.len() as f64 / total as f64
        };
        report.validity_ratio = Some(ratio);

        if ratio <= 0.0 {
            report.reject("no indicator can run on this payload");
        } else if ratio < self.config.degraded_ratio {
            report.verdict = Verdict::Degraded;
            report.warn(format!(
                "only {}/{} indicators can run, confidence degraded",
                report.runnable.len(),
                total
            ));
        }
    }
}

fn present<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}
