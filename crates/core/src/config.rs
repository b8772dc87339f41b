use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::signal::DataClass;
use crate::timeframe::TimeframeRole;

/// Complete engine configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Indicators to register, by name
    pub indicators: Vec<String>,
    /// Per-indicator weight overrides
    pub weights: HashMap<String, f64>,
    /// Weight given to indicators missing from `weights`
    pub default_weight: f64,
    pub timeframes: TimeframesConfig,
    pub debug: DebugConfig,
    pub cache: CacheConfig,
    pub transforms: TransformConfig,
    pub validation: ValidationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indicators: [
                "technical",
                "volume",
                "orderflow",
                "orderbook",
                "sentiment",
                "price_structure",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            weights: HashMap::from([
                ("technical".to_string(), 0.17),
                ("volume".to_string(), 0.17),
                ("orderflow".to_string(), 0.17),
                ("orderbook".to_string(), 0.15),
                ("sentiment".to_string(), 0.17),
                ("price_structure".to_string(), 0.17),
            ]),
            default_weight: 0.05,
            timeframes: TimeframesConfig::default(),
            debug: DebugConfig::default(),
            cache: CacheConfig::default(),
            transforms: TransformConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

/// Interval definition for one canonical role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSpec {
    /// Raw interval label, e.g. "5" or "4h"
    pub interval: String,
    pub weight: f64,
    /// Minimum usable rows before indicators consider the table sufficient
    pub min_rows: usize,
}

impl TimeframeSpec {
    fn new(interval: &str, weight: f64, min_rows: usize) -> Self {
        Self {
            interval: interval.to_string(),
            weight,
            min_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframesConfig {
    pub base: TimeframeSpec,
    pub ltf: TimeframeSpec,
    pub mtf: TimeframeSpec,
    pub htf: TimeframeSpec,
}

impl Default for TimeframesConfig {
    fn default() -> Self {
        Self {
            base: TimeframeSpec::new("1", 0.4, 50),
            ltf: TimeframeSpec::new("5", 0.3, 50),
            mtf: TimeframeSpec::new("30", 0.2, 50),
            htf: TimeframeSpec::new("240", 0.1, 20),
        }
    }
}

impl TimeframesConfig {
    /// Interval definition for a role.
    #[must_use]
    pub fn spec(&self, role: TimeframeRole) -> &TimeframeSpec {
        match role {
            TimeframeRole::Base => &self.base,
            TimeframeRole::Ltf => &self.ltf,
            TimeframeRole::Mtf => &self.mtf,
            TimeframeRole::Htf => &self.htf,
        }
    }

    /// Minimum rows configured for a role.
    #[must_use]
    pub fn min_rows(&self, role: TimeframeRole) -> usize {
        self.spec(role).min_rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    /// Pipeline stages only
    #[default]
    Basic,
    /// Stages plus one event per indicator
    Detailed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub level: DebugLevel,
}

/// Cache TTLs per data class, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub orderbook: u64,
    pub orderflow: u64,
    pub technical: u64,
    pub volume: u64,
    pub sentiment: u64,
    pub structure: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            orderbook: 5,
            orderflow: 15,
            technical: 120,
            volume: 120,
            sentiment: 600,
            structure: 900,
        }
    }
}

impl CacheTtlConfig {
    /// TTL for results of the given data class.
    #[must_use]
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        let secs = match class {
            DataClass::OrderBook => self.orderbook,
            DataClass::OrderFlow => self.orderflow,
            DataClass::Technical => self.technical,
            DataClass::Volume => self.volume,
            DataClass::Sentiment => self.sentiment,
            DataClass::Structure => self.structure,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Prefix of every cache key
    pub namespace: String,
    /// Auto-expiry of the single-flight lock key
    pub lock_ttl_secs: u64,
    /// How long lock losers poll before computing on their own
    pub lock_wait_ms: u64,
    pub lock_poll_ms: u64,
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "confluence".to_string(),
            lock_ttl_secs: 30,
            lock_wait_ms: 10_000,
            lock_poll_ms: 100,
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    #[must_use]
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    #[must_use]
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }
}

/// Shape knobs for the score transforms used by the reference indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Sigmoid steepness applied to ratio inputs centred on 1.0
    pub sigmoid_steepness: f64,
    /// Hyperbolic sensitivity applied to signed imbalance inputs
    pub hyperbolic_sensitivity: f64,
    /// Half-life of proximity scoring, as a percentage of price
    pub decay_half_life_pct: f64,
    /// Oscillator neutral band
    pub oscillator_low: f64,
    pub oscillator_high: f64,
    pub oscillator_steepness: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            sigmoid_steepness: 3.0,
            hyperbolic_sensitivity: 2.0,
            decay_half_life_pct: 0.5,
            oscillator_low: 30.0,
            oscillator_high: 70.0,
            oscillator_steepness: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Timeframes with a larger NaN ratio in any column are dropped
    pub max_nan_ratio: f64,
    /// Below this validity ratio the result is flagged as degraded
    pub degraded_ratio: f64,
    /// Order book levels / trades inspected by the structural checks
    pub sample_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_nan_ratio: 0.10,
            degraded_ratio: 0.60,
            sample_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_cover_default_indicators() {
        let cfg = EngineConfig::default();
        for name in &cfg.indicators {
            assert!(cfg.weights.contains_key(name), "missing weight for {name}");
        }
        let total: f64 = cfg.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ttl_grows_with_staleness_tolerance() {
        let ttl = CacheTtlConfig::default();
        assert!(ttl.ttl_for(DataClass::OrderBook) < ttl.ttl_for(DataClass::Technical));
        assert!(ttl.ttl_for(DataClass::Technical) < ttl.ttl_for(DataClass::Sentiment));
        assert!(ttl.ttl_for(DataClass::Sentiment) <= ttl.ttl_for(DataClass::Structure));
    }

    #[test]
    fn timeframe_spec_lookup_by_role() {
        let tf = TimeframesConfig::default();
        assert_eq!(tf.spec(TimeframeRole::Htf).interval, "240");
        assert_eq!(tf.min_rows(TimeframeRole::Base), 50);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"debug": {"enabled": true}}"#).unwrap();
        assert!(cfg.debug.enabled);
        assert_eq!(cfg.debug.level, DebugLevel::Basic);
        assert_eq!(cfg.cache.namespace, "confluence");
    }
}
