//! Timeframe normalizer.
//!
//! Maps arbitrarily labelled candle tables onto the four canonical roles and
//! fills any role left empty, so indicators can always ask for `ltf` or
//! `htf` without caring how the data source named its intervals.

use std::collections::{BTreeMap, HashMap};

use confluence_core::{parse_interval_minutes, TimeframeRole, TimeframesConfig};
use serde::{Deserialize, Serialize};

/// Where the table for a role came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RoleSource {
    /// A raw label resolved directly to this role
    Resolved { label: String },
    /// A table displaced by a conflicting label, reused for this role
    Duplicate { label: String },
    /// Verbatim copy of another role's table (not resampled)
    Copied { from: TimeframeRole },
    /// Empty table with the required columns
    Placeholder,
}

impl RoleSource {
    /// True if the role holds data that was actually labelled for it.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Record of how every role was filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub sources: BTreeMap<TimeframeRole, RoleSource>,
    /// Labels that could not be mapped to any role
    pub unresolved: Vec<String>,
    /// Labels overwritten by a later label for the same role
    pub conflicts: Vec<String>,
}

impl NormalizationReport {
    /// Roles filled by fallback rather than direct resolution.
    #[must_use]
    pub fn filled_roles(&self) -> Vec<TimeframeRole> {
        self.sources
            .iter()
            .filter(|(_, source)| !source.is_resolved())
            .map(|(role, _)| *role)
            .collect()
    }
}

/// Complete four-role map plus its report.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub tables: BTreeMap<TimeframeRole, T>,
    pub report: NormalizationReport,
}

struct Displaced<T> {
    label: String,
    minutes: Option<u32>,
    table: T,
}

/// Resolves raw timeframe labels to canonical roles.
#[derive(Debug, Clone)]
pub struct TimeframeNormalizer {
    aliases: HashMap<String, TimeframeRole>,
    intervals: BTreeMap<TimeframeRole, u32>,
}

impl Default for TimeframeNormalizer {
    fn default() -> Self {
        Self::new(&TimeframesConfig::default())
    }
}

impl TimeframeNormalizer {
    /// Builds the alias table from the configured interval of each role.
    ///
    /// An interval of `m` minutes yields the aliases `m`, `mm`, `mmin`, and
    /// `hh` when `m` is a whole number of hours.
    #[must_use]
    pub fn new(config: &TimeframesConfig) -> Self {
        let mut aliases = HashMap::new();
        let mut intervals = BTreeMap::new();

        for role in TimeframeRole::ALL {
            let raw = config.spec(role).interval.trim().to_ascii_lowercase();
            let Some(minutes) = parse_interval_minutes(&raw) else {
                tracing::warn!(
                    role = %role,
                    interval = %raw,
                    "Unparseable timeframe interval, role has no aliases"
                );
                continue;
            };

            intervals.insert(role, minutes);
            aliases.insert(raw, role);
            aliases.insert(minutes.to_string(), role);
            aliases.insert(format!("{minutes}m"), role);
            aliases.insert(format!("{minutes}min"), role);
            if minutes >= 60 && minutes % 60 == 0 {
                aliases.insert(format!("{}h", minutes / 60), role);
            }
        }

        Self { aliases, intervals }
    }

    /// Resolves one label: canonical name, then alias, then numeric heuristic.
    #[must_use]
    pub fn resolve_label(&self, label: &str) -> Option<TimeframeRole> {
        if let Some(role) = TimeframeRole::from_name(label) {
            return Some(role);
        }
        let key = label.trim().to_ascii_lowercase();
        if let Some(role) = self.aliases.get(&key) {
            return Some(*role);
        }
        parse_interval_minutes(&key).and_then(TimeframeRole::from_minutes)
    }

    /// Configured interval of a role in minutes.
    #[must_use]
    pub fn interval_minutes(&self, role: TimeframeRole) -> Option<u32> {
        self.intervals.get(&role).copied()
    }

    /// Maps labelled tables onto all four roles.
    ///
    /// Tables are processed in order; when two labels resolve to the same
    /// role the later one wins. Missing roles are then filled from a
    /// displaced table, a copy of the nearest role, or an empty default.
    /// Never fails.
    pub fn normalize<T, I>(&self, tables: I) -> Normalized<T>
    where
        T: Clone + Default,
        I: IntoIterator<Item = (String, T)>,
    {
        let mut resolved: BTreeMap<TimeframeRole, (String, T)> = BTreeMap::new();
        let mut displaced: Vec<Displaced<T>> = Vec::new();
        let mut report = NormalizationReport::default();

        for (label, table) in tables {
            let Some(role) = self.resolve_label(&label) else {
                tracing::warn!(label = %label, "Unrecognised timeframe label, dropping table");
                report.unresolved.push(label);
                continue;
            };

            if let Some((previous, old)) = resolved.insert(role, (label.clone(), table)) {
                tracing::warn!(
                    role = %role,
                    previous = %previous,
                    label = %label,
                    "Timeframe conflict, last label wins"
                );
                report.conflicts.push(previous.clone());
                displaced.push(Displaced {
                    minutes: self.label_minutes(&previous),
                    label: previous,
                    table: old,
                });
            }
        }

        let mut out: BTreeMap<TimeframeRole, T> = BTreeMap::new();
        for (role, (label, table)) in resolved {
            report.sources.insert(role, RoleSource::Resolved { label });
            out.insert(role, table);
        }

        // (a) displaced duplicates, nearest interval first
        for role in TimeframeRole::ALL {
            if out.contains_key(&role) || displaced.is_empty() {
                continue;
            }
            let target = self.interval_minutes(role);
            let pick = displaced
                .iter()
                .enumerate()
                .min_by_key(|(_, d)| interval_distance(d.minutes, target))
                .map(|(i, _)| i);
            if let Some(i) = pick {
                let d = displaced.swap_remove(i);
                tracing::debug!(role = %role, label = %d.label, "Filled role from displaced table");
                report
                    .sources
                    .insert(role, RoleSource::Duplicate { label: d.label });
                out.insert(role, d.table);
            }
        }

        // (b) nearest available role, copied verbatim
        let available: Vec<TimeframeRole> = out.keys().copied().collect();
        for role in TimeframeRole::ALL {
            if out.contains_key(&role) {
                continue;
            }
            let nearest = available
                .iter()
                .copied()
                .min_by_key(|other| (other.rank().abs_diff(role.rank()), other.rank()));

            match nearest.and_then(|from| out.get(&from).cloned().map(|t| (from, t))) {
                Some((from, table)) => {
                    tracing::warn!(
                        role = %role,
                        from = %from,
                        "Missing timeframe approximated by copying nearest role"
                    );
                    report.sources.insert(role, RoleSource::Copied { from });
                    out.insert(role, table);
                }
                // (c) nothing at all to copy from
                None => {
                    tracing::warn!(role = %role, "Missing timeframe, using empty placeholder");
                    report.sources.insert(role, RoleSource::Placeholder);
                    out.insert(role, T::default());
                }
            }
        }

        Normalized {
            tables: out,
            report,
        }
    }

    fn label_minutes(&self, label: &str) -> Option<u32> {
        match TimeframeRole::from_name(label) {
            Some(role) => self.interval_minutes(role),
            None => parse_interval_minutes(label),
        }
    }
}

fn interval_distance(minutes: Option<u32>, target: Option<u32>) -> u32 {
    match (minutes, target) {
        (Some(a), Some(b)) => a.abs_diff(b),
        _ => u32::MAX,
    }
}
