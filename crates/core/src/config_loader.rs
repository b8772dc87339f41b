use crate::config::EngineConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the engine configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by layering defaults, the TOML file,
    /// `CONFLUENCE_`-prefixed environment variables, and an optional JSON
    /// file with the same stem.
    ///
    /// Missing files are skipped, so an absent config yields the defaults.
    /// Nested keys use `__` in environment variables, e.g.
    /// `CONFLUENCE_DEBUG__ENABLED=true`.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file or variable cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<EngineConfig> {
        let path = path.as_ref();
        let config: EngineConfig = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CONFLUENCE_").split("__"))
            .merge(Json::file(path.with_extension("json")))
            .extract()?;

        tracing::debug!(path = %path.display(), indicators = config.indicators.len(), "Loaded engine config");
        Ok(config)
    }

    /// Loads configuration from [`DEFAULT_CONFIG_PATH`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed.
    pub fn load_default() -> Result<EngineConfig> {
        Self::load(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = ConfigLoader::load("nope/Config.toml").map_err(|e| e.to_string())?;
            assert_eq!(cfg, EngineConfig::default());
            Ok(())
        });
    }

    #[test]
    fn toml_overrides_weights_and_debug() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                default_weight = 0.1

                [weights]
                orderbook = 0.4

                [debug]
                enabled = true
                level = "detailed"
                "#,
            )?;

            let cfg = ConfigLoader::load("Config.toml").map_err(|e| e.to_string())?;
            assert_eq!(cfg.weights.get("orderbook"), Some(&0.4));
            assert!((cfg.default_weight - 0.1).abs() < f64::EPSILON);
            assert!(cfg.debug.enabled);
            assert_eq!(cfg.debug.level, crate::config::DebugLevel::Detailed);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", "[cache]\nlock_poll_ms = 50\n")?;
            jail.set_env("CONFLUENCE_CACHE__LOCK_POLL_MS", "25");

            let cfg = ConfigLoader::load("Config.toml").map_err(|e| e.to_string())?;
            assert_eq!(cfg.cache.lock_poll_ms, 25);
            Ok(())
        });
    }

    #[test]
    fn sibling_json_overrides_defaults_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", "default_weight = 0.1\n")?;
            jail.create_file(
                "Config.json",
                r#"{"default_weight": 0.3, "debug": {"enabled": true}, "cache": {"lock_poll_ms": 40}}"#,
            )?;
            jail.set_env("CONFLUENCE_CACHE__LOCK_POLL_MS", "25");

            let cfg = ConfigLoader::load("Config.toml").map_err(|e| e.to_string())?;
            assert!((cfg.default_weight - 0.3).abs() < f64::EPSILON);
            assert!(cfg.debug.enabled);
            assert_eq!(cfg.cache.lock_poll_ms, 40);
            Ok(())
        });
    }
}
