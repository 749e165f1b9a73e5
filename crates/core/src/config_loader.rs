use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads session configuration by merging TOML, environment variables,
    /// and JSON over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Same merge order, with an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("INTRADAY_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_files_present() {
        let config = ConfigLoader::load_from("/nonexistent/Config.toml").unwrap();
        assert_eq!(config.bar_secs, 60);
        assert_eq!(config.indicators.ema_short_period, 5);
        assert!((config.scoring.buy_threshold - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn max_lookback_is_largest_period() {
        let config = AppConfig::default();
        assert_eq!(config.indicators.max_lookback(), 20);
    }
}
