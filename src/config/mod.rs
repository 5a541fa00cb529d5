// Configuration module entry point
// Layered settings: defaults, optional file, then RANGEKEEPER__* environment

mod types;

pub use types::{Config, FreshnessConfig, LoggingConfig, RangeConfig};

/// Environment variable prefix, e.g. `RANGEKEEPER__RANGE__MAX_CHUNK_LEN`
const ENV_PREFIX: &str = "RANGEKEEPER";

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    builder
        .set_default("logging.level", "warn")?
        .set_default("logging.trace_ranges", false)?
        .set_default("logging.trace_format", "text")?
        .set_default("range.max_chunk_len", i64::from(i32::MAX))?
        .set_default("range.resume_truncated", true)?
        .set_default("freshness.heuristic_percent", 10)
}

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// A missing file is not an error; environment variables override it.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );
        let settings = with_defaults(builder)?.build()?;
        settings.try_deserialize()
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        let settings = with_defaults(builder)?.build()?;
        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.range.max_chunk_len, i64::from(i32::MAX));
        assert!(cfg.range.resume_truncated);
        assert_eq!(cfg.freshness.heuristic_percent, 10);
    }

    #[test]
    fn test_toml_overrides() {
        let cfg = Config::from_toml_str(
            r#"
            [logging]
            level = "debug"
            trace_ranges = true
            trace_format = "json"

            [range]
            max_chunk_len = 4096
            resume_truncated = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.trace_ranges);
        assert_eq!(cfg.logging.trace_format, "json");
        assert_eq!(cfg.range.max_chunk_len, 4096);
        assert!(!cfg.range.resume_truncated);
        assert_eq!(cfg.freshness.heuristic_percent, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load_from("/nonexistent/rangekeeper-config").unwrap();
        assert_eq!(cfg.range, RangeConfig::default());
    }

    #[test]
    fn test_invalid_value() {
        assert!(Config::from_toml_str("[freshness]\nheuristic_percent = \"lots\"").is_err());
    }
}
