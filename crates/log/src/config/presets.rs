//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Fields, Format};

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from a variable lookup.
    ///
    /// Reads `CODENODE_LOG` (falling back to `RUST_LOG`),
    /// `CODENODE_LOG_FORMAT`, the display toggles `CODENODE_LOG_TIME`,
    /// `CODENODE_LOG_SOURCE` and `CODENODE_LOG_COLORS`, and the fields
    /// `CODENODE_SERVICE` and `CODENODE_ENV`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup("CODENODE_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = lookup("CODENODE_LOG_FORMAT") {
            config.format = Format::parse(&format);
        }

        let flag = |key: &str| lookup(key).map(|v| v != "0" && v != "false");
        if let Some(time) = flag("CODENODE_LOG_TIME") {
            config.display.time = time;
        }
        if let Some(source) = flag("CODENODE_LOG_SOURCE") {
            config.display.source = source;
        }
        if let Some(colors) = flag("CODENODE_LOG_COLORS") {
            config.display.colors = colors;
        }

        config.fields = Fields {
            service: lookup("CODENODE_SERVICE"),
            env: lookup("CODENODE_ENV"),
            version: None,
        };
        config
    }

    /// Development configuration (pretty, debug level)
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn codenode_log_wins_over_rust_log() {
        let config = Config::from_lookup(lookup(&[("RUST_LOG", "warn"), ("CODENODE_LOG", "trace")]));
        assert_eq!(config.level, "trace");
        let config = Config::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[rstest]
    #[case("json", Format::Json)]
    #[case("PRETTY", Format::Pretty)]
    #[case("logfmt", Format::Compact)]
    fn format_names(#[case] name: &str, #[case] expected: Format) {
        assert_eq!(Format::parse(name), expected);
    }

    #[test]
    fn display_toggles_and_fields() {
        let config = Config::from_lookup(lookup(&[
            ("CODENODE_LOG_TIME", "0"),
            ("CODENODE_LOG_COLORS", "false"),
            ("CODENODE_LOG_SOURCE", "1"),
            ("CODENODE_SERVICE", "codenode"),
        ]));
        assert!(!config.display.time);
        assert!(!config.display.colors);
        assert!(config.display.source);
        assert_eq!(config.fields.service.as_deref(), Some("codenode"));
        assert!(!config.fields.is_empty());
    }

    #[test]
    fn presets() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::production().format, Format::Json);
        assert!(!Config::production().display.colors);
        assert!(Config::default().fields.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"format": "json", "display": {"time": false}}"#).unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.level, "info");
        assert!(!config.display.time);
        assert!(config.display.target);
    }
}
