use std::collections::HashMap;

use phasegate_utils::types::ConfigSource;

use super::Config;

fn stable_source_label(source: &ConfigSource) -> &'static str {
    match source {
        ConfigSource::Cli => "cli",
        ConfigSource::Config => "config",
        ConfigSource::Programmatic => "programmatic",
        ConfigSource::Default => "default",
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)`.
    #[must_use]
    pub fn effective_config(&self) -> HashMap<String, (String, String)> {
        let mut config = HashMap::new();
        let mut add = |key: &str, value: String| {
            let source = stable_source_label(&self.source_of(key)).to_string();
            config.insert(key.to_string(), (value, source));
        };

        add("confidence_threshold", format!("{:.1}", self.confidence_threshold()));
        add("max_retry_attempts", self.max_retry_attempts().to_string());
        add("phase_timeout", self.phase_timeout().as_secs().to_string());
        add("retry_delay", self.retry_delay().as_secs().to_string());
        add("output_root", self.output_root().to_string());
        add("validation_depth", self.validation_depth().to_string());
        add("glob_fallback", self.glob_fallback().to_string());
        add(
            "retry_phases",
            self.retry_phases()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
        add("lock_ttl_seconds", self.lock_ttl_seconds().to_string());

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_labels() {
        let config = Config::builder().max_retry_attempts(2).build().unwrap();
        let effective = config.effective_config();

        assert_eq!(
            effective.get("max_retry_attempts"),
            Some(&("2".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("confidence_threshold"),
            Some(&("9.0".to_string(), "default".to_string()))
        );
        assert_eq!(
            effective.get("retry_phases").map(|(v, _)| v.as_str()),
            Some("validation")
        );
    }
}
