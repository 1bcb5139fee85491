use anyhow::Context;
use std::path::Path;
use textloom_core::PipelineConfig;

/// Loads the pipeline configuration from an optional TOML file; missing keys keep their defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse(&text).with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    Ok(config)
}

pub fn parse(text: &str) -> anyhow::Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn partial_files_override_only_what_they_name() -> anyhow::Result<()> {
        let config = parse(
            r#"
            [validation]
            strict = true
            min_words_ratio = 0.9

            [invocation]
            max_attempts = 3
            short_output_backoff_ms = 500

            [registry]
            retention_ms = 1000

            [search]
            exclude_globs = ["**/vendor/**"]
            "#,
        )?;

        assert!(config.validation.strict);
        assert_eq!(config.validation.min_words_ratio, 0.9);
        assert_eq!(config.validation.min_chars_ratio, 0.8);
        assert_eq!(config.invocation.max_attempts, 3);
        assert_eq!(config.invocation.short_output_backoff, Duration::from_millis(500));
        assert_eq!(config.invocation.transport_backoff, Duration::from_secs(3));
        assert_eq!(config.registry.retention, Duration::from_secs(1));
        assert_eq!(config.search.exclude_globs, vec!["**/vendor/**"]);
        assert_eq!(config.segmentation.max_lines, 80);
        Ok(())
    }

    #[test]
    fn inconsistent_bounds_are_rejected() {
        let result = parse(
            r#"
            [segmentation]
            soft_lines = 90
            max_lines = 80
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_has_context() {
        let error = load(Some(Path::new("/definitely/not/here.toml"))).expect_err("missing file");
        assert!(error.to_string().contains("failed to read config file"));
    }
}
