//! Configuration loading for the binary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use swirly_core::Config;

/// Reads a JSON config (or defaults), applies the seed override and
/// validates the result.
pub fn load(path: Option<&Path>, seed: Option<u64>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            parse(&text).with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => Config::default(),
    };
    if seed.is_some() {
        config.rng_seed = seed;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn parse(text: &str) -> Result<Config> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swirly_core::BehaviorMode;

    #[test]
    fn defaults_without_a_file() {
        let config = load(None, None).expect("defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn seed_flag_overrides_file() {
        let path = std::env::temp_dir().join(format!("swirly-settings-{}.json", std::process::id()));
        fs::write(&path, r#"{ "rng_seed": 1, "mode": "bounce", "num_blobs": 12 }"#).expect("write");
        let config = load(Some(path.as_path()), Some(99));
        let _ = fs::remove_file(&path);

        let config = config.expect("load");
        assert_eq!(config.rng_seed, Some(99));
        assert_eq!(config.mode, BehaviorMode::Bounce);
        assert_eq!(config.num_blobs, 12);
    }

    #[test]
    fn reports_missing_file_and_bad_values() {
        let missing = Path::new("/definitely/not/here/swirly.json");
        let err = load(Some(missing), None).expect_err("missing file");
        assert!(err.to_string().contains("failed to read config"));

        assert!(parse("{ not json").is_err());
        let bad = parse(r#"{ "substeps": 0 }"#).expect("parses");
        assert!(bad.validate().is_err());
    }
}
