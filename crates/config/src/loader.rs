//! Config file loading.

use std::path::Path;

use anyhow::{Context, bail};

use crate::schema::CourierConfig;

/// Load a config file, selecting the format by extension.
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "toml" => Ok(toml::from_str(&raw)?),
        "json" => Ok(serde_json::from_str(&raw)?),
        other => bail!("unsupported config format: .{other} (use .toml or .json)"),
    }
}

/// Load the given path, or fall back to defaults when no path is set.
/// Environment overrides apply on top of the file in either case.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<CourierConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => CourierConfig::default(),
    };
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

const ENV_BIND: &str = "COURIER_BIND";
const ENV_BRIDGE_URL: &str = "COURIER_BRIDGE_URL";
const ENV_DATABASE_URL: &str = "COURIER_DATABASE_URL";

fn apply_overrides(config: &mut CourierConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup(ENV_BIND) {
        config.gateway.bind = bind;
    }
    if let Some(url) = lookup(ENV_BRIDGE_URL) {
        config.bridge.url = url;
    }
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.scheduler.database_url = Some(url);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {std::io::Write, super::*};

    #[test]
    fn defaults_without_a_file() {
        let config = load_or_default(None).unwrap();
        assert_eq!(config.gateway.bind, "127.0.0.1:8080");
        assert_eq!(config.session.max_delay_secs, 30);
        assert!(config.scheduler.database_url.is_none());
        assert!(config.webhook.subscriptions.is_empty());
    }

    #[test]
    fn toml_round_trip_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[gateway]
bind = "0.0.0.0:9090"

[scheduler]
tickSecs = 5
databaseUrl = "sqlite://courier.db"

[[webhook.subscriptions]]
url = "https://hooks.example/a"
secret = "shh"
kinds = ["message.received"]

[autoreply.t1]
enabled = true
ownerMode = true

[[autoreply.t1.rules]]
matchType = "exact"
pattern = "ping"
response = "pong"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.gateway.bind, "0.0.0.0:9090");
        // Unset sections keep defaults.
        assert_eq!(config.bridge.url, "ws://127.0.0.1:3001");
        assert_eq!(config.scheduler.tick_secs, 5);
        assert_eq!(config.webhook.subscriptions.len(), 1);
        assert!(config.webhook.subscriptions[0].active);

        let t1 = &config.autoreply["t1"];
        assert!(t1.enabled && t1.owner_mode);
        assert_eq!(t1.rules[0].response, "pong");
    }

    #[test]
    fn env_overrides_beat_the_file() {
        let mut config = CourierConfig::default();
        apply_overrides(&mut config, |name| match name {
            "COURIER_BIND" => Some("0.0.0.0:8081".to_string()),
            "COURIER_DATABASE_URL" => Some("sqlite://override.db".to_string()),
            _ => None,
        });

        assert_eq!(config.gateway.bind, "0.0.0.0:8081");
        assert_eq!(
            config.scheduler.database_url.as_deref(),
            Some("sqlite://override.db")
        );
        // Untouched variables leave the config alone.
        assert_eq!(config.bridge.url, "ws://127.0.0.1:3001");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
