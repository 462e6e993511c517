use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use client_core::BotConfig;

/// Reads the optional TOML file at `path`, then applies environment
/// overrides. A missing file is not an error.
pub fn load_settings(path: &Path) -> anyhow::Result<BotConfig> {
    let mut config = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<BotConfig>(&raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => BotConfig::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut BotConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BOT_TOKEN") {
        config.token = v;
    }
    if let Some(v) = lookup("APP__TOKEN") {
        config.token = v;
    }

    if let Some(v) = lookup("BOT_NAME") {
        config.name = Some(v);
    }
    if let Some(v) = lookup("APP__NAME") {
        config.name = Some(v);
    }

    if let Some(v) = lookup("APP__CACHED") {
        if let Ok(parsed) = v.parse::<bool>() {
            config.cached = parsed;
        }
    }

    if let Some(v) = lookup("APP__API_BASE_URL") {
        config.api_base_url = v;
    }

    if let Some(v) = lookup("APP__PREFER_ADVERTISED_RECONNECT_URL") {
        if let Ok(parsed) = v.parse::<bool>() {
            config.prefer_advertised_reconnect_url = parsed;
        }
    }
}
