use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use frontdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let webhook_secret = config
        .telephony
        .webhook_secret
        .as_ref()
        .map(|secret| redact_secret(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "database.url",
            &config.database.url,
            source("database.url", "FRONTDESK_DATABASE_URL"),
        ),
        render_line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            source("database.max_connections", "FRONTDESK_DATABASE_MAX_CONNECTIONS"),
        ),
        render_line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            source("database.timeout_secs", "FRONTDESK_DATABASE_TIMEOUT_SECS"),
        ),
        render_line(
            "server.bind_address",
            &config.server.bind_address,
            source("server.bind_address", "FRONTDESK_SERVER_BIND_ADDRESS"),
        ),
        render_line(
            "server.port",
            &config.server.port.to_string(),
            source("server.port", "FRONTDESK_SERVER_PORT"),
        ),
        render_line(
            "server.health_check_port",
            &config.server.health_check_port.to_string(),
            source("server.health_check_port", "FRONTDESK_SERVER_HEALTH_CHECK_PORT"),
        ),
        render_line(
            "events.durable",
            &config.events.durable.to_string(),
            source("events.durable", "FRONTDESK_EVENTS_DURABLE"),
        ),
        render_line(
            "events.fetch_limit",
            &config.events.fetch_limit.to_string(),
            source("events.fetch_limit", "FRONTDESK_EVENTS_FETCH_LIMIT"),
        ),
        render_line(
            "events.memory_capacity",
            &config.events.memory_capacity.to_string(),
            source("events.memory_capacity", "FRONTDESK_EVENTS_MEMORY_CAPACITY"),
        ),
        render_line(
            "events.poll_interval_secs",
            &config.events.poll_interval_secs.to_string(),
            source("events.poll_interval_secs", "FRONTDESK_EVENTS_POLL_INTERVAL_SECS"),
        ),
        render_line(
            "events.reconcile_limit",
            &config.events.reconcile_limit.to_string(),
            source("events.reconcile_limit", "FRONTDESK_EVENTS_RECONCILE_LIMIT"),
        ),
        render_line(
            "events.heartbeat_secs",
            &config.events.heartbeat_secs.to_string(),
            source("events.heartbeat_secs", "FRONTDESK_EVENTS_HEARTBEAT_SECS"),
        ),
        render_line(
            "telephony.webhook_secret",
            &webhook_secret,
            source("telephony.webhook_secret", "FRONTDESK_TELEPHONY_WEBHOOK_SECRET"),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", "FRONTDESK_LOGGING_LEVEL"),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", "FRONTDESK_LOGGING_FORMAT"),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("frontdesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/frontdesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        return "<empty>".to_string();
    }

    "<redacted>".to_string()
}
