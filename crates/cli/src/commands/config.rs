use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use tripflow_core::config::{AppConfig, LoadOptions};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let webhook_token = config
        .notifications
        .webhook_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            env_keys: &["TRIPFLOW_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["TRIPFLOW_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["TRIPFLOW_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_keys: &["TRIPFLOW_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_keys: &["TRIPFLOW_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["TRIPFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "notifications.queue_capacity",
            env_keys: &["TRIPFLOW_NOTIFICATIONS_QUEUE_CAPACITY"],
            value: config.notifications.queue_capacity.to_string(),
        },
        Field {
            key: "notifications.webhook_url",
            env_keys: &["TRIPFLOW_NOTIFICATIONS_WEBHOOK_URL"],
            value: config
                .notifications
                .webhook_url
                .clone()
                .unwrap_or_else(|| "<unset> (log transport)".to_string()),
        },
        Field {
            key: "notifications.webhook_token",
            env_keys: &["TRIPFLOW_NOTIFICATIONS_WEBHOOK_TOKEN"],
            value: webhook_token,
        },
        Field {
            key: "notifications.timeout_secs",
            env_keys: &["TRIPFLOW_NOTIFICATIONS_TIMEOUT_SECS"],
            value: config.notifications.timeout_secs.to_string(),
        },
        Field {
            key: "workflow.notify_manager_on_bypass",
            env_keys: &["TRIPFLOW_WORKFLOW_NOTIFY_MANAGER_ON_BYPASS"],
            value: config.workflow.notify_manager_on_bypass.to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["TRIPFLOW_LOGGING_LEVEL", "TRIPFLOW_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["TRIPFLOW_LOGGING_FORMAT", "TRIPFLOW_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tripflow.toml"), PathBuf::from("config/tripflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let from_env = env_keys
        .iter()
        .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
    if let Some(env_key) = from_env {
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

/// Keeps a short prefix so operators can tell tokens apart without exposing them.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        return format!("{prefix}***");
    }

    "<redacted>".to_string()
}
