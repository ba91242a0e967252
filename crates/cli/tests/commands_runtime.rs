use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tripflow_cli::commands::{config, doctor, migrate, seed, smoke};

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("tripflow.db").display())
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("TRIPFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("TRIPFLOW_DATABASE_URL", "postgres://localhost/tripflow")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_every_demo_account() {
    with_env(&[("TRIPFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("demo directory loaded with 6 accounts:"));
        assert!(message.contains("  - manager: meera.manager@tripflow.dev (Meera Manager)"));
        assert!(message.contains("  - travel desk: priya.poc@tripflow.dev (Priya POC)"));
        assert!(message.contains("  - vendor: desk@skyline.travel (Skyline Travels)"));
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("TRIPFLOW_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_reports_missing_schema_until_migrated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("TRIPFLOW_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check(&report, "database_connectivity")["status"], "pass");
        assert_eq!(check(&report, "schema_migrations")["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(check(&report, "notification_transport")["status"], "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("TRIPFLOW_NOTIFICATIONS_WEBHOOK_URL", "hooks.example.com/travel")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] database_connectivity:"));
    });
}

#[test]
fn config_output_attributes_sources_and_redacts_the_webhook_token() {
    with_env(
        &[
            ("TRIPFLOW_DATABASE_URL", "sqlite::memory:"),
            ("TRIPFLOW_NOTIFICATIONS_WEBHOOK_URL", "https://hooks.example.com/travel"),
            ("TRIPFLOW_NOTIFICATIONS_WEBHOOK_TOKEN", "hook-secret-value"),
            ("TRIPFLOW_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (TRIPFLOW_DATABASE_URL))"
            ));
            assert!(output.contains("- logging.level = debug (source: env (TRIPFLOW_LOG_LEVEL))"));
            assert!(output.contains("- workflow.notify_manager_on_bypass = false (source: default)"));
            assert!(output.contains("- notifications.webhook_token = hook***"));
            assert!(!output.contains("hook-secret-value"));
        },
    );
}

#[test]
fn smoke_runs_an_approval_round_trip() {
    with_env(&[("TRIPFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");

        let round_trip = check(&payload, "workflow_round_trip");
        assert_eq!(round_trip["status"], "pass");
        assert!(round_trip["message"].as_str().unwrap_or("").starts_with("TR-"));
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("TRIPFLOW_DATABASE_TIMEOUT_SECS", "0")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(check(&payload, "workflow_round_trip")["status"], "skipped");
    });
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .unwrap_or_else(|| panic!("check `{name}` missing from report"))
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "TRIPFLOW_DATABASE_URL",
        "TRIPFLOW_DATABASE_MAX_CONNECTIONS",
        "TRIPFLOW_DATABASE_TIMEOUT_SECS",
        "TRIPFLOW_SERVER_BIND_ADDRESS",
        "TRIPFLOW_SERVER_PORT",
        "TRIPFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TRIPFLOW_NOTIFICATIONS_QUEUE_CAPACITY",
        "TRIPFLOW_NOTIFICATIONS_WEBHOOK_URL",
        "TRIPFLOW_NOTIFICATIONS_WEBHOOK_TOKEN",
        "TRIPFLOW_NOTIFICATIONS_TIMEOUT_SECS",
        "TRIPFLOW_WORKFLOW_NOTIFY_MANAGER_ON_BYPASS",
        "TRIPFLOW_LOGGING_LEVEL",
        "TRIPFLOW_LOGGING_FORMAT",
        "TRIPFLOW_LOG_LEVEL",
        "TRIPFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
