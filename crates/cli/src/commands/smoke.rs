use std::sync::Arc;
use std::time::Instant;

use chrono::{Days, Utc};
use serde::Serialize;
use tripflow_core::config::{AppConfig, LoadOptions, WorkflowConfig};
use tripflow_core::domain::{Actor, RequestStatus, TripDetails};
use tripflow_core::{InMemoryNotificationSink, NotificationDispatcher};
use tripflow_db::{
    connect_with_config, connect_with_settings, migrations, DemoDirectory, SqlRoleResolver,
    SqlTravelRequestRepository,
};
use tripflow_workflow::TravelWorkflowService;

use crate::commands::{runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    let pool = match runtime.block_on(connect_with_config(&config.database)) {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed_since(db_started),
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_since(db_started),
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async {
        let result = migrations::run_pending(&pool).await;
        pool.close().await;
        result
    });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: elapsed_since(migration_started),
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_since(migration_started),
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, elapsed_since(started));
        }
    }

    let workflow_started = Instant::now();
    let round_trip = runtime.block_on(workflow_round_trip(&config.workflow));
    checks.push(SmokeCheck {
        name: "workflow_round_trip",
        status: if round_trip.is_ok() { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: elapsed_since(workflow_started),
        message: round_trip.unwrap_or_else(|error| format!("workflow round trip failed: {error}")),
    });

    finalize_report(checks, elapsed_since(started))
}

/// Drives one request from creation to a vendor quote against a scratch in-memory database
/// seeded with the demo directory, so the configured database never receives smoke data.
async fn workflow_round_trip(workflow: &WorkflowConfig) -> Result<String, String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5)
        .await
        .map_err(|error| format!("scratch database: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("scratch migrations: {error}"))?;
    DemoDirectory::load(&pool).await.map_err(|error| format!("demo directory: {error}"))?;

    let sink = InMemoryNotificationSink::default();
    let service = TravelWorkflowService::new(
        Arc::new(SqlTravelRequestRepository::new(pool.clone())),
        Arc::new(SqlRoleResolver::new(pool.clone())),
        NotificationDispatcher::spawn(Arc::new(sink.clone()), 16),
        workflow.policy(),
    );

    let employee = Actor::new(DemoDirectory::EMPLOYEE, "Esha Employee");
    let manager = Actor::new(DemoDirectory::MANAGER, "Meera Manager");
    let poc = Actor::new(DemoDirectory::POC, "Priya POC");
    let vendor = Actor::new(DemoDirectory::VENDOR, "Skyline Travels");
    let departure = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(14))
        .ok_or_else(|| "departure date out of range".to_string())?;
    let trip = TripDetails::one_way("Mumbai", "Bengaluru", departure, "Smoke check");

    let outcome = async {
        let created = service.create_request(&employee, trip).await?;
        service.manager_approve(&created.id, &manager).await?;
        service.poc_approve(&created.id, &poc).await?;
        let quoted = service
            .vendor_respond(&created.id, &vendor, "Morning flight held for 24h", Vec::new())
            .await?;
        Ok::<_, tripflow_core::ApplicationError>(quoted)
    }
    .await;

    service.flush_notifications().await;
    pool.close().await;

    let request = outcome.map_err(|error| error.to_string())?;
    if request.status != RequestStatus::Approved || request.vendor_messages.len() != 1 {
        return Err(format!(
            "{} ended as `{}` with {} vendor responses",
            request.human_id,
            request.status.as_str(),
            request.vendor_messages.len()
        ));
    }

    Ok(format!(
        "{} approved by manager and travel desk, quoted by vendor; \
         {} audit entries, {} notifications",
        request.human_id,
        request.audit_trail.len(),
        sink.delivered().len()
    ))
}

fn elapsed_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status != SmokeStatus::Pass);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
