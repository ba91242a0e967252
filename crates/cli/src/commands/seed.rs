use crate::commands::{runtime, CommandResult};
use tripflow_core::config::{AppConfig, LoadOptions};
use tripflow_db::{connect_with_config, migrations, DemoDirectory, SeededAccount};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let seeded = DemoDirectory::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification = DemoDirectory::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if !verification.all_present {
                let message = failed_checks_message(&verification.checks);
                return Err(("seed_verification", message, 6u8));
            }
            Ok(seeded.accounts_seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(accounts) => CommandResult::success("seed", render_accounts(&accounts)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn render_accounts(accounts: &[SeededAccount]) -> String {
    let lines = accounts
        .iter()
        .map(|account| {
            format!("  - {}: {} ({})", account.role_label, account.identity, account.display_name)
        })
        .collect::<Vec<_>>();
    format!("demo directory loaded with {} accounts:\n{}", accounts.len(), lines.join("\n"))
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(identity, present)| (!present).then_some(*identity))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "demo directory failed to load".to_string()
    } else {
        format!("demo directory verification failed for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use tripflow_db::SeededAccount;

    use super::{failed_checks_message, render_accounts};

    #[test]
    fn verification_message_names_the_missing_accounts() {
        let checks = [
            ("meera.manager@tripflow.dev", true),
            ("priya.poc@tripflow.dev", false),
            ("desk@skyline.travel", false),
        ];

        assert_eq!(
            failed_checks_message(&checks),
            "demo directory verification failed for: priya.poc@tripflow.dev, desk@skyline.travel"
        );
    }

    #[test]
    fn verification_message_falls_back_to_generic_text() {
        let checks = [("meera.manager@tripflow.dev", true)];
        assert_eq!(failed_checks_message(&checks), "demo directory failed to load");
    }

    #[test]
    fn rendered_summary_lists_each_account_with_its_role() {
        let accounts = [SeededAccount {
            identity: "priya.poc@tripflow.dev",
            display_name: "Priya POC",
            role_label: "poc",
        }];

        let message = render_accounts(&accounts);
        assert!(message.starts_with("demo directory loaded with 1 accounts:"));
        assert!(message.contains("  - poc: priya.poc@tripflow.dev (Priya POC)"));
    }
}
