use tripflow_core::domain::IdentityId;
use tripflow_core::{Capability, DirectoryEntry};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlRoleResolver};

/// Deterministic directory for local runs and smoke tests: one reporting line, a travel desk
/// and two vendors.
pub struct DemoDirectory;

#[derive(Debug, Clone, Copy)]
struct SeedAccount {
    identity: &'static str,
    display_name: &'static str,
    manager: Option<&'static str>,
    capabilities: &'static [Capability],
    role_label: &'static str,
}

const SEED_ACCOUNTS: &[SeedAccount] = &[
    SeedAccount {
        identity: "meera.manager@tripflow.dev",
        display_name: "Meera Manager",
        manager: None,
        capabilities: &[],
        role_label: "manager",
    },
    SeedAccount {
        identity: "esha.employee@tripflow.dev",
        display_name: "Esha Employee",
        manager: Some("meera.manager@tripflow.dev"),
        capabilities: &[],
        role_label: "employee",
    },
    SeedAccount {
        identity: "priya.poc@tripflow.dev",
        display_name: "Priya POC",
        manager: Some("meera.manager@tripflow.dev"),
        capabilities: &[Capability::Poc],
        role_label: "travel desk",
    },
    SeedAccount {
        identity: "desk@skyline.travel",
        display_name: "Skyline Travels",
        manager: None,
        capabilities: &[Capability::Vendor],
        role_label: "vendor",
    },
    SeedAccount {
        identity: "quotes@harbor.travel",
        display_name: "Harbor Journeys",
        manager: None,
        capabilities: &[Capability::Vendor],
        role_label: "vendor",
    },
    SeedAccount {
        identity: "ops.admin@tripflow.dev",
        display_name: "Ops Admin",
        manager: None,
        capabilities: &[Capability::Admin],
        role_label: "admin",
    },
];

impl SeedAccount {
    fn entry(&self) -> DirectoryEntry {
        let mut entry = DirectoryEntry::employee(self.identity, self.display_name);
        if let Some(manager) = self.manager {
            entry = entry.reporting_to(manager);
        }
        for capability in self.capabilities {
            entry = entry.with_capability(*capability);
        }
        entry
    }
}

impl DemoDirectory {
    pub const EMPLOYEE: &'static str = "esha.employee@tripflow.dev";
    pub const MANAGER: &'static str = "meera.manager@tripflow.dev";
    pub const POC: &'static str = "priya.poc@tripflow.dev";
    pub const VENDOR: &'static str = "desk@skyline.travel";

    pub fn entries() -> Vec<DirectoryEntry> {
        SEED_ACCOUNTS.iter().map(SeedAccount::entry).collect()
    }

    /// Upserts every demo account. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlRoleResolver::new(pool.clone());
        for account in SEED_ACCOUNTS {
            directory.upsert(&account.entry()).await?;
        }

        let accounts_seeded = SEED_ACCOUNTS
            .iter()
            .map(|account| SeededAccount {
                identity: account.identity,
                display_name: account.display_name,
                role_label: account.role_label,
            })
            .collect();
        Ok(SeedResult { accounts_seeded })
    }

    /// Checks that each demo account exists, is active and carries exactly its seeded
    /// reporting line and capabilities.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let directory = SqlRoleResolver::new(pool.clone());
        let mut checks = Vec::with_capacity(SEED_ACCOUNTS.len());

        for account in SEED_ACCOUNTS {
            let stored = directory.find_entry(&IdentityId::new(account.identity)).await?;
            let matches = stored.is_some_and(|stored| {
                let expected = account.entry();
                stored.active
                    && stored.display_name == expected.display_name
                    && stored.manager == expected.manager
                    && stored.capabilities == expected.capabilities
            });
            checks.push((account.identity, matches));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for account in SEED_ACCOUNTS {
            sqlx::query("DELETE FROM account_capability WHERE identity = ?")
                .bind(account.identity)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM employee WHERE identity = ?")
                .bind(account.identity)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub accounts_seeded: Vec<SeededAccount>,
}

#[derive(Debug)]
pub struct SeededAccount {
    pub identity: &'static str,
    pub display_name: &'static str,
    pub role_label: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};
    use tripflow_core::RoleResolver;

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = setup_pool().await;

        let first = DemoDirectory::load(&pool).await.expect("load seed");
        let second = DemoDirectory::load(&pool).await.expect("reload seed");
        assert_eq!(first.accounts_seeded.len(), second.accounts_seeded.len());

        let verification = DemoDirectory::verify(&pool).await.expect("verify seed");
        assert!(verification.all_present, "{:?}", verification.checks);
        assert_eq!(verification.checks.len(), DemoDirectory::entries().len());
    }

    #[tokio::test]
    async fn seeded_accounts_hold_their_roles() {
        let pool = setup_pool().await;
        DemoDirectory::load(&pool).await.expect("load seed");
        let directory = SqlRoleResolver::new(pool.clone());

        let employee = IdentityId::new(DemoDirectory::EMPLOYEE);
        let manager = IdentityId::new(DemoDirectory::MANAGER);
        assert!(directory.is_manager_of(&manager, &employee).await.expect("query"));
        assert!(directory
            .has_capability(&IdentityId::new(DemoDirectory::POC), Capability::Poc)
            .await
            .expect("query"));
        assert_eq!(directory.holders_of(Capability::Vendor).await.expect("query").len(), 2);
    }

    #[tokio::test]
    async fn verify_notices_drift_and_clean_removes_accounts() {
        let pool = setup_pool().await;
        DemoDirectory::load(&pool).await.expect("load seed");
        let directory = SqlRoleResolver::new(pool.clone());

        directory
            .revoke(&IdentityId::new(DemoDirectory::POC), Capability::Poc)
            .await
            .expect("revoke");
        let verification = DemoDirectory::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.contains(&(DemoDirectory::POC, false)));

        DemoDirectory::clean(&pool).await.expect("clean");
        assert!(directory.list_entries().await.expect("list").is_empty());
    }
}
