//! Admin operations
//!
//! Role gating lives here: every operation takes the acting user and
//! rejects non-admins with `Forbidden` before touching anything. The
//! admin flag is mutable only by other admins; self-demotion is rejected
//! so the portal can never lock itself out through its own UI.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use ranch_common::audit::AuditLogger;
use ranch_common::error::{RanchError, Result};
use ranch_common::types::ledger::LedgerEntry;
use ranch_common::types::user::User;
use ranch_store::Repository;

use crate::wallet::Wallet;

/// Admin dashboard figures over a time window
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    /// All registered users
    pub total_users: u64,

    /// Jobs created in the window
    pub jobs: u64,

    /// Jobs that failed in the window
    pub failed_jobs: u64,

    /// RCC debited for jobs in the window
    pub rcc_consumed: i64,

    /// Window start (Unix millis)
    pub since: i64,
}

/// Admin-gated user management, credit corrections and dashboard
pub struct AdminService {
    repo: Arc<dyn Repository>,
    wallet: Arc<Wallet>,
    audit: AuditLogger,
}

impl AdminService {
    pub fn new(repo: Arc<dyn Repository>, wallet: Arc<Wallet>, audit: AuditLogger) -> Self {
        Self { repo, wallet, audit }
    }

    fn require_admin(&self, actor: &User) -> Result<()> {
        if actor.is_admin {
            Ok(())
        } else {
            Err(RanchError::Forbidden("Admin role required".to_string()))
        }
    }

    /// Grant or revoke the admin flag on another account.
    ///
    /// Self-demotion is rejected; promote a second admin first.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, %target_id, is_admin))]
    pub async fn set_admin(&self, actor: &User, target_id: Uuid, is_admin: bool) -> Result<User> {
        self.require_admin(actor)?;
        if actor.id == target_id && !is_admin {
            return Err(RanchError::Forbidden(
                "Admins cannot demote themselves".to_string(),
            ));
        }

        let mut target = self
            .repo
            .get_user(target_id)
            .await?
            .ok_or_else(|| RanchError::NotFound(format!("User {target_id}")))?;
        target.is_admin = is_admin;
        let target = self.repo.update_user(target).await?;

        self.audit.log_admin_toggle(actor.id, target_id, is_admin);
        Ok(target)
    }

    /// Apply a signed RCC correction to any account
    pub async fn adjust_credits(
        &self,
        actor: &User,
        user_id: Uuid,
        delta: i64,
        reason: &str,
    ) -> Result<LedgerEntry> {
        self.require_admin(actor)?;
        if self.repo.get_user(user_id).await?.is_none() {
            return Err(RanchError::NotFound(format!("User {user_id}")));
        }
        self.wallet.manual_adjust(user_id, delta, actor.id, reason).await
    }

    /// Page through all accounts
    pub async fn list_users(&self, actor: &User, limit: usize, offset: usize) -> Result<Vec<User>> {
        self.require_admin(actor)?;
        self.repo.list_users(limit, offset).await
    }

    /// Dashboard figures since the given timestamp (Unix millis)
    pub async fn dashboard(&self, actor: &User, since: i64) -> Result<DashboardStats> {
        self.require_admin(actor)?;
        Ok(DashboardStats {
            total_users: self.repo.count_users().await?,
            jobs: self.repo.count_jobs_since(since).await?,
            failed_jobs: self.repo.count_failed_jobs_since(since).await?,
            rcc_consumed: self.repo.total_rcc_consumed_since(since).await?,
            since,
        })
    }
}
