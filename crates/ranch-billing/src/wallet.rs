//! Wallet operations over the RCC ledger
//!
//! Every operation appends at most one ledger entry. Mutating operations
//! for a user run under that user's async mutex, so a reserve observes
//! all previously committed entries and two concurrent reserves can never
//! both succeed on one reservation's worth of balance. Reads
//! (`balance`, `history`) take no lock.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use ranch_common::audit::AuditLogger;
use ranch_common::error::{Result, WalletError};
use ranch_common::types::job::{ChargeMode, Job};
use ranch_common::types::ledger::{LedgerEntry, LedgerReason};
use ranch_store::Repository;

/// Result of the completion-time charge decision for one job
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    /// Whether a debit was appended
    pub charged: bool,

    /// Amount debited; zero when nothing was charged
    pub amount: i64,

    /// Balance after the decision
    pub balance: i64,

    /// The job the decision was for
    pub job_id: Uuid,

    /// The job's snapshotted charge mode
    pub charge_mode: ChargeMode,
}

/// A page of ledger history with the derived balance
#[derive(Debug, Clone, Serialize)]
pub struct WalletHistory {
    pub balance: i64,
    pub entries: Vec<LedgerEntry>,
}

/// Ledger-backed wallet
pub struct Wallet {
    repo: Arc<dyn Repository>,
    audit: AuditLogger,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Wallet {
    pub fn new(repo: Arc<dyn Repository>, audit: AuditLogger) -> Self {
        Self {
            repo,
            audit,
            locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Current balance: the sum of the user's ledger deltas
    pub async fn balance(&self, user_id: Uuid) -> Result<i64> {
        self.repo.sum_ledger_deltas(user_id).await
    }

    /// Reserve a job's cost at creation time.
    ///
    /// Admins get a zero-delta `AdminBypass` marker instead of a debit.
    /// A shortfall returns `InsufficientBalance` and appends nothing.
    #[instrument(skip(self), fields(%user_id, %job_id))]
    pub async fn reserve(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        cost: i64,
        is_admin: bool,
    ) -> Result<LedgerEntry> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if is_admin {
            let entry = LedgerEntry::new(user_id, 0, LedgerReason::AdminBypass).with_job(job_id);
            return self.repo.append_ledger_entry(entry).await;
        }

        let available = self.repo.sum_ledger_deltas(user_id).await?;
        if available < cost {
            return Err(WalletError::InsufficientBalance {
                required: cost,
                available,
            }
            .into());
        }

        let entry = LedgerEntry::new(user_id, -cost, LedgerReason::JobReserve).with_job(job_id);
        let entry = self.repo.append_ledger_entry(entry).await?;
        info!(cost, "Reserved RCC for job");
        Ok(entry)
    }

    /// Refund a failed job's snapshotted cost.
    ///
    /// A non-positive cost is a no-op (free-tier and bypassed jobs have
    /// nothing to release).
    #[instrument(skip(self), fields(%user_id, %job_id))]
    pub async fn release(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        cost: i64,
    ) -> Result<Option<LedgerEntry>> {
        if cost <= 0 {
            return Ok(None);
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let entry = LedgerEntry::new(user_id, cost, LedgerReason::JobRelease).with_job(job_id);
        let entry = self.repo.append_ledger_entry(entry).await?;
        info!(cost, "Released RCC for failed job");
        Ok(Some(entry))
    }

    /// Debit a successfully completed job under the completion charge mode.
    ///
    /// Admin-bypassed jobs are never charged here; their zero-delta marker
    /// was appended at creation. Uses the `JobReserve` reason, matching the
    /// creation-time debit so ledger consumers see one debit tag.
    #[instrument(skip(self), fields(%user_id, %job_id))]
    pub async fn charge_on_completion(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        cost: i64,
        is_admin: bool,
    ) -> Result<Option<LedgerEntry>> {
        if is_admin || cost <= 0 {
            return Ok(None);
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let available = self.repo.sum_ledger_deltas(user_id).await?;
        if available < cost {
            return Err(WalletError::InsufficientBalance {
                required: cost,
                available,
            }
            .into());
        }

        let entry = LedgerEntry::new(user_id, -cost, LedgerReason::JobReserve).with_job(job_id);
        let entry = self.repo.append_ledger_entry(entry).await?;
        info!(cost, "Charged RCC on completion");
        Ok(Some(entry))
    }

    /// Credit a completed top-up purchase
    #[instrument(skip(self), fields(%user_id))]
    pub async fn grant_topup(
        &self,
        user_id: Uuid,
        amount: i64,
        external_ref: &str,
    ) -> Result<LedgerEntry> {
        self.grant(user_id, amount, LedgerReason::TopupGrant, external_ref)
            .await
    }

    /// Credit a paid subscription invoice
    #[instrument(skip(self), fields(%user_id))]
    pub async fn grant_subscription(
        &self,
        user_id: Uuid,
        amount: i64,
        external_ref: &str,
    ) -> Result<LedgerEntry> {
        self.grant(user_id, amount, LedgerReason::SubscriptionGrant, external_ref)
            .await
    }

    async fn grant(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: LedgerReason,
        external_ref: &str,
    ) -> Result<LedgerEntry> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount.into());
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let entry = LedgerEntry::new(user_id, amount, reason).with_external_ref(external_ref);
        let entry = self.repo.append_ledger_entry(entry).await?;
        info!(amount, reason = %reason, "Granted RCC");
        Ok(entry)
    }

    /// Admin correction with an arbitrary signed delta.
    ///
    /// No floor check: a negative adjustment may drive the balance below
    /// zero. Always audited with the acting admin.
    #[instrument(skip(self, reason), fields(%user_id, %admin_id))]
    pub async fn manual_adjust(
        &self,
        user_id: Uuid,
        delta: i64,
        admin_id: Uuid,
        reason: &str,
    ) -> Result<LedgerEntry> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let entry = LedgerEntry::new(user_id, delta, LedgerReason::ManualAdjust)
            .with_external_ref(reason);
        let entry = self.repo.append_ledger_entry(entry).await?;

        self.audit.log_wallet_adjust(admin_id, user_id, delta, reason);
        Ok(entry)
    }

    /// Apply the completion-time charge decision for a finished job.
    ///
    /// Charges only when the job's snapshotted mode is `OnCompletion`, the
    /// job succeeded and it was not admin-bypassed. Shortfalls propagate.
    pub async fn process_completion(&self, job: &Job, success: bool) -> Result<CompletionOutcome> {
        let mut charged = false;
        let mut amount = 0;

        if job.charge_mode == ChargeMode::OnCompletion && success && !job.admin_bypass {
            if let Some(entry) = self
                .charge_on_completion(job.user_id, job.id, job.cost_rcc, false)
                .await?
            {
                charged = true;
                amount = -entry.delta;
            }
        }

        let balance = self.balance(job.user_id).await?;

        Ok(CompletionOutcome {
            charged,
            amount,
            balance,
            job_id: job.id,
            charge_mode: job.charge_mode,
        })
    }

    /// Ledger history page plus the derived balance
    pub async fn history(&self, user_id: Uuid, limit: usize, offset: usize) -> Result<WalletHistory> {
        let entries = self.repo.list_ledger_entries(user_id, limit, offset).await?;
        let balance = self.repo.sum_ledger_deltas(user_id).await?;
        Ok(WalletHistory { balance, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranch_common::error::RanchError;
    use ranch_common::types::job::JobType;
    use ranch_store::MemoryStore;

    fn wallet() -> Wallet {
        Wallet::new(Arc::new(MemoryStore::new()), AuditLogger::with_sinks(vec![]))
    }

    #[tokio::test]
    async fn test_reserve_then_release_round_trip() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        wallet.grant_topup(user_id, 10, "evt_a").await.unwrap();
        wallet.reserve(user_id, job_id, 5, false).await.unwrap();
        assert_eq!(wallet.balance(user_id).await.unwrap(), 5);

        wallet.release(user_id, job_id, 5).await.unwrap();
        assert_eq!(wallet.balance(user_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_insufficient_balance_appends_nothing() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();

        wallet.grant_topup(user_id, 3, "evt_b").await.unwrap();
        let err = wallet
            .reserve(user_id, Uuid::new_v4(), 5, false)
            .await
            .unwrap_err();

        match err {
            RanchError::Wallet(WalletError::InsufficientBalance { required, available }) => {
                assert_eq!(required, 5);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        let history = wallet.history(user_id, 10, 0).await.unwrap();
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.balance, 3);
    }

    #[tokio::test]
    async fn test_admin_bypass_is_zero_delta() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();

        let entry = wallet
            .reserve(user_id, Uuid::new_v4(), 5, true)
            .await
            .unwrap();
        assert_eq!(entry.delta, 0);
        assert_eq!(entry.reason, LedgerReason::AdminBypass);
        assert_eq!(wallet.balance(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_noop_for_zero_cost() {
        let wallet = wallet();
        let released = wallet
            .release(Uuid::new_v4(), Uuid::new_v4(), 0)
            .await
            .unwrap();
        assert!(released.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_reserves_one_winner() {
        let wallet = Arc::new(wallet());
        let user_id = Uuid::new_v4();
        wallet.grant_topup(user_id, 5, "evt_c").await.unwrap();

        let a = {
            let wallet = wallet.clone();
            tokio::spawn(async move { wallet.reserve(user_id, Uuid::new_v4(), 5, false).await })
        };
        let b = {
            let wallet = wallet.clone();
            tokio::spawn(async move { wallet.reserve(user_id, Uuid::new_v4(), 5, false).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(wallet.balance(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_manual_adjust_may_go_negative() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        wallet.grant_topup(user_id, 2, "evt_d").await.unwrap();
        wallet
            .manual_adjust(user_id, -10, admin_id, "billing correction")
            .await
            .unwrap();
        assert_eq!(wallet.balance(user_id).await.unwrap(), -8);
    }

    #[tokio::test]
    async fn test_invalid_grant_amount() {
        let wallet = wallet();
        assert!(wallet
            .grant_topup(Uuid::new_v4(), 0, "evt_e")
            .await
            .is_err());
        assert!(wallet
            .grant_subscription(Uuid::new_v4(), -5, "evt_f")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_process_completion_charges_on_completion_jobs() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();
        wallet.grant_topup(user_id, 5, "evt_g").await.unwrap();

        let job = Job::new(user_id, JobType::VideoTask, 5, ChargeMode::OnCompletion, false);
        let outcome = wallet.process_completion(&job, true).await.unwrap();

        assert!(outcome.charged);
        assert_eq!(outcome.amount, 5);
        assert_eq!(outcome.balance, 0);
    }

    #[tokio::test]
    async fn test_process_completion_skips_creation_mode() {
        let wallet = wallet();
        let user_id = Uuid::new_v4();
        wallet.grant_topup(user_id, 5, "evt_h").await.unwrap();

        let job = Job::new(user_id, JobType::VideoTask, 5, ChargeMode::OnCreation, false);
        let outcome = wallet.process_completion(&job, true).await.unwrap();

        assert!(!outcome.charged);
        assert_eq!(outcome.balance, 5);
    }
}
