//! Repository abstraction for the Ranch portal
//!
//! Persistence lives behind the [`Repository`] trait so the billing and
//! compute services never touch a concrete backend:
//! - Users, jobs, ledger entries and payment records
//! - Ledger entries are append-only; there is no update or delete
//! - `sum_ledger_deltas` is the one and only balance computation
//! - Dashboard counters for the admin overview
//!
//! [`MemoryStore`] is the embedded implementation used by the services
//! and the test suite.

pub mod memory;
pub mod testing;

pub use memory::MemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use ranch_common::error::Result;
use ranch_common::types::job::{Job, JobStatus};
use ranch_common::types::ledger::LedgerEntry;
use ranch_common::types::payment::PaymentRecord;
use ranch_common::types::user::User;

/// Storage backend for users, jobs, the credit ledger and payments
///
/// Individual operations are atomic and consistent on their own. The
/// serializable check-then-append that reservations need is provided by
/// the wallet's per-user mutex, not by the repository.
#[async_trait]
pub trait Repository: Send + Sync {
    // -- users --

    /// Persist a new user; fails if the email is already taken
    async fn create_user(&self, user: User) -> Result<User>;

    /// Fetch a user by id
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Fetch a user by email
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Replace a stored user record
    async fn update_user(&self, user: User) -> Result<User>;

    /// Total registered users
    async fn count_users(&self) -> Result<u64>;

    /// Page through users, oldest first
    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>>;

    // -- jobs --

    /// Persist a new job
    async fn create_job(&self, job: Job) -> Result<Job>;

    /// Fetch a job by id
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    /// Replace a stored job record
    async fn update_job(&self, job: Job) -> Result<Job>;

    /// Delete a job record; used only to compensate a failed reservation
    async fn delete_job(&self, id: Uuid) -> Result<()>;

    /// Page through a user's jobs, newest first, optionally filtered by status
    async fn list_jobs(
        &self,
        user_id: Option<Uuid>,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>>;

    /// Jobs created at or after `since` (Unix millis)
    async fn count_jobs_since(&self, since: i64) -> Result<u64>;

    /// Failed jobs that ended at or after `since` (Unix millis)
    async fn count_failed_jobs_since(&self, since: i64) -> Result<u64>;

    // -- ledger --

    /// Append an immutable ledger entry
    async fn append_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry>;

    /// Sum of all entry deltas for a user; zero when no entries exist
    async fn sum_ledger_deltas(&self, user_id: Uuid) -> Result<i64>;

    /// Page through a user's ledger entries, newest first
    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Total RCC debited for jobs at or after `since` (Unix millis),
    /// returned as a positive figure
    async fn total_rcc_consumed_since(&self, since: i64) -> Result<i64>;

    // -- payments --

    /// Persist a payment record; fails if the external event id was
    /// already recorded
    async fn create_payment(&self, record: PaymentRecord) -> Result<PaymentRecord>;

    /// Look up a payment record by gateway event id
    async fn get_payment_by_event_id(&self, event_id: &str) -> Result<Option<PaymentRecord>>;

    /// Page through a user's payment records, newest first
    async fn list_payments(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentRecord>>;
}
