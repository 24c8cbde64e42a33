//! Fault-injecting repository double
//!
//! Delegates to an embedded [`MemoryStore`] while letting tests make
//! selected operations fail with storage errors, to exercise the
//! degraded paths real backends hit.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use ranch_common::error::{RanchError, Result};
use ranch_common::types::job::{Job, JobStatus};
use ranch_common::types::ledger::LedgerEntry;
use ranch_common::types::payment::PaymentRecord;
use ranch_common::types::user::User;

use crate::{MemoryStore, Repository};

#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_create_payment: AtomicBool,
    fail_delete_job: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_payment` fail with a storage error
    pub fn fail_create_payment(&self, fail: bool) {
        self.fail_create_payment.store(fail, Ordering::SeqCst);
    }

    /// Make `delete_job` fail with a storage error
    pub fn fail_delete_job(&self, fail: bool) {
        self.fail_delete_job.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FaultyStore {
    async fn create_user(&self, user: User) -> Result<User> {
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.get_user_by_email(email).await
    }

    async fn update_user(&self, user: User) -> Result<User> {
        self.inner.update_user(user).await
    }

    async fn count_users(&self) -> Result<u64> {
        self.inner.count_users().await
    }

    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
        self.inner.list_users(limit, offset).await
    }

    async fn create_job(&self, job: Job) -> Result<Job> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        self.inner.get_job(id).await
    }

    async fn update_job(&self, job: Job) -> Result<Job> {
        self.inner.update_job(job).await
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        if self.fail_delete_job.load(Ordering::SeqCst) {
            return Err(RanchError::Storage("Delete rejected by backend".to_string()));
        }
        self.inner.delete_job(id).await
    }

    async fn list_jobs(
        &self,
        user_id: Option<Uuid>,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        self.inner.list_jobs(user_id, status, limit, offset).await
    }

    async fn count_jobs_since(&self, since: i64) -> Result<u64> {
        self.inner.count_jobs_since(since).await
    }

    async fn count_failed_jobs_since(&self, since: i64) -> Result<u64> {
        self.inner.count_failed_jobs_since(since).await
    }

    async fn append_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        self.inner.append_ledger_entry(entry).await
    }

    async fn sum_ledger_deltas(&self, user_id: Uuid) -> Result<i64> {
        self.inner.sum_ledger_deltas(user_id).await
    }

    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        self.inner.list_ledger_entries(user_id, limit, offset).await
    }

    async fn total_rcc_consumed_since(&self, since: i64) -> Result<i64> {
        self.inner.total_rcc_consumed_since(since).await
    }

    async fn create_payment(&self, record: PaymentRecord) -> Result<PaymentRecord> {
        if self.fail_create_payment.load(Ordering::SeqCst) {
            return Err(RanchError::Storage("Write rejected by backend".to_string()));
        }
        self.inner.create_payment(record).await
    }

    async fn get_payment_by_event_id(&self, event_id: &str) -> Result<Option<PaymentRecord>> {
        self.inner.get_payment_by_event_id(event_id).await
    }

    async fn list_payments(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentRecord>> {
        self.inner.list_payments(user_id, limit, offset).await
    }
}
