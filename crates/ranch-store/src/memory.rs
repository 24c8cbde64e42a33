//! Embedded in-memory repository
//!
//! DashMap-backed implementation of [`Repository`]. Secondary indexes
//! (email, gateway event id) enforce the uniqueness constraints the
//! services rely on. Ledger entries are kept per user in append order.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use ranch_common::error::{RanchError, Result};
use ranch_common::types::job::{Job, JobStatus};
use ranch_common::types::ledger::{LedgerEntry, LedgerReason};
use ranch_common::types::payment::PaymentRecord;
use ranch_common::types::user::User;

use crate::Repository;

/// In-memory store
///
/// Individual map operations are atomic; cross-entity consistency is the
/// caller's concern.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    users_by_email: DashMap<String, Uuid>,
    jobs: DashMap<Uuid, Job>,
    ledger: DashMap<Uuid, Vec<LedgerEntry>>,
    payments: DashMap<Uuid, PaymentRecord>,
    payments_by_event: DashMap<String, Uuid>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User> {
        match self.users_by_email.entry(user.email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RanchError::Storage(format!(
                    "Email already registered: {}",
                    user.email
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.users_by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        self.get_user(id).await
    }

    async fn update_user(&self, user: User) -> Result<User> {
        if !self.users.contains_key(&user.id) {
            return Err(RanchError::NotFound(format!("User {}", user.id)));
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.users.len() as u64)
    }

    async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }

    async fn create_job(&self, job: Job) -> Result<Job> {
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn update_job(&self, job: Job) -> Result<Job> {
        if !self.jobs.contains_key(&job.id) {
            return Err(RanchError::NotFound(format!("Job {}", job.id)));
        }
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        self.jobs.remove(&id);
        Ok(())
    }

    async fn list_jobs(
        &self,
        user_id: Option<Uuid>,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| user_id.map_or(true, |u| j.user_id == u))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .map(|j| j.clone())
            .collect();
        jobs.sort_by_key(|j| (std::cmp::Reverse(j.created_at), j.id));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_jobs_since(&self, since: i64) -> Result<u64> {
        Ok(self.jobs.iter().filter(|j| j.created_at >= since).count() as u64)
    }

    async fn count_failed_jobs_since(&self, since: i64) -> Result<u64> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed && j.ended_at.map_or(false, |t| t >= since))
            .count() as u64)
    }

    async fn append_ledger_entry(&self, entry: LedgerEntry) -> Result<LedgerEntry> {
        self.ledger
            .entry(entry.user_id)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn sum_ledger_deltas(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .ledger
            .get(&user_id)
            .map(|entries| entries.iter().map(|e| e.delta).sum())
            .unwrap_or(0))
    }

    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger
            .get(&user_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn total_rcc_consumed_since(&self, since: i64) -> Result<i64> {
        let mut total = 0i64;
        for entries in self.ledger.iter() {
            total += entries
                .value()
                .iter()
                .filter(|e| e.reason == LedgerReason::JobReserve && e.created_at >= since)
                .map(|e| -e.delta)
                .sum::<i64>();
        }
        Ok(total)
    }

    async fn create_payment(&self, record: PaymentRecord) -> Result<PaymentRecord> {
        match self
            .payments_by_event
            .entry(record.external_event_id.clone())
        {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RanchError::Conflict(format!(
                    "Payment event already recorded: {}",
                    record.external_event_id
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.id);
            }
        }
        self.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_payment_by_event_id(&self, event_id: &str) -> Result<Option<PaymentRecord>> {
        let Some(id) = self.payments_by_event.get(event_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.payments.get(&id).map(|p| p.clone()))
    }

    async fn list_payments(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentRecord>> {
        let mut records: Vec<PaymentRecord> = self
            .payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.clone())
            .collect();
        records.sort_by_key(|p| (std::cmp::Reverse(p.created_at), p.id));
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }
}
