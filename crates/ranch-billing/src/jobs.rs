//! Job lifecycle with pricing snapshots
//!
//! `create_job` prices the job once and writes both the cost and the
//! current charge mode into the job row. Every later refund or
//! completion-charge decision consults those snapshots only.
//!
//! If the creation-time reservation fails, the freshly created job row is
//! deleted again, so no unpaid job ever survives in `Created`.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use ranch_common::error::{JobError, RanchError, Result};
use ranch_common::types::job::{ChargeMode, Job, JobStatus, JobType};
use ranch_common::types::user::User;
use ranch_store::Repository;

use crate::pricing::CreditPolicy;
use crate::wallet::{CompletionOutcome, Wallet};

/// What happened alongside a status transition
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdateOutcome {
    /// The job after the transition
    pub job: Job,

    /// RCC refunded on failure, if any
    pub refunded: Option<i64>,

    /// Completion-charge decision, when the job reached `Succeeded`
    pub completion: Option<CompletionOutcome>,

    /// Message describing a failed completion charge; the job stays
    /// `Succeeded` regardless
    pub completion_error: Option<String>,
}

/// Job creation, transitions and ownership checks
pub struct JobService {
    repo: Arc<dyn Repository>,
    wallet: Arc<Wallet>,
    policy: Arc<CreditPolicy>,
    /// Per-job locks serializing status transitions, so two concurrent
    /// terminal transitions cannot both pass the terminal check and
    /// refund twice
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl JobService {
    pub fn new(repo: Arc<dyn Repository>, wallet: Arc<Wallet>, policy: Arc<CreditPolicy>) -> Self {
        Self {
            repo,
            wallet,
            policy,
            locks: DashMap::new(),
        }
    }

    /// Create a job for `user`, pricing and charging it per the current
    /// policy.
    ///
    /// Under `OnCreation` the cost is reserved immediately; a failed
    /// reservation deletes the job row and propagates the error. Admins
    /// always get the zero-delta bypass entry instead of a debit.
    #[instrument(skip(self, user, metadata), fields(user_id = %user.id, %job_type))]
    pub async fn create_job(
        &self,
        user: &User,
        job_type: JobType,
        metadata: Option<serde_json::Value>,
    ) -> Result<Job> {
        let cost = self.policy.cost(job_type)?;
        let mode = self.policy.charge_mode();

        let mut job = Job::new(user.id, job_type, cost, mode, user.is_admin);
        if let Some(metadata) = metadata {
            job = job.with_metadata(metadata);
        }
        let job = self.repo.create_job(job).await?;

        let must_charge_now = user.is_admin || mode == ChargeMode::OnCreation;
        if must_charge_now {
            if let Err(err) = self
                .wallet
                .reserve(user.id, job.id, cost, user.is_admin)
                .await
            {
                // The reservation error is what the caller needs to see;
                // a failed cleanup is logged, not substituted for it.
                if let Err(delete_err) = self.repo.delete_job(job.id).await {
                    error!(job_id = %job.id, %delete_err, "Failed to delete unpaid job");
                }
                return Err(err);
            }
        }

        info!(job_id = %job.id, cost, mode = %mode, "Job created");
        Ok(job)
    }

    /// Fetch a job; non-admins may only read their own
    pub async fn get_job(&self, actor: &User, job_id: Uuid) -> Result<Job> {
        let job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;
        self.check_ownership(actor, &job)?;
        Ok(job)
    }

    /// List jobs; non-admins are always scoped to their own
    pub async fn list_jobs(
        &self,
        actor: &User,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let scope = if actor.is_admin { None } else { Some(actor.id) };
        self.repo.list_jobs(scope, status, limit, offset).await
    }

    /// Transition a job's status.
    ///
    /// `Running` stamps `started_at`. Terminal states stamp `ended_at` and
    /// the duration, and trigger the refund or completion-charge decision
    /// from the job's snapshots. Terminal jobs reject any further
    /// transition.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, %job_id, status = %status))]
    pub async fn update_status(
        &self,
        actor: &User,
        job_id: Uuid,
        status: JobStatus,
        output_uri: Option<String>,
    ) -> Result<JobUpdateOutcome> {
        let lock = self
            .locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut job = self
            .repo
            .get_job(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;
        self.check_ownership(actor, &job)?;

        if job.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                job_id,
                status: job.status.to_string(),
            }
            .into());
        }

        let now = chrono::Utc::now().timestamp_millis();
        job.status = status;
        if status == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if status.is_terminal() {
            job.ended_at = Some(now);
            job.duration_ms = Some(now - job.started_at.unwrap_or(job.created_at));
        }
        if let Some(uri) = output_uri {
            job.output_uri = Some(uri);
        }
        let job = self.repo.update_job(job).await?;

        let mut refunded = None;
        let mut completion = None;
        let mut completion_error = None;

        match status {
            JobStatus::Failed => {
                let refundable = job.charge_mode == ChargeMode::OnCreation
                    && !job.admin_bypass
                    && self.policy.refund_on_failure();
                if refundable {
                    if let Some(entry) =
                        self.wallet.release(job.user_id, job.id, job.cost_rcc).await?
                    {
                        refunded = Some(entry.delta);
                    }
                }
            }
            JobStatus::Succeeded => {
                match self.wallet.process_completion(&job, true).await {
                    Ok(outcome) => completion = Some(outcome),
                    Err(RanchError::Wallet(err)) => {
                        // The work is done; an unpayable completion charge
                        // does not un-succeed the job.
                        warn!(job_id = %job.id, %err, "Completion charge failed");
                        completion_error = Some(err.to_string());
                    }
                    Err(other) => return Err(other),
                }
            }
            _ => {}
        }

        Ok(JobUpdateOutcome {
            job,
            refunded,
            completion,
            completion_error,
        })
    }

    fn check_ownership(&self, actor: &User, job: &Job) -> Result<()> {
        if actor.is_admin || job.user_id == actor.id {
            Ok(())
        } else {
            Err(RanchError::Forbidden(format!(
                "Job {} belongs to another user",
                job.id
            )))
        }
    }
}
