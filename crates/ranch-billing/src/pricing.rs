//! Credit policy
//!
//! One explicitly owned policy object; no globals. Mutations validate
//! before touching anything, take the single write lock, and are audited
//! with the acting admin. Reads are snapshots; a job priced before a
//! change keeps its price.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use ranch_common::audit::AuditLogger;
use ranch_common::error::{PricingError, Result};
use ranch_common::types::job::{ChargeMode, JobType};
use ranch_common::{DEFAULT_IMAGE_COST, DEFAULT_VIDEO_COST};

/// Pricing for one job type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTypePricing {
    /// Base cost in RCC, non-negative
    pub base_cost: i64,

    /// Cost multiplier, non-negative
    pub multiplier: f64,

    /// Human-readable description for the admin view
    pub description: String,
}

/// Full pricing configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Per-job-type pricing
    pub job_types: HashMap<JobType, JobTypePricing>,

    /// When job costs are debited
    pub charge_mode: ChargeMode,

    /// Whether failed creation-charged jobs are refunded
    pub refund_on_failure: bool,

    /// Last change timestamp (Unix millis)
    pub updated_at: i64,

    /// Admin who made the last change, when any
    pub updated_by: Option<Uuid>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let mut job_types = HashMap::new();
        job_types.insert(
            JobType::ImageTask,
            JobTypePricing {
                base_cost: DEFAULT_IMAGE_COST,
                multiplier: 1.0,
                description: "Image generation".to_string(),
            },
        );
        job_types.insert(
            JobType::VideoTask,
            JobTypePricing {
                base_cost: DEFAULT_VIDEO_COST,
                multiplier: 1.0,
                description: "Video generation".to_string(),
            },
        );
        Self {
            job_types,
            charge_mode: ChargeMode::OnCreation,
            refund_on_failure: true,
            updated_at: chrono::Utc::now().timestamp_millis(),
            updated_by: None,
        }
    }
}

impl PricingConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Recognized: `RANCH_IMAGE_BASE_COST`, `RANCH_VIDEO_BASE_COST`,
    /// `RANCH_COST_MULTIPLIER`, `RANCH_CHARGE_MODE`,
    /// `RANCH_REFUND_ON_FAILURE`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(cost) = env_parse::<i64>("RANCH_IMAGE_BASE_COST") {
            if let Some(p) = config.job_types.get_mut(&JobType::ImageTask) {
                p.base_cost = cost;
            }
        }
        if let Some(cost) = env_parse::<i64>("RANCH_VIDEO_BASE_COST") {
            if let Some(p) = config.job_types.get_mut(&JobType::VideoTask) {
                p.base_cost = cost;
            }
        }
        if let Some(mult) = env_parse::<f64>("RANCH_COST_MULTIPLIER") {
            for p in config.job_types.values_mut() {
                p.multiplier = mult;
            }
        }
        if let Ok(raw) = env::var("RANCH_CHARGE_MODE") {
            if let Ok(mode) = ChargeMode::from_str(&raw) {
                config.charge_mode = mode;
            }
        }
        if let Some(refund) = env_parse::<bool>("RANCH_REFUND_ON_FAILURE") {
            config.refund_on_failure = refund;
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// The live credit policy
pub struct CreditPolicy {
    config: RwLock<PricingConfig>,
    audit: AuditLogger,
}

impl CreditPolicy {
    /// Create a policy with the given starting configuration
    pub fn new(config: PricingConfig, audit: AuditLogger) -> Self {
        Self {
            config: RwLock::new(config),
            audit,
        }
    }

    /// Create a policy with environment-derived defaults
    pub fn from_env(audit: AuditLogger) -> Self {
        Self::new(PricingConfig::from_env(), audit)
    }

    /// Current cost of one job of the given type.
    ///
    /// `round(base_cost * multiplier)`, floored at 1 unless the base cost
    /// is exactly zero (free tier), in which case the cost is exactly 0.
    pub fn cost(&self, job_type: JobType) -> Result<i64> {
        let config = self.config.read();
        let pricing = config
            .job_types
            .get(&job_type)
            .ok_or_else(|| PricingError::UnknownJobType(job_type.to_string()))?;

        if pricing.base_cost == 0 {
            return Ok(0);
        }
        let raw = (pricing.base_cost as f64 * pricing.multiplier).round() as i64;
        Ok(raw.max(1))
    }

    /// Current charge mode
    pub fn charge_mode(&self) -> ChargeMode {
        self.config.read().charge_mode
    }

    /// Whether failed creation-charged jobs are refunded
    pub fn refund_on_failure(&self) -> bool {
        self.config.read().refund_on_failure
    }

    /// Snapshot of the full configuration
    pub fn snapshot(&self) -> PricingConfig {
        self.config.read().clone()
    }

    /// Set the base cost of a job type
    pub fn set_base_cost(&self, admin_id: Uuid, job_type: JobType, base_cost: i64) -> Result<()> {
        if base_cost < 0 {
            return Err(PricingError::NegativeBaseCost(base_cost).into());
        }

        let mut config = self.config.write();
        let pricing = config
            .job_types
            .get_mut(&job_type)
            .ok_or_else(|| PricingError::UnknownJobType(job_type.to_string()))?;

        let old = pricing.base_cost;
        pricing.base_cost = base_cost;
        config.updated_at = chrono::Utc::now().timestamp_millis();
        config.updated_by = Some(admin_id);
        drop(config);

        self.audit.log_config_change(
            admin_id,
            &format!("{}_base_cost", job_type),
            &old.to_string(),
            &base_cost.to_string(),
        );
        info!(%job_type, base_cost, "Base cost updated");
        Ok(())
    }

    /// Set the cost multiplier of a job type
    pub fn set_multiplier(&self, admin_id: Uuid, job_type: JobType, multiplier: f64) -> Result<()> {
        if multiplier < 0.0 || !multiplier.is_finite() {
            return Err(PricingError::NegativeMultiplier(multiplier).into());
        }

        let mut config = self.config.write();
        let pricing = config
            .job_types
            .get_mut(&job_type)
            .ok_or_else(|| PricingError::UnknownJobType(job_type.to_string()))?;

        let old = pricing.multiplier;
        pricing.multiplier = multiplier;
        config.updated_at = chrono::Utc::now().timestamp_millis();
        config.updated_by = Some(admin_id);
        drop(config);

        self.audit.log_config_change(
            admin_id,
            &format!("{}_multiplier", job_type),
            &old.to_string(),
            &multiplier.to_string(),
        );
        Ok(())
    }

    /// Switch the global charge mode.
    ///
    /// Only affects jobs created after the switch; in-flight jobs carry
    /// their snapshotted mode.
    pub fn set_charge_mode(&self, admin_id: Uuid, mode: ChargeMode) -> Result<()> {
        let mut config = self.config.write();
        let old = config.charge_mode;
        config.charge_mode = mode;
        config.updated_at = chrono::Utc::now().timestamp_millis();
        config.updated_by = Some(admin_id);
        drop(config);

        self.audit
            .log_config_change(admin_id, "charge_mode", old.as_str(), mode.as_str());
        info!(mode = %mode, "Charge mode switched");
        Ok(())
    }

    /// Toggle refunds for failed creation-charged jobs
    pub fn set_refund_on_failure(&self, admin_id: Uuid, refund: bool) -> Result<()> {
        let mut config = self.config.write();
        let old = config.refund_on_failure;
        config.refund_on_failure = refund;
        config.updated_at = chrono::Utc::now().timestamp_millis();
        config.updated_by = Some(admin_id);
        drop(config);

        self.audit.log_config_change(
            admin_id,
            "refund_on_failure",
            &old.to_string(),
            &refund.to_string(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CreditPolicy {
        CreditPolicy::new(PricingConfig::default(), AuditLogger::with_sinks(vec![]))
    }

    #[test]
    fn test_default_costs() {
        let policy = policy();
        assert_eq!(policy.cost(JobType::ImageTask).unwrap(), 1);
        assert_eq!(policy.cost(JobType::VideoTask).unwrap(), 5);
    }

    #[test]
    fn test_multiplier_rounds() {
        let policy = policy();
        let admin = Uuid::new_v4();
        policy.set_multiplier(admin, JobType::VideoTask, 1.5).unwrap();
        // 5 * 1.5 = 7.5 -> 8
        assert_eq!(policy.cost(JobType::VideoTask).unwrap(), 8);
    }

    #[test]
    fn test_cost_floor_is_one() {
        let policy = policy();
        let admin = Uuid::new_v4();
        policy
            .set_multiplier(admin, JobType::ImageTask, 0.1)
            .unwrap();
        // 1 * 0.1 rounds to 0, floored to 1
        assert_eq!(policy.cost(JobType::ImageTask).unwrap(), 1);
    }

    #[test]
    fn test_zero_base_means_free() {
        let policy = policy();
        let admin = Uuid::new_v4();
        policy.set_base_cost(admin, JobType::ImageTask, 0).unwrap();
        assert_eq!(policy.cost(JobType::ImageTask).unwrap(), 0);
    }

    #[test]
    fn test_invalid_updates_rejected_without_effect() {
        let policy = policy();
        let admin = Uuid::new_v4();

        assert!(policy.set_base_cost(admin, JobType::ImageTask, -5).is_err());
        assert!(policy
            .set_multiplier(admin, JobType::ImageTask, -1.0)
            .is_err());
        assert!(policy
            .set_multiplier(admin, JobType::ImageTask, f64::NAN)
            .is_err());

        assert_eq!(policy.cost(JobType::ImageTask).unwrap(), 1);
        assert!(policy.snapshot().updated_by.is_none());
    }

    #[test]
    fn test_charge_mode_switch() {
        let policy = policy();
        assert_eq!(policy.charge_mode(), ChargeMode::OnCreation);
        policy
            .set_charge_mode(Uuid::new_v4(), ChargeMode::OnCompletion)
            .unwrap();
        assert_eq!(policy.charge_mode(), ChargeMode::OnCompletion);
    }
}
