//! Purchasable credit packs and subscription plans
//!
//! The catalog is what the checkout page sells and what the webhook
//! processor consults to turn a paid event into an RCC grant. Amounts
//! are env-overridable so staging can sell cheap test packs.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A one-time top-up pack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPack {
    /// Stable pack id, referenced by checkout metadata
    pub id: String,

    /// Display name
    pub name: String,

    /// RCC granted on purchase
    pub rcc: i64,

    /// Price in minor currency units (cents)
    pub price_cents: i64,
}

/// A recurring subscription plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Stable plan id, referenced by invoice metadata
    pub id: String,

    /// Display name
    pub name: String,

    /// RCC granted per paid monthly invoice
    pub rcc_per_month: i64,

    /// Price in minor currency units (cents)
    pub price_cents: i64,
}

/// The sellable catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub packs: Vec<CreditPack>,
    pub plans: Vec<SubscriptionPlan>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            packs: vec![
                CreditPack {
                    id: "small".to_string(),
                    name: "Small pack".to_string(),
                    rcc: 10,
                    price_cents: 500,
                },
                CreditPack {
                    id: "medium".to_string(),
                    name: "Medium pack".to_string(),
                    rcc: 50,
                    price_cents: 2000,
                },
                CreditPack {
                    id: "large".to_string(),
                    name: "Large pack".to_string(),
                    rcc: 150,
                    price_cents: 5000,
                },
            ],
            plans: vec![
                SubscriptionPlan {
                    id: "starter".to_string(),
                    name: "Starter".to_string(),
                    rcc_per_month: 20,
                    price_cents: 999,
                },
                SubscriptionPlan {
                    id: "pro".to_string(),
                    name: "Pro".to_string(),
                    rcc_per_month: 100,
                    price_cents: 2999,
                },
                SubscriptionPlan {
                    id: "enterprise".to_string(),
                    name: "Enterprise".to_string(),
                    rcc_per_month: 500,
                    price_cents: 9999,
                },
            ],
        }
    }
}

impl Catalog {
    /// Build the catalog with environment overrides.
    ///
    /// `RANCH_PACK_<ID>_RCC` / `RANCH_PACK_<ID>_CENTS` and
    /// `RANCH_PLAN_<ID>_RCC` / `RANCH_PLAN_<ID>_CENTS` (ids uppercased)
    /// override the corresponding amounts.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut catalog = Self::default();

        for pack in &mut catalog.packs {
            let key = pack.id.to_uppercase();
            if let Some(rcc) = env_parse::<i64>(&format!("RANCH_PACK_{}_RCC", key)) {
                pack.rcc = rcc;
            }
            if let Some(cents) = env_parse::<i64>(&format!("RANCH_PACK_{}_CENTS", key)) {
                pack.price_cents = cents;
            }
        }
        for plan in &mut catalog.plans {
            let key = plan.id.to_uppercase();
            if let Some(rcc) = env_parse::<i64>(&format!("RANCH_PLAN_{}_RCC", key)) {
                plan.rcc_per_month = rcc;
            }
            if let Some(cents) = env_parse::<i64>(&format!("RANCH_PLAN_{}_CENTS", key)) {
                plan.price_cents = cents;
            }
        }

        catalog
    }

    /// Look up a pack by id
    pub fn pack(&self, id: &str) -> Option<&CreditPack> {
        self.packs.iter().find(|p| p.id == id)
    }

    /// Look up a plan by id
    pub fn plan(&self, id: &str) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|p| p.id == id)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
