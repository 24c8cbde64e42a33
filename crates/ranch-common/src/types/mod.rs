//! Domain types for the Ranch portal

pub mod container;
pub mod job;
pub mod ledger;
pub mod payment;
pub mod user;
