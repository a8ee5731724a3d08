//! Teachers domain: accounts with subscription plans and cycle counters,
//! plus the quota ledger built on them.

pub mod models;
pub mod quota;

pub use quota::{Admission, PostgresQuotaLedger, QuotaDenial, QuotaLedger};
