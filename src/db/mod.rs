//! Persistence layer (C1, C3, C10). SQLite via `sqlx`, grounded on the
//! teacher's `db/schema.rs` + `db/models.rs` DDL-and-FromRow idiom.

mod call_log;
mod models;
mod schema;
mod store;
mod usage;

pub use call_log::CallLogRecorder;
pub use models::{Account, ChannelType, CustomApiFormat, Extension, GeminiModelQuota, ModelMapping};
pub use store::{AdminRow, CredentialStore};
pub use usage::{UsagePeriod, UsageRecord, UsageSummaryRow, UsageTracker};
