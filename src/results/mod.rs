//! Test-result aggregation, the shared result cell, and run history.

pub mod broadcaster;
pub mod history;
mod summary;

pub use self::broadcaster::{ResultBroadcaster, ResultSubscription, SharedSummary};
pub use self::history::{HistoryEntry, TestHistory, TestTrends, HISTORY_LIMIT};
pub use self::summary::{summarize, FeatureSummary, TestResultsSummary};
