//! Chain epoch arithmetic.

use chrono::{DateTime, Utc};

/// Length of one chain epoch in seconds.
pub const EPOCH_DURATION_SECONDS: i64 = 30;

/// Number of epochs per hour.
pub const EPOCHS_PER_HOUR: i64 = 60 * 60 / EPOCH_DURATION_SECONDS;

/// Number of epochs per day.
pub const EPOCHS_PER_DAY: i64 = 24 * EPOCHS_PER_HOUR;

/// Unix timestamp of the mainnet genesis block.
pub const MAINNET_GENESIS_UNIX: i64 = 1_598_306_400;

/// Longest deal a client may ask for, in days.
pub const MAX_DEAL_DURATION_DAYS: i64 = 540;

/// Default deal duration in epochs.
pub const DEFAULT_DEAL_DURATION_EPOCHS: i64 = MAX_DEAL_DURATION_DAYS * EPOCHS_PER_DAY;

/// Days reserved for sealing between the start epoch and the deal term.
pub const SEALING_BUFFER_DAYS: i64 = 7;

/// Chain height at the given wall-clock time.
///
/// Times before genesis map to height zero.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use delta_core::epoch::{date_to_height, MAINNET_GENESIS_UNIX};
///
/// let genesis = Utc.timestamp_opt(MAINNET_GENESIS_UNIX, 0).unwrap();
/// assert_eq!(date_to_height(genesis), 0);
/// assert_eq!(date_to_height(genesis + chrono::Duration::days(1)), 2880);
/// ```
pub fn date_to_height(at: DateTime<Utc>) -> i64 {
    ((at.timestamp() - MAINNET_GENESIS_UNIX) / EPOCH_DURATION_SECONDS).max(0)
}

/// Number of epochs covering `days` full days.
pub const fn days_to_epochs(days: i64) -> i64 {
    days * EPOCHS_PER_DAY
}
