//! Expiry Module
//!
//! Maps a logical expiration kind to a concrete instant and a session flag.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Horizon used for items that never expire by date.
const NEVER_EXPIRES_MONTHS: u32 = 100 * 12;

// == Time Unit ==
/// Calendar unit for custom expirations and the hosted cache age window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl TimeUnit {
    /// Returns `date` shifted by `amount` units. Negative amounts go back in time.
    ///
    /// Saturates at the representable bounds instead of overflowing.
    pub fn offset(self, date: DateTime<Utc>, amount: i64) -> DateTime<Utc> {
        let shifted = match self {
            TimeUnit::Minutes => Duration::try_minutes(amount).and_then(|d| date.checked_add_signed(d)),
            TimeUnit::Hours => Duration::try_hours(amount).and_then(|d| date.checked_add_signed(d)),
            TimeUnit::Days => Duration::try_days(amount).and_then(|d| date.checked_add_signed(d)),
            TimeUnit::Months => shift_months(date, amount),
            TimeUnit::Years => amount.checked_mul(12).and_then(|m| shift_months(date, m)),
        };
        shifted.unwrap_or(if amount >= 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
    }
}

fn shift_months(date: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    }
}

// == Expiry ==
/// How long a data layer entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Lives until the session ends; never removed by date
    Session,
    /// Lives for the lifetime of the process only
    UntilRestart,
    Forever,
    /// Expires at the given instant
    After(DateTime<Utc>),
    /// Expires `amount` units from now
    AfterCustom(TimeUnit, i64),
}

/// A resolved [`Expiry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryDate {
    pub expires_at: DateTime<Utc>,
    pub is_session_scoped: bool,
}

impl Expiry {
    // == Resolve ==
    /// Computes the concrete expiration relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> ExpiryDate {
        let never = || shift_months(now, NEVER_EXPIRES_MONTHS as i64).unwrap_or(DateTime::<Utc>::MAX_UTC);
        match *self {
            Expiry::Session => ExpiryDate {
                expires_at: never(),
                is_session_scoped: true,
            },
            Expiry::UntilRestart => ExpiryDate {
                expires_at: now,
                is_session_scoped: false,
            },
            Expiry::Forever => ExpiryDate {
                expires_at: never(),
                is_session_scoped: false,
            },
            Expiry::After(date) => ExpiryDate {
                expires_at: date,
                is_session_scoped: false,
            },
            Expiry::AfterCustom(unit, amount) => ExpiryDate {
                expires_at: unit.offset(now, amount),
                is_session_scoped: false,
            },
        }
    }
}
