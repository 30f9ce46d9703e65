//! Timezone normalization (pre-pass). Computed once during preprocessing;
//! the resulting normalized dates are threaded through scoring and the
//! duplicate-detection pass rather than re-derived at each use site — see
//! the "normalize once, at preprocessing" design note.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::config::TimezonePolicy;
use crate::model::LedgerEntry;

fn normalize_one(timestamp: &DateTime<FixedOffset>, policy: TimezonePolicy) -> NaiveDate {
    match policy {
        TimezonePolicy::Ignore => timestamp.date_naive(),
        TimezonePolicy::NormalizeToUtc => timestamp.with_timezone(&Utc).date_naive(),
        TimezonePolicy::StrictLocal => timestamp.date_naive(),
    }
}

/// Normalize every ledger entry's timestamp to a comparison date, per the
/// configured `TimezonePolicy`. The returned vector is parallel to
/// `ledger` (same length, same order).
pub fn normalize_ledger_dates(ledger: &[LedgerEntry], policy: TimezonePolicy) -> Vec<NaiveDate> {
    ledger.iter().map(|entry| normalize_one(&entry.timestamp, policy)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger_at(offset_hours: i32, hour: u32) -> LedgerEntry {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        LedgerEntry {
            id: "TX1".into(),
            amount_cents: 100,
            direction: crate::model::Direction::Credit,
            timestamp: offset.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ignore_policy_uses_wall_clock_date() {
        // 2024-01-15T23:00+05:00 -> wall clock date is still the 15th.
        let entry = ledger_at(5, 23);
        let dates = normalize_ledger_dates(&[entry], TimezonePolicy::Ignore);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn normalize_to_utc_can_shift_the_date() {
        // 2024-01-15T23:00+05:00 is 2024-01-15T18:00 UTC -> same day here,
        // but 2024-01-15T01:00+05:00 is 2024-01-14T20:00 UTC -> shifts back.
        let entry = ledger_at(5, 1);
        let dates = normalize_ledger_dates(&[entry], TimezonePolicy::NormalizeToUtc);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
    }

    #[test]
    fn strict_local_leaves_wall_clock_date_untouched() {
        let entry = ledger_at(5, 1);
        let dates = normalize_ledger_dates(&[entry], TimezonePolicy::StrictLocal);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }
}
