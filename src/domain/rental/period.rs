use std::{fmt, ops::Range};

use chrono::{Datelike, NaiveDate};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// Closed calendar interval `[start, end]` of a rental. Both days are rented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct RentalPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawPeriod> for RentalPeriod {
    type Error = PeriodError;

    fn try_from(value: RawPeriod) -> Result<Self, Self::Error> {
        Self::new(value.start, value.end)
    }
}

impl RentalPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Touching boundaries count as overlap: a vehicle returned on a day
    /// cannot be picked up by someone else that same day.
    pub fn overlaps(&self, other: &RentalPeriod) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Half-open range of day numbers covering the period, for interval trees.
    pub fn day_range(&self) -> Range<i32> {
        self.start.num_days_from_ce()..self.end.num_days_from_ce() + 1
    }
}

impl fmt::Display for RentalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[display(fmt = "Start date {} is after end date {}", start, end)]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn period(start: &str, end: &str) -> RentalPeriod {
        RentalPeriod::new(date(start), date(end)).unwrap()
    }

    #[test]
    fn test_new_rejects_reversed_dates() {
        assert_eq!(
            RentalPeriod::new(date("2024-06-05"), date("2024-06-01")),
            Err(PeriodError::EndBeforeStart {
                start: date("2024-06-05"),
                end: date("2024-06-01"),
            })
        );
    }

    #[test]
    fn test_single_day_period() {
        let p = period("2024-06-01", "2024-06-01");
        assert_eq!(p.day_range().len(), 1);
        assert!(p.overlaps(&p));
    }

    #[test]
    fn test_overlaps_is_boundary_inclusive() {
        let booked = period("2024-06-01", "2024-06-05");
        assert!(booked.overlaps(&period("2024-06-03", "2024-06-07")));
        assert!(booked.overlaps(&period("2024-05-25", "2024-06-01")));
        assert!(booked.overlaps(&period("2024-06-05", "2024-06-09")));
        assert!(booked.overlaps(&period("2024-05-01", "2024-07-01")));
        assert!(!booked.overlaps(&period("2024-06-06", "2024-06-10")));
        assert!(!booked.overlaps(&period("2024-05-20", "2024-05-31")));
    }

    #[test]
    fn test_day_range_covers_both_ends() {
        let r = period("2024-06-01", "2024-06-05").day_range();
        assert_eq!(r.end - r.start, 5);
    }

    #[test]
    fn test_deserialize_validates_order() {
        let ok: RentalPeriod =
            serde_json::from_str(r#"{"start":"2024-06-01","end":"2024-06-05"}"#).unwrap();
        assert_eq!(ok, period("2024-06-01", "2024-06-05"));
        assert!(
            serde_json::from_str::<RentalPeriod>(r#"{"start":"2024-06-05","end":"2024-06-01"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            period("2024-06-01", "2024-06-05").to_string(),
            "[2024-06-01, 2024-06-05]"
        );
    }
}
