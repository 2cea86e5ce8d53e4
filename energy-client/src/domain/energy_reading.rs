use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A validated, classified reading as persisted in `energy_readings`.
///
/// `net_energy_kwh` and `anomaly` are derived from the two measured
/// quantities and are never taken from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnergyReading {
    pub site_id: String,
    #[serde(with = "time::serde::rfc3339")]
    #[sqlx(rename = "ts")]
    pub timestamp: OffsetDateTime,
    pub energy_generated_kwh: Decimal,
    pub energy_consumed_kwh: Decimal,
    pub net_energy_kwh: Decimal,
    pub anomaly: bool,
}

impl EnergyReading {
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            site_id: self.site_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Uniqueness key of a reading in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingKey {
    pub site_id: String,
    pub timestamp: OffsetDateTime,
}

impl fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.site_id, self.timestamp)
    }
}

/// Inclusive time window for site queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn reading() -> EnergyReading {
        EnergyReading {
            site_id: "SolarFarm_AZ_001".to_string(),
            timestamp: datetime!(2025-06-06 12:00:00 UTC),
            energy_generated_kwh: dec!(-5.0),
            energy_consumed_kwh: dec!(3.2),
            net_energy_kwh: dec!(-8.2),
            anomaly: true,
        }
    }

    #[test]
    fn serializes_to_persisted_record_shape() {
        let json = serde_json::to_value(reading()).unwrap();

        assert_eq!(json["site_id"], "SolarFarm_AZ_001");
        assert_eq!(json["timestamp"], "2025-06-06T12:00:00Z");
        assert_eq!(json["energy_generated_kwh"], "-5.0");
        assert_eq!(json["energy_consumed_kwh"], "3.2");
        assert_eq!(json["net_energy_kwh"], "-8.2");
        assert_eq!(json["anomaly"], true);
    }

    #[test]
    fn key_is_site_and_timestamp() {
        let r = reading();
        let key = r.key();
        assert_eq!(key.site_id, r.site_id);
        assert_eq!(key.timestamp, r.timestamp);
    }

    #[test]
    fn keys_order_by_site_then_time() {
        let a = ReadingKey {
            site_id: "a".into(),
            timestamp: datetime!(2025-01-02 00:00:00 UTC),
        };
        let b = ReadingKey {
            site_id: "b".into(),
            timestamp: datetime!(2025-01-01 00:00:00 UTC),
        };
        let a_later = ReadingKey {
            site_id: "a".into(),
            timestamp: datetime!(2025-01-03 00:00:00 UTC),
        };
        assert!(a < b);
        assert!(a < a_later);
    }

    #[test]
    fn time_range_is_inclusive() {
        let range = TimeRange::new(
            datetime!(2025-06-06 00:00:00 UTC),
            datetime!(2025-06-06 12:00:00 UTC),
        );
        assert!(range.contains(datetime!(2025-06-06 00:00:00 UTC)));
        assert!(range.contains(datetime!(2025-06-06 12:00:00 UTC)));
        assert!(!range.contains(datetime!(2025-06-06 12:00:01 UTC)));
    }
}
