use energy_client::domain::EnergyReading;
use rust_decimal::Decimal;

use super::NormalizedReading;

/// Derive `net_energy_kwh` and the anomaly flag.
///
/// A negative generated or consumed quantity is the only anomaly signal.
pub fn classify(reading: NormalizedReading) -> EnergyReading {
    let NormalizedReading {
        site_id,
        timestamp,
        energy_generated_kwh,
        energy_consumed_kwh,
    } = reading;

    let net_energy_kwh = energy_generated_kwh - energy_consumed_kwh;
    let anomaly = energy_generated_kwh < Decimal::ZERO || energy_consumed_kwh < Decimal::ZERO;

    EnergyReading {
        site_id,
        timestamp,
        energy_generated_kwh,
        energy_consumed_kwh,
        net_energy_kwh,
        anomaly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::normalize;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use time::macros::datetime;

    fn reading(generated: Decimal, consumed: Decimal) -> NormalizedReading {
        NormalizedReading {
            site_id: "WindPark_CA_002".to_string(),
            timestamp: datetime!(2025-06-06 12:00:00 UTC),
            energy_generated_kwh: generated,
            energy_consumed_kwh: consumed,
        }
    }

    #[test]
    fn negative_generation_is_anomalous() {
        let r = classify(reading(dec!(-5.0), dec!(3.2)));
        assert_eq!(r.net_energy_kwh, dec!(-8.2));
        assert!(r.anomaly);
    }

    #[test]
    fn negative_consumption_is_anomalous() {
        let r = classify(reading(dec!(10), dec!(-0.01)));
        assert_eq!(r.net_energy_kwh, dec!(10.01));
        assert!(r.anomaly);
    }

    #[test]
    fn non_negative_flows_are_normal_even_when_net_is_negative() {
        let r = classify(reading(dec!(1.5), dec!(120.25)));
        assert_eq!(r.net_energy_kwh, dec!(-118.75));
        assert!(!r.anomaly);
    }

    #[test]
    fn zero_is_not_anomalous() {
        let r = classify(reading(dec!(0), dec!(-0)));
        assert!(!r.anomaly);
    }

    #[test]
    fn net_is_exact_at_the_edge_of_the_range() {
        let raw = json!({
            "site_id": "GeoPlant_NV_004",
            "timestamp": "2025-06-06T12:00:00Z",
            "energy_generated_kwh": "79228162514264337593543950334",
            "energy_consumed_kwh": "-1",
        });
        let r = classify(normalize(&raw).unwrap());
        assert_eq!(r.net_energy_kwh, Decimal::MAX);
        assert!(r.anomaly);
    }

    #[test]
    fn classify_after_normalize_matches_sign_rule() {
        let cases = [
            (json!(-5.0), json!(3.2), true),
            (json!(5.0), json!(-3.2), true),
            (json!(-1), json!(-1), true),
            (json!(12.34), json!(56.78), false),
            (json!("0"), json!("0.00"), false),
        ];

        for (generated, consumed, expected) in cases {
            let raw = json!({
                "site_id": "GeoPlant_NV_004",
                "timestamp": "2025-06-06T12:00:00+00:00",
                "energy_generated_kwh": generated,
                "energy_consumed_kwh": consumed,
            });
            let r = classify(normalize(&raw).unwrap());
            assert_eq!(r.anomaly, expected, "generated={generated} consumed={consumed}");
            assert_eq!(r.net_energy_kwh, r.energy_generated_kwh - r.energy_consumed_kwh);
        }
    }
}
