use energy_client::domain::parse_timestamp;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Untrusted input record: an arbitrary JSON value, expected to be an object.
pub type RawRecord = Value;

pub const SITE_ID: &str = "site_id";
pub const TIMESTAMP: &str = "timestamp";
pub const ENERGY_GENERATED_KWH: &str = "energy_generated_kwh";
pub const ENERGY_CONSUMED_KWH: &str = "energy_consumed_kwh";
pub const NET_ENERGY_KWH: &str = "net_energy_kwh";

/// A record that passed validation but has not been classified yet.
///
/// Only `normalize` builds one, so `generated - consumed` is always
/// representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedReading {
    pub(super) site_id: String,
    pub(super) timestamp: OffsetDateTime,
    pub(super) energy_generated_kwh: Decimal,
    pub(super) energy_consumed_kwh: Decimal,
}


#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid timestamp `{value}`")]
    InvalidTimestamp { value: String },
    #[error("invalid number in `{field}`: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("record is not a JSON object")]
    NotAnObject,
}

impl RejectionReason {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::InvalidNumber { .. } => "invalid_number",
            Self::NotAnObject => "not_an_object",
        }
    }
}

/// Validate one raw record.
///
/// Fields are checked in the order site_id, timestamp, generated, consumed
/// and the first failure is reported.
pub fn normalize(raw: &RawRecord) -> Result<NormalizedReading, RejectionReason> {
    let obj = raw.as_object().ok_or(RejectionReason::NotAnObject)?;

    let site_id = site_id(obj)?;
    let timestamp = timestamp(obj)?;
    let energy_generated_kwh = quantity(obj, ENERGY_GENERATED_KWH)?;
    let energy_consumed_kwh = quantity(obj, ENERGY_CONSUMED_KWH)?;

    if energy_generated_kwh.checked_sub(energy_consumed_kwh).is_none() {
        return Err(RejectionReason::InvalidNumber {
            field: NET_ENERGY_KWH,
            value: format!("{energy_generated_kwh} - {energy_consumed_kwh} is out of range"),
        });
    }

    Ok(NormalizedReading {
        site_id,
        timestamp,
        energy_generated_kwh,
        energy_consumed_kwh,
    })
}

fn site_id(obj: &Map<String, Value>) -> Result<String, RejectionReason> {
    let coerced = match obj.get(SITE_ID) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };

    if coerced.is_empty() {
        return Err(RejectionReason::MissingField { field: SITE_ID });
    }
    Ok(coerced)
}

fn timestamp(obj: &Map<String, Value>) -> Result<OffsetDateTime, RejectionReason> {
    match obj.get(TIMESTAMP) {
        Some(Value::String(s)) => {
            parse_timestamp(s).map_err(|_| RejectionReason::InvalidTimestamp { value: s.clone() })
        }
        other => Err(RejectionReason::InvalidTimestamp {
            value: describe(other),
        }),
    }
}

fn quantity(obj: &Map<String, Value>, field: &'static str) -> Result<Decimal, RejectionReason> {
    // JSON numbers go through their literal text so no binary float rounding
    // leaks into the decimal value.
    let text = match obj.get(field) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        other => {
            return Err(RejectionReason::InvalidNumber {
                field,
                value: describe(other),
            })
        }
    };

    parse_decimal(&text).ok_or(RejectionReason::InvalidNumber { field, value: text })
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    // The decimal parser tolerates `_` digit separators.
    if text.is_empty() || text.contains('_') {
        return None;
    }
    Decimal::from_str_exact(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "<missing>".to_string(),
        Some(v) => v.to_string(),
    }
}
