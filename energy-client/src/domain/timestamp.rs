use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

/// Parse an ISO-8601 instant and normalize it to UTC.
///
/// Accepts RFC 3339 (`2025-06-06T12:00:00Z`, `...+02:00`, fractional seconds)
/// and ISO-8601 date-times. A date-time without an offset is taken as UTC.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let s = input.trim();

    let parsed = OffsetDateTime::parse(s, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(s, &Iso8601::DEFAULT))
        .or_else(|err| {
            PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
                .map(PrimitiveDateTime::assume_utc)
                .map_err(|_| err)
        })?;

    Ok(parsed.to_offset(UtcOffset::UTC))
}

pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC).format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_zulu_and_explicit_utc_offset_to_the_same_instant() {
        let a = parse_timestamp("2025-06-06T12:00:00Z").unwrap();
        let b = parse_timestamp("2025-06-06T12:00:00+00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, datetime!(2025-06-06 12:00:00 UTC));
    }

    #[test]
    fn converts_offsets_to_utc() {
        let ts = parse_timestamp("2025-06-06T12:00:00+02:00").unwrap();
        assert_eq!(ts, datetime!(2025-06-06 10:00:00 UTC));
        assert_eq!(ts.offset(), UtcOffset::UTC);
    }

    #[test]
    fn keeps_fractional_seconds() {
        let ts = parse_timestamp("2025-06-06T12:00:00.250+00:00").unwrap();
        assert_eq!(ts, datetime!(2025-06-06 12:00:00.25 UTC));
    }

    #[test]
    fn naive_date_time_is_taken_as_utc() {
        let ts = parse_timestamp("2025-06-06T12:00:00").unwrap();
        assert_eq!(ts, datetime!(2025-06-06 12:00:00 UTC));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2025-13-40T99:00:00Z").is_err());
    }

    #[test]
    fn formats_as_rfc3339_utc() {
        let s = format_timestamp(datetime!(2025-06-06 14:00:00 +2)).unwrap();
        assert_eq!(s, "2025-06-06T12:00:00Z");
    }
}
