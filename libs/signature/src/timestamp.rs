//! HL7v3 `TS` values (`YYYYMMDD[HH[MM[SS[.fff]]]][+/-ZZZZ]`).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses an HL7v3 timestamp. Values without an offset are taken as UTC.
pub fn parse_hl7_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let (local, offset) = split_offset(value)?;
    let digits = local.split('.').next()?;
    if digits.len() < 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let date = NaiveDate::parse_from_str(&digits[..8], "%Y%m%d").ok()?;
    let padded = format!("{:0<6}", &digits[8..]);
    if padded.len() != 6 {
        return None;
    }
    let hour = padded[0..2].parse().ok()?;
    let minute = padded[2..4].parse().ok()?;
    let second = padded[4..6].parse().ok()?;
    let naive: NaiveDateTime = date.and_hms_opt(hour, minute, second)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RFC 3339 rendering of an HL7v3 timestamp with an explicit `+00:00`.
pub fn hl7_timestamp_to_rfc3339(value: &str) -> Option<String> {
    parse_hl7_timestamp(value).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string())
}

fn split_offset(value: &str) -> Option<(&str, FixedOffset)> {
    let Some(pos) = value.rfind(['+', '-']) else {
        return Some((value, FixedOffset::east_opt(0)?));
    };
    let (local, zone) = value.split_at(pos);
    let digits = zone.get(1..)?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let seconds = hours * 3600 + minutes * 60;
    let offset = if zone.starts_with('-') {
        FixedOffset::west_opt(seconds)?
    } else {
        FixedOffset::east_opt(seconds)?
    };
    Some((local, offset))
}
