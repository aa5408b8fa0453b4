use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::Halifax;

const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders epoch milliseconds as Halifax local time, e.g. `2016-06-29 07:22:30 ADT`.
pub fn millis_to_report_time(millis: i64) -> Result<String> {
    let utc = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| anyhow!("Request time is out of range: {millis}"))?;

    Ok(utc
        .with_timezone(&Halifax)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string())
}

/// Parses `yyyy-MM-dd HH:mm:ss [zone]` into epoch milliseconds.
///
/// `ADT`, `AST` and `UTC`/`GMT`/`Z` map to their fixed offsets. Any other
/// abbreviation, or none at all, is read as Halifax local time.
pub fn report_time_to_millis(value: &str) -> Result<i64> {
    let value = value.trim();
    let (local, zone) = split_zone(value);

    let naive = NaiveDateTime::parse_from_str(local, REPORT_TIME_FORMAT)
        .with_context(|| format!("Invalid request time: {value}"))?;

    let offset_secs = match zone.map(|z| z.to_ascii_uppercase()).as_deref() {
        Some("ADT") => Some(-3 * 3600),
        Some("AST") => Some(-4 * 3600),
        Some("UTC") | Some("GMT") | Some("Z") => Some(0),
        _ => None,
    };

    let millis = match offset_secs {
        Some(secs) => FixedOffset::east_opt(secs)
            .and_then(|offset| offset.from_local_datetime(&naive).single())
            .map(|dt| dt.timestamp_millis()),
        None => Halifax
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp_millis()),
    };

    millis.ok_or_else(|| anyhow!("Request time doesn't exist in the Halifax time zone: {value}"))
}

fn split_zone(value: &str) -> (&str, Option<&str>) {
    match value.rsplit_once(' ') {
        Some((local, zone)) if zone.chars().all(|c| c.is_ascii_alphabetic()) => {
            (local.trim_end(), Some(zone))
        }
        _ => (value, None),
    }
}
