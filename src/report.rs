use crate::util::{millis_to_report_time, report_time_to_millis};
use anyhow::{anyhow, bail, Context, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::net::IpAddr;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub client_address: IpAddr,
    pub client_guid: String,
    #[serde(deserialize_with = "deserialize_request_time")]
    pub request_time: i64,
    pub service_guid: String,
    pub retries_request: u32,
    pub packets_requested: u32,
    pub packets_serviced: u32,
    pub max_hole_size: u32,
}

// Generated datasets carry epoch millis, hand-written reports carry local times.
fn deserialize_request_time<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(RequestTimeVisitor)
}

struct RequestTimeVisitor;

impl<'de> Visitor<'de> for RequestTimeVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("epoch milliseconds or a `yyyy-MM-dd HH:mm:ss zone` time")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        checked_request_time(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        i64::try_from(value)
            .map_err(|_| anyhow!("Request time is out of range: {value}"))
            .and_then(checked_request_time)
            .map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
        parse_request_time(value).map_err(E::custom)
    }
}

fn parse_request_time(value: &str) -> Result<i64> {
    match value.trim().parse::<i64>() {
        Ok(millis) => checked_request_time(millis),
        Err(_) => report_time_to_millis(value).context("Failed to parse request time"),
    }
}

// Every kept report has to be printable as a Halifax local time.
fn checked_request_time(millis: i64) -> Result<i64> {
    millis_to_report_time(millis)?;
    Ok(millis)
}

/// A `<report>` element as text fields, so one bad element doesn't reject the
/// whole document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawXmlReport {
    client_address: Option<String>,
    client_guid: Option<String>,
    request_time: Option<String>,
    service_guid: Option<String>,
    retries_request: Option<String>,
    packets_requested: Option<String>,
    packets_serviced: Option<String>,
    max_hole_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawXmlReports {
    #[serde(rename = "report", default)]
    reports: Vec<RawXmlReport>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| anyhow!("Report found without {name}"))
}

fn parse_count(value: &Option<String>, name: &str) -> Result<u32> {
    let text = required(value, name)?;
    text.parse::<u32>()
        .with_context(|| format!("Invalid {name}: {text}"))
}

impl TryFrom<RawXmlReport> for Report {
    type Error = anyhow::Error;

    fn try_from(value: RawXmlReport) -> Result<Self> {
        let client_address = required(&value.client_address, "client-address")?;

        Ok(Report {
            client_address: client_address
                .parse()
                .with_context(|| format!("Invalid client-address: {client_address}"))?,
            client_guid: required(&value.client_guid, "client-guid")?.to_string(),
            request_time: parse_request_time(required(&value.request_time, "request-time")?)?,
            service_guid: required(&value.service_guid, "service-guid")?.to_string(),
            retries_request: parse_count(&value.retries_request, "retries-request")?,
            packets_requested: parse_count(&value.packets_requested, "packets-requested")?,
            packets_serviced: parse_count(&value.packets_serviced, "packets-serviced")?,
            max_hole_size: parse_count(&value.max_hole_size, "max-hole-size")?,
        })
    }
}

pub fn load_reports(path: &Path) -> Result<Vec<Report>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let file = File::open(path)
        .with_context(|| format!("Failed to open report file {}", path.display()))?;

    match extension.as_deref() {
        Some("csv") => read_csv_reports(file),
        Some("json") => read_json_reports(BufReader::new(file)),
        Some("xml") => read_xml_reports(file),
        _ => bail!(
            "Unsupported report file {}, expected a .csv, .json or .xml extension",
            path.display()
        ),
    }
}

pub fn read_csv_reports<R: Read>(reader: R) -> Result<Vec<Report>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader.headers().context("Failed to read csv header")?;

    let mut reports = Vec::new();
    for result in csv_reader.deserialize::<Report>() {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Invalid row in provided csv: {e}"),
        }
    }

    Ok(reports)
}

pub fn read_json_reports<R: Read>(reader: R) -> Result<Vec<Report>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_reader(reader).context("Expected a json array of reports")?;

    let mut reports = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<Report>(value) {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Invalid report #{index} in provided json: {e}"),
        }
    }

    Ok(reports)
}

pub fn read_xml_reports<R: Read>(mut reader: R) -> Result<Vec<Report>> {
    let mut xml = String::new();
    reader
        .read_to_string(&mut xml)
        .context("Failed to read xml reports")?;

    let raw: RawXmlReports =
        quick_xml::de::from_str(&xml).context("Expected an xml document of <report> elements")?;

    let mut reports = Vec::with_capacity(raw.reports.len());
    for (index, raw_report) in raw.reports.into_iter().enumerate() {
        match Report::try_from(raw_report) {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Invalid report #{index} in provided xml: {e:#}"),
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use crate::report::{read_csv_reports, read_json_reports, read_xml_reports};
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_csv_report_deserialization() {
        let csv = "client-address,client-guid,request-time,service-guid,retries-request,packets-requested,packets-serviced,max-hole-size
                        10.0.0.1, client-1, 2016-06-29 07:22:30 ADT, service-1, 1, 10, 9, 3
                        10.0.0.2, client-2, 1467187200000, service-2, 2, 12, 11, 4";

        let reports = read_csv_reports(csv.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);

        assert_eq!(
            reports[0].client_address,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(reports[0].client_guid, "client-1");
        assert_eq!(reports[0].request_time, 1_467_195_750_000);
        assert_eq!(reports[0].service_guid, "service-1");
        assert_eq!(reports[0].retries_request, 1);
        assert_eq!(reports[0].packets_requested, 10);
        assert_eq!(reports[0].packets_serviced, 9);
        assert_eq!(reports[0].max_hole_size, 3);

        assert_eq!(reports[1].request_time, 1_467_187_200_000);
    }

    #[test]
    fn test_csv_invalid_rows_are_skipped() {
        let csv = "client-address,client-guid,request-time,service-guid,retries-request,packets-requested,packets-serviced,max-hole-size
                        not-an-ip,client-1,1467187200000,service-1,1,10,9,3
                        10.0.0.1,client-1,tomorrow,service-1,1,10,9,3
                        10.0.0.1,client-1,1467187200000,service-1,-1,10,9,3
                        10.0.0.1,client-1,1467187200000,service-1,1,10,9
                        10.0.0.1,client-1,1467187200000,service-1,1,10,9,3";

        let reports = read_csv_reports(csv.as_bytes()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].packets_serviced, 9);
    }

    #[test]
    fn test_json_report_deserialization() {
        let json = r#"[
            {
                "client-address": "192.168.1.20",
                "client-guid": "client-1",
                "request-time": 1467202500000,
                "service-guid": "service-1",
                "retries-request": 0,
                "packets-requested": 5,
                "packets-serviced": 5,
                "max-hole-size": 0
            },
            {
                "client-address": "192.168.1.21",
                "client-guid": "client-2",
                "request-time": "2016-12-01 08:00:00 AST",
                "service-guid": "service-2",
                "retries-request": 3,
                "packets-requested": 18,
                "packets-serviced": 14,
                "max-hole-size": 7
            },
            {
                "client-address": "192.168.1.22",
                "service-guid": "service-2"
            }
        ]"#;

        let reports = read_json_reports(json.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].request_time, 1_467_202_500_000);
        assert_eq!(reports[1].request_time, 1_480_593_600_000);
        assert_eq!(reports[1].max_hole_size, 7);
    }

    #[test]
    fn test_json_must_be_an_array() {
        assert!(read_json_reports(r#"{"client-address": "10.0.0.1"}"#.as_bytes()).is_err());
    }

    #[test]
    fn test_out_of_range_request_time_is_skipped() {
        let json = r#"[
            {
                "client-address": "10.0.0.1",
                "client-guid": "client-1",
                "request-time": 1467195750000,
                "service-guid": "service-1",
                "retries-request": 1,
                "packets-requested": 2,
                "packets-serviced": 2,
                "max-hole-size": 0
            },
            {
                "client-address": "10.0.0.2",
                "client-guid": "client-2",
                "request-time": 9223372036854775807,
                "service-guid": "service-1",
                "retries-request": 1,
                "packets-requested": 2,
                "packets-serviced": 2,
                "max-hole-size": 0
            },
            {
                "client-address": "10.0.0.3",
                "client-guid": "client-3",
                "request-time": 18446744073709551615,
                "service-guid": "service-1",
                "retries-request": 1,
                "packets-requested": 2,
                "packets-serviced": 2,
                "max-hole-size": 0
            }
        ]"#;

        let reports = read_json_reports(json.as_bytes()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].client_guid, "client-1");

        let csv = "client-address,client-guid,request-time,service-guid,retries-request,packets-requested,packets-serviced,max-hole-size
                        10.0.0.1,client-1,1467195750000,service-1,1,2,2,0
                        10.0.0.2,client-2,9223372036854775807,service-1,1,2,2,0";

        let reports = read_csv_reports(csv.as_bytes()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].client_guid, "client-1");
    }

    #[test]
    fn test_xml_report_deserialization() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <reports>
                <report>
                    <client-address>172.16.0.5</client-address>
                    <client-guid>client-1</client-guid>
                    <request-time>2016-06-29 07:22:30 ADT</request-time>
                    <service-guid>service-1</service-guid>
                    <retries-request>2</retries-request>
                    <packets-requested>11</packets-requested>
                    <packets-serviced>10</packets-serviced>
                    <max-hole-size>4</max-hole-size>
                </report>
                <report>
                    <client-address>172.16.0.6</client-address>
                    <client-guid>client-2</client-guid>
                    <request-time>1480593600000</request-time>
                    <service-guid>service-2</service-guid>
                    <retries-request>0</retries-request>
                    <packets-requested>3</packets-requested>
                    <packets-serviced>3</packets-serviced>
                    <max-hole-size>1</max-hole-size>
                </report>
                <report>
                    <client-address>172.16.0.7</client-address>
                    <client-guid>client-3</client-guid>
                    <request-time>someday</request-time>
                    <service-guid>service-2</service-guid>
                    <retries-request>0</retries-request>
                    <packets-requested>3</packets-requested>
                    <packets-serviced>3</packets-serviced>
                    <max-hole-size>1</max-hole-size>
                </report>
                <report>
                    <client-address>172.16.0.8</client-address>
                    <client-guid>client-4</client-guid>
                    <request-time>2016-06-29 07:22:30 ADT</request-time>
                    <service-guid>service-2</service-guid>
                    <retries-request>0</retries-request>
                    <packets-requested>3</packets-requested>
                </report>
            </reports>"#;

        let reports = read_xml_reports(xml.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);

        assert_eq!(
            reports[0].client_address,
            IpAddr::V4(Ipv4Addr::new(172, 16, 0, 5))
        );
        assert_eq!(reports[0].client_guid, "client-1");
        assert_eq!(reports[0].request_time, 1_467_195_750_000);
        assert_eq!(reports[0].service_guid, "service-1");
        assert_eq!(reports[0].retries_request, 2);
        assert_eq!(reports[0].packets_requested, 11);
        assert_eq!(reports[0].packets_serviced, 10);
        assert_eq!(reports[0].max_hole_size, 4);

        assert_eq!(reports[1].request_time, 1_480_593_600_000);
    }

    #[test]
    fn test_xml_without_reports() {
        let reports = read_xml_reports("<reports></reports>".as_bytes()).unwrap();
        assert!(reports.is_empty());
    }
}
