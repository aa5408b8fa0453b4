use crate::report::Report;
use crate::util::millis_to_report_time;
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::debug;

pub const HEADER: [&str; 8] = [
    "client-address",
    "client-guid",
    "request-time",
    "service-guid",
    "retries-request",
    "packets-requested",
    "packets-serviced",
    "max-hole-size",
];

/// Collects reports, dropping the ones that were never serviced, and writes
/// them back out ordered by request time.
pub struct ReportFilter {
    reports: Vec<Report>,
    pruned: usize,
    sorted: bool,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
            pruned: 0,
            sorted: true,
        }
    }

    pub fn add_report(&mut self, report: Report) {
        if report.packets_serviced == 0 {
            debug!(
                client_guid = %report.client_guid,
                service_guid = %report.service_guid,
                "Dropping report without serviced packets"
            );
            self.pruned += 1;
            return;
        }

        self.sorted = false;
        self.reports.push(report);
    }

    pub fn extend(&mut self, reports: impl IntoIterator<Item = Report>) {
        for report in reports {
            self.add_report(report);
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn pruned(&self) -> usize {
        self.pruned
    }

    /// Kept reports ordered by request time. Equal times keep their input order.
    pub fn reports(&mut self) -> &[Report] {
        if !self.sorted {
            self.reports.sort_by_key(|r| r.request_time);
            self.sorted = true;
        }
        &self.reports
    }

    pub fn write_csv<W: Write>(&mut self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        wtr.write_record(HEADER)?;

        for report in self.reports() {
            wtr.serialize((
                report.client_address.to_string(),
                &report.client_guid,
                millis_to_report_time(report.request_time)?,
                &report.service_guid,
                report.retries_request,
                report.packets_requested,
                report.packets_serviced,
                report.max_hole_size,
            ))?;
        }

        wtr.flush()?;

        Ok(())
    }

    pub fn service_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for report in self.reports.iter() {
            *counts.entry(report.service_guid.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn write_summary<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "--Summary--")?;
        for (service_guid, count) in self.service_counts() {
            writeln!(out, "{service_guid}: {count:02} records")?;
        }
        out.flush()?;
        Ok(())
    }
}
