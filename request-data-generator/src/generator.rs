use anyhow::{anyhow, ensure, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Triangular};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::net::Ipv4Addr;
use uuid::Uuid;

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

/// Upper bound of the random offset added to the generation time.
pub const MAX_REQUEST_OFFSET_SECS: i64 = 86_400;
const MAX_JITTER_MS: i64 = 999;

pub const MAX_RETRIES: f64 = 10.0;
const RETRIES_MODE: f64 = 7.0;
pub const MAX_PACKETS: f64 = 20.0;
const PACKETS_MODE: f64 = 15.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub address: Ipv4Addr,
    pub guid: Uuid,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RequestRecord {
    pub client_address: Ipv4Addr,
    pub client_guid: Uuid,
    pub request_time: i64,
    pub service_guid: Uuid,
    pub retries_request: u32,
    pub packets_requested: u32,
    pub packets_serviced: u32,
    pub max_hole_size: u32,
}

/// Produces request rows by sampling a fixed pool of clients and services.
///
/// Both pools are built once in [`RequestGenerator::new`] and sampled with
/// replacement for every row.
pub struct RequestGenerator<R: Rng> {
    rng: R,
    services: Vec<Uuid>,
    clients: Vec<Client>,
    retries: Triangular<f64>,
    packets: Triangular<f64>,
}

impl<R: Rng> RequestGenerator<R> {
    pub fn new(mut rng: R, n_services: usize, n_clients: usize) -> Result<Self> {
        ensure!(n_services > 0, anyhow!("At least one service is required"));
        ensure!(n_clients > 0, anyhow!("At least one client is required"));

        let services = generate_services(&mut rng, n_services);
        let clients = generate_clients(&mut rng, n_clients);

        let retries = Triangular::new(0.0, MAX_RETRIES, RETRIES_MODE)
            .map_err(|e| anyhow!("Invalid retries distribution: {e}"))?;
        let packets = Triangular::new(0.0, MAX_PACKETS, PACKETS_MODE)
            .map_err(|e| anyhow!("Invalid packets distribution: {e}"))?;

        Ok(Self {
            rng,
            services,
            clients,
            retries,
            packets,
        })
    }

    pub fn services(&self) -> &[Uuid] {
        &self.services
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn next_record(&mut self, now: DateTime<Utc>) -> RequestRecord {
        let client = self.clients[self.rng.gen_range(0..self.clients.len())].clone();
        let request_time = self.request_time(now);
        let service_guid = self.services[self.rng.gen_range(0..self.services.len())];

        RequestRecord {
            client_address: client.address,
            client_guid: client.guid,
            request_time,
            service_guid,
            retries_request: self.retries.sample(&mut self.rng) as u32,
            packets_requested: self.packets.sample(&mut self.rng) as u32,
            packets_serviced: self.packets.sample(&mut self.rng) as u32,
            max_hole_size: self.packets.sample(&mut self.rng) as u32,
        }
    }

    /// Writes the header followed by `rows` records.
    pub fn write_dataset<W: Write>(
        &mut self,
        writer: W,
        rows: usize,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        wtr.write_record(HEADER)?;

        for _ in 0..rows {
            wtr.serialize(self.next_record(now))?;
        }

        wtr.flush()?;

        Ok(())
    }

    // Whole seconds in the future, scaled to millis, plus sub-second jitter.
    fn request_time(&mut self, now: DateTime<Utc>) -> i64 {
        let offset = self.rng.gen_range(0..=MAX_REQUEST_OFFSET_SECS);
        (now.timestamp() + offset) * 1000 + self.rng.gen_range(0..=MAX_JITTER_MS)
    }
}

pub fn generate_services<R: Rng>(rng: &mut R, count: usize) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(count);
    let mut services = Vec::with_capacity(count);

    while services.len() < count {
        let guid = random_guid(rng);
        if seen.insert(guid) {
            services.push(guid);
        }
    }

    services
}

pub fn generate_clients<R: Rng>(rng: &mut R, count: usize) -> Vec<Client> {
    let mut seen = HashSet::with_capacity(count);
    let mut clients = Vec::with_capacity(count);

    while clients.len() < count {
        let guid = random_guid(rng);
        if seen.insert(guid) {
            clients.push(Client {
                address: Ipv4Addr::from(rng.gen::<[u8; 4]>()),
                guid,
            });
        }
    }

    clients
}

fn random_guid<R: Rng>(rng: &mut R) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}
