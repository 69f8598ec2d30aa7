//! Zero-loss filter
//!
//! Keeps only probe rows with exactly 0% packet loss and turns them into
//! endpoints.

use std::net::{IpAddr, Ipv6Addr};

use tracing::debug;

use crate::types::{ProbeRecord, RankedEndpoint};

/// True iff the loss column, stripped of `%`, parses to exactly zero
pub fn is_zero_loss(record: &ProbeRecord) -> bool {
    record.loss_percent() == Some(0.0)
}

/// Split `ip:port` / `[ipv6]:port` into an endpoint
pub fn extract_endpoint(record: &ProbeRecord) -> Option<RankedEndpoint> {
    let raw = record.address_port.trim();

    let (address, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.rsplit(':').next()?;
        (IpAddr::V6(host.trim().parse::<Ipv6Addr>().ok()?), port)
    } else {
        let mut parts = raw.split(':');
        let host = parts.next()?;
        let port = parts.next()?;
        (host.trim().parse::<IpAddr>().ok()?, port)
    };

    let port = port.trim().parse::<u16>().ok()?;
    Some(RankedEndpoint {
        address,
        port,
        latency_ms: record.latency_ms(),
    })
}

/// Zero-loss endpoints in discovery order
pub fn filter(records: &[ProbeRecord]) -> Vec<RankedEndpoint> {
    records
        .iter()
        .filter(|r| is_zero_loss(r))
        .filter_map(|r| {
            let endpoint = extract_endpoint(r);
            if endpoint.is_none() {
                debug!("unusable endpoint `{}` dropped", r.address_port);
            }
            endpoint
        })
        .collect()
}
