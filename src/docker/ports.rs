// Host port helpers for published container ports

use crate::errors::{HarnessError, Result};
use serde::Serialize;
use std::net::{Ipv4Addr, TcpListener};

/// Host side of a published container port, as reported by `docker port`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// `<port>/<proto>` when the runtime printed it
    pub container_port: Option<String>,
    pub host_address: String,
    pub host_port: u16,
}

/// Parse a mapping such as `6379/tcp -> 0.0.0.0:32774`.
///
/// The trimmed text must split on `:` into exactly two parts. When the
/// runtime reports one binding per line (IPv4 and IPv6), only the first line
/// is considered.
pub fn parse_port_mapping(text: &str) -> Result<PortMapping> {
    let line = text
        .trim()
        .lines()
        .next()
        .map(str::trim)
        .unwrap_or_default();

    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 2 {
        return Err(HarnessError::MalformedPortMapping(text.trim().to_string()));
    }

    let host_port = parts[1]
        .trim()
        .parse::<u16>()
        .map_err(|_| HarnessError::MalformedPortMapping(text.trim().to_string()))?;

    let (container_port, host_address) = match parts[0].split_once("->") {
        Some((container, address)) => (Some(container.trim().to_string()), address.trim()),
        None => (None, parts[0].trim()),
    };

    Ok(PortMapping {
        container_port,
        host_address: host_address.to_string(),
        host_port,
    })
}

/// Ask the OS for a currently unused TCP port on the loopback interface
pub fn next_free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}
