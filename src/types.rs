//! Shared types and constants for the WARP scanner

use std::{
    fmt,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

// ==================== CONSTANTS ====================

/// Built-in WARP IPv4 blocks, `a.b.c.start/end` on the last octet
pub const DEFAULT_IPV4_RANGES: &[&str] = &[
    "162.159.192.0/255",
    "162.159.193.0/255",
    "162.159.195.0/255",
    "188.114.96.0/255",
    "188.114.97.0/255",
    "188.114.98.0/255",
    "188.114.99.0/255",
];

/// Fixed WARP IPv6 prefixes used when no IPv6 range list is given
pub const WARP_IPV6_PREFIXES: [Ipv6Addr; 2] = [
    Ipv6Addr::new(0x2606, 0x4700, 0xd0, 0, 0, 0, 0, 0),
    Ipv6Addr::new(0x2606, 0x4700, 0xd1, 0, 0, 0, 0, 0),
];

/// Published IPv6 range list, used with `published_ranges`
pub const DEFAULT_IPV6_RANGE_URL: &str =
    "https://raw.githubusercontent.com/Jelingam/WarpGenerator/refs/heads/main/utils/ipv6_range.txt";

/// Public WireGuard key issuing endpoint
pub const DEFAULT_KEY_URL: &str = "https://wg-key.forvps.gq/";

/// Static WARP interface addresses, identical for every tunnel
pub const WARP_LOCAL_ADDRESSES: [&str; 2] = [
    "172.16.0.2/24",
    "2606:4700:110:8056:6ec9:563a:d8e7:5097/128",
];

/// Hand-off files inside the work directory
pub const CANDIDATE_LIST_FILE: &str = "ip.txt";
pub const PROBE_RESULT_FILE: &str = "result.csv";
pub const WGCF_ACCOUNT_FILE: &str = "wgcf-account.toml";
pub const WGCF_PROFILE_FILE: &str = "wgcf-profile.conf";

/// Addresses drawn from each block per sampling pass
pub const SAMPLES_PER_BLOCK: usize = 5;

// ==================== ENUMS ====================

/// Address family being scanned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 endpoints
    #[default]
    V4,
    /// IPv6 endpoints
    V6,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("ipv4"),
            IpVersion::V6 => f.write_str("ipv6"),
        }
    }
}

// ==================== CORE STRUCTS ====================

/// One raw row of the probe result table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// `ip:port` or `[ipv6]:port`
    pub address_port: String,
    /// Loss column as printed, e.g. `0.00%`
    pub packet_loss: String,
    /// First token of the latency column, e.g. `120`
    pub latency: String,
}

impl ProbeRecord {
    /// Loss in percent, `None` when the column is not numeric
    pub fn loss_percent(&self) -> Option<f64> {
        self.packet_loss
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
    }

    /// Latency in milliseconds with any trailing unit removed
    pub fn latency_ms(&self) -> Option<f64> {
        let value = self
            .latency
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_alphabetic());
        value.parse::<f64>().ok()
    }
}

/// Endpoint that passed the zero-loss filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEndpoint {
    /// Endpoint address
    pub address: IpAddr,
    /// WireGuard port
    pub port: u16,
    /// Measured latency (ms)
    pub latency_ms: Option<f64>,
}

impl RankedEndpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// External executable plus leading arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Program path or name
    pub program: PathBuf,
    /// Arguments placed before the tool-specific ones
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Same tool resolved through `PATH` (`./wgcf` → `wgcf`)
    pub fn bare(&self) -> Option<Self> {
        let name = self.program.file_name()?;
        let bare = PathBuf::from(name);
        (bare != self.program).then(|| Self {
            program: bare,
            args: self.args.clone(),
        })
    }

    /// Build a process command with the leading arguments applied.
    ///
    /// Relative paths such as `./warpendpoint` are resolved against the
    /// process working directory, not the child's `current_dir`.
    pub fn command(&self) -> tokio::process::Command {
        let program = if self.program.is_relative() && self.program.components().count() > 1 {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.program))
                .unwrap_or_else(|_| self.program.clone())
        } else {
            self.program.clone()
        };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
