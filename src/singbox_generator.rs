//! Sing-Box WireGuard Outbound Generator
//!
//! تولید outboundهای WireGuard برای Hiddify/sing-box از endpointهای تمیز.
//! One outbound per endpoint, all sharing the run's keypair.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Local};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::Result,
    types::{RankedEndpoint, WARP_LOCAL_ADDRESSES},
    warp_client::WireguardKeypair,
};

// ── Defaults ───────────────────────────────────────────────────────────────

pub const DEFAULT_MTU: u16 = 1280;
pub const DEFAULT_FAKE_PACKETS: &str = "40-80";
pub const DEFAULT_FAKE_PACKETS_SIZE: &str = "40-100";
pub const DEFAULT_FAKE_PACKETS_DELAY: &str = "5-10";
pub const DEFAULT_FAKE_PACKETS_MODE: &str = "m4";

const OUTPUT_PREFIX: &str = "Wireguard_configs_";
const TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";

// ── Obfuscation ────────────────────────────────────────────────────────────

/// MTU و پارامترهای fake-packet یک تانل
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obfuscation {
    pub mtu: u16,
    /// نرخ fake packets
    pub fake_packets: String,
    /// اندازه fake packets
    pub fake_packets_size: String,
    /// تأخیر fake packets
    pub fake_packets_delay: String,
    /// حالت fake packets
    pub fake_packets_mode: String,
}

impl Obfuscation {
    pub fn with_mtu(mtu: u16) -> Self {
        Self {
            mtu,
            ..Self::default()
        }
    }
}

impl Default for Obfuscation {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            fake_packets: DEFAULT_FAKE_PACKETS.to_string(),
            fake_packets_size: DEFAULT_FAKE_PACKETS_SIZE.to_string(),
            fake_packets_delay: DEFAULT_FAKE_PACKETS_DELAY.to_string(),
            fake_packets_mode: DEFAULT_FAKE_PACKETS_MODE.to_string(),
        }
    }
}

/// Explicit per-tunnel values; unset fields fall through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseOverrides {
    pub mtu: Option<u16>,
    pub fake_packets: Option<String>,
    pub fake_packets_size: Option<String>,
    pub fake_packets_delay: Option<String>,
    pub fake_packets_mode: Option<String>,
}

impl NoiseOverrides {
    pub fn apply(&self, base: &Obfuscation) -> Obfuscation {
        Obfuscation {
            mtu: self.mtu.unwrap_or(base.mtu),
            fake_packets: pick(&self.fake_packets, &base.fake_packets),
            fake_packets_size: pick(&self.fake_packets_size, &base.fake_packets_size),
            fake_packets_delay: pick(&self.fake_packets_delay, &base.fake_packets_delay),
            fake_packets_mode: pick(&self.fake_packets_mode, &base.fake_packets_mode),
        }
    }
}

fn pick(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Option lists for randomized noise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoisePool {
    pub mtu: Vec<u16>,
    pub fake_packets: Vec<String>,
    pub fake_packets_size: Vec<String>,
    pub fake_packets_delay: Vec<String>,
    pub fake_packets_mode: Vec<String>,
}

impl Default for NoisePool {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            mtu: vec![1280, 1306],
            fake_packets: owned(&["5-10", "10-20", "20-40", "40-80", "80-160"]),
            fake_packets_size: owned(&["40-100", "100-200"]),
            fake_packets_delay: owned(&["5-10", "10-20", "20-50", "50-100"]),
            fake_packets_mode: owned(&["m1", "m2", "m3", "m4", "m5", "m6"]),
        }
    }
}

impl NoisePool {
    /// Random draw per field; empty lists keep the base value
    pub fn draw<R: Rng + ?Sized>(&self, base: &Obfuscation, rng: &mut R) -> Obfuscation {
        let choose = |opts: &[String], fallback: &str, rng: &mut R| {
            opts.choose(rng).cloned().unwrap_or_else(|| fallback.to_string())
        };
        Obfuscation {
            mtu: self.mtu.choose(&mut *rng).copied().unwrap_or(base.mtu),
            fake_packets: choose(&self.fake_packets, &base.fake_packets, &mut *rng),
            fake_packets_size: choose(&self.fake_packets_size, &base.fake_packets_size, &mut *rng),
            fake_packets_delay: choose(&self.fake_packets_delay, &base.fake_packets_delay, &mut *rng),
            fake_packets_mode: choose(&self.fake_packets_mode, &base.fake_packets_mode, &mut *rng),
        }
    }
}

/// How each tunnel's obfuscation is decided: overrides, then pool or defaults
#[derive(Debug, Clone, Default)]
pub struct NoisePlan {
    pub defaults: Obfuscation,
    pub overrides: NoiseOverrides,
    pub random: Option<NoisePool>,
}

impl NoisePlan {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Obfuscation {
        let base = match &self.random {
            Some(pool) => pool.draw(&self.defaults, rng),
            None => self.defaults.clone(),
        };
        self.overrides.apply(&base)
    }
}

// ── Outbound Types ─────────────────────────────────────────────────────────

/// یک outbound وایرگارد
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
    pub local_address: Vec<String>,
    pub private_key: Arc<str>,
    pub server: String,
    pub server_port: u16,
    pub peer_public_key: Arc<str>,
    #[serde(flatten)]
    pub obfuscation: Obfuscation,
}

/// `{"outbounds": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub outbounds: Vec<TunnelConfig>,
}

impl ConfigBundle {
    pub fn len(&self) -> usize {
        self.outbounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbounds.is_empty()
    }

    /// Profile-title comment line followed by pretty JSON
    pub fn render(&self, title: &str) -> Result<String> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(format!("//profile-title: {}\n{}", title, json))
    }

    pub fn file_name(timestamp: &DateTime<Local>) -> String {
        format!("{}{}.txt", OUTPUT_PREFIX, timestamp.format(TIMESTAMP_FORMAT))
    }

    /// Write the bundle as `Wireguard_configs_<timestamp>.txt` inside `dir`
    pub async fn write(&self, dir: &Path, title: &str, timestamp: &DateTime<Local>) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(timestamp));
        tokio::fs::write(&path, self.render(title)?).await?;
        info!("💾 {} کانفیگ WireGuard ذخیره شد: {}", self.len(), path.display());
        Ok(path)
    }
}

// ── Generator ──────────────────────────────────────────────────────────────

/// موتور تولید outbound
#[derive(Debug, Clone)]
pub struct SingboxGenerator {
    plan: NoisePlan,
    limit: usize,
}

impl SingboxGenerator {
    pub fn new(plan: NoisePlan, limit: usize) -> Self {
        Self { plan, limit }
    }

    pub fn synthesize(&self, endpoints: &[RankedEndpoint], keys: &WireguardKeypair) -> ConfigBundle {
        self.synthesize_with_rng(endpoints, keys, &mut rand::thread_rng())
    }

    /// One outbound per endpoint in discovery order, at most `limit`
    pub fn synthesize_with_rng<R: Rng + ?Sized>(
        &self,
        endpoints: &[RankedEndpoint],
        keys: &WireguardKeypair,
        rng: &mut R,
    ) -> ConfigBundle {
        let outbounds = endpoints
            .iter()
            .take(self.limit)
            .enumerate()
            .map(|(i, ep)| TunnelConfig {
                kind: "wireguard".to_string(),
                tag: format!("W{}", i + 1),
                local_address: WARP_LOCAL_ADDRESSES.iter().map(|s| s.to_string()).collect(),
                private_key: Arc::clone(&keys.private_key),
                server: ep.address.to_string(),
                server_port: ep.port,
                peer_public_key: Arc::clone(&keys.public_key),
                obfuscation: self.plan.resolve(rng),
            })
            .collect();

        ConfigBundle { outbounds }
    }
}
