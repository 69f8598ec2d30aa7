//! WARP Endpoint Scanner v5.0
//!
//! Discovers low-loss Cloudflare WARP entry points and emits sing-box
//! WireGuard outbounds for them.
//! اسکن IP تمیز WARP و ساخت کانفیگ sing-box با noise ضد DPI.

// ── Core ────────────────────────────────────────────────────────────────────
pub mod types;
pub mod error;
pub mod config;
pub mod engine;

// ── Discovery ────────────────────────────────────────────────────────────────
pub mod address_space;
pub mod candidates;
pub mod scanner;
pub mod filter;

// ── Config Generators ────────────────────────────────────────────────────────
pub mod warp_client;
pub mod singbox_generator;

// ── Utilities ────────────────────────────────────────────────────────────────
pub mod dashboard;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use types::{IpVersion, ProbeRecord, RankedEndpoint, ToolCommand};
pub use error::{Result, ScanError};
pub use config::{ScannerConfig, Variant};
pub use engine::{DiscoveryEngine, RunReport, ScanPipeline};

pub use address_space::NetworkBlock;
pub use candidates::{CandidateGenerator, CandidateSet, RangeSource};
pub use scanner::ProbeRunner;

pub use singbox_generator::{ConfigBundle, NoiseOverrides, NoisePlan, SingboxGenerator, TunnelConfig};
pub use warp_client::{KeyChain, KeySource, WireguardKeypair};
