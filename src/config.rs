//! Configuration Management
//!
//! Scanner settings loaded from an optional TOML file and overridden by CLI
//! flags. Two presets cover the historical defaults of the tool.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    candidates::RangeSource,
    error::{Result, ScanError},
    singbox_generator::{NoiseOverrides, NoisePlan, NoisePool, Obfuscation, DEFAULT_MTU},
    types::{IpVersion, ToolCommand, DEFAULT_IPV6_RANGE_URL, DEFAULT_KEY_URL},
};

pub const LEGACY_MTU: u16 = 1306;

/// Default preset values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// IPv4/IPv6, minimum 2 endpoints, mtu 1280, one attempt
    #[default]
    Current,
    /// IPv4, minimum 10 endpoints, mtu 1306, five attempts
    Legacy,
}

impl Variant {
    pub fn minimum_configs(self) -> usize {
        match self {
            Variant::Current => 2,
            Variant::Legacy => 10,
        }
    }

    pub fn max_retries(self) -> usize {
        match self {
            Variant::Current => 1,
            Variant::Legacy => 5,
        }
    }

    pub fn mtu(self) -> u16 {
        match self {
            Variant::Current => DEFAULT_MTU,
            Variant::Legacy => LEGACY_MTU,
        }
    }
}

impl FromStr for Variant {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "current" | "v2" => Ok(Variant::Current),
            "legacy" | "v1" => Ok(Variant::Legacy),
            other => Err(ScanError::Config(format!("unknown variant `{}`", other))),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Current => f.write_str("current"),
            Variant::Legacy => f.write_str("legacy"),
        }
    }
}

impl FromStr for IpVersion {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "4" | "v4" | "ipv4" => Ok(IpVersion::V4),
            "6" | "v6" | "ipv6" => Ok(IpVersion::V6),
            other => Err(ScanError::Config(format!("unknown ip version `{}`", other))),
        }
    }
}

/// Full scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Preset supplying unset defaults
    pub variant: Variant,
    /// Address family to scan
    pub ip_version: IpVersion,
    /// User range list (path or URL)
    pub range_source: Option<RangeSource>,
    /// Fetch the published IPv6 range list when no `range_source` is set
    pub published_ranges: bool,
    /// Candidates generated per attempt
    pub candidate_count: usize,
    /// Zero-loss endpoints required (preset when unset)
    pub minimum_configs: Option<usize>,
    /// Discovery attempts (preset when unset)
    pub max_retries: Option<usize>,
    /// Maximum outbounds written
    pub config_limit: usize,
    /// Hand-off directory for ip.txt / result.csv / wgcf files
    pub work_dir: PathBuf,
    /// Where the bundle is written
    pub output_dir: PathBuf,
    /// `//profile-title:` value
    pub profile_title: String,
    /// Probe tool
    pub probe: ToolCommand,
    /// wgcf tool
    pub wgcf: ToolCommand,
    /// Attempts per wgcf step
    pub wgcf_retries: usize,
    /// Try the online key service before wgcf
    pub online_keys: bool,
    /// Online key service
    pub key_url: String,
    /// Explicit obfuscation values
    pub noise: NoiseOverrides,
    /// Draw unset obfuscation values from `noise_pool`
    pub random_noise: bool,
    /// Options for random noise
    pub noise_pool: NoisePool,
    /// Copy the bundle here after writing (e.g. `/storage/emulated/0`)
    pub copy_to: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Current,
            ip_version: IpVersion::V4,
            range_source: None,
            published_ranges: false,
            candidate_count: 200,
            minimum_configs: None,
            max_retries: None,
            config_limit: 50,
            work_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            profile_title: "Network Ghost WARP Scanner".to_string(),
            probe: ToolCommand::new("./warpendpoint"),
            wgcf: ToolCommand::new("./wgcf"),
            wgcf_retries: 2,
            online_keys: true,
            key_url: DEFAULT_KEY_URL.to_string(),
            noise: NoiseOverrides::default(),
            random_noise: false,
            noise_pool: NoisePool::default(),
            copy_to: None,
        }
    }
}

impl ScannerConfig {
    /// Read a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// User list first, then the published IPv6 list when requested.
    /// IPv4 has no published list; its built-in blocks apply instead.
    pub fn effective_range_source(&self) -> Option<RangeSource> {
        match (&self.range_source, self.ip_version) {
            (Some(source), _) => Some(source.clone()),
            (None, IpVersion::V6) if self.published_ranges => {
                Some(RangeSource::Url(DEFAULT_IPV6_RANGE_URL.to_string()))
            }
            _ => None,
        }
    }

    pub fn minimum_configs(&self) -> usize {
        self.minimum_configs.unwrap_or_else(|| self.variant.minimum_configs())
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries.unwrap_or_else(|| self.variant.max_retries())
    }

    pub fn noise_plan(&self) -> NoisePlan {
        NoisePlan {
            defaults: Obfuscation::with_mtu(self.variant.mtu()),
            overrides: self.noise.clone(),
            random: self.random_noise.then(|| self.noise_pool.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("candidate_count", self.candidate_count),
            ("minimum_configs", self.minimum_configs()),
            ("max_retries", self.max_retries()),
            ("config_limit", self.config_limit),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ScanError::Config(format!("{} must be positive", name)));
            }
        }
        if self.minimum_configs() > self.candidate_count {
            return Err(ScanError::Config(format!(
                "minimum_configs ({}) exceeds candidate_count ({})",
                self.minimum_configs(),
                self.candidate_count
            )));
        }
        Ok(())
    }
}
