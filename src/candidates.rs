//! Candidate Generator - ساخت لیست IP برای اسکن
//!
//! Builds a deduplicated, exactly-sized candidate list from user ranges with a
//! fallback to the built-in WARP blocks, and persists it for the probe tool.

use std::{
    fmt,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    address_space::{synthesize_fixed_prefix, NetworkBlock},
    error::{Result, ScanError},
    types::{IpVersion, DEFAULT_IPV4_RANGES, SAMPLES_PER_BLOCK, WARP_IPV6_PREFIXES},
};

/// Sampling passes without growth before a block set counts as exhausted
const MAX_STALLED_PASSES: usize = 32;

const RANGE_FETCH_TIMEOUT_SECS: u64 = 15;

// ── Range Source ─────────────────────────────────────────────────────────────

/// Where user ranges come from: a local file or an `http(s)` URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RangeSource {
    File(PathBuf),
    Url(String),
}

impl RangeSource {
    /// Read the raw range list
    pub async fn load(&self) -> Result<String> {
        match self {
            RangeSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            RangeSource::Url(url) => {
                info!("🌐 دریافت لیست رنج از {}", url);
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(RANGE_FETCH_TIMEOUT_SECS))
                    .build()?;
                let body = client
                    .get(url.as_str())
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Ok(body)
            }
        }
    }
}

impl From<String> for RangeSource {
    fn from(s: String) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            RangeSource::Url(s)
        } else {
            RangeSource::File(PathBuf::from(s))
        }
    }
}

impl From<RangeSource> for String {
    fn from(source: RangeSource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for RangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSource::File(path) => write!(f, "{}", path.display()),
            RangeSource::Url(url) => f.write_str(url),
        }
    }
}

// ── Candidate Set ────────────────────────────────────────────────────────────

/// Insertion-ordered, duplicate-free candidate addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    addrs: IndexSet<IpAddr>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addrs.contains(ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter()
    }

    /// Newline-delimited list, IPv6 in brackets, no trailing newline
    pub fn to_list_string(&self) -> String {
        self.addrs
            .iter()
            .map(|ip| match ip {
                IpAddr::V4(v4) => v4.to_string(),
                IpAddr::V6(v6) => format!("[{}]", v6),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse a list written by [`CandidateSet::to_list_string`]
    pub fn parse_list(text: &str) -> Result<Self> {
        let mut addrs = IndexSet::new();
        for (idx, line) in text.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            let bare = entry.trim_start_matches('[').trim_end_matches(']');
            let ip = bare.parse::<IpAddr>().map_err(|e| ScanError::Parse {
                line: idx + 1,
                reason: format!("`{}`: {}", entry, e),
            })?;
            addrs.insert(ip);
        }
        Ok(Self { addrs })
    }

    pub async fn write_list(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_list_string()).await?;
        debug!("💾 {} candidates → {}", self.len(), path.display());
        Ok(())
    }

    pub async fn read_list(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse_list(&text)
    }
}

impl FromIterator<IpAddr> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().collect(),
        }
    }
}

// ── Generator ────────────────────────────────────────────────────────────────

/// Produces exactly `count` unique candidates per call
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    version: IpVersion,
    default_blocks: Vec<NetworkBlock>,
}

impl CandidateGenerator {
    pub fn new(version: IpVersion) -> Self {
        let default_blocks = match version {
            IpVersion::V4 => DEFAULT_IPV4_RANGES
                .iter()
                .filter_map(|r| NetworkBlock::validate_ipv4(r).ok())
                .collect(),
            IpVersion::V6 => Vec::new(),
        };
        Self { version, default_blocks }
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    /// Generate candidates; `ranges` is the content of the user range list.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        ranges: Option<&str>,
        count: usize,
        rng: &mut R,
    ) -> Result<CandidateSet> {
        let mut pool = match self.version {
            IpVersion::V4 => self.pool_v4(ranges, count, rng)?,
            IpVersion::V6 => self.pool_v6(ranges, count, rng)?,
        };

        if pool.len() < count {
            warn!("⚠️ فقط {} از {} IP ساخته شد", pool.len(), count);
            return Err(ScanError::InsufficientCandidates {
                found: pool.len(),
                required: count,
            });
        }

        // حذف تصادفی تا رسیدن به تعداد دقیق
        while pool.len() > count {
            let idx = rng.gen_range(0..pool.len());
            pool.shift_remove_index(idx);
        }

        info!("🎯 {} IP {} ساخته شد", pool.len(), self.version);
        Ok(CandidateSet { addrs: pool })
    }

    fn pool_v4<R: Rng + ?Sized>(
        &self,
        ranges: Option<&str>,
        count: usize,
        rng: &mut R,
    ) -> Result<IndexSet<IpAddr>> {
        let mut pool = IndexSet::with_capacity(count);
        let mut any_valid = false;

        if let Some(text) = ranges {
            let blocks = parse_blocks(text, IpVersion::V4);
            any_valid |= !blocks.is_empty();
            accumulate(&blocks, count, &mut pool, rng);
            if pool.len() < count {
                info!("➕ رنج‌های کاربر کافی نبود ({}/{}), استفاده از رنج‌های پیش‌فرض", pool.len(), count);
            }
        }

        if pool.len() < count {
            any_valid |= !self.default_blocks.is_empty();
            accumulate(&self.default_blocks, count, &mut pool, rng);
        }

        if !any_valid {
            return Err(ScanError::InsufficientCandidates { found: 0, required: count });
        }
        Ok(pool)
    }

    fn pool_v6<R: Rng + ?Sized>(
        &self,
        ranges: Option<&str>,
        count: usize,
        rng: &mut R,
    ) -> Result<IndexSet<IpAddr>> {
        let mut pool = IndexSet::with_capacity(count + 1);

        match ranges {
            Some(text) => {
                let blocks = parse_blocks(text, IpVersion::V6);
                if blocks.is_empty() {
                    return Err(ScanError::InsufficientCandidates { found: 0, required: count });
                }
                accumulate(&blocks, count, &mut pool, rng);
            }
            None => {
                let mut stalled = 0;
                while pool.len() < count && stalled < MAX_STALLED_PASSES {
                    let before = pool.len();
                    for prefix in WARP_IPV6_PREFIXES {
                        pool.insert(IpAddr::V6(synthesize_fixed_prefix(prefix, rng)));
                    }
                    stalled = if pool.len() == before { stalled + 1 } else { 0 };
                }
            }
        }
        Ok(pool)
    }
}

/// Parse range lines, skipping blanks, `#` comments and invalid literals
pub fn parse_blocks(text: &str, version: IpVersion) -> Vec<NetworkBlock> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| match NetworkBlock::parse(l, version) {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("⚠️ رنج نامعتبر رد شد: {}", e);
                None
            }
        })
        .collect()
}

/// Round-robin sampling until `target` unique addresses or exhaustion
fn accumulate<R: Rng + ?Sized>(
    blocks: &[NetworkBlock],
    target: usize,
    pool: &mut IndexSet<IpAddr>,
    rng: &mut R,
) {
    if blocks.is_empty() {
        return;
    }
    let mut stalled = 0;
    while pool.len() < target && stalled < MAX_STALLED_PASSES {
        let before = pool.len();
        for block in blocks {
            pool.extend(block.sample_within(SAMPLES_PER_BLOCK, rng));
        }
        stalled = if pool.len() == before { stalled + 1 } else { 0 };
    }
}
