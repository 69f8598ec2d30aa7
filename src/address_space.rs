//! فضای آدرس WARP
//!
//! Network blocks of the relay network and random candidate sampling inside them.

use std::{
    collections::HashSet,
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use rand::Rng;

use crate::{
    error::{Result, ScanError},
    types::IpVersion,
};

// ==================== CONSTANTS ====================

/// محدوده hextetهای تصادفی در پیشوندهای ثابت
const HEXTET_MIN: u16 = 10;
const HEXTET_MAX: u16 = 65000;

// ==================== NETWORK BLOCK ====================

/// یک بلوک شبکه
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkBlock {
    /// IPv4 با اکتت آخر متغیر: `a.b.c.start/end`
    V4 {
        /// سه اکتت ثابت
        prefix: [u8; 3],
        /// شروع بازه (شامل)
        start: u8,
        /// پایان بازه (شامل)
        end: u8,
    },
    /// شبکه IPv6 به صورت CIDR
    V6 {
        /// آدرس شبکه (بیت‌های host صفر)
        network: Ipv6Addr,
        /// طول پیشوند
        prefix_len: u8,
    },
}

impl NetworkBlock {
    /// Validate an IPv4 `a.b.c.start/end` literal.
    ///
    /// Exactly three dots, four numeric octets in `[0,255]`, and a numeric
    /// range end strictly greater than the last octet.
    pub fn validate_ipv4(literal: &str) -> Result<Self> {
        let trimmed = literal.trim();
        let (ip, end) = trimmed
            .split_once('/')
            .ok_or_else(|| ScanError::validation(trimmed, "missing `/end`"))?;

        if trimmed.matches('.').count() != 3 || end.contains('.') {
            return Err(ScanError::validation(trimmed, "expected exactly three dots"));
        }

        let mut octets = [0u8; 4];
        for (slot, part) in octets.iter_mut().zip(ip.split('.')) {
            *slot = parse_decimal(part)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| ScanError::validation(trimmed, format!("bad octet `{}`", part)))?;
        }

        let end = parse_decimal(end)
            .ok_or_else(|| ScanError::validation(trimmed, format!("bad range end `{}`", end)))?;
        let start = octets[3];

        if u32::from(start) >= end {
            return Err(ScanError::validation(trimmed, "range start must be below range end"));
        }
        let end = u8::try_from(end)
            .map_err(|_| ScanError::validation(trimmed, "range end exceeds 255"))?;

        Ok(Self::V4 {
            prefix: [octets[0], octets[1], octets[2]],
            start,
            end,
        })
    }

    /// Parse an IPv6 CIDR literal; a bare address is taken as `/128`.
    pub fn parse_ipv6(literal: &str) -> Result<Self> {
        let trimmed = literal.trim();
        let (addr, len) = match trimmed.split_once('/') {
            Some((addr, len)) => (addr, len),
            None => (trimmed, "128"),
        };

        let addr = Ipv6Addr::from_str(addr)
            .map_err(|e| ScanError::validation(trimmed, e.to_string()))?;
        let prefix_len = len
            .parse::<u8>()
            .ok()
            .filter(|l| *l <= 128)
            .ok_or_else(|| ScanError::validation(trimmed, format!("bad prefix length `{}`", len)))?;

        let network = Ipv6Addr::from(u128::from(addr) & !host_mask(prefix_len));
        Ok(Self::V6 { network, prefix_len })
    }

    /// Parse a literal for the given address family
    pub fn parse(literal: &str, version: IpVersion) -> Result<Self> {
        match version {
            IpVersion::V4 => Self::validate_ipv4(literal),
            IpVersion::V6 => Self::parse_ipv6(literal),
        }
    }

    pub fn version(&self) -> IpVersion {
        match self {
            Self::V4 { .. } => IpVersion::V4,
            Self::V6 { .. } => IpVersion::V6,
        }
    }

    /// Whether `ip` lies inside this block
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (Self::V4 { prefix, start, end }, IpAddr::V4(v4)) => {
                let o = v4.octets();
                o[..3] == prefix[..] && (*start..=*end).contains(&o[3])
            }
            (Self::V6 { network, prefix_len }, IpAddr::V6(v6)) => {
                u128::from(v6) & !host_mask(*prefix_len) == u128::from(*network)
            }
            _ => false,
        }
    }

    /// Draw `n` random addresses from the block.
    ///
    /// IPv4 draws are distinct and the call returns nothing when the range
    /// holds no more than `n` values past its start. IPv6 draws are
    /// independent; callers deduplicate.
    pub fn sample_within<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<IpAddr> {
        match *self {
            Self::V4 { prefix, start, end } => {
                if usize::from(end.saturating_sub(start)) <= n {
                    return Vec::new();
                }
                let mut seen = HashSet::with_capacity(n);
                let mut out = Vec::with_capacity(n);
                while out.len() < n {
                    let last = rng.gen_range(start..=end);
                    if seen.insert(last) {
                        out.push(IpAddr::V4(Ipv4Addr::new(prefix[0], prefix[1], prefix[2], last)));
                    }
                }
                out
            }
            Self::V6 { network, prefix_len } => {
                let base = u128::from(network);
                let mask = host_mask(prefix_len);
                (0..n)
                    .map(|_| IpAddr::V6(Ipv6Addr::from(base | (rng.gen::<u128>() & mask))))
                    .collect()
            }
        }
    }
}

impl fmt::Display for NetworkBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 { prefix, start, end } => {
                write!(f, "{}.{}.{}.{}/{}", prefix[0], prefix[1], prefix[2], start, end)
            }
            Self::V6 { network, prefix_len } => write!(f, "{}/{}", network, prefix_len),
        }
    }
}

// ==================== FIXED PREFIXES ====================

/// Address inside a fixed `/64` WARP prefix with four random hextets
pub fn synthesize_fixed_prefix<R: Rng + ?Sized>(prefix: Ipv6Addr, rng: &mut R) -> Ipv6Addr {
    let head = prefix.segments();
    let mut segments = [0u16; 8];
    segments[..4].copy_from_slice(&head[..4]);
    for seg in segments[4..].iter_mut() {
        *seg = rng.gen_range(HEXTET_MIN..=HEXTET_MAX);
    }
    Ipv6Addr::from(segments)
}

// ==================== HELPERS ====================

fn host_mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => u128::MAX,
        l if l >= 128 => 0,
        l => (1u128 << (128 - u32::from(l))) - 1,
    }
}

fn parse_decimal(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
