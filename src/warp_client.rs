//! WARP - کلیدهای WireGuard برای Cloudflare WARP
//!
//! دریافت جفت کلید از سرویس آنلاین یا ساخت اکانت با ابزار wgcf.
//! Key sources are tried in order; the first valid pair wins.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ScanError},
    types::{ToolCommand, WGCF_ACCOUNT_FILE, WGCF_PROFILE_FILE},
};

// ── Constants ──────────────────────────────────────────────────────────────

/// طول کلید base64 وایرگارد
pub const KEY_LENGTH: usize = 44;
const KEY_BYTES: usize = 32;

const ONLINE_TIMEOUT_SECS: u64 = 5;

/// موقعیت کلیدها در wgcf-profile.conf (خط، ستون) - وابسته به فرمت فعلی wgcf
const PROFILE_PRIVATE_KEY_AT: (usize, usize) = (1, 2);
const PROFILE_PUBLIC_KEY_AT: (usize, usize) = (7, 2);

// ── WireGuard Key Pair ─────────────────────────────────────────────────────

/// جفت کلید WireGuard، مشترک بین همه outboundهای یک اجرا
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireguardKeypair {
    pub public_key: Arc<str>,
    pub private_key: Arc<str>,
}

impl WireguardKeypair {
    /// Validate and wrap a key pair
    pub fn new(public_key: &str, private_key: &str) -> Result<Self> {
        validate_key("public", public_key)?;
        validate_key("private", private_key)?;
        Ok(Self {
            public_key: Arc::from(public_key.trim()),
            private_key: Arc::from(private_key.trim()),
        })
    }
}

fn validate_key(label: &str, key: &str) -> Result<()> {
    let key = key.trim();
    if key.len() != KEY_LENGTH {
        return Err(ScanError::KeyValidation(format!(
            "{} key has {} characters, expected {}",
            label,
            key.len(),
            KEY_LENGTH
        )));
    }
    let bytes = STANDARD
        .decode(key)
        .map_err(|e| ScanError::KeyValidation(format!("{} key is not base64: {}", label, e)))?;
    if bytes.len() != KEY_BYTES {
        return Err(ScanError::KeyValidation(format!(
            "{} key decodes to {} bytes",
            label,
            bytes.len()
        )));
    }
    Ok(())
}

// ── Key Sources ────────────────────────────────────────────────────────────

#[async_trait]
pub trait KeySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<WireguardKeypair>;
}

/// سرویس آنلاین تولید کلید
pub struct OnlineKeySource {
    url: String,
    timeout: Duration,
}

impl OnlineKeySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(ONLINE_TIMEOUT_SECS),
        }
    }
}

#[async_trait]
impl KeySource for OnlineKeySource {
    fn name(&self) -> &str {
        "online"
    }

    async fn fetch(&self) -> Result<WireguardKeypair> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = client
            .get(self.url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_online_keys(&body)
    }
}

/// `label: public` on the first line, `label: private` on the second
pub fn parse_online_keys(body: &str) -> Result<WireguardKeypair> {
    let mut lines = body.lines();
    let mut value = |what: &str| {
        lines
            .next()
            .and_then(|l| l.split_once(':'))
            .map(|(_, v)| v.trim().to_string())
            .ok_or_else(|| ScanError::KeyValidation(format!("missing {} key line", what)))
    };
    let public_key = value("public")?;
    let private_key = value("private")?;
    WireguardKeypair::new(&public_key, &private_key)
}

/// ساخت اکانت و پروفایل با wgcf
pub struct WgcfKeySource {
    tool: ToolCommand,
    work_dir: PathBuf,
    max_retries: usize,
}

impl WgcfKeySource {
    pub fn new(tool: ToolCommand, work_dir: impl Into<PathBuf>, max_retries: usize) -> Self {
        Self {
            tool,
            work_dir: work_dir.into(),
            max_retries: max_retries.max(1),
        }
    }

    /// Run one wgcf step until `expected` exists, alternating between the
    /// configured path and the bare name on `PATH`.
    async fn run_step(&self, args: &[&str], expected: &Path) -> Result<()> {
        let bare = self.tool.bare();
        for attempt in 0..self.max_retries {
            let tool = match (&bare, attempt % 2) {
                (Some(bare), 1) => bare,
                _ => &self.tool,
            };
            info!("🔐 wgcf {} (تلاش {}/{})", args.join(" "), attempt + 1, self.max_retries);

            let outcome = tool
                .command()
                .args(args)
                .current_dir(&self.work_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match outcome {
                Ok(status) if !status.success() => {
                    debug!("wgcf exited with {}", status.code().unwrap_or(-1));
                }
                Ok(_) => {}
                Err(e) => warn!("⚠️ اجرای {} ناموفق: {}", tool, e),
            }

            if expected.exists() {
                return Ok(());
            }
        }
        Err(ScanError::external(
            &self.tool,
            format!("{} was not created", expected.display()),
        ))
    }
}

#[async_trait]
impl KeySource for WgcfKeySource {
    fn name(&self) -> &str {
        "wgcf"
    }

    async fn fetch(&self) -> Result<WireguardKeypair> {
        let account = self.work_dir.join(WGCF_ACCOUNT_FILE);
        let profile = self.work_dir.join(WGCF_PROFILE_FILE);
        for stale in [&account, &profile] {
            match tokio::fs::remove_file(stale).await {
                Ok(()) => debug!("🧹 {} removed", stale.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("☁️ ثبت اکانت رایگان WARP...");
        self.run_step(&["register", "--accept-tos"], &account).await?;
        info!("📝 ساخت پروفایل WireGuard...");
        self.run_step(&["generate"], &profile).await?;

        let text = tokio::fs::read_to_string(&profile).await?;
        parse_wgcf_profile(&text)
    }
}

/// Keys at fixed offsets of `wgcf-profile.conf`: private key on line 2,
/// peer public key on line 8, third space-separated token each.
pub fn parse_wgcf_profile(text: &str) -> Result<WireguardKeypair> {
    let lines: Vec<&str> = text.lines().collect();
    let token = |(line, col): (usize, usize)| {
        lines
            .get(line)
            .and_then(|l| l.split(' ').nth(col))
            .map(str::trim)
            .ok_or_else(|| {
                ScanError::KeyValidation(format!("profile has no key at line {}", line + 1))
            })
    };
    let private_key = token(PROFILE_PRIVATE_KEY_AT)?;
    let public_key = token(PROFILE_PUBLIC_KEY_AT)?;
    WireguardKeypair::new(public_key, private_key)
}

// ── Key Chain ──────────────────────────────────────────────────────────────

/// زنجیره منابع کلید
pub struct KeyChain {
    sources: Vec<Box<dyn KeySource>>,
}

impl KeyChain {
    pub fn new(sources: Vec<Box<dyn KeySource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First valid keypair from the configured sources
    pub async fn acquire(&self) -> Result<WireguardKeypair> {
        for source in &self.sources {
            match source.fetch().await {
                Ok(keys) => {
                    info!("🔑 کلیدها از منبع {} دریافت شد", source.name());
                    return Ok(keys);
                }
                Err(e) => warn!("⚠️ منبع کلید {} ناموفق: {}", source.name(), e),
            }
        }
        Err(ScanError::KeyAcquisition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: &str = "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=";
    const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";

    #[test]
    fn rejects_wrong_length_and_non_base64() {
        assert!(matches!(
            WireguardKeypair::new("short", PRIVATE),
            Err(ScanError::KeyValidation(_))
        ));
        let bad = "!".repeat(KEY_LENGTH);
        assert!(matches!(
            WireguardKeypair::new(PUBLIC, &bad),
            Err(ScanError::KeyValidation(_))
        ));
        assert!(WireguardKeypair::new(PUBLIC, PRIVATE).is_ok());
    }

    #[test]
    fn parses_online_response() {
        let body = format!("PublicKey: {}\nPrivateKey: {}\n", PUBLIC, PRIVATE);
        let keys = parse_online_keys(&body).unwrap();
        assert_eq!(&*keys.public_key, PUBLIC);
        assert_eq!(&*keys.private_key, PRIVATE);
        assert!(parse_online_keys("PublicKey: abc").is_err());
    }

    #[test]
    fn parses_wgcf_profile_offsets() {
        let profile = format!(
            "[Interface]\nPrivateKey = {}\nAddress = 172.16.0.2/32\nAddress = 2606:4700:110::1/128\nDNS = 1.1.1.1\nMTU = 1280\n[Peer]\nPublicKey = {}\nAllowedIPs = 0.0.0.0/0\nEndpoint = engage.cloudflareclient.com:2408\n",
            PRIVATE, PUBLIC
        );
        let keys = parse_wgcf_profile(&profile).unwrap();
        assert_eq!(&*keys.private_key, PRIVATE);
        assert_eq!(&*keys.public_key, PUBLIC);
        assert!(parse_wgcf_profile("[Interface]\n").is_err());
    }

    struct Fixed(Option<WireguardKeypair>);

    #[async_trait]
    impl KeySource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> Result<WireguardKeypair> {
            self.0.clone().ok_or(ScanError::KeyAcquisition)
        }
    }

    #[tokio::test]
    async fn chain_falls_through_to_next_source() {
        let keys = WireguardKeypair::new(PUBLIC, PRIVATE).unwrap();
        let chain = KeyChain::new(vec![Box::new(Fixed(None)), Box::new(Fixed(Some(keys.clone())))]);
        assert_eq!(chain.acquire().await.unwrap(), keys);

        let empty = KeyChain::new(vec![Box::new(Fixed(None))]);
        assert!(matches!(empty.acquire().await, Err(ScanError::KeyAcquisition)));
    }
}
