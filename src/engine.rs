//! Scanner Engine - discovery loop and end-to-end pipeline
//!
//! candidates → probe → zero-loss filter → keys → sing-box bundle

use std::{
    collections::HashSet,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use chrono::Local;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::{
    candidates::{CandidateGenerator, RangeSource},
    config::ScannerConfig,
    error::{Result, ScanError},
    filter,
    scanner::{self, ProbeRunner},
    singbox_generator::SingboxGenerator,
    types::{ProbeRecord, RankedEndpoint, CANDIDATE_LIST_FILE},
    warp_client::{KeyChain, KeySource, OnlineKeySource, WgcfKeySource},
};

// ==================== Discovery ====================

/// Retry loop around generate → probe → filter
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    /// تولیدکننده IP
    generator: CandidateGenerator,
    /// اجرای ابزار probe
    runner: ProbeRunner,
    /// لیست رنج کاربر
    range_source: Option<RangeSource>,
    /// دایرکتوری کاری
    work_dir: PathBuf,
    candidate_count: usize,
    minimum: usize,
    max_retries: usize,
}

impl DiscoveryEngine {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            generator: CandidateGenerator::new(config.ip_version),
            runner: ProbeRunner::new(config.probe.clone(), config.work_dir.clone()),
            range_source: config.effective_range_source(),
            work_dir: config.work_dir.clone(),
            candidate_count: config.candidate_count,
            minimum: config.minimum_configs(),
            max_retries: config.max_retries().max(1),
        }
    }

    pub fn candidate_list_path(&self) -> PathBuf {
        self.work_dir.join(CANDIDATE_LIST_FILE)
    }

    pub async fn discover(&self) -> Result<Vec<RankedEndpoint>> {
        let ranges = self.load_ranges().await?;
        let mut rng = StdRng::from_entropy();
        self.discover_inner(ranges.as_deref(), &mut rng).await
    }

    /// Same as `discover` with a caller-supplied generator
    pub async fn discover_with_rng<R: Rng + Send + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<RankedEndpoint>> {
        let ranges = self.load_ranges().await?;
        self.discover_inner(ranges.as_deref(), rng).await
    }

    async fn discover_inner<R: Rng + Send + ?Sized>(
        &self,
        ranges: Option<&str>,
        rng: &mut R,
    ) -> Result<Vec<RankedEndpoint>> {
        let mut survivors = Vec::new();
        let mut seen = HashSet::new();

        for attempt in 1..=self.max_retries {
            info!("🔍 تلاش {}/{} برای یافتن endpoint تمیز", attempt, self.max_retries);

            let candidates = match self.generator.generate(ranges, self.candidate_count, rng) {
                Ok(candidates) => candidates,
                Err(e @ ScanError::InsufficientCandidates { .. }) => {
                    warn!("⚠️ تلاش {}: ساخت IP ناموفق: {}", attempt, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let list_path = self.candidate_list_path();
            candidates.write_list(&list_path).await?;

            let records = match self.run_attempt(&list_path).await {
                Ok(records) => records,
                Err(e @ (ScanError::ExternalTool { .. } | ScanError::Parse { .. })) => {
                    warn!("⚠️ نتیجه تلاش {} کنار گذاشته شد: {}", attempt, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let clean = filter::filter(&records);
            let added = merge_survivors(&mut survivors, &mut seen, clean);
            info!(
                "✅ {} endpoint جدید با packet loss صفر (مجموع {}/{})",
                added,
                survivors.len(),
                self.minimum
            );

            if survivors.len() >= self.minimum {
                return Ok(survivors);
            }
        }

        error!(
            "❌ فقط {} endpoint پیدا شد، حداقل {} لازم است",
            survivors.len(),
            self.minimum
        );
        Err(ScanError::InsufficientCandidates {
            found: survivors.len(),
            required: self.minimum,
        })
    }

    /// Probe the written list and parse the table it leaves behind
    async fn run_attempt(&self, list_path: &Path) -> Result<Vec<ProbeRecord>> {
        let result_path = self.runner.probe(list_path, self.candidate_count).await?;
        scanner::read_results(&result_path).await
    }

    async fn load_ranges(&self) -> Result<Option<String>> {
        match &self.range_source {
            Some(source) => {
                info!("📥 بارگذاری رنج‌ها از {}", source);
                Ok(Some(source.load().await?))
            }
            None => Ok(None),
        }
    }
}

/// Append endpoints not already seen (by socket address); returns how many
/// were new.
pub fn merge_survivors(
    survivors: &mut Vec<RankedEndpoint>,
    seen: &mut HashSet<SocketAddr>,
    batch: Vec<RankedEndpoint>,
) -> usize {
    let before = survivors.len();
    for endpoint in batch {
        if seen.insert(endpoint.socket_addr()) {
            survivors.push(endpoint);
        } else {
            debug!("duplicate endpoint {} skipped", endpoint.socket_addr());
        }
    }
    survivors.len() - before
}

// ==================== Pipeline ====================

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub endpoints: Vec<RankedEndpoint>,
    pub outbounds: usize,
    pub bundle_path: PathBuf,
    pub copied_to: Option<PathBuf>,
}

/// Key sources in configured order: online service first when enabled
pub fn key_chain(config: &ScannerConfig) -> KeyChain {
    let mut sources: Vec<Box<dyn KeySource>> = Vec::new();
    if config.online_keys {
        sources.push(Box::new(OnlineKeySource::new(config.key_url.clone())));
    }
    sources.push(Box::new(WgcfKeySource::new(
        config.wgcf.clone(),
        config.work_dir.clone(),
        config.wgcf_retries,
    )));
    KeyChain::new(sources)
}

pub struct ScanPipeline {
    config: ScannerConfig,
    discovery: DiscoveryEngine,
    keys: KeyChain,
    generator: SingboxGenerator,
}

impl ScanPipeline {
    pub fn new(config: ScannerConfig) -> Self {
        let keys = key_chain(&config);
        Self::with_keys(config, keys)
    }

    pub fn with_keys(config: ScannerConfig, keys: KeyChain) -> Self {
        Self {
            discovery: DiscoveryEngine::new(&config),
            generator: SingboxGenerator::new(config.noise_plan(), config.config_limit),
            keys,
            config,
        }
    }

    /// Run every stage; nothing is written unless discovery and key
    /// acquisition both succeed.
    pub async fn run(&self) -> Result<RunReport> {
        info!("🚀 شروع اسکن WARP ({}, {})", self.config.variant, self.config.ip_version);

        // Stage 1: discovery
        let endpoints = self.discovery.discover().await?;

        // Stage 2: keys
        let keys = self.keys.acquire().await?;

        // Stage 3: outbounds
        let bundle = self.generator.synthesize(&endpoints, &keys);

        // Stage 4: persist
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let bundle_path = bundle
            .write(&self.config.output_dir, &self.config.profile_title, &Local::now())
            .await?;

        let copied_to = match &self.config.copy_to {
            Some(dir) => match copy_bundle_to(&bundle_path, dir).await {
                Ok(dest) => Some(dest),
                Err(e) => {
                    warn!("⚠️ کپی فایل به {} ناموفق: {}", dir.display(), e);
                    None
                }
            },
            None => None,
        };

        Ok(RunReport {
            outbounds: bundle.len(),
            endpoints,
            bundle_path,
            copied_to,
        })
    }
}

/// Copy the written bundle into `dir`, keeping its file name
pub async fn copy_bundle_to(bundle: &Path, dir: &Path) -> Result<PathBuf> {
    let name = bundle
        .file_name()
        .ok_or_else(|| ScanError::Config(format!("{} has no file name", bundle.display())))?;
    let dest = dir.join(name);
    tokio::fs::copy(bundle, &dest).await?;
    info!("📋 کپی شد: {}", dest.display());
    Ok(dest)
}
