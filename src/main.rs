//! WARP Endpoint Scanner v5.0
//! اسکنر IP تمیز Cloudflare WARP | خروجی sing-box با noise ضد DPI
//!
//! candidates → warpendpoint → zero loss → wgcf / online keys → outbounds

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use warp_scanner::{
    dashboard,
    engine::{self, ScanPipeline},
    error::{ScanError, EXIT_GENERAL, EXIT_SUCCESS},
    scanner, filter,
    CandidateGenerator, IpVersion, ScannerConfig, ToolCommand, Variant,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "warp-scanner",
    version,
    about = "☁️ WARP Endpoint Scanner - clean WARP IPs to sing-box WireGuard outbounds",
    long_about = "اسکن IPهای WARP با packet loss صفر و ساخت کانفیگ sing-box\n\
                  ابزارهای خارجی: warpendpoint (probe) | wgcf (کلید)"
)]
struct Cli {
    /// فایل پیکربندی TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// سطح لاگ (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// پیش‌فرض‌ها (current, legacy)
    #[arg(long)]
    variant: Option<Variant>,

    /// نسخه IP (4, 6)
    #[arg(long)]
    ip_version: Option<IpVersion>,

    /// فایل یا URL لیست رنج‌ها
    #[arg(short, long)]
    ranges: Option<String>,

    /// دانلود لیست رنج IPv6 منتشر شده
    #[arg(long)]
    published_ranges: bool,

    /// تعداد IP در هر تلاش
    #[arg(long)]
    count: Option<usize>,

    /// حداقل endpoint تمیز
    #[arg(long)]
    minimum: Option<usize>,

    /// تعداد تلاش‌ها
    #[arg(long)]
    retries: Option<usize>,

    /// حداکثر تعداد کانفیگ
    #[arg(long)]
    limit: Option<usize>,

    /// دایرکتوری ip.txt و result.csv
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// دایرکتوری خروجی
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// عنوان پروفایل
    #[arg(long)]
    title: Option<String>,

    /// مسیر ابزار probe
    #[arg(long)]
    probe: Option<PathBuf>,

    /// مسیر wgcf
    #[arg(long)]
    wgcf: Option<PathBuf>,

    /// بدون سرویس آنلاین کلید
    #[arg(long)]
    offline_keys: bool,

    /// noise تصادفی
    #[arg(long)]
    random_noise: bool,

    /// کپی خروجی به این دایرکتوری
    #[arg(long)]
    copy_to: Option<PathBuf>,

    /// دستور
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// اسکن کامل و ساخت کانفیگ
    Run,
    /// فقط ساخت لیست IP
    Candidates {
        /// مسیر خروجی (پیش‌فرض: ip.txt در work dir)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// فیلتر و نمایش یک result.csv موجود
    Results {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// دریافت کلید WireGuard
    Keys,
}

// ── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let code = match run(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            e.downcast_ref::<ScanError>()
                .map(ScanError::exit_code)
                .unwrap_or(EXIT_GENERAL)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    config.validate()?;

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => run_scan(config).await,
        Commands::Candidates { output } => run_candidates(config, output).await,
        Commands::Results { file } => run_results(config, file).await,
        Commands::Keys => run_keys(config).await,
    }
}

// ── Command Handlers ─────────────────────────────────────────────────────────

async fn run_scan(config: ScannerConfig) -> Result<()> {
    dashboard::print_banner(&config);
    let version = config.ip_version;

    let report = ScanPipeline::new(config).run().await?;
    dashboard::print_endpoint_table(&report.endpoints, version);
    dashboard::print_summary(&report);
    Ok(())
}

async fn run_candidates(config: ScannerConfig, output: Option<PathBuf>) -> Result<()> {
    let ranges = match &config.effective_range_source() {
        Some(source) => Some(source.load().await?),
        None => None,
    };

    let candidates = {
        let mut rng = rand::thread_rng();
        CandidateGenerator::new(config.ip_version).generate(
            ranges.as_deref(),
            config.candidate_count,
            &mut rng,
        )?
    };

    let path = output.unwrap_or_else(|| engine::DiscoveryEngine::new(&config).candidate_list_path());
    candidates
        .write_list(&path)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("💾 {} IP در {} ذخیره شد", candidates.len(), path.display());
    Ok(())
}

async fn run_results(config: ScannerConfig, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| config.work_dir.join(warp_scanner::types::PROBE_RESULT_FILE));
    let records = scanner::read_results(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let endpoints = filter::filter(&records);
    info!("📊 {} از {} ردیف بدون packet loss", endpoints.len(), records.len());
    dashboard::print_endpoint_table(&endpoints, config.ip_version);
    Ok(())
}

async fn run_keys(config: ScannerConfig) -> Result<()> {
    let keys = engine::key_chain(&config).acquire().await?;
    println!("PublicKey: {}", keys.public_key);
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn setup_logging(level: &str) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

fn build_config(cli: &Cli) -> Result<ScannerConfig> {
    let mut config = match &cli.config {
        Some(path) => ScannerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScannerConfig::default(),
    };

    if let Some(variant) = cli.variant {
        config.variant = variant;
    }
    if let Some(version) = cli.ip_version {
        config.ip_version = version;
    }
    if config.variant == Variant::Legacy && config.ip_version == IpVersion::V6 {
        warn!("⚠️ legacy فقط IPv4 اسکن می‌کرد؛ IPv6 با پیش‌فرض‌های legacy ادامه می‌یابد");
    }
    if let Some(ranges) = &cli.ranges {
        config.range_source = Some(ranges.clone().into());
    }
    if cli.published_ranges {
        config.published_ranges = true;
    }
    if config.published_ranges && config.ip_version == IpVersion::V4 {
        warn!("⚠️ لیست رنج منتشر شده فقط برای IPv6 است؛ رنج‌های پیش‌فرض IPv4 استفاده می‌شود");
    }
    if let Some(count) = cli.count {
        config.candidate_count = count;
    }
    if let Some(minimum) = cli.minimum {
        config.minimum_configs = Some(minimum);
    }
    if let Some(retries) = cli.retries {
        config.max_retries = Some(retries);
    }
    if let Some(limit) = cli.limit {
        config.config_limit = limit;
    }
    if let Some(dir) = &cli.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(title) = &cli.title {
        config.profile_title = title.clone();
    }
    if let Some(probe) = &cli.probe {
        config.probe = ToolCommand::new(probe.clone());
    }
    if let Some(wgcf) = &cli.wgcf {
        config.wgcf = ToolCommand::new(wgcf.clone());
    }
    if cli.offline_keys {
        config.online_keys = false;
    }
    if cli.random_noise {
        config.random_noise = true;
    }
    if let Some(dir) = &cli.copy_to {
        config.copy_to = Some(dir.clone());
    }

    Ok(config)
}
