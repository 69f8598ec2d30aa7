//! Terminal Dashboard
//!
//! بنر و جدول endpointهای پیدا شده

use colored::Colorize;

use crate::{
    config::ScannerConfig,
    engine::RunReport,
    types::{IpVersion, RankedEndpoint},
};

const RULE_WIDTH: usize = 60;
const IPV4_COLUMN: usize = 15;
const IPV6_COLUMN: usize = 39;
const FAST_MS: f64 = 100.0;
const SLOW_MS: f64 = 250.0;

pub fn print_banner(config: &ScannerConfig) {
    println!("{}", "═".repeat(RULE_WIDTH).cyan());
    println!(
        "{}",
        format!("  ☁️  WARP Endpoint Scanner v{}", env!("CARGO_PKG_VERSION"))
            .cyan()
            .bold()
    );
    println!(
        "  {} | {} | {} IP | حداقل {}",
        config.variant.to_string().yellow(),
        config.ip_version.to_string().yellow(),
        config.candidate_count,
        config.minimum_configs()
    );
    println!("{}", "═".repeat(RULE_WIDTH).cyan());
}

/// Width of the address column; IPv6 literals need the full 39
fn address_width(endpoints: &[RankedEndpoint], version: IpVersion) -> usize {
    let floor = match version {
        IpVersion::V4 => IPV4_COLUMN,
        IpVersion::V6 => IPV6_COLUMN,
    };
    endpoints
        .iter()
        .map(|e| e.address.to_string().len())
        .max()
        .unwrap_or(0)
        .max(floor)
}

fn latency_cell(latency: Option<f64>) -> String {
    match latency {
        Some(ms) if ms < FAST_MS => format!("{:.0}ms ⚡", ms).green().to_string(),
        Some(ms) if ms < SLOW_MS => format!("{:.0}ms 🐇", ms).yellow().to_string(),
        Some(ms) => format!("{:.0}ms 🐌", ms).red().to_string(),
        None => "-".dimmed().to_string(),
    }
}

pub fn print_endpoint_table(endpoints: &[RankedEndpoint], version: IpVersion) {
    if endpoints.is_empty() {
        println!("  ❌ هیچ endpoint تمیزی یافت نشد.");
        return;
    }

    let width = address_width(endpoints, version);
    println!("\n  🏆 endpointهای بدون packet loss:");
    println!(
        "  {:>3}  {:<width$}  {:>5}  {}",
        "#".bold(),
        "IP".bold(),
        "Port".bold(),
        "Latency".bold(),
        width = width
    );
    for (i, ep) in endpoints.iter().enumerate() {
        println!(
            "  {:>3}  {:<width$}  {:>5}  {}",
            i + 1,
            ep.address.to_string().cyan(),
            ep.port,
            latency_cell(ep.latency_ms),
            width = width
        );
    }
}

pub fn print_summary(report: &RunReport) {
    println!("\n  📊 نتایج:");
    println!("  ├── endpoint: {}", report.endpoints.len());
    println!("  ├── outbound: {}", report.outbounds.to_string().green());
    println!("  └── فایل: {}", report.bundle_path.display());
    if let Some(copy) = &report.copied_to {
        println!("      📋 {}", copy.display());
    }
    println!("{}", "═".repeat(RULE_WIDTH).cyan());
}
