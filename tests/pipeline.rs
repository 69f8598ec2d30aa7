//! End-to-end runs against shell scripts standing in for warpendpoint and wgcf.

#![cfg(unix)]

use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, SeedableRng};
use tempfile::TempDir;

use warp_scanner::{
    engine::ScanPipeline,
    warp_client::{KeyChain, KeySource, WgcfKeySource},
    CandidateGenerator, CandidateSet, DiscoveryEngine, IpVersion, ScanError, ScannerConfig,
    ToolCommand,
};

const PUBLIC: &str = "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=";
const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";

const THREE_CLEAN: &str = "IP:Port,Loss,Latency
162.159.192.10:2408,0.00%,85 ms
162.159.192.11:2408,25.00%,90 ms
162.159.195.7:2408,0.00%,120 ms
188.114.97.3:2408,100.00%,0 ms
188.114.98.9:2408,0.00%,64 ms
";

fn script(dir: &Path, name: &str, body: &str) -> ToolCommand {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    ToolCommand::new("/bin/sh").with_args([path.to_string_lossy().into_owned()])
}

/// Probe stand-in: requires ip.txt and writes a fixed result table
fn fake_probe(dir: &Path, table: &str) -> ToolCommand {
    script(
        dir,
        "probe.sh",
        &format!(
            "test -f ip.txt || exit 1\ncat > result.csv <<'EOF'\n{}EOF\n",
            table
        ),
    )
}

fn fake_wgcf(dir: &Path) -> ToolCommand {
    let profile = format!(
        "[Interface]\nPrivateKey = {}\nAddress = 172.16.0.2/32\nAddress = 2606:4700:110::2/128\nDNS = 1.1.1.1\nMTU = 1280\n[Peer]\nPublicKey = {}\nAllowedIPs = 0.0.0.0/0\nEndpoint = engage.cloudflareclient.com:2408\n",
        PRIVATE, PUBLIC
    );
    script(
        dir,
        "wgcf.sh",
        &format!(
            "case \"$1\" in\n  register) echo 'access_token = \"x\"' > wgcf-account.toml ;;\n  generate) cat > wgcf-profile.conf <<'EOF'\n{}EOF\n  ;;\nesac\n",
            profile
        ),
    )
}

struct Workspace {
    _root: TempDir,
    work: PathBuf,
    out: PathBuf,
    tools: PathBuf,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    let out = root.path().join("out");
    let tools = root.path().join("tools");
    for dir in [&work, &out, &tools] {
        std::fs::create_dir_all(dir).unwrap();
    }
    Workspace {
        _root: root,
        work,
        out,
        tools,
    }
}

fn base_config(ws: &Workspace, table: &str) -> ScannerConfig {
    ScannerConfig {
        candidate_count: 20,
        work_dir: ws.work.clone(),
        output_dir: ws.out.clone(),
        profile_title: "Pipeline Test".to_string(),
        probe: fake_probe(&ws.tools, table),
        wgcf: fake_wgcf(&ws.tools),
        online_keys: false,
        ..Default::default()
    }
}

fn offline_keys(config: &ScannerConfig) -> KeyChain {
    let wgcf: Box<dyn KeySource> = Box::new(WgcfKeySource::new(
        config.wgcf.clone(),
        config.work_dir.clone(),
        1,
    ));
    KeyChain::new(vec![wgcf])
}

#[tokio::test]
async fn too_few_clean_endpoints_writes_nothing() {
    let ws = workspace();
    let config = ScannerConfig {
        minimum_configs: Some(10),
        max_retries: Some(3),
        ..base_config(&ws, THREE_CLEAN)
    };

    let err = ScanPipeline::with_keys(config.clone(), offline_keys(&config))
        .run()
        .await
        .unwrap_err();

    // the same three endpoints come back every attempt and count once
    assert!(matches!(
        err,
        ScanError::InsufficientCandidates { found: 3, required: 10 }
    ));
    assert_eq!(err.exit_code(), warp_scanner::error::EXIT_INSUFFICIENT);
    assert_eq!(std::fs::read_dir(&ws.out).unwrap().count(), 0);
}

#[tokio::test]
async fn clean_endpoints_become_outbounds() {
    let ws = workspace();
    let copy_dir = ws.out.join("device");
    std::fs::create_dir_all(&copy_dir).unwrap();
    let config = ScannerConfig {
        copy_to: Some(copy_dir.clone()),
        ..base_config(&ws, THREE_CLEAN)
    };

    let report = ScanPipeline::with_keys(config.clone(), offline_keys(&config))
        .run()
        .await
        .unwrap();

    assert_eq!(report.endpoints.len(), 3);
    assert_eq!(report.outbounds, 3);
    assert!(report.bundle_path.starts_with(&ws.out));
    let name = report.bundle_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Wireguard_configs_") && name.ends_with(".txt"));
    assert_eq!(report.copied_to, Some(copy_dir.join(&name)));

    let text = std::fs::read_to_string(&report.bundle_path).unwrap();
    let (title, json) = text.split_once('\n').unwrap();
    assert_eq!(title, "//profile-title: Pipeline Test");

    let doc: serde_json::Value = serde_json::from_str(json).unwrap();
    let outbounds = doc["outbounds"].as_array().unwrap();
    let servers: Vec<&str> = outbounds.iter().map(|o| o["server"].as_str().unwrap()).collect();
    assert_eq!(servers, ["162.159.192.10", "162.159.195.7", "188.114.98.9"]);
    for (i, o) in outbounds.iter().enumerate() {
        assert_eq!(o["tag"], format!("W{}", i + 1));
        assert_eq!(o["type"], "wireguard");
        assert_eq!(o["server_port"], 2408);
        assert_eq!(o["private_key"], PRIVATE);
        assert_eq!(o["peer_public_key"], PUBLIC);
        assert_eq!(o["mtu"], 1280);
        assert_eq!(o["fake_packets_mode"], "m4");
    }
}

#[tokio::test]
async fn config_limit_caps_outbounds() {
    let ws = workspace();
    let config = ScannerConfig {
        config_limit: 2,
        ..base_config(&ws, THREE_CLEAN)
    };

    let report = ScanPipeline::with_keys(config.clone(), offline_keys(&config))
        .run()
        .await
        .unwrap();
    assert_eq!(report.endpoints.len(), 3);
    assert_eq!(report.outbounds, 2);
}

#[tokio::test]
async fn malformed_table_discards_the_attempt() {
    let ws = workspace();
    let config = base_config(&ws, "IP:Port,Loss,Latency\n162.159.192.10:2408;0%\n");

    let err = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(7))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::InsufficientCandidates { found: 0, required: 2 }
    ));
}

/// Probe stand-in that logs each call to `calls.log` and answers call `n`
/// with `tables[n - 1]` (the last entry repeats). `None` leaves no table.
fn counting_probe(dir: &Path, tables: &[Option<&str>]) -> ToolCommand {
    let answer = |table: &Option<&str>| match table {
        Some(t) => format!("cat > result.csv <<'EOF'\n{}EOF\n", t),
        None => "exit 0\n".to_string(),
    };
    let mut body = String::from(
        "test -f ip.txt || exit 1\necho call >> calls.log\nn=$(wc -l < calls.log | tr -d ' ')\ncase \"$n\" in\n",
    );
    let (last, numbered) = tables.split_last().unwrap();
    for (i, table) in numbered.iter().enumerate() {
        body.push_str(&format!("{})\n{};;\n", i + 1, answer(table)));
    }
    body.push_str(&format!("*)\n{};;\nesac\n", answer(last)));
    script(dir, "counting.sh", &body)
}

fn calls(ws: &Workspace) -> usize {
    std::fs::read_to_string(ws.work.join("calls.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

const ONE_CLEAN: &str = "IP:Port,Loss,Latency
162.159.192.10:2408,0.00%,85 ms
162.159.192.11:2408,40.00%,90 ms
";

const ONE_MORE_CLEAN: &str = "IP:Port,Loss,Latency
162.159.192.10:2408,0.00%,85 ms
162.159.195.7:2408,0.00%,120 ms
";

#[tokio::test]
async fn tool_without_output_exhausts_every_attempt() {
    let ws = workspace();
    let config = ScannerConfig {
        max_retries: Some(3),
        probe: counting_probe(&ws.tools, &[None]),
        ..base_config(&ws, THREE_CLEAN)
    };

    let err = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(7))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::InsufficientCandidates { found: 0, required: 2 }
    ));
    assert_eq!(err.exit_code(), warp_scanner::error::EXIT_INSUFFICIENT);
    assert_eq!(calls(&ws), 3);
}

#[tokio::test]
async fn failed_attempt_is_retried() {
    let ws = workspace();
    let config = ScannerConfig {
        max_retries: Some(3),
        probe: counting_probe(&ws.tools, &[None, Some(THREE_CLEAN)]),
        ..base_config(&ws, THREE_CLEAN)
    };

    let found = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(7))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(calls(&ws), 2);
}

#[tokio::test]
async fn stops_once_minimum_is_met() {
    let ws = workspace();
    let config = ScannerConfig {
        max_retries: Some(5),
        probe: counting_probe(&ws.tools, &[Some(THREE_CLEAN)]),
        ..base_config(&ws, THREE_CLEAN)
    };

    let found = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(5))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(calls(&ws), 1);
}

#[tokio::test]
async fn survivors_accumulate_across_attempts() {
    let ws = workspace();
    let config = ScannerConfig {
        max_retries: Some(5),
        probe: counting_probe(&ws.tools, &[Some(ONE_CLEAN), Some(ONE_MORE_CLEAN)]),
        ..base_config(&ws, THREE_CLEAN)
    };

    let found = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(5))
        .await
        .unwrap();
    let addrs: Vec<String> = found.iter().map(|e| e.socket_addr().to_string()).collect();
    assert_eq!(addrs, ["162.159.192.10:2408", "162.159.195.7:2408"]);
    assert_eq!(calls(&ws), 2);
}

#[tokio::test]
async fn generation_shortfall_skips_the_tool() {
    let ws = workspace();
    let ranges = ws.tools.join("ipv6.txt");
    std::fs::write(&ranges, "not-a-network
").unwrap();
    let config = ScannerConfig {
        ip_version: IpVersion::V6,
        max_retries: Some(2),
        range_source: Some(ranges.to_string_lossy().into_owned().into()),
        probe: counting_probe(&ws.tools, &[Some(THREE_CLEAN)]),
        ..base_config(&ws, THREE_CLEAN)
    };

    let err = DiscoveryEngine::new(&config)
        .discover_with_rng(&mut StdRng::seed_from_u64(9))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::InsufficientCandidates { found: 0, required: 2 }
    ));
    assert_eq!(calls(&ws), 0);
}

#[tokio::test]
async fn discovery_writes_candidate_list_for_the_probe() {
    let ws = workspace();
    let config = base_config(&ws, THREE_CLEAN);
    let engine = DiscoveryEngine::new(&config);

    engine
        .discover_with_rng(&mut StdRng::seed_from_u64(11))
        .await
        .unwrap();

    let list = CandidateSet::read_list(&engine.candidate_list_path()).await.unwrap();
    assert_eq!(list.len(), 20);
    assert!(list.iter().all(|ip| ip.is_ipv4()));
}

#[tokio::test]
async fn user_range_file_feeds_generation() {
    let ws = workspace();
    let ranges = ws.tools.join("ranges.txt");
    std::fs::write(&ranges, "# custom\n162.159.192.0/255\nnot-a-range\n").unwrap();
    let config = ScannerConfig {
        range_source: Some(ranges.to_string_lossy().into_owned().into()),
        ..base_config(&ws, THREE_CLEAN)
    };
    let engine = DiscoveryEngine::new(&config);

    engine
        .discover_with_rng(&mut StdRng::seed_from_u64(3))
        .await
        .unwrap();

    let list = CandidateSet::read_list(&engine.candidate_list_path()).await.unwrap();
    assert_eq!(list.len(), 20);
}

#[tokio::test]
async fn candidate_list_round_trip() {
    let ws = workspace();
    let mut rng = StdRng::seed_from_u64(42);
    let set = CandidateGenerator::new(IpVersion::V6)
        .generate(None, 50, &mut rng)
        .unwrap();
    let path = ws.work.join("ip.txt");

    set.write_list(&path).await.unwrap();
    let back = CandidateSet::read_list(&path).await.unwrap();
    assert_eq!(back, set);
}

#[tokio::test]
async fn wgcf_source_reads_generated_profile() {
    let ws = workspace();
    let source = WgcfKeySource::new(fake_wgcf(&ws.tools), ws.work.clone(), 2);

    let keys = source.fetch().await.unwrap();
    assert_eq!(&*keys.public_key, PUBLIC);
    assert_eq!(&*keys.private_key, PRIVATE);
}

#[tokio::test]
async fn wgcf_without_files_fails_and_chain_reports_keys() {
    let ws = workspace();
    let broken = script(&ws.tools, "broken.sh", "exit 1\n");

    let source = WgcfKeySource::new(broken.clone(), ws.work.clone(), 2);
    assert!(matches!(
        source.fetch().await,
        Err(ScanError::ExternalTool { .. })
    ));

    let wgcf: Box<dyn KeySource> = Box::new(WgcfKeySource::new(broken, ws.work.clone(), 1));
    let chain = KeyChain::new(vec![wgcf]);
    let err = chain.acquire().await.unwrap_err();
    assert_eq!(err.exit_code(), warp_scanner::error::EXIT_KEYS);
}
