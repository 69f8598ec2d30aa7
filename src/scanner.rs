//! اسکنر endpoint - اجرای ابزار warpendpoint
//!
//! Runs the external probe over the candidate list and parses its result table.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use tracing::{debug, info, warn};

use crate::{
    error::{Result, ScanError},
    types::{ProbeRecord, ToolCommand, PROBE_RESULT_FILE},
};

/// Minimum columns per result row: endpoint, loss, latency
const MIN_COLUMNS: usize = 3;

/// Runs the external probe tool
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    /// ابزار probe
    tool: ToolCommand,
    /// دایرکتوری کاری (محل ip.txt و result.csv)
    work_dir: PathBuf,
}

impl ProbeRunner {
    pub fn new(tool: ToolCommand, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            work_dir: work_dir.into(),
        }
    }

    /// Fixed location the probe writes its table to
    pub fn result_path(&self) -> PathBuf {
        self.work_dir.join(PROBE_RESULT_FILE)
    }

    /// Run `<probe> -max N` and wait for it to exit.
    ///
    /// Returns the result table path, or `ExternalTool` when the tool could
    /// not be started or left no result file behind.
    pub async fn probe(&self, candidate_list: &Path, max_candidates: usize) -> Result<PathBuf> {
        if !candidate_list.exists() {
            return Err(ScanError::external(
                &self.tool,
                format!("candidate list {} not found", candidate_list.display()),
            ));
        }

        let result_path = self.result_path();
        match tokio::fs::remove_file(&result_path).await {
            Ok(()) => debug!("🧹 stale {} removed", result_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("📡 اجرای probe: {} -max {}", self.tool, max_candidates);
        let status = self
            .tool
            .command()
            .arg("-max")
            .arg(max_candidates.to_string())
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| ScanError::external(&self.tool, e.to_string()))?;

        if !status.success() {
            warn!("⚠️ probe با کد {} خارج شد", status.code().unwrap_or(-1));
        }

        if !result_path.exists() {
            return Err(ScanError::external(&self.tool, "no result file produced"));
        }
        Ok(result_path)
    }
}

/// Parse the probe table; the header row is discarded.
///
/// Column 0 is the endpoint, column 1 the loss, and the latency is the first
/// whitespace token of the last column. Any malformed row fails the whole
/// table.
pub fn parse_results(text: &str) -> Result<Vec<ProbeRecord>> {
    let mut records = Vec::new();

    for (idx, raw) in text.lines().enumerate().skip(1) {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() < MIN_COLUMNS {
            return Err(ScanError::Parse {
                line: line_no,
                reason: format!("expected {} columns, found {}", MIN_COLUMNS, cols.len()),
            });
        }

        let endpoint = cols[0];
        if endpoint.is_empty() {
            return Err(ScanError::Parse {
                line: line_no,
                reason: "empty endpoint".into(),
            });
        }

        let latency = cols[cols.len() - 1]
            .split_whitespace()
            .next()
            .ok_or_else(|| ScanError::Parse {
                line: line_no,
                reason: "empty latency".into(),
            })?;

        records.push(ProbeRecord {
            address_port: endpoint.to_string(),
            packet_loss: cols[1].to_string(),
            latency: latency.to_string(),
        });
    }

    debug!("📄 {} probe rows parsed", records.len());
    Ok(records)
}

pub async fn read_results(path: &Path) -> Result<Vec<ProbeRecord>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_results(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "IP:Port,Loss,Latency\n\
        162.159.192.10:2408,0.00%,120 ms\n\
        [2606:4700:d0::a:b:c:d]:878,0.00%,98 ms\n\
        188.114.97.3:500,25.00%,300 ms\n";

    #[test]
    fn parses_rows_after_header() {
        let records = parse_results(TABLE).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].address_port, "162.159.192.10:2408");
        assert_eq!(records[0].packet_loss, "0.00%");
        assert_eq!(records[0].latency, "120");
        assert_eq!(records[1].address_port, "[2606:4700:d0::a:b:c:d]:878");
        assert_eq!(records[2].packet_loss, "25.00%");
    }

    #[test]
    fn latency_comes_from_last_column() {
        let text = "a,b,c,d\n1.1.1.1:2408,0%,x,y,55 ms\n";
        let records = parse_results(text).unwrap();
        assert_eq!(records[0].latency, "55");
    }

    #[test]
    fn header_only_and_empty_tables() {
        assert!(parse_results("IP:Port,Loss,Latency\n").unwrap().is_empty());
        assert!(parse_results("").unwrap().is_empty());
    }

    #[test]
    fn short_row_fails_whole_table() {
        let text = "h\n1.1.1.1:2408,0%,10 ms\n1.1.1.2:2408,0%\n";
        let err = parse_results(text).unwrap_err();
        assert!(matches!(err, ScanError::Parse { line: 3, .. }));
    }

    #[test]
    fn blank_latency_is_malformed() {
        let text = "h\n1.1.1.1:2408,0%,   \n";
        assert!(matches!(parse_results(text), Err(ScanError::Parse { line: 2, .. })));
    }

    #[tokio::test]
    async fn missing_candidate_list_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProbeRunner::new(ToolCommand::new("/bin/true"), dir.path());
        let err = runner.probe(&dir.path().join("ip.txt"), 10).await.unwrap_err();
        assert!(matches!(err, ScanError::ExternalTool { .. }));
    }
}
