//! Throughput measurement backed by the `speedtest-cli` binary.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::error::MeasurementError;
use crate::models::SpeedTestResponse;

/// Trait to abstract the throughput measurement transport.
///
/// Implementations must fail within a bounded time rather than hang.
#[async_trait]
pub trait ThroughputProbe: Send + Sync {
    /// Measures download throughput in megabits per second.
    async fn measure_download_mbps(&self) -> Result<f64, MeasurementError>;

    /// Name of the test server recorded on results.
    fn server_name(&self) -> String;
}

/// Real probe running `speedtest-cli --json --no-upload`.
#[derive(Debug, Clone)]
pub struct SpeedtestCliProbe {
    command: String,
    timeout: Duration,
}

impl SpeedtestCliProbe {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    async fn run_speedtest(&self) -> Result<String, MeasurementError> {
        let output = Command::new(&self.command)
            .arg("--json")
            .arg("--no-upload")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MeasurementError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(MeasurementError::CommandFailed {
                command: self.command.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for SpeedtestCliProbe {
    fn default() -> Self {
        Self::new("speedtest-cli", Duration::from_secs(120))
    }
}

#[async_trait]
impl ThroughputProbe for SpeedtestCliProbe {
    async fn measure_download_mbps(&self) -> Result<f64, MeasurementError> {
        let stdout = time::timeout(self.timeout, self.run_speedtest())
            .await
            .map_err(|_| MeasurementError::Timeout(self.timeout))??;

        let mbps = parse_download_mbps(&stdout)?;
        debug!(mbps, "speedtest-cli measurement parsed");
        Ok(mbps)
    }

    fn server_name(&self) -> String {
        "Speedtest.net".to_string()
    }
}

/// Extracts the download figure from `speedtest-cli --json` output, in Mbps.
pub fn parse_download_mbps(stdout: &str) -> Result<f64, MeasurementError> {
    let response: SpeedTestResponse = serde_json::from_str(stdout)?;
    if !response.download.is_finite() || response.download < 0.0 {
        return Err(MeasurementError::InvalidValue(response.download));
    }
    Ok(response.download / 1_000_000.0)
}
