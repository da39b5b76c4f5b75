//! Best-effort lookups for the network interface type and the ISP name.
//!
//! Both lookups swallow their own failures: a result is still recorded, with
//! the corresponding field set to `Unknown`.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::models::{InterfaceType, UNKNOWN};

/// Detects whether the default route uses WiFi or Ethernet. Never fails.
#[async_trait]
pub trait InterfaceDetector: Send + Sync {
    async fn detect_interface_type(&self) -> InterfaceType;
}

/// Looks up the ISP name. Returns `"Unknown"` on any failure.
#[async_trait]
pub trait IspLookup: Send + Sync {
    async fn lookup_isp(&self) -> String;
}

/// Detector using the platform's routing tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaceDetector;

impl SystemInterfaceDetector {
    /// Overall bound on one detection, including every command it spawns.
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    async fn detect(&self) -> Result<InterfaceType, LookupError> {
        if cfg!(target_os = "linux") {
            let routes = run("ip", &["route", "show", "default"]).await?;
            let name = default_route_device(&routes).ok_or(LookupError::Empty)?;
            let wireless = Path::new("/sys/class/net").join(&name).join("wireless");
            if tokio::fs::try_exists(&wireless).await.unwrap_or(false) {
                return Ok(InterfaceType::WiFi);
            }
            Ok(classify_interface_name(&name))
        } else if cfg!(target_os = "macos") {
            let route = run("route", &["-n", "get", "default"]).await?;
            let name = route
                .lines()
                .find_map(|line| line.trim().strip_prefix("interface:"))
                .map(|name| name.trim().to_string())
                .ok_or(LookupError::Empty)?;
            match run("networksetup", &["-getairportnetwork", &name]).await {
                Ok(out) if !out.contains("not a Wi-Fi interface") => Ok(InterfaceType::WiFi),
                _ => Ok(classify_interface_name(&name)),
            }
        } else if cfg!(target_os = "windows") {
            let table = run("netsh", &["interface", "show", "interface"]).await?;
            Ok(classify_netsh_table(&table))
        } else {
            Ok(InterfaceType::Unknown)
        }
    }
}

#[async_trait]
impl InterfaceDetector for SystemInterfaceDetector {
    async fn detect_interface_type(&self) -> InterfaceType {
        match tokio::time::timeout(Self::TIMEOUT, self.detect()).await {
            Ok(Ok(kind)) => kind,
            Ok(Err(e)) => {
                warn!(error = %e, "network interface detection failed");
                InterfaceType::Unknown
            }
            Err(_) => {
                warn!("network interface detection timed out");
                InterfaceType::Unknown
            }
        }
    }
}

async fn run(program: &str, args: &[&str]) -> Result<String, LookupError> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(LookupError::Empty);
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Extracts the device name from `ip route show default` output.
pub fn default_route_device(routes: &str) -> Option<String> {
    let mut words = routes.split_whitespace();
    while let Some(word) = words.next() {
        if word == "dev" {
            return words.next().map(str::to_string);
        }
    }
    None
}

/// Guesses the link type from conventional interface names.
pub fn classify_interface_name(name: &str) -> InterfaceType {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("wl") || lower.contains("wifi") || lower == "en1" {
        InterfaceType::WiFi
    } else if lower.starts_with("eth") || lower.starts_with("en") {
        InterfaceType::Ethernet
    } else {
        InterfaceType::Unknown
    }
}

fn classify_netsh_table(table: &str) -> InterfaceType {
    for line in table.lines() {
        if !(line.contains("Connected") && line.contains("Dedicated")) {
            continue;
        }
        let lower = line.to_lowercase();
        if lower.contains("wi-fi") || lower.contains("wireless") || lower.contains("wifi") {
            return InterfaceType::WiFi;
        }
        if lower.contains("ethernet") || lower.contains("local area connection") {
            return InterfaceType::Ethernet;
        }
    }
    InterfaceType::Unknown
}

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

#[derive(Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    isp: Option<String>,
}

/// ISP lookup through ipify and ip-api.com.
#[derive(Debug, Clone)]
pub struct HttpIspLookup {
    client: reqwest::Client,
    ip_url: String,
    isp_url: String,
}

impl HttpIspLookup {
    /// Overall bound on one lookup.
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Result<Self, LookupError> {
        Self::with_endpoints("https://api.ipify.org?format=json", "http://ip-api.com/json")
    }

    /// Builds a lookup against custom endpoints. `isp_url` gets `/<ip>?fields=isp` appended.
    pub fn with_endpoints(
        ip_url: impl Into<String>,
        isp_url: impl Into<String>,
    ) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            ip_url: ip_url.into(),
            isp_url: isp_url.into(),
        })
    }

    async fn lookup(&self) -> Result<String, LookupError> {
        let ip = self
            .client
            .get(&self.ip_url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpifyResponse>()
            .await?
            .ip;
        if ip.is_empty() {
            return Err(LookupError::Empty);
        }

        let url = format!("{}/{}?fields=isp", self.isp_url.trim_end_matches('/'), ip);
        let isp = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpApiResponse>()
            .await?
            .isp
            .filter(|isp| !isp.trim().is_empty())
            .ok_or(LookupError::Empty)?;

        debug!(isp = %isp, "ISP lookup succeeded");
        Ok(isp)
    }
}

#[async_trait]
impl IspLookup for HttpIspLookup {
    async fn lookup_isp(&self) -> String {
        match tokio::time::timeout(Self::TIMEOUT, self.lookup()).await {
            Ok(Ok(isp)) => isp,
            Ok(Err(e)) => {
                warn!(error = %e, "ISP lookup failed");
                UNKNOWN.to_string()
            }
            Err(_) => {
                warn!("ISP lookup timed out");
                UNKNOWN.to_string()
            }
        }
    }
}
