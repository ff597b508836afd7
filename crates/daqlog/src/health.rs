// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Health gate: a cheap reachability probe run before any delivery attempt.
//!
//! Probes never fail; every error (DNS, timeout, refused, unexpected status)
//! reads as "unreachable".

use crate::config::{HealthConfig, ProbeKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Pre-flight reachability check.
pub trait HealthGate: Send + Sync {
    /// Whether the delivery network looks usable right now.
    fn is_reachable(&self) -> bool;
}

/// TCP connect probe against `host:port`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }
}

impl HealthGate for TcpProbe {
    fn is_reachable(&self) -> bool {
        let addrs = match self.target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!(probe = %self.target, "Probe resolve failed: {}", e);
                return false;
            }
        };

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(e) => tracing::debug!(%addr, "Probe connect failed: {}", e),
            }
        }
        false
    }
}

/// HTTP probe expecting a fixed status.
///
/// With the default 204 this also detects captive portals, which answer the
/// check URL with a 200 login page.
pub struct HttpProbe {
    url: String,
    expect_status: u16,
    client: Option<reqwest::blocking::Client>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, expect_status: u16, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| tracing::warn!("Failed to build probe HTTP client: {}", e))
            .ok();
        Self {
            url: url.into(),
            expect_status,
            client,
        }
    }
}

impl HealthGate for HttpProbe {
    fn is_reachable(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.get(&self.url).send() {
            Ok(resp) => resp.status().as_u16() == self.expect_status,
            Err(e) => {
                tracing::debug!(url = %self.url, "Probe request failed: {}", e);
                false
            }
        }
    }
}

/// Gate that always reports reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl HealthGate for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

/// Build the configured gate.
pub fn create_gate(config: &HealthConfig) -> Box<dyn HealthGate> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.probe {
        ProbeKind::Tcp => Box::new(TcpProbe::new(config.target.clone(), timeout)),
        ProbeKind::Http => Box::new(HttpProbe::new(
            config.target.clone(),
            config.expect_status,
            timeout,
        )),
        ProbeKind::Disabled => Box::new(AlwaysReachable),
    }
}
