// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FTP sink: passive-mode binary uploads over a `suppaftp` control session.
//!
//! Uploads land in `<remote_dir>/<period>/<artifact file name>`.

use super::{ArtifactMeta, DeliveryReport, DeliverySink};
use crate::config::FtpConfig;
use std::fs::File;
use std::io;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use thiserror::Error;

/// Reply codes a server uses for "directory already exists" on MKD.
const MKD_EXISTS: [u32; 2] = [521, 550];

/// FTP errors.
#[derive(Debug, Error)]
pub enum FtpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("FTP error: {0}")]
    Protocol(#[from] suppaftp::FtpError),

    #[error("{0}")]
    Invalid(String),
}

/// Create `dir` in the current directory; an existing directory is success.
///
/// Returns `true` if the server created it.
fn ensure_remote_dir(ftp: &mut FtpStream, dir: &str) -> Result<bool, FtpError> {
    match ftp.mkdir(dir) {
        Ok(()) => Ok(true),
        Err(suppaftp::FtpError::UnexpectedResponse(resp))
            if MKD_EXISTS.contains(&resp.status.code()) =>
        {
            tracing::debug!(dir, code = resp.status.code(), "Remote directory exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Uploads artifacts to one FTP server.
pub struct FtpSink {
    config: FtpConfig,
    destination: String,
}

impl FtpSink {
    pub fn new(config: FtpConfig) -> Self {
        let destination = format!("ftp:{}{}", config.host, config.remote_dir);
        Self {
            config,
            destination,
        }
    }

    fn upload(&self, artifact: &Path, meta: &ArtifactMeta) -> Result<u64, FtpError> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FtpError::Invalid(format!("no file name in {}", artifact.display())))?;
        let mut file = File::open(artifact)?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                FtpError::Invalid(format!("{} resolved to nothing", self.config.host))
            })?;
        let mut ftp = FtpStream::connect_timeout(addr, timeout)?;
        ftp.get_ref().set_read_timeout(Some(timeout))?;
        ftp.get_ref().set_write_timeout(Some(timeout))?;
        ftp.login(&self.config.user, &self.config.password)?;
        tracing::debug!(host = %self.config.host, "FTP session established");

        ftp.cwd(&self.config.remote_dir)?;
        let period = meta.period.to_string();
        if ensure_remote_dir(&mut ftp, &period)? {
            tracing::debug!(dir = %period, "Created remote directory");
        }
        ftp.cwd(&period)?;

        ftp.transfer_type(FileType::Binary)?;
        let written = ftp.put_file(&name, &mut file)?;
        ftp.quit()?;
        Ok(written)
    }
}

impl DeliverySink for FtpSink {
    fn name(&self) -> &str {
        "ftp"
    }

    fn send(&self, artifact: &Path, meta: &ArtifactMeta) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        match self.upload(artifact, meta) {
            Ok(bytes) => {
                tracing::info!(
                    host = %self.config.host,
                    period = %meta.period,
                    bytes,
                    "Artifact uploaded over FTP"
                );
                report.record(self.destination.clone(), true);
            }
            Err(e) => {
                tracing::error!(
                    host = %self.config.host,
                    period = %meta.period,
                    "FTP upload failed: {}",
                    e
                );
                report.record(self.destination.clone(), false);
            }
        }
        report
    }
}
