// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telegram Bot API sink (`sendDocument`, `sendMessage`, `getMe`).

use super::{ArtifactMeta, DeliveryReport, DeliverySink};
use crate::config::TelegramConfig;
use reqwest::blocking::{multipart, Client, Response};
use std::path::Path;
use std::time::Duration;

/// Uploads artifacts to every configured chat.
pub struct TelegramSink {
    config: TelegramConfig,
    label: Option<String>,
    upload: Option<Client>,
    short: Option<Client>,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig, label: Option<String>) -> Self {
        let upload = build_client(&config, config.upload_timeout_secs);
        let short = build_client(&config, config.alert_timeout_secs);
        Self {
            config,
            label,
            upload,
            short,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    fn destination(chat_id: &str) -> String {
        format!("telegram:{}", chat_id)
    }

    /// Call `getMe` once and log whether the bot is usable.
    pub fn check(&self) -> bool {
        let Some(client) = &self.short else {
            return false;
        };
        match client.get(self.method_url("getMe")).send() {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Telegram bot reachable");
                true
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Telegram bot check failed");
                false
            }
            Err(e) => {
                tracing::warn!("No connection to Telegram at startup: {}", e);
                false
            }
        }
    }

    fn send_document(
        &self,
        client: &Client,
        chat_id: &str,
        artifact: &Path,
        caption: &str,
    ) -> Result<(), String> {
        // Rebuilt per chat: a multipart form owns its file handle.
        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .file("document", artifact)
            .map_err(|e| format!("cannot read {}: {}", artifact.display(), e))?;

        let resp = client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .map_err(|e| e.to_string())?;
        check_response(resp)
    }

    fn labelled(&self, text: &str) -> String {
        match &self.label {
            Some(label) => format!("[{}] {}", label, text),
            None => text.to_string(),
        }
    }
}

impl DeliverySink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send(&self, artifact: &Path, meta: &ArtifactMeta) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        let caption = meta.caption();

        for chat_id in &self.config.chat_ids {
            let result = match &self.upload {
                Some(client) => self.send_document(client, chat_id, artifact, &caption),
                None => Err("HTTP client unavailable".to_string()),
            };
            match result {
                Ok(()) => {
                    tracing::info!(chat_id = %chat_id, period = %meta.period, "Artifact sent to Telegram");
                    report.record(Self::destination(chat_id), true);
                }
                Err(e) => {
                    tracing::error!(chat_id = %chat_id, period = %meta.period, "Telegram upload failed: {}", e);
                    report.record(Self::destination(chat_id), false);
                }
            }
        }

        report
    }

    fn alert(&self, text: &str) {
        let Some(client) = &self.short else {
            return;
        };
        let text = self.labelled(text);
        for chat_id in &self.config.chat_ids {
            let sent = client
                .post(self.method_url("sendMessage"))
                .form(&[("chat_id", chat_id.as_str()), ("text", text.as_str())])
                .send();
            if let Err(e) = sent {
                tracing::debug!(chat_id = %chat_id, "Telegram alert not sent: {}", e);
            }
        }
    }
}

fn build_client(config: &TelegramConfig, timeout_secs: u64) -> Option<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| tracing::error!("Failed to build Telegram HTTP client: {}", e))
        .ok()
}

/// Map a Bot API reply to success or its error description.
fn check_response(resp: Response) -> Result<(), String> {
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if status.is_success() {
        return Ok(());
    }
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> String {
    let description = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(String::from));
    match description {
        Some(d) => format!("API error {}: {}", status, d),
        None => format!("API error {}: {}", status, body.trim()),
    }
}
