//! Fire-and-forget usage events.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// A named usage event.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: Value,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, event: TelemetryEvent) -> anyhow::Result<()>;
}

/// Writes events to the log.
#[derive(Debug, Default, Clone)]
pub struct LogTelemetry;

#[async_trait]
impl TelemetrySink for LogTelemetry {
    async fn send(&self, event: TelemetryEvent) -> anyhow::Result<()> {
        info!(target: "embedchat::telemetry", event = %event.name, properties = %event.properties, "telemetry");
        Ok(())
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn send(&self, _event: TelemetryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Send `event` on a detached task. Failures are logged and otherwise ignored.
pub fn emit_detached(sink: Arc<dyn TelemetrySink>, event: TelemetryEvent) {
    tokio::spawn(async move {
        let name = event.name.clone();
        if let Err(e) = sink.send(event).await {
            warn!(event = %name, "Failed to send telemetry: {:#}", e);
        }
    });
}
