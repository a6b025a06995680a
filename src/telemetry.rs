use anyhow::{Context, Result};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, Resource};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

/// Telemetry configuration structure
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub otlp_endpoint: Option<String>,
    pub enable_tracing: bool,
    pub export_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            enable_tracing: std::env::var("OTEL_TRACES_ENABLED")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(true),
            export_timeout: Duration::from_secs(30),
        }
    }
}

impl TelemetryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service_name: config.app.name.clone(),
            environment: config.app.environment.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn exporter_configured(&self) -> bool {
        self.enable_tracing && self.otlp_endpoint.is_some()
    }
}

/// Telemetry handles for graceful shutdown
pub struct TelemetryHandles {
    config: TelemetryConfig,
}

impl TelemetryHandles {
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Flushes pending spans and shuts the exporter down.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down telemetry providers...");
        if self.config.exporter_configured() {
            global::shutdown_tracer_provider();
        }
        info!("Telemetry providers shutdown completed");
        Ok(())
    }
}

/// Initialize OpenTelemetry and the tracing subscriber.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryHandles> {
    // Subscriber first so the rest of startup is logged.
    setup_tracing_subscriber()?;

    info!(
        "Initializing telemetry for service: {} v{} in environment: {}",
        config.service_name, config.service_version, config.environment
    );

    if config.enable_tracing {
        let resource = create_resource(&config);
        init_tracing(&config, resource)?;
    }

    info!("Telemetry initialization completed successfully");
    Ok(TelemetryHandles { config })
}

fn create_resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ])
}

/// Initialize distributed tracing
fn init_tracing(config: &TelemetryConfig, resource: Resource) -> Result<()> {
    let Some(endpoint) = &config.otlp_endpoint else {
        info!("No OTLP endpoint configured, using console-only tracing");
        return Ok(());
    };

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(config.export_timeout),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_resource(resource)
                .with_sampler(opentelemetry_sdk::trace::Sampler::AlwaysOn),
        )
        .install_batch(runtime::Tokio)
        .context("Failed to initialize OTLP tracer")?;

    info!(%endpoint, "Distributed tracing initialized with OTLP exporter");
    Ok(())
}

fn setup_tracing_subscriber() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into());

    Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Log-backed instruments until a metrics exporter is wired in.
#[derive(Debug)]
pub struct LogMeter {
    name: &'static str,
}

pub fn get_meter(name: &'static str) -> LogMeter {
    LogMeter { name }
}

impl LogMeter {
    pub fn u64_counter(&self, name: &'static str) -> LogCounter {
        LogCounter {
            meter: self.name,
            name,
        }
    }

    pub fn f64_histogram(&self, name: &'static str) -> LogHistogram {
        LogHistogram {
            meter: self.name,
            name,
        }
    }
}

#[derive(Debug)]
pub struct LogCounter {
    meter: &'static str,
    name: &'static str,
}

impl LogCounter {
    pub fn add(&self, value: u64, attributes: &[KeyValue]) {
        tracing::debug!(
            meter = self.meter,
            counter = self.name,
            value,
            attributes = ?attributes,
            "Counter incremented"
        );
    }
}

#[derive(Debug)]
pub struct LogHistogram {
    meter: &'static str,
    name: &'static str,
}

impl LogHistogram {
    pub fn record(&self, value: f64, attributes: &[KeyValue]) {
        tracing::debug!(
            meter = self.meter,
            histogram = self.name,
            value,
            attributes = ?attributes,
            "Histogram recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_requires_endpoint_and_tracing() {
        let console = TelemetryConfig {
            otlp_endpoint: None,
            ..TelemetryConfig::default()
        };
        assert!(!console.exporter_configured());

        let exporting = TelemetryConfig {
            otlp_endpoint: Some("http://collector:4317".to_string()),
            enable_tracing: true,
            ..TelemetryConfig::default()
        };
        assert!(exporting.exporter_configured());

        let disabled = TelemetryConfig {
            enable_tracing: false,
            ..exporting
        };
        assert!(!disabled.exporter_configured());
    }
}
