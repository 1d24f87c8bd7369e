//! Process-wide logging, optional span export and the Prometheus recorder.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "lanstream";
const OTEL_STDOUT_ENV: &str = "LANSTREAM_OTEL_STDOUT";
const DEFAULT_FILTER: &str = "info";

/// What to install. `from_env` reads `RUST_LOG` and `LANSTREAM_OTEL_STDOUT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryOptions {
    pub filter: String,
    pub otel_stdout: bool,
}

impl TelemetryOptions {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var(OTEL_STDOUT_ENV).ok(),
        )
    }

    fn from_vars(rust_log: Option<String>, otel_stdout: Option<String>) -> Self {
        Self {
            filter: rust_log
                .filter(|directives| !directives.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            otel_stdout: otel_stdout.as_deref().is_some_and(is_truthy),
        }
    }
}

/// Keeps the tracer provider alive; spans are flushed when this drops.
pub struct Telemetry {
    metrics_handle: PrometheusHandle,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn init() -> Result<Self> {
        Self::init_with(TelemetryOptions::from_env())
    }

    pub fn init_with(options: TelemetryOptions) -> Result<Self> {
        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus metrics recorder")?;

        let filter = EnvFilter::try_new(&options.filter).unwrap_or_else(|err| {
            eprintln!("ignoring invalid log filter {:?}: {err}", options.filter);
            EnvFilter::new(DEFAULT_FILTER)
        });
        let tracer_provider = options.otel_stdout.then(stdout_tracer_provider);
        let otel_layer = tracer_provider.as_ref().map(|provider| {
            opentelemetry::global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(otel_layer)
            .try_init()
            .context("failed to initialise tracing subscriber")?;

        if tracer_provider.is_some() {
            info!("exporting spans to stdout ({OTEL_STDOUT_ENV} is set)");
        }
        Ok(Self {
            metrics_handle,
            tracer_provider,
        })
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics_handle.clone()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let Some(provider) = self.tracer_provider.take() else {
            return;
        };
        if let Err(err) = provider.shutdown() {
            warn!(error = %err, "span exporter did not shut down cleanly");
        }
    }
}

fn stdout_tracer_provider() -> SdkTracerProvider {
    let resource = Resource::builder()
        .with_attributes([KeyValue::new("service.name", SERVICE_NAME)])
        .build();
    SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(resource)
        .build()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
