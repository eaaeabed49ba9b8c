use anyhow::Context;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::settings::TelemetrySettings;

/// Installs the global subscriber: bunyan JSON logs on stdout, filtered by `RUST_LOG`
/// (default `info`), plus span export to a Jaeger agent when enabled
pub fn init_telemetry(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let service_name = settings.service_name.clone();

    let jaeger_layer = if settings.jaeger_enabled {
        global::set_text_map_propagator(TraceContextPropagator::new());
        // Spans are exported in batch
        #[allow(deprecated)]
        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name(service_name.clone())
            .install_batch(TokioCurrentThread)
            .context("Failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new(service_name, std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(jaeger_layer)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install `tracing` subscriber")
}
