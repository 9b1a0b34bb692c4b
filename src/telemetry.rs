use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Build a JSON-formatting subscriber writing to `sink`.
/// `RUST_LOG` wins over `default_filter` when it is set.
pub fn get_subscriber<Sink>(default_filter: &str, sink: Sink) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(sink)
        .json();

    Registry::default().with(env_filter).with(formatting_layer)
}

/// Install `subscriber` as the global default. Fails if one is already set.
pub fn init_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber)
}

/// JSON logs on stdout, `info` unless `RUST_LOG` says otherwise
pub fn init_telemetry() -> Result<(), SetGlobalDefaultError> {
    init_subscriber(get_subscriber("info", std::io::stdout))
}
