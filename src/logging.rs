//! Opt-in tracing setup for embedding applications

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Initialize a stdout tracing subscriber.
///
/// Level comes from the RUST_LOG environment variable, defaulting to "info".
/// Safe to call more than once: if the host application already installed a
/// subscriber, this is a no-op.
pub fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter),
        )
        .try_init();
}
