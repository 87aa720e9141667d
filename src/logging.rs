use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Output goes to stderr so stdout stays
/// free for the CLI's CSV report.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is a no-op.
pub fn init(default_filter: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
