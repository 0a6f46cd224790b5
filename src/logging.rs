use tracing_subscriber::{fmt, EnvFilter};

/// Install the default subscriber for embedding callers: env-driven
/// filtering, span close events. Safe to call more than once.
pub fn init() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,salescope=info"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .try_init();
}
