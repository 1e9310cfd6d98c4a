use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `warn` when
/// `silence` is requested so that instruction output stays quiet.
pub fn init(silence: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let default_level = if silence { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Span wrapping one instruction execution
pub fn instruction_span(name: &str, uid: &str) -> Span {
    span!(Level::INFO, "instruction", name = %name, uid = %uid)
}

/// Span wrapping one migration step
pub fn migration_span(migration: &str, uid: &str) -> Span {
    span!(Level::INFO, "migration", migration = %migration, uid = %uid)
}
