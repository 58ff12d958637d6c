use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` is honoured; `default_directive` (e.g. `grid_insight=info`) is
/// added on top so the crate's own events show without any env setup.
pub fn init_tracing(default_directive: &str) {
    let directive: Directive = default_directive
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
