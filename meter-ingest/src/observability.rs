use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "meter_ingest=info";

/// Installs the fmt subscriber for the binaries. Logs go to stderr so
/// stdout stays free for rendered statistics.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
