use busygate::cli;
use busygate::telemetry::init_tracing;

fn main() {
    init_tracing(tracing::Level::INFO);

    if let Err(e) = cli::run() {
        tracing::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
