use clap::Parser;
use rotatrader::cli::{run, Cli};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "rotatrader=info".into()))
        .init();

    run(Cli::parse())
}
