#[cfg(feature = "cli")]
use certsuck::cli::run_cli;
#[cfg(feature = "cli")]
use colored::Colorize;
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_cli() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        let code = if e.is_usage() { 1 } else { 2 };
        std::process::exit(code);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature to be enabled.");
    eprintln!("Build with: cargo build --features cli");
    std::process::exit(1);
}
