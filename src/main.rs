//! Receta CLI — declarative machine recipes.

use clap::Parser;
use receta::cli::Cli;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            level
        })
        .format_timestamp(None)
        .parse_default_env()
        .init();

    if let Err(e) = receta::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
