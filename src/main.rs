//! Refine Core command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `refine-core config` - Print the effective configuration as JSON
//! - `refine-core version` - Print the version
//! - `refine-core help` - Show usage

use std::process::ExitCode;

use refine_core::config as refine_config;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => {
            let compact = args.get(2).map(|s| s.as_str()) == Some("--compact");
            run_config(compact)
        }
        "version" | "--version" | "-V" => {
            println!("refine-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Print the configuration loaded from `REFINE_*` variables.
fn run_config(compact: bool) -> ExitCode {
    let effective = refine_config::load().effective_config();
    let rendered = if compact {
        serde_json::to_string(&effective)
    } else {
        serde_json::to_string_pretty(&effective)
    };
    match rendered {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {}", e);
            ExitCode::from(2u8)
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "refine-core - concurrent enhancement pipeline v{}

USAGE:
    refine-core [COMMAND] [OPTIONS]

COMMANDS:
    config       Print the effective configuration as JSON
    version      Show version information
    help         Show this help message

OPTIONS:
    config --compact   Print the configuration on one line

ENVIRONMENT:
    REFINE_*     Pipeline settings (see `refine-core config`)
    RUST_LOG     Overrides REFINE_LOG_LEVEL

EXIT CODES:
    0  Success
    1  Unknown command
    2  Configuration error
",
        version
    );
}
