use std::process::ExitCode;

use clap::Parser;
use kvbackup::cli::{init_logging, install_panic_hook, Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    install_panic_hook();

    let result = match &cli.command {
        None | Some(Commands::Backup) => kvbackup::cli::commands::backup::execute(&cli),
        Some(Commands::Open { file }) => {
            kvbackup::cli::commands::open::execute(&cli, file).map(|()| 0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            kvbackup::cli::output::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
