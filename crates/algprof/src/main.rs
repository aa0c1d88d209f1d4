use algprof::cli::{Cli, Command};
use algprof::commands::simulate::{Output, SimulateOptions};
use algprof::error::{exit_code, exit_code_of};
use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_of(&e) as u8)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Validate CLI arguments
    cli.validate()
        .map_err(algprof::Error::InvalidArgument)
        .context("Invalid arguments")?;

    match cli.command {
        Command::Check { task } => {
            algprof::commands::check::run(&task)?;
        }
        Command::Simulate {
            task,
            name,
            service,
            events,
            cost,
            duration,
            log_level,
            json,
            output,
            save,
        } => {
            let output = match (output, save) {
                (Some(path), _) => Output::File(path),
                (None, true) => Output::Timestamped,
                (None, false) => Output::Stderr,
            };
            let opts = SimulateOptions {
                name,
                service,
                events,
                cost,
                duration,
                log_level,
                json,
                output,
            };
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                r.store(false, Ordering::SeqCst);
            })
            .map_err(algprof::Error::from)?;

            algprof::commands::simulate::run(&task, opts, &running)?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "algprof", &mut std::io::stdout());
        }
    }

    Ok(())
}
