//! Magnetic field control panel - console entry point
//!
//! Runs the control panel on simulated hardware and reads commands from
//! stdin. The sampler ticks on this thread; the worker runs on its own.
//! SIGINT and SIGTERM leave the loop through the same shutdown as `quit`,
//! so the coils are zeroed either way.

use anyhow::Context;
use crossbeam_channel::{bounded, select, Receiver};
use magctl_rs::{
    config::{self, AppConfig},
    console::{Console, ConsoleAction, HELP},
    logging, ControlPanel,
};
use std::io::BufRead;
use std::path::PathBuf;

/// Environment variable overriding the config file location
const CONFIG_ENV: &str = "MAGCTL_CONFIG";

fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .or_else(config::default_path);

    let config = match &config_path {
        Some(path) => AppConfig::load_or_default(path),
        None => AppConfig::default(),
    };
    config
        .validate()
        .context("Invalid configuration")?;

    let _log_guard = logging::init(&config.logging).context("Failed to set up logging")?;
    tracing::info!("Starting magnetic field control panel");
    if let Some(path) = &config_path {
        tracing::info!("Configuration: {:?}", path);
    }

    let interrupts = install_signal_handler().context("Failed to set signal handler")?;
    let mut panel = ControlPanel::with_simulated_hardware(config);
    let lines = spawn_stdin_reader();
    let ticker = panel.sampler_ticker();
    let worker_events = panel.worker_events();
    let mut console = Console::new();

    println!("Type 'help' for commands.");
    loop {
        select! {
            recv(ticker) -> at => {
                if let Ok(at) = at {
                    panel.tick_sampler(at);
                }
            }
            recv(worker_events) -> event => {
                if let Ok(event) = event {
                    panel.handle_worker_event(&event);
                }
            }
            recv(lines) -> line => {
                let Ok(line) = line else {
                    tracing::info!("Input closed");
                    break;
                };
                if !run_command(&mut panel, &mut console, &line) {
                    break;
                }
            }
            recv(interrupts) -> _ => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    panel.shutdown().context("Shutdown did not complete cleanly")?;
    Ok(())
}

/// Handle one console line; returns `false` on quit
fn run_command(panel: &mut ControlPanel, console: &mut Console, line: &str) -> bool {
    let action = match console.feed(line) {
        Ok(action) => action,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match action {
        ConsoleAction::Nothing | ConsoleAction::Buffered => {}
        ConsoleAction::Input(input) => {
            if let Err(e) = panel.handle(input) {
                println!("error: {}", e);
            }
        }
        ConsoleAction::EditStarted => println!("Enter routing text, end with '.'"),
        ConsoleAction::EditFinished(n) => println!("{} lines buffered; 'refresh' to apply", n),
        ConsoleAction::ShowStatus => println!("{}", panel.status()),
        ConsoleAction::ShowPlan => {
            let plan = panel.plan();
            if plan.is_empty() {
                println!("(empty plan)");
            } else {
                println!("{}", plan);
            }
        }
        ConsoleAction::ShowHelp => println!("{}", HELP),
        ConsoleAction::Quit => return false,
    }
    true
}

/// Route SIGINT/SIGTERM to a channel the main loop selects on
fn install_signal_handler() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        // A full slot means an interrupt is already pending
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}

/// Forward stdin lines to a channel so the main loop can select on them
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = bounded(64);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .unwrap_or_else(|e| tracing::error!("Failed to spawn stdin reader: {}", e));
    rx
}
