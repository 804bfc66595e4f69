use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use homestead::cli::{Cli, Command, OutputFormat};
use homestead::config;
use homestead::controller::{Controller, ControllerDeps};
use homestead::driver::ControlOp;
use homestead::error::HomesteadError;
use homestead::logging;
use homestead::process::SystemRunner;
use homestead::progress::{OutputMode, ProgressSurface, SilentSurface, TerminalSurface};
use homestead::prompt::{InquirePrompter, NonInteractive, Prompter};
use homestead::settings::{FileSettingsStore, SettingsStore};
use homestead::state::StateTransition;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let output_format = resolve_output_format(cli.output);
    let mode = resolve_output_mode(output_format, cli.verbose, cli.quiet);

    // Spinners own the terminal in Normal/Quiet mode; tracing on stderr would
    // break indicatif's redraws.
    let terminal_filter = match mode {
        OutputMode::Verbose => EnvFilter::new("debug"),
        OutputMode::Normal | OutputMode::Quiet => EnvFilter::new("off"),
        OutputMode::Plain => EnvFilter::from_default_env()
            .add_directive("homestead=info".parse().expect("valid log directive")),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    // File layer: always captures homestead=debug once the data dir is known
    let (file_writer, file_handle) = logging::DeferredFileWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("homestead=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    let config = config::resolve_config(cli.config.as_deref())?;

    let logs_dir = config.logs_dir();
    if let Err(e) = file_handle.set_file(&logs_dir.join("homestead.log")) {
        tracing::debug!(error = %e, "file logging disabled");
    }

    // Logs need neither the driver nor a controller
    if let Command::Log { failed, all } = cli.command {
        return handle_log_command(&logs_dir, failed, all);
    }

    let json = output_format == OutputFormat::Json;
    let settings_store = Arc::new(FileSettingsStore::new(config.settings_path()));
    let settings = settings_store.load()?;

    let prompter: Arc<dyn Prompter> = if !json && output_format == OutputFormat::Interactive {
        Arc::new(InquirePrompter)
    } else {
        Arc::new(NonInteractive)
    };
    let surface: Arc<dyn ProgressSurface> = if json {
        Arc::new(SilentSurface)
    } else {
        Arc::new(TerminalSurface::new(mode))
    };

    let controller = Controller::new(
        config,
        ControllerDeps {
            runner: Arc::new(SystemRunner),
            prompter,
            surface,
            settings: settings_store,
        },
        settings,
    );
    tokio::spawn(log_transitions(controller.subscribe()));

    match cli.command {
        Command::Log { .. } => unreachable!(),
        Command::Status => {
            let identity = controller.detect().await?;
            controller.check_state().await?;
            let flags = controller.flags();

            if json {
                println!(
                    "{}",
                    facet_json::to_string(&StatusJson {
                        name: identity.name.clone(),
                        id: identity.id.clone(),
                        provider: identity.provider.clone(),
                        home: identity.home.display().to_string(),
                        running: flags.running(),
                        needs_provision: flags.needs_provision(),
                    })
                    .expect("JSON serialization"),
                );
            } else {
                let state = if flags.running() {
                    style("running").green()
                } else {
                    style("stopped").yellow()
                };
                println!("VM '{}': {state}", identity.name);
                println!("  ID: {}", identity.id);
                if let Some(provider) = &identity.provider {
                    println!("  Provider: {provider}");
                }
                println!("  Home: {}", identity.home.display());
                if flags.needs_provision() {
                    println!(
                        "  {}",
                        style("Configuration changed. Run `homestead provision` to apply it.").cyan()
                    );
                }
            }
        }
        Command::Up => {
            controller.start().await?;
            controller.drain().await?;
            report(json, "up", &controller);
        }
        Command::Halt => {
            if !controller.stop().await? && !json {
                println!("VM is not running.");
            }
            report(json, "halt", &controller);
        }
        Command::Provision { force } => {
            if force {
                controller.detect().await?;
                controller.control(ControlOp::Provision).await?;
            } else if !controller.provision().await? && !json {
                println!("Nothing to provision. Use --force to provision anyway.");
            }
            report(json, "provision", &controller);
        }
        Command::Reload => {
            controller.reload().await?;
            report(json, "reload", &controller);
        }
        Command::Stale => {
            controller.mark_needs_provision().await?;
            if json {
                report(json, "stale", &controller);
            } else {
                println!("VM marked as needing re-provisioning.");
            }
        }
        Command::Config => {
            let site = controller.load_site_config().await?;
            if json {
                println!(
                    "{}",
                    facet_json::to_string(site.document()).expect("JSON serialization"),
                );
            } else {
                println!("# {}", site.path().display());
                print!("{}", site.to_yaml()?);
            }
        }
        Command::Check => {
            let version = controller.check_prerequisites().await?;
            if json {
                println!(
                    "{}",
                    facet_json::to_string(&CheckJson {
                        driver: controller.config().driver.binary.clone(),
                        version,
                    })
                    .expect("JSON serialization"),
                );
            } else {
                println!("{} {version}", style("\u{2713}").green());
            }
        }
    }

    Ok(())
}

/// Mirror register changes into the log file.
async fn log_transitions(mut rx: broadcast::Receiver<StateTransition>) {
    loop {
        match rx.recv().await {
            Ok(t) if t.changed() => tracing::info!(old = %t.old, new = %t.new, "VM state changed"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("transition logger lagged, missed {n} transitions");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(json: bool, command: &str, controller: &Controller) {
    let flags = controller.flags();
    if json {
        println!(
            "{}",
            facet_json::to_string(&ControlJson {
                command: command.to_string(),
                running: flags.running(),
                needs_provision: flags.needs_provision(),
            })
            .expect("JSON serialization"),
        );
    } else {
        println!("VM is {flags}.");
    }
}

fn handle_log_command(logs_dir: &std::path::Path, failed: bool, all: bool) -> miette::Result<()> {
    if all {
        let logs = logging::list_operation_logs(logs_dir);
        if logs.is_empty() {
            println!("No operation logs found.");
        } else {
            for entry in &logs {
                let status_indicator = match entry.outcome {
                    logging::Outcome::Failed => "FAIL",
                    logging::Outcome::Ok => " OK ",
                };
                println!(
                    "[{status_indicator}] {} {} ({})",
                    entry.timestamp,
                    entry.subcommand,
                    entry.path.display()
                );
            }
        }
        return Ok(());
    }

    match logging::latest_operation_log(logs_dir, failed) {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).map_err(|e| HomesteadError::Io {
                context: format!("reading {}", path.display()),
                source: e,
            })?;
            let fname = path.file_name().and_then(|f| f.to_str()).unwrap_or("?");
            println!("--- {fname} ---");
            print!("{contents}");
        }
        None => {
            if failed {
                println!("No failed operation logs found.");
            } else {
                println!("No operation logs found. Run `homestead up` first.");
            }
        }
    }

    Ok(())
}

// ── JSON output structs ─────────────────────────────────────────────

#[derive(facet::Facet)]
struct StatusJson {
    name: String,
    id: String,
    provider: Option<String>,
    home: String,
    running: bool,
    needs_provision: bool,
}

#[derive(facet::Facet)]
struct ControlJson {
    command: String,
    running: bool,
    needs_provision: bool,
}

#[derive(facet::Facet)]
struct CheckJson {
    driver: String,
    version: String,
}

/// Resolve `Auto` to a concrete format based on terminal detection.
fn resolve_output_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
                OutputFormat::Plain
            } else {
                OutputFormat::Interactive
            }
        }
        other => other,
    }
}

fn resolve_output_mode(format: OutputFormat, verbose: bool, quiet: bool) -> OutputMode {
    match format {
        // Nothing is rendered in JSON mode; Plain keeps indicatif hidden.
        OutputFormat::Json => OutputMode::Plain,
        OutputFormat::Plain => {
            if quiet {
                OutputMode::Quiet
            } else if verbose {
                OutputMode::Verbose
            } else {
                OutputMode::Plain
            }
        }
        OutputFormat::Interactive | OutputFormat::Auto => {
            if quiet {
                OutputMode::Quiet
            } else if verbose {
                OutputMode::Verbose
            } else {
                OutputMode::Normal
            }
        }
    }
}
