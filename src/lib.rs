pub mod cache;
pub mod deploy;
pub mod download;
pub mod platform;
pub mod product;
pub mod request;
pub mod resolve;
pub mod settings;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use zeroize::Zeroizing;

use deploy::{AuthMethod, SessionConfig};
use platform::{Arch, Os};
use product::ProductIdentity;
use request::{Dispatcher, Request, Response};
use settings::Settings;
use status::SpinnerSink;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "osi",
    version,
    about = "Offline provisioning of editor remote-server and CLI bundles"
)]
pub struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Path to the editor's product.json
    #[arg(long, global = true, default_value = "product.json")]
    pub product_json: PathBuf,

    /// Cache directory override for this invocation
    #[arg(long, global = true)]
    pub target_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download server archives for the configured OS/arch selection
    Download {
        /// Delete cached files outside the keep set after the run
        #[arg(long)]
        clean: bool,

        /// Verify published sha256 checksums of downloaded archives
        #[arg(long)]
        verify: bool,
    },
    /// Report which artifacts of the selection are cached
    Check,
    /// Delete every cached artifact of the selection
    Purge {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Provision a remote host over SSH from the local cache
    Deploy {
        /// Destination host name or address
        #[arg(long)]
        host: String,

        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,

        /// Remote user name
        #[arg(long)]
        user: String,

        /// Authenticate with this private key instead of a password prompt
        #[arg(long)]
        key: Option<PathBuf>,

        /// Prompt for the private key passphrase
        #[arg(long, requires = "key")]
        ask_passphrase: bool,
    },
    /// Inspect or change persisted settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings
    Show,
    /// Set the cache directory
    SetPath { path: PathBuf },
    /// Replace the architecture selection (x64, arm64)
    SetArch { arches: Vec<String> },
    /// Replace the operating system selection (linux, darwin, win32)
    SetOs { oses: Vec<String> },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)?;
    if let Some(dir) = &cli.target_dir {
        settings.target_path = Some(dir.clone());
    }
    // Flags widen the persisted settings for this run only.
    if let Commands::Download { clean, verify } = &cli.command {
        settings.auto_clean_files |= *clean;
        settings.verify_checksums |= *verify;
    }

    let identity = ProductIdentity::load(&cli.product_json).with_context(|| {
        format!(
            "cannot read product metadata from {}",
            cli.product_json.display()
        )
    })?;

    let mut dispatcher = Dispatcher::new(settings, settings_path, identity);

    match cli.command {
        Commands::Download { .. } => run_download(&mut dispatcher),
        Commands::Check => run_check(&mut dispatcher),
        Commands::Purge { yes } => run_purge(&mut dispatcher, yes),
        Commands::Deploy {
            host,
            port,
            user,
            key,
            ask_passphrase,
        } => run_deploy(&mut dispatcher, host, port, user, key, ask_passphrase),
        Commands::Config { command } => run_config(&mut dispatcher, command),
    }
}

fn run_download(dispatcher: &mut Dispatcher) -> Result<()> {
    let sink = SpinnerSink::new();
    let response = dispatcher.handle(Request::Download, &sink)?;
    let Response::Download(report) = response else {
        unreachable!("download request yields a download response");
    };
    sink.finish(&format!(
        "{} downloaded, {} already cached, {} cleaned",
        report.fetched.len(),
        report.skipped.len(),
        report.cleaned.len()
    ));

    if !report.all_succeeded() {
        for failure in &report.failures {
            eprintln!("failed: {}: {}", failure.file_name, failure.error);
        }
        bail!("{} of {} artifacts failed to download",
            report.failures.len(),
            report.failures.len() + report.fetched.len() + report.skipped.len(),
        );
    }
    Ok(())
}

fn run_check(dispatcher: &mut Dispatcher) -> Result<()> {
    // With auto-update on, a check first brings the cache up to date.
    if dispatcher.settings().auto_update_server_file {
        let sink = SpinnerSink::new();
        if let Response::Download(report) = dispatcher.handle(Request::Download, &sink)? {
            sink.finish(&format!(
                "{} downloaded, {} already cached",
                report.fetched.len(),
                report.skipped.len()
            ));
        }
    }

    let Response::Check(report) = dispatcher.handle(Request::Check, &status::LogSink)? else {
        unreachable!("check request yields a check response");
    };
    for name in &report.existing {
        println!("cached   {name}");
    }
    for name in &report.missing {
        println!("missing  {name}");
    }
    println!(
        "{}/{} artifacts cached",
        report.existing.len(),
        report.total()
    );
    Ok(())
}

fn run_purge(dispatcher: &mut Dispatcher, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Delete all downloaded server files?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("aborted");
            return Ok(());
        }
    }

    let Response::Deleted(count) = dispatcher.handle(Request::DeleteFiles, &status::LogSink)?
    else {
        unreachable!("delete request yields a deleted response");
    };
    println!("deleted {count} file(s)");
    Ok(())
}

fn run_deploy(
    dispatcher: &mut Dispatcher,
    host: String,
    port: u16,
    user: String,
    key: Option<PathBuf>,
    ask_passphrase: bool,
) -> Result<()> {
    let auth = match key {
        Some(path) => {
            let passphrase = if ask_passphrase {
                let raw = dialoguer::Password::new()
                    .with_prompt(format!("Passphrase for {}", path.display()))
                    .allow_empty_password(true)
                    .interact()?;
                Some(Zeroizing::new(raw))
            } else {
                None
            };
            AuthMethod::PrivateKey { path, passphrase }
        }
        None => {
            let raw = dialoguer::Password::new()
                .with_prompt(format!("Password for {user}@{host}"))
                .interact()?;
            AuthMethod::Password(Zeroizing::new(raw))
        }
    };

    let config = SessionConfig {
        host,
        port,
        username: user,
        auth,
    };

    let sink = SpinnerSink::new();
    let Response::Deployed(outcome) = dispatcher.handle(Request::Deploy(config), &sink)? else {
        unreachable!("deploy request yields a deployed response");
    };
    sink.finish(&format!(
        "installed {}-{} under {}",
        outcome.os, outcome.arch, outcome.layout.base_dir
    ));
    Ok(())
}

fn run_config(dispatcher: &mut Dispatcher, command: ConfigCommand) -> Result<()> {
    let sink = status::LogSink;
    let response = match command {
        ConfigCommand::Show => {
            print!("{}", toml::to_string_pretty(dispatcher.settings())?);
            return Ok(());
        }
        ConfigCommand::SetPath { path } => {
            dispatcher.handle(Request::UpdateTargetPath(path), &sink)?
        }
        ConfigCommand::SetArch { arches } => {
            let parsed = parse_all(&arches, Arch::parse, "architecture")?;
            dispatcher.handle(Request::UpdateArchitectures(parsed), &sink)?
        }
        ConfigCommand::SetOs { oses } => {
            let parsed = parse_all(&oses, Os::parse, "operating system")?;
            dispatcher.handle(Request::UpdateOperatingSystems(parsed), &sink)?
        }
    };

    if let Response::SettingsUpdated(settings) = response {
        print!("{}", toml::to_string_pretty(&settings)?);
    }
    Ok(())
}

fn parse_all<T>(values: &[String], parse: fn(&str) -> Option<T>, what: &str) -> Result<Vec<T>> {
    if values.is_empty() {
        bail!("at least one {what} is required");
    }
    values
        .iter()
        .map(|value| parse(value).with_context(|| format!("unknown {what} '{value}'")))
        .collect()
}
