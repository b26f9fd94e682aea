//! `telium` command line: talk to a payment terminal from a shell.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use telium_manager::ecr::packet::TransactionType;
use telium_manager::ecr::{Amount, Ask, PaymentOptions, SendOutcome, Terminal};
use telium_manager::logging::{self, LogOptions};
use telium_manager::{Iso4217, TeliumError, TerminalConfig};
use tracing::{info, warn};

/// Drive an Ingenico Telium terminal over Protocol E.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_SHA"), ")"),
    about,
    long_about = None
)]
struct Cli {
    /// JSON file with terminal settings (camelCase keys).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device, overrides the config file.
    #[arg(long, global = true)]
    device: Option<String>,

    /// Log each frame as a hexdump.
    #[arg(long, global = true)]
    trace_frames: bool,

    /// Console logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also write daily log files to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the terminal answers ENQ.
    Probe,
    /// Request a payment and wait for its result.
    Pay(PayArgs),
}

#[derive(Debug, Args)]
struct PayArgs {
    /// Amount such as 12.50.
    #[arg(long)]
    amount: Amount,

    /// Alphabetic or numeric ISO 4217 code.
    #[arg(long, default_value = "EUR")]
    currency: String,

    /// debit, credit, refund or auto.
    #[arg(long = "type", default_value = "debit")]
    transaction_type: TransactionType,

    /// Checkout id, 1 to 99.
    #[arg(long, default_value_t = 1)]
    pos: u32,

    /// Ask for an answer without the card report.
    #[arg(long)]
    limited: bool,

    /// Have the terminal answer immediately instead of after the transaction.
    #[arg(long)]
    instant: bool,

    /// Force online authorization with the bank.
    #[arg(long)]
    force_verification: bool,

    /// Return once the terminal accepts the ask.
    #[arg(long)]
    no_wait: bool,
}

fn load_config(cli: &Cli) -> Result<TerminalConfig> {
    let mut config = match &cli.config {
        Some(path) => TerminalConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TerminalConfig::default(),
    };
    if let Some(device) = &cli.device {
        config.path = device.clone();
    }
    config.trace_frames |= cli.trace_frames;
    Ok(config)
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn probe(config: &TerminalConfig) -> Result<()> {
    let mut terminal = Terminal::open(config)
        .with_context(|| format!("failed to open terminal on {}", config.path))?;
    let ready = terminal.is_ok()?;
    terminal.close()?;
    print_json(json!({ "device": config.path, "ready": ready }))?;
    if !ready {
        bail!("terminal on {} did not acknowledge", config.path);
    }
    Ok(())
}

fn pay(config: &TerminalConfig, args: &PayArgs) -> Result<()> {
    let options = PaymentOptions {
        pos_number: args.pos,
        wait_for_transaction_end: !args.instant,
        collect_payment_source_info: !args.limited,
        force_bank_verification: args.force_verification,
        ..Default::default()
    };
    let ask = Ask::new_payment(
        args.amount,
        args.transaction_type,
        &args.currency,
        &Iso4217,
        options,
    )?;

    let mut terminal = Terminal::open(config)
        .with_context(|| format!("failed to open terminal on {}", config.path))?;

    if terminal.ask(&ask)? == SendOutcome::Rejected {
        print_json(json!({ "outcome": SendOutcome::Rejected }))?;
        bail!("terminal refused the payment request");
    }
    if args.no_wait {
        terminal.close()?;
        return print_json(json!({ "outcome": SendOutcome::Accepted, "ask": ask }));
    }

    info!(
        "Waiting up to {} s for the terminal",
        config.answer_wait_ms / 1000
    );
    let answer = match terminal.verify(&ask) {
        Ok(answer) => answer,
        Err(TeliumError::MissingTerminator(response)) => {
            warn!("Terminal did not close the conversation; keeping its answer");
            Some(*response)
        }
        Err(e) => return Err(e.into()),
    };
    terminal.close()?;

    match answer {
        Some(response) => {
            let succeeded = response.has_succeeded();
            print_json(json!({
                "outcome": response.outcome(),
                "succeeded": succeeded,
                "transactionId": response.transaction_id(),
                "response": response,
            }))?;
            if !succeeded {
                bail!("payment was not successful");
            }
            Ok(())
        }
        None => {
            print_json(json!({ "outcome": "no_answer" }))?;
            bail!("no answer from terminal within the wait window")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&LogOptions {
        json: cli.json_logs,
        log_dir: cli.log_dir.clone(),
    })?;

    let config = load_config(&cli)?;
    match &cli.command {
        Command::Probe => probe(&config),
        Command::Pay(args) => pay(&config, args),
    }
}
