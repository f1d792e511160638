use std::io::BufRead;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tally_ledger::{BootstrapOutcome, LedgerService, WipeOutcome};
use tally_server::TallyServer;
use tally_types::{AccountSummary, TransferReceipt};

use crate::cli::*;
use crate::config::TallyConfig;

pub fn run_command(cli: Cli, config: TallyConfig) -> anyhow::Result<()> {
    let format = cli.format;
    let ledger = open_ledger(&config)?;
    let seeded = ledger.bootstrap().ensure_admin_seeded()?;
    report_generated_credential(&seeded);

    let result = match cli.command {
        Command::Bootstrap => cmd_bootstrap(format, &seeded),
        Command::Serve(args) => cmd_serve(args, &config, ledger.clone()),
        Command::Signup(args) => cmd_signup(format, &ledger, args),
        Command::Login(args) => cmd_login(format, &ledger, args),
        Command::Show(args) => cmd_show(format, &ledger, args),
        Command::Transfer(args) => cmd_transfer(format, &ledger, args),
        Command::Passwd(args) => cmd_passwd(&ledger, args),
        Command::Admin(args) => cmd_admin(format, &ledger, args),
    };
    ledger.store().flush().context("flushing store")?;
    result
}

fn open_ledger(config: &TallyConfig) -> anyhow::Result<LedgerService> {
    let store = config.storage.open()?;
    Ok(LedgerService::new(store, config.ledger.clone())?)
}

/// A generated admin credential exists nowhere else; always surface it.
fn report_generated_credential(outcome: &BootstrapOutcome) {
    if let BootstrapOutcome::Seeded {
        username,
        generated_credential: Some(credential),
    } = outcome
    {
        eprintln!(
            "{} seeded admin {} with generated credential {}",
            "!".yellow().bold(),
            username.as_str().bold(),
            credential.yellow()
        );
        eprintln!("  change it with `tally passwd {username}`");
    }
}

/// Use `given`, or read one line from stdin.
fn secret(given: Option<String>, prompt: &str) -> anyhow::Result<String> {
    if let Some(s) = given {
        return Ok(s);
    }
    eprint!("{prompt}: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading credential from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_account(account: &AccountSummary) {
    let role = if account.is_admin {
        "admin".red().bold()
    } else {
        "user".normal()
    };
    println!("{} ({})", account.username.as_str().bold(), role);
    println!("  Balance: {}", account.balance);
    println!("  Tokens:  {}", account.tokens.to_string().cyan());
    println!("  Since:   {}", account.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if account.must_rotate_credential {
        println!("  {}", "credential must be changed".yellow());
    }
}

fn cmd_bootstrap(format: OutputFormat, outcome: &BootstrapOutcome) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(outcome);
    }
    match outcome {
        BootstrapOutcome::AlreadySeeded { username } => {
            println!("{} admin {} already present", "✓".green(), username.as_str().bold())
        }
        BootstrapOutcome::Seeded { username, .. } => {
            println!("{} seeded admin {}", "✓".green().bold(), username.as_str().bold())
        }
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs, config: &TallyConfig, ledger: LedgerService) -> anyhow::Result<()> {
    let mut server_config = config.server.clone();
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    println!("Tally server on {}", server_config.bind_addr.to_string().bold());
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(async move {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!("shutdown requested");
        };
        TallyServer::new(server_config, ledger).serve_until(shutdown).await
    })?;
    Ok(())
}

fn cmd_signup(format: OutputFormat, ledger: &LedgerService, args: SignupArgs) -> anyhow::Result<()> {
    let credential = secret(args.credential, "credential")?;
    let account = ledger.create_account(&args.username, &credential)?;
    if format == OutputFormat::Json {
        return print_json(&account);
    }
    println!("{} created {}", "✓".green().bold(), account.username.as_str().bold());
    Ok(())
}

fn cmd_login(format: OutputFormat, ledger: &LedgerService, args: SignupArgs) -> anyhow::Result<()> {
    let credential = secret(args.credential, "credential")?;
    let account = ledger.authenticate(&args.username, &credential)?.summary();
    if format == OutputFormat::Json {
        return print_json(&account);
    }
    println!("{} logged in", "✓".green().bold());
    print_account(&account);
    Ok(())
}

fn cmd_show(format: OutputFormat, ledger: &LedgerService, args: ShowArgs) -> anyhow::Result<()> {
    let account = ledger.get_account(&args.username)?;
    if format == OutputFormat::Json {
        return print_json(&account);
    }
    print_account(&account);
    Ok(())
}

fn cmd_transfer(format: OutputFormat, ledger: &LedgerService, args: TransferArgs) -> anyhow::Result<()> {
    let credential = secret(args.auth.credential, "credential")?;
    let caller = ledger.authenticate(&args.auth.username, &credential)?;
    let receipt = ledger.transfer(caller.username.as_str(), &args.to, args.amount)?;
    if format == OutputFormat::Json {
        return print_json(&receipt);
    }
    print_receipt(&receipt);
    Ok(())
}

fn print_receipt(receipt: &TransferReceipt) {
    println!(
        "{} sent {} tokens {} → {}",
        "✓".green().bold(),
        receipt.amount.to_string().cyan(),
        receipt.from.username.as_str().bold(),
        receipt.to.username.as_str().bold()
    );
    if receipt.debited {
        println!("  {} now holds {}", receipt.from.username, receipt.from.tokens);
    }
    println!("  {} now holds {}", receipt.to.username, receipt.to.tokens);
}

fn cmd_passwd(ledger: &LedgerService, args: PasswdArgs) -> anyhow::Result<()> {
    let current = secret(args.current, "current credential")?;
    let new = secret(args.new, "new credential")?;
    ledger.change_credential(&args.username, &current, &new)?;
    println!("{} credential changed for {}", "✓".green().bold(), args.username.bold());
    Ok(())
}

fn cmd_admin(format: OutputFormat, ledger: &LedgerService, args: AdminArgs) -> anyhow::Result<()> {
    let credential = secret(args.auth.credential, "admin credential")?;
    let caller = ledger.authenticate(&args.auth.username, &credential)?;
    let caller = caller.username.as_str();
    let admin = ledger.admin();

    match args.action {
        AdminAction::List => {
            let accounts = admin.list_accounts(caller)?;
            if format == OutputFormat::Json {
                return print_json(&accounts);
            }
            for a in &accounts {
                let flag = if a.is_admin { "*".red().bold() } else { " ".normal() };
                println!("{flag} {:<24} {:>20}", a.username.as_str(), a.tokens);
            }
            println!("{} account(s)", accounts.len());
        }
        AdminAction::ResetPassword {
            target,
            new_credential,
        } => {
            let new_credential = secret(new_credential, "new credential")?;
            admin.reset_password(caller, &target, &new_credential)?;
            println!("{} credential reset for {}", "✓".green().bold(), target.bold());
        }
        AdminAction::ResetTokens { target } => {
            let account = admin.reset_tokens(caller, &target)?;
            if format == OutputFormat::Json {
                return print_json(&account);
            }
            println!("{} tokens reset for {}", "✓".green().bold(), target.bold());
        }
        AdminAction::Delete { target } => {
            let removed = admin.delete_account(caller, &target)?;
            if format == OutputFormat::Json {
                return print_json(&serde_json::json!({ "removed": removed }));
            }
            if removed {
                println!("{} deleted {}", "✓".green().bold(), target.bold());
            } else {
                println!("{} did not exist", target.bold());
            }
        }
        AdminAction::Wipe { confirm } => {
            let outcome = admin.wipe_all(caller, &confirm)?;
            if format == OutputFormat::Json {
                return print_json(&outcome);
            }
            match outcome {
                WipeOutcome::NotConfirmed => println!(
                    "{} nothing removed; pass {} to confirm",
                    "!".yellow().bold(),
                    format!("--confirm {}", tally_ledger::WIPE_CONFIRMATION).bold()
                ),
                WipeOutcome::Wiped { removed } => {
                    println!("{} wiped {removed} account(s)", "✓".red().bold());
                    println!("  the admin is re-seeded on the next command");
                }
            }
        }
    }
    Ok(())
}
