use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally", about = "Tally: a token ledger with accounts and transfers", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file; defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = "tally.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seed the admin account if none exists
    Bootstrap,
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Create an account
    Signup(SignupArgs),
    /// Check a credential
    Login(SignupArgs),
    /// Show an account
    Show(ShowArgs),
    /// Send tokens to another account
    Transfer(TransferArgs),
    /// Change your credential
    Passwd(PasswdArgs),
    /// Privileged operations
    Admin(AdminArgs),
}

/// Identity of the caller. The credential is read from stdin when omitted.
#[derive(Args, Clone, Debug)]
pub struct AuthArgs {
    #[arg(short, long = "user")]
    pub username: String,
    #[arg(long)]
    pub credential: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides `server.bind_addr` from the configuration.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct SignupArgs {
    pub username: String,
    #[arg(long)]
    pub credential: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub username: String,
}

#[derive(Args)]
pub struct TransferArgs {
    #[command(flatten)]
    pub auth: AuthArgs,
    pub to: String,
    #[arg(allow_negative_numbers = true)]
    pub amount: i64,
}

#[derive(Args)]
pub struct PasswdArgs {
    pub username: String,
    #[arg(long)]
    pub current: Option<String>,
    #[arg(long)]
    pub new: Option<String>,
}

#[derive(Args)]
pub struct AdminArgs {
    #[command(flatten)]
    pub auth: AuthArgs,
    #[command(subcommand)]
    pub action: AdminAction,
}

#[derive(Subcommand)]
pub enum AdminAction {
    /// List every account
    List,
    /// Overwrite a user's credential
    ResetPassword {
        target: String,
        #[arg(long)]
        new_credential: Option<String>,
    },
    /// Zero a user's tokens
    ResetTokens { target: String },
    /// Delete an account
    Delete { target: String },
    /// Delete every account
    Wipe {
        #[arg(long, default_value = "")]
        confirm: String,
    },
}
