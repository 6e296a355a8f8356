//! CLI framework for the tessera vault client

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tessera_log::{debug, LogFormat};
use tessera_types::ResourceRef;

use crate::config::{ClientConfig, ConfigError, OutputFormat};
use crate::keys::KeysHandler;
use crate::locks::VaultHandler;
use crate::{ClientError, Result};

impl GlobalOpts {
    /// Get the effective home directory (from CLI arg or default)
    pub fn get_home(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(ClientConfig::default_home)
    }

    /// Get the effective output format (from CLI arg or config)
    pub fn get_output(&self, config: &ClientConfig) -> OutputFormat {
        self.output.unwrap_or(config.output)
    }

    /// Get the effective log filter (from verbosity or config)
    pub fn get_log_level(&self, config: &ClientConfig) -> String {
        match self.verbose {
            0 => config.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

/// Tessera vault client CLI
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Threshold multi-signature vault coordinator")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global_opts: GlobalOpts,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global CLI options
#[derive(Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Home directory for configuration, keys and data
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose logging; repeat for trace output
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration to the home directory
    Init(InitCmd),

    /// Key management commands
    Keys(KeysCmd),

    /// Lock funds under an M-of-N owner policy
    Lock(LockCmd),

    /// List recorded locks
    Locks,

    /// Signing session commands
    Session(SessionCmd),

    /// Configuration management
    Config(ConfigCmd),

    /// Display version information
    Version,
}

/// Initialize command
#[derive(Parser, Debug)]
pub struct InitCmd {
    /// Overwrite existing configuration
    #[arg(long)]
    pub overwrite: bool,
}

/// Keys command
#[derive(Parser, Debug)]
pub struct KeysCmd {
    #[command(subcommand)]
    pub action: KeysAction,
}

/// Key management actions
#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Create a key, or import one from a hex encoded seed
    Add(AddKeyCmd),

    /// List all keys
    List,

    /// Show key details
    Show(ShowKeyCmd),

    /// Delete a key
    Delete(DeleteKeyCmd),
}

/// Add key command
#[derive(Parser, Debug)]
pub struct AddKeyCmd {
    /// Name of the key
    pub name: String,

    /// Hex encoded 32 byte ed25519 seed to import
    #[arg(long)]
    pub private_key: Option<String>,
}

/// Show key command
#[derive(Parser, Debug)]
pub struct ShowKeyCmd {
    /// Name of the key
    pub name: String,

    /// Print only the account reference
    #[arg(short, long)]
    pub address: bool,
}

/// Delete key command
#[derive(Parser, Debug)]
pub struct DeleteKeyCmd {
    /// Name of the key
    pub name: String,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Lock command
#[derive(Parser, Debug)]
pub struct LockCmd {
    /// Owner account reference or keyring key name; repeat for each owner
    #[arg(long = "owner", required = true)]
    pub owners: Vec<String>,

    /// Signatures required to release
    #[arg(long)]
    pub threshold: u32,

    /// Amount in lovelace, or ada with an `ada` suffix
    #[arg(long)]
    pub amount: String,
}

/// Session command
#[derive(Parser, Debug)]
pub struct SessionCmd {
    #[command(subcommand)]
    pub action: SessionAction,
}

/// Signing session actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start collecting signatures to release a lock
    Start(StartSessionCmd),

    /// Sign the pending release with a keyring key
    Sign(SignCmd),

    /// Show the state of an active session
    Status {
        /// Lock reference (`<tx hash>#<index>`)
        resource: ResourceRef,
    },

    /// Abandon an active session
    Abandon {
        /// Lock reference (`<tx hash>#<index>`)
        resource: ResourceRef,
    },

    /// List active sessions
    List,
}

/// Start session command
#[derive(Parser, Debug)]
pub struct StartSessionCmd {
    /// Lock reference (`<tx hash>#<index>`)
    pub resource: ResourceRef,

    /// Address receiving the released funds
    #[arg(long)]
    pub recipient: String,
}

/// Sign command
#[derive(Parser, Debug)]
pub struct SignCmd {
    /// Lock reference (`<tx hash>#<index>`)
    pub resource: ResourceRef,

    /// Keyring key to sign with
    #[arg(long)]
    pub from: String,
}

/// Config command
#[derive(Parser, Debug)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key, e.g. `network` or `storage.compression`
        key: String,

        /// New value
        value: String,
    },
}

/// CLI command handler
pub struct CliHandler {
    global_opts: GlobalOpts,
    home: PathBuf,
    config: ClientConfig,
}

impl CliHandler {
    /// Create a new CLI handler, loading the configuration under the home directory
    pub fn new(global_opts: GlobalOpts) -> Result<Self> {
        let home = global_opts.get_home();
        let config = ClientConfig::load_or_default(&home)?;
        Ok(Self {
            global_opts,
            home,
            config,
        })
    }

    fn output(&self) -> OutputFormat {
        self.global_opts.get_output(&self.config)
    }

    /// Install the global tracing subscriber
    pub fn init_logging(&self) -> Result<()> {
        let level = self.global_opts.get_log_level(&self.config);
        let format = match self.output() {
            OutputFormat::Json => LogFormat::Json,
            OutputFormat::Text => LogFormat::Text,
        };
        tessera_log::init_tracing_with_level(&level, format)
            .map_err(|e| ClientError::Logging(e.to_string()))
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<()> {
        debug!(home = %self.home.display(), "Executing command");
        match command {
            Commands::Init(cmd) => self.handle_init(cmd),
            Commands::Keys(cmd) => Ok(self.keys().handle_keys(cmd).await?),
            Commands::Lock(cmd) => self.vault()?.handle_lock(cmd).await,
            Commands::Locks => self.vault()?.handle_locks(),
            Commands::Session(cmd) => self.vault()?.handle_session(cmd).await,
            Commands::Config(cmd) => self.handle_config(cmd),
            Commands::Version => {
                println!("tessera {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }

    fn keys(&self) -> KeysHandler {
        KeysHandler::new(self.home.clone(), self.config.clone(), self.output())
    }

    fn vault(&self) -> Result<VaultHandler> {
        VaultHandler::open(&self.home, self.config.clone(), self.output())
    }

    fn handle_init(&self, cmd: InitCmd) -> Result<()> {
        ClientConfig::init(&self.home, cmd.overwrite)?;
        let path = ClientConfig::config_file(&self.home);
        match self.output() {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "config": path.display().to_string() }))
            }
            OutputFormat::Text => println!("Initialized configuration at {}", path.display()),
        }
        Ok(())
    }

    fn handle_config(&self, cmd: ConfigCmd) -> Result<()> {
        match cmd.action {
            ConfigAction::Show => match self.output() {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&self.config)?)
                }
                OutputFormat::Text => print!(
                    "{}",
                    toml::to_string_pretty(&self.config).map_err(ConfigError::from)?
                ),
            },
            ConfigAction::Set { key, value } => {
                let mut config = self.config.clone();
                config.set(&key, &value)?;
                config.save_to_file(ClientConfig::config_file(&self.home))?;
                println!("Set {key} = {value}");
            }
        }
        Ok(())
    }
}

/// Run the CLI application
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let handler = CliHandler::new(cli.global_opts)?;
    handler.init_logging()?;
    handler.execute(cli.command).await
}
