//! Key management commands for the tessera CLI
//!
//! Owner keys live in a keyring under the client home. The file backend
//! encrypts every key with a password taken from `TESSERA_KEYRING_PASSWORD`
//! or prompted for on the terminal.

use crate::cli::{AddKeyCmd, DeleteKeyCmd, KeysAction, KeysCmd, ShowKeyCmd};
use crate::config::{ClientConfig, KeyringBackend, OutputFormat};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tessera_keyring::{FileKeyring, KeyInfo, Keyring, KeyringError, MemoryKeyring};
use tessera_log::{debug, info, warn};
use thiserror::Error;

/// Environment variable holding the keyring password
pub const PASSWORD_ENV: &str = "TESSERA_KEYRING_PASSWORD";

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeysError {
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user cancelled operation")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl KeysError {
    /// Whether the failure came from what the user typed
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            KeysError::Cancelled
                | KeysError::InvalidInput(_)
                | KeysError::Keyring(
                    KeyringError::KeyNotFound(_)
                        | KeyringError::KeyExists(_)
                        | KeyringError::InvalidName(_)
                        | KeyringError::InvalidPrivateKey(_)
                )
        )
    }
}

/// Result type for key operations
pub type KeysResult<T> = Result<T, KeysError>;

/// Printable view of a keyring entry
#[derive(Debug, Serialize)]
pub struct KeyView {
    pub name: String,
    pub address: String,
    pub identity: String,
    pub pubkey: String,
}

impl From<&KeyInfo> for KeyView {
    fn from(info: &KeyInfo) -> Self {
        Self {
            name: info.name.clone(),
            address: info.address.to_string(),
            identity: info.address.identity().to_hex(),
            pubkey: hex::encode(info.pubkey.to_bytes()),
        }
    }
}

/// Open the keyring configured for `home`
pub async fn open_keyring(home: &Path, config: &ClientConfig) -> KeysResult<Box<dyn Keyring>> {
    match config.keyring_backend {
        KeyringBackend::Memory => Ok(Box::new(MemoryKeyring::new(config.network))),
        KeyringBackend::File => {
            let password = keyring_password()?;
            let dir = ClientConfig::keyring_dir(home);
            debug!(dir = %dir.display(), "Opening file keyring");
            let keyring = FileKeyring::new(&dir, password, config.network).await?;
            Ok(Box::new(keyring))
        }
    }
}

fn keyring_password() -> KeysResult<String> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Enter keyring password: ")?,
    };
    if password.is_empty() {
        return Err(KeysError::InvalidInput(
            "keyring password must not be empty".to_string(),
        ));
    }
    Ok(password)
}

/// Key management handler
pub struct KeysHandler {
    home: PathBuf,
    config: ClientConfig,
    output: OutputFormat,
}

impl KeysHandler {
    /// Create a new keys handler
    pub fn new(home: PathBuf, config: ClientConfig, output: OutputFormat) -> Self {
        Self {
            home,
            config,
            output,
        }
    }

    /// Handle keys command
    pub async fn handle_keys(&self, cmd: KeysCmd) -> KeysResult<()> {
        match cmd.action {
            KeysAction::Add(add_cmd) => self.handle_add(add_cmd).await,
            KeysAction::List => self.handle_list().await,
            KeysAction::Show(show_cmd) => self.handle_show(show_cmd).await,
            KeysAction::Delete(delete_cmd) => self.handle_delete(delete_cmd).await,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(name = %cmd.name))]
    async fn handle_add(&self, cmd: AddKeyCmd) -> KeysResult<()> {
        let mut keyring = open_keyring(&self.home, &self.config).await?;
        if self.config.keyring_backend == KeyringBackend::Memory {
            warn!("Memory keyring does not persist keys between invocations");
        }

        let info = match cmd.private_key {
            Some(private_key) => keyring.import_private_key(&cmd.name, &private_key).await?,
            None => keyring.create_key(&cmd.name).await?,
        };
        info!(address = %info.address, "Key added");

        self.print_key(&info)
    }

    async fn handle_list(&self) -> KeysResult<()> {
        let keyring = open_keyring(&self.home, &self.config).await?;
        let keys = keyring.list_keys().await?;
        let views: Vec<KeyView> = keys.iter().map(KeyView::from).collect();

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
            OutputFormat::Text if views.is_empty() => println!("No keys found."),
            OutputFormat::Text => {
                for key in &views {
                    println!("{}\t{}", key.name, key.address);
                }
            }
        }
        Ok(())
    }

    async fn handle_show(&self, cmd: ShowKeyCmd) -> KeysResult<()> {
        let keyring = open_keyring(&self.home, &self.config).await?;
        let info = keyring.get_key(&cmd.name).await?;

        if cmd.address {
            println!("{}", info.address);
            return Ok(());
        }
        self.print_key(&info)
    }

    #[tracing::instrument(skip(self, cmd), fields(name = %cmd.name))]
    async fn handle_delete(&self, cmd: DeleteKeyCmd) -> KeysResult<()> {
        let mut keyring = open_keyring(&self.home, &self.config).await?;
        keyring.get_key(&cmd.name).await?;

        if !cmd.yes && !confirm(&format!("Permanently delete key {}?", cmd.name))? {
            return Err(KeysError::Cancelled);
        }

        keyring.delete_key(&cmd.name).await?;
        info!("Key deleted");
        if self.output == OutputFormat::Text {
            println!("Deleted key {}", cmd.name);
        }
        Ok(())
    }

    fn print_key(&self, info: &KeyInfo) -> KeysResult<()> {
        let view = KeyView::from(info);
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            OutputFormat::Text => {
                println!("name:     {}", view.name);
                println!("address:  {}", view.address);
                println!("identity: {}", view.identity);
                println!("pubkey:   {}", view.pubkey);
            }
        }
        Ok(())
    }
}

/// Prompt user for confirmation on stderr
fn confirm(prompt: &str) -> KeysResult<bool> {
    eprint!("{prompt} [y/N]: ");
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
