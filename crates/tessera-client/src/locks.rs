//! Lock and signing session commands
//!
//! Every invocation opens the vault database under the client home, resumes
//! the sessions persisted by earlier invocations and writes back whatever
//! the command changed. The ledger is a local one kept in the same database.

use crate::cli::{LockCmd, SessionAction, SessionCmd, SignCmd, StartSessionCmd};
use crate::config::{ClientConfig, OutputFormat};
use crate::keys::open_keyring;
use crate::{format_ada, ClientError, Result};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_keyring::{Keyring, KeyringError};
use tessera_log::{debug, info, warn};
use tessera_store::open_storage;
use tessera_types::{KeyAddress, ResourceRef};
use tessera_vault::{
    KeyringCredentials, LedgerService, LocalLedger, LockRecord, SessionHandle, SessionStore,
    SignatureOutcome, SigningSession, Vault,
};

/// Printable view of a signing session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub resource_ref: ResourceRef,
    pub recipient: String,
    pub state: String,
    pub amount: Option<u64>,
    pub threshold: u32,
    pub collected: Vec<String>,
    pub outstanding: Vec<String>,
    pub confirmation: Option<String>,
    pub failure: Option<String>,
    pub started_at: String,
}

impl From<&SigningSession> for SessionView {
    fn from(session: &SigningSession) -> Self {
        Self {
            resource_ref: session.resource_ref(),
            recipient: session.recipient().to_string(),
            state: session.state().to_string(),
            amount: session.verified_amount(),
            threshold: session.lock().threshold,
            collected: session.collected().iter().map(|id| id.to_hex()).collect(),
            outstanding: session
                .outstanding_signers()
                .iter()
                .map(|id| id.to_hex())
                .collect(),
            confirmation: session.confirmation().map(|tx| tx.to_string()),
            failure: session.failure().map(str::to_string),
            started_at: session.started_at().to_rfc3339(),
        }
    }
}

/// Handler for lock and session commands
pub struct VaultHandler {
    home: PathBuf,
    config: ClientConfig,
    output: OutputFormat,
    vault: Vault,
    sessions: SessionStore,
}

impl VaultHandler {
    /// Open the vault database and resume persisted sessions
    pub fn open(home: &Path, config: ClientConfig, output: OutputFormat) -> Result<Self> {
        let store = open_storage(home, &config.storage)?;
        let ledger: Arc<dyn LedgerService> = Arc::new(LocalLedger::new(
            store.clone(),
            config.custody_address.clone(),
        ));
        let vault = Vault::new(
            Box::new(store.clone()),
            ledger,
            config.custody_address.clone(),
        );
        let sessions = SessionStore::new(Box::new(store));

        let handler = Self {
            home: home.to_path_buf(),
            config,
            output,
            vault,
            sessions,
        };
        handler.resume_sessions()?;
        Ok(handler)
    }

    fn resume_sessions(&self) -> Result<()> {
        for session in self.sessions.list()? {
            let resource = session.resource_ref();
            match self.vault.coordinator().resume(session) {
                Ok(_) => debug!(resource = %resource, "Resumed persisted session"),
                Err(err) => {
                    warn!(resource = %resource, error = %err, "Dropping persisted session");
                    self.sessions.remove(&resource)?;
                }
            }
        }
        Ok(())
    }

    /// Lock funds under a new policy
    #[tracing::instrument(skip(self, cmd), fields(threshold = cmd.threshold))]
    pub async fn handle_lock(&self, cmd: LockCmd) -> Result<()> {
        let amount = crate::parse_lovelace(&cmd.amount)?;
        let owners = self.owner_refs(&cmd.owners).await?;
        let record = self.vault.lock_funds(&owners, cmd.threshold, amount).await?;
        info!(resource = %record.resource_ref, "Lock recorded");

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
            OutputFormat::Text => print_lock(&record, false),
        }
        Ok(())
    }

    /// Owners may be named by account reference or by keyring entry
    async fn owner_refs(&self, owners: &[String]) -> Result<Vec<String>> {
        let keyring: Option<Box<dyn Keyring>> =
            if owners.iter().any(|owner| KeyAddress::parse(owner).is_err()) {
                Some(open_keyring(&self.home, &self.config).await?)
            } else {
                None
            };

        let mut refs = Vec::with_capacity(owners.len());
        for owner in owners {
            let keyring = match &keyring {
                Some(keyring) if KeyAddress::parse(owner).is_err() => keyring,
                _ => {
                    refs.push(owner.clone());
                    continue;
                }
            };
            match keyring.get_key(owner).await {
                Ok(info) => refs.push(info.address.to_string()),
                // Not a key name either; the vault rejects the reference
                Err(KeyringError::KeyNotFound(_) | KeyringError::InvalidName(_)) => {
                    refs.push(owner.clone())
                }
                Err(err) => return Err(crate::keys::KeysError::from(err).into()),
            }
        }
        Ok(refs)
    }

    /// List recorded locks
    pub fn handle_locks(&self) -> Result<()> {
        let locks = self.vault.list_locks()?;

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&locks)?),
            OutputFormat::Text if locks.is_empty() => println!("No locks found."),
            OutputFormat::Text => {
                for record in &locks {
                    let active = self
                        .vault
                        .coordinator()
                        .session(&record.resource_ref)
                        .is_some();
                    print_lock(record, active);
                }
            }
        }
        Ok(())
    }

    pub async fn handle_session(&self, cmd: SessionCmd) -> Result<()> {
        match cmd.action {
            SessionAction::Start(start) => self.handle_start(start).await,
            SessionAction::Sign(sign) => self.handle_sign(sign).await,
            SessionAction::Status { resource } => self.handle_status(resource).await,
            SessionAction::Abandon { resource } => self.handle_abandon(resource).await,
            SessionAction::List => self.handle_list().await,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(resource = %cmd.resource))]
    async fn handle_start(&self, cmd: StartSessionCmd) -> Result<()> {
        let handle = self
            .vault
            .start_session(&cmd.resource, &cmd.recipient)
            .await?;
        let session = handle.lock().await;
        self.sessions.save(&session)?;
        self.print_session(&session)
    }

    #[tracing::instrument(skip(self, cmd), fields(resource = %cmd.resource, from = %cmd.from))]
    async fn handle_sign(&self, cmd: SignCmd) -> Result<()> {
        let handle = self.active(&cmd.resource)?;
        let keyring = open_keyring(&self.home, &self.config).await?;
        let credentials = KeyringCredentials::new(keyring.as_ref(), cmd.from.as_str());

        let outcome = self.vault.offer_signature(&handle, &credentials).await;
        self.persist(&handle).await?;

        match outcome? {
            SignatureOutcome::Collecting {
                collected,
                threshold,
            } => match self.output {
                OutputFormat::Json => println!(
                    "{}",
                    json!({"state": "collecting", "collected": collected, "threshold": threshold})
                ),
                OutputFormat::Text => {
                    println!("Signature accepted ({collected} of {threshold} collected)")
                }
            },
            SignatureOutcome::Submitted { tx_id } => match self.output {
                OutputFormat::Json => {
                    println!("{}", json!({"state": "submitted", "tx_id": tx_id}))
                }
                OutputFormat::Text => println!("Release submitted: {tx_id}"),
            },
        }
        Ok(())
    }

    async fn handle_status(&self, resource: ResourceRef) -> Result<()> {
        let handle = self.active(&resource)?;
        let session = handle.lock().await;
        self.print_session(&session)
    }

    #[tracing::instrument(skip(self))]
    async fn handle_abandon(&self, resource: ResourceRef) -> Result<()> {
        let handle = self.active(&resource)?;
        self.vault.abandon_session(&handle).await?;
        self.sessions.remove(&resource)?;

        match self.output {
            OutputFormat::Json => println!("{}", json!({"resource_ref": resource, "state": "failed"})),
            OutputFormat::Text => println!("Session for {resource} abandoned"),
        }
        Ok(())
    }

    async fn handle_list(&self) -> Result<()> {
        let mut views = Vec::new();
        for record in self.vault.list_locks()? {
            if let Some(handle) = self.vault.coordinator().session(&record.resource_ref) {
                views.push(SessionView::from(&*handle.lock().await));
            }
        }

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
            OutputFormat::Text if views.is_empty() => println!("No active sessions."),
            OutputFormat::Text => {
                for view in &views {
                    println!(
                        "{}\t{}\t{} of {}\t{}",
                        view.resource_ref,
                        view.state,
                        view.collected.len(),
                        view.threshold,
                        view.recipient
                    );
                }
            }
        }
        Ok(())
    }

    fn active(&self, resource: &ResourceRef) -> Result<SessionHandle> {
        self.vault
            .coordinator()
            .session(resource)
            .ok_or(ClientError::NoActiveSession(*resource))
    }

    /// Write a session back, or forget it once it is closed
    async fn persist(&self, handle: &SessionHandle) -> Result<()> {
        let session = handle.lock().await;
        if session.state().is_terminal() {
            self.sessions.remove(&session.resource_ref())?;
        } else {
            self.sessions.save(&session)?;
        }
        Ok(())
    }

    fn print_session(&self, session: &SigningSession) -> Result<()> {
        let view = SessionView::from(session);
        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            OutputFormat::Text => {
                println!("resource:    {}", view.resource_ref);
                println!("recipient:   {}", view.recipient);
                println!("state:       {}", view.state);
                if let Some(amount) = view.amount {
                    println!("amount:      {}", format_ada(amount));
                }
                println!("signatures:  {} of {}", view.collected.len(), view.threshold);
                for identity in &view.outstanding {
                    println!("  waiting on {identity}");
                }
                if let Some(tx) = &view.confirmation {
                    println!("release tx:  {tx}");
                }
                if let Some(reason) = &view.failure {
                    println!("failure:     {reason}");
                }
            }
        }
        Ok(())
    }
}

fn print_lock(record: &LockRecord, active: bool) {
    println!(
        "{}\t{}-of-{}\t{}{}",
        record.resource_ref,
        record.threshold,
        record.owners.len(),
        format_ada(record.amount),
        if active { "\tsession active" } else { "" }
    );
}
