//! Serialized access to the [`WalletManager`].
//!
//! The manager is owned by a single task. Callers talk to it through a
//! [`WalletHandle`] that sends [`WalletCommand`]s over a bounded channel and
//! awaits a `oneshot` reply, so vault and session writes never interleave.
//! The same loop runs the auto-lock ticker.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Result, WalletError};
use crate::transaction::{Transaction, TxSignature};

use super::manager::{UnlockReport, WalletManager, WalletStatus};
use super::types::{ExportedWallet, MetadataPatch, WalletSummary};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const AUTO_LOCK_TICK: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<Result<T>>;
/// Passwords, keys and phrases; wiped when the command is dropped.
type Secret = Zeroizing<String>;

// ---------------------------------------------------------------------------
// WalletCommand
// ---------------------------------------------------------------------------

pub enum WalletCommand {
    Status { reply: Reply<WalletStatus> },
    SetupPassword { password: Secret, reply: Reply<()> },
    SkipPassword { reply: Reply<()> },
    /// `deadline` defaults to the configured unlock timeout.
    Unlock { password: Secret, deadline: Option<Duration>, reply: Reply<UnlockReport> },
    Lock { reply: Reply<()> },
    RestoreQuarantined { reply: Reply<usize> },
    ChangePassword { old: Secret, new: Secret, reply: Reply<()> },
    Create { name: String, password: Secret, set_active: bool, reply: Reply<WalletSummary> },
    Import {
        name: String,
        private_key_b64: Secret,
        address: Option<String>,
        password: Secret,
        set_active: bool,
        reply: Reply<WalletSummary>,
    },
    ImportMnemonic {
        name: String,
        phrase: Secret,
        password: Secret,
        set_active: bool,
        reply: Reply<WalletSummary>,
    },
    SetActive { id: String, reply: Reply<()> },
    Rename { id: String, name: String, password: Secret, reply: Reply<WalletSummary> },
    UpdateMetadata { id: String, patch: MetadataPatch, reply: Reply<WalletSummary> },
    Delete { id: String, password: Secret, reply: Reply<()> },
    List { reply: Reply<Vec<WalletSummary>> },
    Export { id: String, reply: Reply<ExportedWallet> },
    Sign { tx: Box<Transaction>, reply: Reply<TxSignature> },
    SetAutoLock { secs: u64, reply: Reply<()> },
    Touch,
    Shutdown,
}

impl WalletCommand {
    /// Commands that count as user activity.
    fn is_activity(&self) -> bool {
        !matches!(
            self,
            Self::Status { .. } | Self::Lock { .. } | Self::RestoreQuarantined { .. } | Self::Shutdown
        )
    }
}

// Manual Debug: passwords and keys stay out of logs.
impl std::fmt::Debug for WalletCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { .. } => f.write_str("Status"),
            Self::SetupPassword { .. } => f.write_str("SetupPassword"),
            Self::SkipPassword { .. } => f.write_str("SkipPassword"),
            Self::Unlock { deadline, .. } => f
                .debug_struct("Unlock")
                .field("deadline", deadline)
                .finish_non_exhaustive(),
            Self::Lock { .. } => f.write_str("Lock"),
            Self::RestoreQuarantined { .. } => f.write_str("RestoreQuarantined"),
            Self::ChangePassword { .. } => f.write_str("ChangePassword"),
            Self::Create { name, set_active, .. } => f
                .debug_struct("Create")
                .field("name", name)
                .field("set_active", set_active)
                .finish_non_exhaustive(),
            Self::Import { name, address, .. } => f
                .debug_struct("Import")
                .field("name", name)
                .field("address", address)
                .finish_non_exhaustive(),
            Self::ImportMnemonic { name, .. } => f
                .debug_struct("ImportMnemonic")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::SetActive { id, .. } => f.debug_struct("SetActive").field("id", id).finish_non_exhaustive(),
            Self::Rename { id, name, .. } => f
                .debug_struct("Rename")
                .field("id", id)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::UpdateMetadata { id, .. } => f
                .debug_struct("UpdateMetadata")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::Delete { id, .. } => f.debug_struct("Delete").field("id", id).finish_non_exhaustive(),
            Self::List { .. } => f.write_str("List"),
            Self::Export { id, .. } => f.debug_struct("Export").field("id", id).finish_non_exhaustive(),
            Self::Sign { tx, .. } => f
                .debug_struct("Sign")
                .field("from", &tx.from)
                .field("nonce", &tx.nonce)
                .finish_non_exhaustive(),
            Self::SetAutoLock { secs, .. } => f.debug_struct("SetAutoLock").field("secs", secs).finish_non_exhaustive(),
            Self::Touch => f.write_str("Touch"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Service loop
// ---------------------------------------------------------------------------

pub struct WalletService;

impl WalletService {
    /// Move `manager` into its own task and return the handle that drives it.
    pub fn spawn(manager: WalletManager) -> (WalletHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_service(manager, rx));
        (WalletHandle { tx }, task)
    }
}

async fn run_service(mut manager: WalletManager, mut rx: mpsc::Receiver<WalletCommand>) {
    info!("wallet service started");
    let mut auto_lock_tick = tokio::time::interval(AUTO_LOCK_TICK);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                debug!(?cmd, "wallet command");
                if matches!(cmd, WalletCommand::Shutdown) {
                    break;
                }
                // an idle session must lock before the command can count as activity
                if let Err(e) = manager.check_auto_lock().await {
                    warn!(error = %e, "auto-lock failed");
                }
                if cmd.is_activity() && manager.is_unlocked() {
                    if let Err(e) = manager.touch().await {
                        warn!(error = %e, "activity update failed");
                    }
                }
                handle_command(&mut manager, cmd).await;
            }
            _ = auto_lock_tick.tick() => {
                match manager.check_auto_lock().await {
                    Ok(true) => info!("wallet auto-locked"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "auto-lock failed"),
                }
            }
        }
    }

    if manager.is_unlocked() {
        if let Err(e) = manager.lock().await {
            warn!(error = %e, "lock on shutdown failed");
        }
    }
    info!("wallet service stopped");
}

async fn handle_command(m: &mut WalletManager, cmd: WalletCommand) {
    // a dropped receiver means the caller went away; nothing to do
    match cmd {
        WalletCommand::Status { reply } => {
            let _ = reply.send(m.status().await);
        }
        WalletCommand::SetupPassword { password, reply } => {
            let _ = reply.send(m.setup_password(&password).await);
        }
        WalletCommand::SkipPassword { reply } => {
            let _ = reply.send(m.skip_password().await);
        }
        WalletCommand::Unlock { password, deadline, reply } => {
            let result = match deadline {
                Some(deadline) => m.unlock_within(&password, deadline).await,
                None => m.unlock(&password).await,
            };
            let _ = reply.send(result);
        }
        WalletCommand::Lock { reply } => {
            let _ = reply.send(m.lock().await);
        }
        WalletCommand::RestoreQuarantined { reply } => {
            let _ = reply.send(m.restore_quarantined().await);
        }
        WalletCommand::ChangePassword { old, new, reply } => {
            let _ = reply.send(m.change_password(&old, &new).await);
        }
        WalletCommand::Create { name, password, set_active, reply } => {
            let _ = reply.send(m.create(&name, &password, set_active).await);
        }
        WalletCommand::Import { name, private_key_b64, address, password, set_active, reply } => {
            let result = m
                .import(&name, &private_key_b64, address.as_deref(), &password, set_active)
                .await;
            let _ = reply.send(result);
        }
        WalletCommand::ImportMnemonic { name, phrase, password, set_active, reply } => {
            let _ = reply.send(m.import_mnemonic(&name, &phrase, &password, set_active).await);
        }
        WalletCommand::SetActive { id, reply } => {
            let _ = reply.send(m.set_active(&id).await);
        }
        WalletCommand::Rename { id, name, password, reply } => {
            let _ = reply.send(m.rename(&id, &name, &password).await);
        }
        WalletCommand::UpdateMetadata { id, patch, reply } => {
            let _ = reply.send(m.update_metadata(&id, patch).await);
        }
        WalletCommand::Delete { id, password, reply } => {
            let _ = reply.send(m.delete(&id, &password).await);
        }
        WalletCommand::List { reply } => {
            let result = if m.is_unlocked() {
                Ok(m.list())
            } else {
                Err(WalletError::Locked)
            };
            let _ = reply.send(result);
        }
        WalletCommand::Export { id, reply } => {
            let _ = reply.send(m.export_portable(&id));
        }
        WalletCommand::Sign { tx, reply } => {
            let _ = reply.send(m.sign_with_active(&tx).await);
        }
        WalletCommand::SetAutoLock { secs, reply } => {
            let _ = reply.send(m.set_auto_lock_duration(secs).await);
        }
        WalletCommand::Touch | WalletCommand::Shutdown => {}
    }
}

// ---------------------------------------------------------------------------
// WalletHandle
// ---------------------------------------------------------------------------

fn secret(s: &str) -> Secret {
    Zeroizing::new(s.to_string())
}

/// Cloneable front end of a running [`WalletService`].
#[derive(Clone, Debug)]
pub struct WalletHandle {
    tx: mpsc::Sender<WalletCommand>,
}

impl WalletHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> WalletCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| WalletError::Cancelled)?;
        rx.await.map_err(|_| WalletError::Cancelled)?
    }

    pub async fn status(&self) -> Result<WalletStatus> {
        self.request(|reply| WalletCommand::Status { reply }).await
    }

    pub async fn setup_password(&self, password: &str) -> Result<()> {
        let password = secret(password);
        self.request(|reply| WalletCommand::SetupPassword { password, reply }).await
    }

    pub async fn skip_password(&self) -> Result<()> {
        self.request(|reply| WalletCommand::SkipPassword { reply }).await
    }

    pub async fn unlock(&self, password: &str) -> Result<UnlockReport> {
        let password = secret(password);
        self.request(|reply| WalletCommand::Unlock { password, deadline: None, reply })
            .await
    }

    pub async fn unlock_within(&self, password: &str, deadline: Duration) -> Result<UnlockReport> {
        let password = secret(password);
        self.request(|reply| WalletCommand::Unlock {
            password,
            deadline: Some(deadline),
            reply,
        })
        .await
    }

    pub async fn lock(&self) -> Result<()> {
        self.request(|reply| WalletCommand::Lock { reply }).await
    }

    pub async fn restore_quarantined(&self) -> Result<usize> {
        self.request(|reply| WalletCommand::RestoreQuarantined { reply }).await
    }

    pub async fn change_password(&self, old: &str, new: &str) -> Result<()> {
        let (old, new) = (secret(old), secret(new));
        self.request(|reply| WalletCommand::ChangePassword { old, new, reply }).await
    }

    pub async fn create(&self, name: &str, password: &str, set_active: bool) -> Result<WalletSummary> {
        let (name, password) = (name.to_string(), secret(password));
        self.request(|reply| WalletCommand::Create { name, password, set_active, reply })
            .await
    }

    pub async fn import(
        &self,
        name: &str,
        private_key_b64: &str,
        address: Option<&str>,
        password: &str,
        set_active: bool,
    ) -> Result<WalletSummary> {
        let name = name.to_string();
        let private_key_b64 = secret(private_key_b64);
        let address = address.map(str::to_string);
        let password = secret(password);
        self.request(|reply| WalletCommand::Import {
            name,
            private_key_b64,
            address,
            password,
            set_active,
            reply,
        })
        .await
    }

    pub async fn import_mnemonic(
        &self,
        name: &str,
        phrase: &str,
        password: &str,
        set_active: bool,
    ) -> Result<WalletSummary> {
        let (name, phrase, password) = (name.to_string(), secret(phrase), secret(password));
        self.request(|reply| WalletCommand::ImportMnemonic {
            name,
            phrase,
            password,
            set_active,
            reply,
        })
        .await
    }

    pub async fn set_active(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.request(|reply| WalletCommand::SetActive { id, reply }).await
    }

    pub async fn rename(&self, id: &str, name: &str, password: &str) -> Result<WalletSummary> {
        let (id, name, password) = (id.to_string(), name.to_string(), secret(password));
        self.request(|reply| WalletCommand::Rename { id, name, password, reply }).await
    }

    pub async fn update_metadata(&self, id: &str, patch: MetadataPatch) -> Result<WalletSummary> {
        let id = id.to_string();
        self.request(|reply| WalletCommand::UpdateMetadata { id, patch, reply }).await
    }

    pub async fn delete(&self, id: &str, password: &str) -> Result<()> {
        let (id, password) = (id.to_string(), secret(password));
        self.request(|reply| WalletCommand::Delete { id, password, reply }).await
    }

    pub async fn list(&self) -> Result<Vec<WalletSummary>> {
        self.request(|reply| WalletCommand::List { reply }).await
    }

    pub async fn export(&self, id: &str) -> Result<ExportedWallet> {
        let id = id.to_string();
        self.request(|reply| WalletCommand::Export { id, reply }).await
    }

    pub async fn sign(&self, tx: Transaction) -> Result<TxSignature> {
        let tx = Box::new(tx);
        self.request(|reply| WalletCommand::Sign { tx, reply }).await
    }

    pub async fn set_auto_lock_duration(&self, secs: u64) -> Result<()> {
        self.request(|reply| WalletCommand::SetAutoLock { secs, reply }).await
    }

    /// Record user activity without any other effect.
    pub async fn touch(&self) -> Result<()> {
        self.tx
            .send(WalletCommand::Touch)
            .await
            .map_err(|_| WalletError::Cancelled)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(WalletCommand::Shutdown)
            .await
            .map_err(|_| WalletError::Cancelled)
    }
}
