//! SSH Gateway (C7, spec.md §4.7): accepts Git-over-SSH sessions, resolves
//! the repository from the exec command, consults the Authorization Gate
//! (C3), and wires a spawned `git-upload-pack`/`git-receive-pack` process's
//! stdio through the SSH channel — the same `Command::new("git")` +
//! `Stdio::piped()` + concurrent `copy`/`wait` pattern the Git Workspace
//! (C2) and the `radicle-link` example use for the same problem.

pub mod command;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use russh::server::{Handler, Msg, Session};
use russh::{Channel, ChannelId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::authz::{Gate, OrganizationDirectory};
use crate::db::MetadataStore;
use crate::errors::RegistryError;
use crate::git::Workspace;
use crate::queue::trigger;

pub use command::{GitVerb, ParsedCommand, parse_git_command};

/// The out-of-scope authentication interceptor's SSH-side analogue (spec.md
/// §1 treats "authenticates ... Git/SSH clients" as a black box): resolves an
/// offered public key to an authenticated user id, or `None` to reject.
#[async_trait]
pub trait SshIdentityResolver: Send + Sync {
    async fn resolve(&self, user: &str, public_key_blob: &[u8]) -> Option<Uuid>;
}

/// Per-channel state: the spawned git child and a sender feeding its stdin
/// from inbound SSH channel data.
struct ExecChannel {
    stdin_tx: mpsc::Sender<Vec<u8>>,
}

pub struct GatewayHandler<D: OrganizationDirectory, I: SshIdentityResolver> {
    store: MetadataStore,
    workspace: Workspace,
    gate: Arc<Gate<D>>,
    identity: Arc<I>,
    caller: Option<Uuid>,
    execs: HashMap<ChannelId, ExecChannel>,
}

impl<D: OrganizationDirectory, I: SshIdentityResolver> GatewayHandler<D, I> {
    pub fn new(store: MetadataStore, workspace: Workspace, gate: Arc<Gate<D>>, identity: Arc<I>) -> Self {
        Self {
            store,
            workspace,
            gate,
            identity,
            caller: None,
            execs: HashMap::new(),
        }
    }

    async fn handle_exec(
        &mut self,
        channel_id: ChannelId,
        raw_command: &str,
        session: &mut Session,
    ) -> Result<(), RegistryError> {
        let caller = self.caller.ok_or(RegistryError::Unauthenticated)?;
        let parsed = parse_git_command(raw_command)?;

        let repo = self.store.get_repository(parsed.repository_id).await?;
        match parsed.verb {
            GitVerb::UploadPack => self.gate.require_member(repo.organization_id, caller).await?,
            GitVerb::ReceivePack => {
                self.gate
                    .require_owner_or_author(repo.organization_id, caller)
                    .await?
            }
        }

        let repo_path = self.workspace.repo_path(repo.id);
        let mut child = Command::new("git")
            .arg(parsed.verb.as_git_subcommand())
            .arg(&repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RegistryError::Io)?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(32);
        self.execs.insert(channel_id, ExecChannel { stdin_tx });

        tokio::spawn(async move {
            while let Some(chunk) = stdin_rx.recv().await {
                if stdin.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        let handle = session.handle();
        let store = self.store.clone();
        let verb = parsed.verb;
        let repo_id = repo.id;
        let repo_path_owned = repo_path.clone();

        tokio::spawn(async move {
            let mut out_buf = [0u8; 32 * 1024];
            let mut err_buf = [0u8; 4096];
            loop {
                tokio::select! {
                    n = stdout.read(&mut out_buf) => {
                        match n {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                let _ = handle.data(channel_id, out_buf[..n].to_vec().into()).await;
                            }
                        }
                    }
                    n = stderr.read(&mut err_buf) => {
                        match n {
                            Ok(0) | Err(_) => {}
                            Ok(n) => {
                                let _ = handle.extended_data(channel_id, 1, err_buf[..n].to_vec().into()).await;
                            }
                            _ => {}
                        }
                    }
                }
            }

            let status = wait_child(child).await;
            let exit_code = status.map(exit_code_of).unwrap_or(1);
            let _ = handle.exit_status_request(channel_id, exit_code).await;
            let _ = handle.eof(channel_id).await;
            let _ = handle.close(channel_id).await;

            if verb == GitVerb::ReceivePack && exit_code == 0 {
                if let Err(err) = trigger::enqueue(&store, repo_id, repo_path_owned.display().to_string()).await {
                    tracing::error!(repository_id = %repo_id, error = %err, "failed to enqueue trigger job after push");
                }
            }
        });

        Ok(())
    }
}

async fn wait_child(mut child: Child) -> std::io::Result<std::process::ExitStatus> {
    child.wait().await
}

fn exit_code_of(status: std::process::ExitStatus) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().map(|c| c as u32).unwrap_or_else(|| {
            status.signal().map(|s| 128 + s as u32).unwrap_or(1)
        })
    }
    #[cfg(not(unix))]
    {
        status.code().map(|c| c as u32).unwrap_or(1)
    }
}

#[async_trait]
impl<D: OrganizationDirectory, I: SshIdentityResolver> Handler for GatewayHandler<D, I> {
    type Error = RegistryError;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<russh::server::Auth, Self::Error> {
        let blob = public_key.to_bytes().map_err(|e| RegistryError::internal(e.to_string()))?;
        match self.identity.resolve(user, &blob).await {
            Some(user_id) => {
                self.caller = Some(user_id);
                Ok(russh::server::Auth::Accept)
            }
            None => Ok(russh::server::Auth::reject()),
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.handle_exec(channel, &command, session).await
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(exec) = self.execs.get(&channel) {
            let _ = exec.stdin_tx.send(data.to_vec()).await;
        }
        Ok(())
    }

    async fn channel_eof(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), Self::Error> {
        self.execs.remove(&channel);
        Ok(())
    }
}
