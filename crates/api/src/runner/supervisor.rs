//! Spawning and supervising the external sync tool.
//!
//! Two execution paths share the same argument construction and log
//! plumbing. Unattended runs block until a terminal [`RunOutcome`]: exit 0
//! is success, a detected interactive prompt kills the process and yields
//! the distinguished requires-interactive-auth outcome, and an elapsed
//! execution bound kills it with a timeout outcome. Interactive runs are
//! spawned with stdin held open, registered in the [`RunRegistry`], and
//! stream typed events to whatever session is currently attached; the
//! process is never tied to the lifetime of a connection.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use synchub_core::credentials::CredentialCipher;
use synchub_core::error::CoreError;
use synchub_core::scan::OutputScanner;
use synchub_core::types::DbId;
use synchub_db::models::profile::{Profile, ProfileAccount};
use synchub_db::models::run::RunStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::ledger::RunLedger;
use crate::runner::command::{decrypt_accounts, CommandSpec};
use crate::runner::events::{status, RunEvent, RunOutcome};
use crate::runner::registry::{RunHandle, RunRegistry};
use crate::ws::session::SessionManager;

/// Bound on the availability/version probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervises child processes of the external sync tool.
pub struct RunSupervisor {
    bin: String,
    data_dir: PathBuf,
    run_timeout: Duration,
    cipher: Arc<CredentialCipher>,
    registry: Arc<RunRegistry>,
    ledger: Arc<RunLedger>,
    sessions: Arc<SessionManager>,
}

impl RunSupervisor {
    pub fn new(
        bin: String,
        data_dir: PathBuf,
        run_timeout: Duration,
        cipher: Arc<CredentialCipher>,
        registry: Arc<RunRegistry>,
        ledger: Arc<RunLedger>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            bin,
            data_dir,
            run_timeout,
            cipher,
            registry,
            ledger,
            sessions,
        }
    }

    // -----------------------------------------------------------------------
    // Unattended execution
    // -----------------------------------------------------------------------

    /// Run the sync tool to completion without a human in the loop.
    ///
    /// Does not touch the ledger; the caller owns the run's lifecycle and
    /// maps the returned outcome onto it.
    pub async fn execute_unattended(
        &self,
        profile: &Profile,
        accounts: &[ProfileAccount],
        run_id: DbId,
        log_path: &Path,
        timeout: Duration,
    ) -> RunOutcome {
        let decrypted = match decrypt_accounts(&self.cipher, accounts) {
            Ok(d) => d,
            Err(e) => {
                return RunOutcome::SpawnFailed {
                    message: e.to_string(),
                }
            }
        };
        let spec = CommandSpec::build(&self.bin, profile, &decrypted, None);
        tracing::info!(
            run_id,
            profile_id = profile.id,
            program = %spec.program,
            args = ?spec.masked_args(),
            "Spawning unattended sync"
        );

        let mut cmd = spec.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunOutcome::SpawnFailed {
                    message: format!("Failed to spawn {}: {e}", spec.program),
                }
            }
        };

        let log_tx = spawn_log_sink(log_path.to_path_buf());
        let prompt = CancellationToken::new();

        let out_task = tokio::spawn(scan_unattended(
            child.stdout.take(),
            log_tx.clone(),
            prompt.clone(),
        ));
        let err_task = tokio::spawn(scan_unattended(
            child.stderr.take(),
            log_tx.clone(),
            prompt.clone(),
        ));
        drop(log_tx);

        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(s) if s.code() == Some(0) => RunOutcome::Success,
                Ok(s) => RunOutcome::Failed {
                    exit_code: s.code().unwrap_or(-1),
                },
                Err(e) => RunOutcome::SpawnFailed {
                    message: format!("Failed to wait for sync process: {e}"),
                },
            },
            _ = prompt.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                RunOutcome::RequiresInteractiveAuth
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(run_id, timeout_secs = timeout.as_secs(), "Sync run timed out");
                let _ = child.start_kill();
                let _ = child.wait().await;
                RunOutcome::TimedOut { limit_secs: timeout.as_secs() }
            }
        };

        let _ = out_task.await;
        let _ = err_task.await;

        // A prompt may land in the scanner after the process has already
        // exited; the distinguished outcome still wins over a plain exit.
        let outcome = match outcome {
            RunOutcome::Success | RunOutcome::Failed { .. } if prompt.is_cancelled() => {
                RunOutcome::RequiresInteractiveAuth
            }
            other => other,
        };

        if outcome == RunOutcome::RequiresInteractiveAuth {
            tracing::warn!(
                run_id,
                profile_id = profile.id,
                "Interactive prompt detected during unattended run; terminated"
            );
        }
        outcome
    }

    /// Full unattended lifecycle: claim the run through the ledger, execute,
    /// and write the terminal state.
    ///
    /// The run is never left `running`: every early return after a
    /// successful start passes back through [`RunLedger::complete`].
    pub async fn run_unattended_to_completion(
        &self,
        profile: &Profile,
        accounts: &[ProfileAccount],
        run_id: DbId,
    ) -> AppResult<RunOutcome> {
        self.ledger.start(run_id).await?;

        let log_path = match self.ledger.assign_log_path(run_id, &self.data_dir).await {
            Ok(path) => path,
            Err(e) => {
                self.ledger
                    .complete(
                        run_id,
                        RunStatus::Failed,
                        None,
                        Some("Failed to assign run log file"),
                    )
                    .await?;
                return Err(e);
            }
        };

        let outcome = self
            .execute_unattended(profile, accounts, run_id, &log_path, self.run_timeout)
            .await;

        let (run_status, exit_code, message) = outcome.terminal_parts();
        self.ledger
            .complete(run_id, run_status, exit_code, message.as_deref())
            .await?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Interactive execution
    // -----------------------------------------------------------------------

    /// Spawn the sync tool with stdin held open and return immediately.
    ///
    /// The process is registered in the run registry; output streams to the
    /// attached session (if any) and to the run's log file. On exit the
    /// supervising task writes the terminal run state itself, so a detached
    /// run still terminalizes correctly.
    pub async fn spawn_interactive(
        &self,
        profile: &Profile,
        accounts: &[ProfileAccount],
        run_id: DbId,
        log_path: PathBuf,
    ) -> Result<(), CoreError> {
        let decrypted = decrypt_accounts(&self.cipher, accounts)?;
        let spec = CommandSpec::build(&self.bin, profile, &decrypted, None);
        tracing::info!(
            run_id,
            profile_id = profile.id,
            program = %spec.program,
            args = ?spec.masked_args(),
            "Spawning interactive sync"
        );

        let mut cmd = spec.command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::Process(format!("Failed to spawn {}: {e}", spec.program)))?;

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        let kill = CancellationToken::new();
        self.registry
            .insert(
                run_id,
                RunHandle {
                    input_tx,
                    kill: kill.clone(),
                },
            )
            .await;

        // Stdin writer: drains queued input lines into the process.
        let stdin = child.stdin.take();
        let stdin_task = tokio::spawn(async move {
            let Some(mut stdin) = stdin else { return };
            while let Some(text) = input_rx.recv().await {
                if stdin.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        let log_tx = spawn_log_sink(log_path);
        let out_task = tokio::spawn(relay_stream(
            child.stdout.take(),
            run_id,
            log_tx.clone(),
            Arc::clone(&self.sessions),
            StreamKind::Stdout,
        ));
        let err_task = tokio::spawn(relay_stream(
            child.stderr.take(),
            run_id,
            log_tx.clone(),
            Arc::clone(&self.sessions),
            StreamKind::Stderr,
        ));
        drop(log_tx);

        let registry = Arc::clone(&self.registry);
        let ledger = Arc::clone(&self.ledger);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => status.ok(),
                _ = kill.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            };

            let _ = out_task.await;
            let _ = err_task.await;
            stdin_task.abort();
            registry.remove(run_id).await;

            let code = exit.and_then(|s| s.code());
            let (run_status, message) = match code {
                Some(0) => (RunStatus::Success, None),
                Some(c) => (RunStatus::Failed, Some(format!("Sync exited with code {c}"))),
                None => (RunStatus::Failed, Some("Sync terminated by signal".to_string())),
            };
            if let Err(e) = ledger
                .complete(run_id, run_status, code, message.as_deref())
                .await
            {
                tracing::error!(run_id, error = %e, "Failed to record interactive run completion");
            }

            let final_status = match code {
                Some(0) => status::completed(0),
                Some(c) => status::failed(c),
                None => status::failed(-1),
            };
            sessions.forward(run_id, &RunEvent::Status(final_status)).await;
            tracing::info!(run_id, exit_code = ?code, "Interactive sync finished");
        });

        Ok(())
    }

    /// Write a line to a live run's stdin. A finished or detached run
    /// silently drops late input.
    pub async fn send_input(&self, run_id: DbId, text: &str) {
        if !self.registry.send_input(run_id, text.to_string()).await {
            tracing::info!(run_id, "No live process for run; dropping input");
        }
    }

    // -----------------------------------------------------------------------
    // Probes
    // -----------------------------------------------------------------------

    /// Whether the sync binary can be executed. Fails soft.
    pub async fn check_availability(&self) -> bool {
        self.version().await.is_some()
    }

    /// First line of `--version` output, or `None` if the probe fails.
    pub async fn version(&self) -> Option<String> {
        let probe = tokio::process::Command::new(&self.bin)
            .arg("--version")
            .output();
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(output)) if output.status.success() => Some(
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            ),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream plumbing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Append lines to the run's log file, decoupled from the reading tasks so
/// a slow disk never blocks output capture.
fn spawn_log_sink(log_path: PathBuf) -> mpsc::UnboundedSender<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    path = %log_path.display(),
                    error = %e,
                    "Failed to open run log; output will not be persisted"
                );
                while rx.recv().await.is_some() {}
                return;
            }
        };
        while let Some(line) = rx.recv().await {
            if file.write_all(line.as_bytes()).await.is_err()
                || file.write_all(b"\n").await.is_err()
            {
                break;
            }
        }
        let _ = file.flush().await;
    });
    tx
}

/// Unattended reader: persist every line and raise the prompt token when an
/// interactive-input phrase appears.
async fn scan_unattended<R>(
    stream: Option<R>,
    log_tx: mpsc::UnboundedSender<String>,
    prompt: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else { return };
    let scanner = OutputScanner::new();
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if scanner.is_prompt(&line) {
            prompt.cancel();
        }
        let _ = log_tx.send(line);
    }
}

/// Interactive reader: persist every line, forward it to the attached
/// session, and surface prompts and authorization URLs as typed events.
async fn relay_stream<R>(
    stream: Option<R>,
    run_id: DbId,
    log_tx: mpsc::UnboundedSender<String>,
    sessions: Arc<SessionManager>,
    kind: StreamKind,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else { return };
    let mut scanner = OutputScanner::new();
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = log_tx.send(line.clone());

        if scanner.is_prompt(&line) {
            sessions
                .forward(run_id, &RunEvent::Status(status::WAITING_FOR_INPUT.to_string()))
                .await;
        }
        if matches!(kind, StreamKind::Stdout) {
            for url in scanner.auth_urls(&line) {
                sessions.forward(run_id, &RunEvent::AuthUrl(url)).await;
            }
        }

        let event = match kind {
            StreamKind::Stdout => RunEvent::Stdout(line),
            StreamKind::Stderr => RunEvent::Stderr(line),
        };
        sessions.forward(run_id, &event).await;
    }
}
