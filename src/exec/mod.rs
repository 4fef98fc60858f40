// src/exec/mod.rs

//! Mutating package commands
//!
//! Install, uninstall, upgrade, reinstall and pin state changes are delegated
//! to the external package manager as `brew <verb> [--cask] <name>`. Output is
//! streamed as [`CommandEvent`]s through one unbounded channel fed by one task
//! per output stream. `Finished` is sent only after both stream tasks are
//! done, so every line arrives before it. Lines from stdout and stderr may
//! interleave in any order.
//!
//! After a successful command the [`Reconciler`] patches the affected
//! catalog records in place.

mod reconcile;

pub use reconcile::Reconciler;

use crate::catalog::{CatalogHandle, PackageKind};
use crate::config::Config;
use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Mutating operation passed to the package manager
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verb {
    Install,
    Uninstall,
    Upgrade,
    Reinstall,
    Pin,
    Unpin,
}

impl Verb {
    /// Pinning only exists for formulae
    pub fn applies_to(self, kind: PackageKind) -> bool {
        match self {
            Verb::Pin | Verb::Unpin => kind == PackageKind::Formula,
            _ => true,
        }
    }
}

/// A single package command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub verb: Verb,
    pub name: String,
    pub kind: PackageKind,
}

impl CommandRequest {
    pub fn new(verb: Verb, name: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            verb,
            name: name.into(),
            kind,
        }
    }

    /// Reject requests the package manager cannot perform
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.starts_with('-') {
            return Err(Error::ParseError(format!(
                "invalid package name '{}'",
                self.name
            )));
        }
        if !self.verb.applies_to(self.kind) {
            return Err(Error::ParseError(format!(
                "'{}' is not supported for {}s",
                self.verb, self.kind
            )));
        }
        Ok(())
    }

    /// Arguments after the program name
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.verb.to_string()];
        if self.kind == PackageKind::Cask {
            args.push("--cask".to_string());
        }
        args.push(self.name.clone());
        args
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Event stream of one command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Emitted once, before any output
    Started { command: String },
    Output { stream: StreamKind, line: String },
    /// Emitted once, after every output line
    Finished { success: bool, code: Option<i32> },
}

/// Collected result of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    /// Combined stdout/stderr lines in delivery order
    pub lines: Vec<String>,
}

/// Runs package commands through the configured program
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: PathBuf,
}

impl CommandExecutor {
    pub fn new(config: &Config) -> Self {
        Self::with_program(config.commands.brew.clone())
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full command line, for display and errors
    pub fn command_line(&self, request: &CommandRequest) -> String {
        format!("{} {}", self.program.display(), request)
    }

    /// Start `request` and stream its events
    ///
    /// Spawn failures are returned directly; once the process runs, its exit
    /// status arrives as the final [`CommandEvent::Finished`].
    pub fn spawn(&self, request: &CommandRequest) -> Result<UnboundedReceiver<CommandEvent>> {
        request.validate()?;
        let command = self.command_line(request);

        let mut child = Command::new(&self.program)
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SpawnFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        info!("Running {}", command);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(CommandEvent::Started {
            command: command.clone(),
        });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tokio::spawn(async move {
            let out_task =
                stdout.map(|s| tokio::spawn(forward_lines(s, StreamKind::Stdout, tx.clone())));
            let err_task =
                stderr.map(|s| tokio::spawn(forward_lines(s, StreamKind::Stderr, tx.clone())));

            for task in [out_task, err_task].into_iter().flatten() {
                if let Err(e) = task.await {
                    warn!("Output reader for {} stopped: {}", command, e);
                }
            }

            let finished = match child.wait().await {
                Ok(status) => CommandEvent::Finished {
                    success: status.success(),
                    code: status.code(),
                },
                Err(e) => {
                    warn!("Failed to wait for {}: {}", command, e);
                    CommandEvent::Finished {
                        success: false,
                        code: None,
                    }
                }
            };
            debug!("{} finished: {:?}", command, finished);
            let _ = tx.send(finished);
        });

        Ok(rx)
    }

    /// Run `request` to completion, retaining its output
    pub async fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        let mut events = self.spawn(request)?;
        let mut output = CommandOutput::default();

        while let Some(event) = events.recv().await {
            match event {
                CommandEvent::Started { command } => output.command = command,
                CommandEvent::Output { line, .. } => output.lines.push(line),
                CommandEvent::Finished { success: true, .. } => return Ok(output),
                CommandEvent::Finished {
                    success: false,
                    code,
                } => {
                    return Err(Error::CommandFailed {
                        command: output.command,
                        code,
                        output: output.lines,
                    });
                }
            }
        }

        Err(Error::ChannelClosed(format!(
            "{} ended without a finish event",
            self.command_line(request)
        )))
    }

    /// Run `request` and patch the catalog if it succeeds
    ///
    /// On failure the catalog is left untouched.
    pub async fn execute_and_reconcile(
        &self,
        reconciler: &Reconciler,
        handle: &CatalogHandle,
        request: &CommandRequest,
    ) -> Result<CommandOutput> {
        let output = self.run(request).await?;
        reconciler.apply(handle, request).await?;
        Ok(output)
    }
}

async fn forward_lines<R>(reader: R, stream: StreamKind, tx: UnboundedSender<CommandEvent>)
where
    R: AsyncRead + Unpin,
{
    // The pipe is drained to EOF even when lines cannot be delivered, so the
    // child never sees a closed pipe.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut errors = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                errors = 0;
                let line = decode_line(&buf);
                let _ = tx.send(CommandEvent::Output { stream, line });
            }
            Err(e) => {
                warn!("Error reading {:?}: {}", stream, e);
                errors += 1;
                if errors >= MAX_READ_ERRORS {
                    break;
                }
            }
        }
    }
}

/// Consecutive read failures after which a stream is abandoned
const MAX_READ_ERRORS: u32 = 8;

/// Decode one raw output line, replacing invalid UTF-8
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_request_args() {
        let request = CommandRequest::new(Verb::Install, "wget", PackageKind::Formula);
        assert_eq!(request.args(), vec!["install", "wget"]);
        assert_eq!(request.to_string(), "install wget");

        let request = CommandRequest::new(Verb::Uninstall, "firefox", PackageKind::Cask);
        assert_eq!(request.args(), vec!["uninstall", "--cask", "firefox"]);

        let executor = CommandExecutor::with_program("/opt/homebrew/bin/brew");
        assert_eq!(
            executor.command_line(&request),
            "/opt/homebrew/bin/brew uninstall --cask firefox"
        );
    }

    #[test]
    fn test_verb_parse() {
        assert_eq!(Verb::from_str("upgrade").unwrap(), Verb::Upgrade);
        assert_eq!(Verb::from_str("Unpin").unwrap(), Verb::Unpin);
        assert!(Verb::from_str("tap").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(CommandRequest::new(Verb::Pin, "wget", PackageKind::Formula)
            .validate()
            .is_ok());
        assert!(CommandRequest::new(Verb::Pin, "firefox", PackageKind::Cask)
            .validate()
            .is_err());
        assert!(CommandRequest::new(Verb::Install, "--force", PackageKind::Formula)
            .validate()
            .is_err());
        assert!(CommandRequest::new(Verb::Install, "", PackageKind::Formula)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let executor = CommandExecutor::with_program("/nonexistent/brew");
        let request = CommandRequest::new(Verb::Install, "wget", PackageKind::Formula);
        let err = executor.spawn(&request).unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_cask_pin_rejected_before_spawn() {
        let executor = CommandExecutor::with_program("/nonexistent/brew");
        let request = CommandRequest::new(Verb::Pin, "firefox", PackageKind::Cask);
        assert!(matches!(
            executor.spawn(&request),
            Err(Error::ParseError(_))
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("brew");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_events_end_with_finished() {
            let temp = TempDir::new().unwrap();
            let program = script(
                &temp,
                r#"echo "==> $1 $2"
echo "warning: slow mirror" >&2
echo "done""#,
            );
            let executor = CommandExecutor::with_program(program);
            let request = CommandRequest::new(Verb::Install, "wget", PackageKind::Formula);

            let mut events = Vec::new();
            let mut rx = executor.spawn(&request).unwrap();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }

            assert!(matches!(events.first(), Some(CommandEvent::Started { .. })));
            assert_eq!(
                events.last(),
                Some(&CommandEvent::Finished {
                    success: true,
                    code: Some(0)
                })
            );

            let stdout: Vec<&str> = events
                .iter()
                .filter_map(|e| match e {
                    CommandEvent::Output {
                        stream: StreamKind::Stdout,
                        line,
                    } => Some(line.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(stdout, vec!["==> install wget", "done"]);
            assert!(events.contains(&CommandEvent::Output {
                stream: StreamKind::Stderr,
                line: "warning: slow mirror".to_string(),
            }));
        }

        #[tokio::test]
        async fn test_run_failure_keeps_output() {
            let temp = TempDir::new().unwrap();
            let program = script(&temp, "echo \"Error: No available formula\" >&2\nexit 3");
            let executor = CommandExecutor::with_program(program);
            let request = CommandRequest::new(Verb::Install, "nope", PackageKind::Formula);

            match executor.run(&request).await {
                Err(Error::CommandFailed { code, output, command }) => {
                    assert_eq!(code, Some(3));
                    assert_eq!(output, vec!["Error: No available formula"]);
                    assert!(command.ends_with("install nope"));
                }
                other => panic!("expected CommandFailed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_run_success() {
            let temp = TempDir::new().unwrap();
            let program = script(&temp, "echo \"$@\"");
            let executor = CommandExecutor::with_program(program);
            let request = CommandRequest::new(Verb::Upgrade, "firefox", PackageKind::Cask);

            let output = executor.run(&request).await.unwrap();
            assert_eq!(output.lines, vec!["upgrade --cask firefox"]);
        }

        #[tokio::test]
        async fn test_non_utf8_output_is_delivered() {
            let temp = TempDir::new().unwrap();
            let program = script(
                &temp,
                r"printf 'caf\351 compiled\r\n'
sleep 0.3
echo after
echo done
exit 0",
            );
            let executor = CommandExecutor::with_program(program);
            let request = CommandRequest::new(Verb::Install, "wget", PackageKind::Formula);

            let output = executor.run(&request).await.unwrap();
            assert_eq!(
                output.lines,
                vec!["caf\u{FFFD} compiled", "after", "done"]
            );
        }
    }
}
