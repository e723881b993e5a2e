// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Launches the VM `up`/`halt` commands and pumps their output into the log.

use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::{LaunchHandle, LaunchKind, LaunchSnapshot, LaunchStatus, LogTail};
use crate::config::VmConfig;
use crate::errors::LaunchError;
use crate::events::{EventBus, LabEvent};
use crate::security::escape_html;

/// How long output is still collected after the command has exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

pub struct VmTrigger {
    workdir: PathBuf,
    up_command: String,
    halt_command: String,
    log_path: PathBuf,
    poll_interval: Duration,
    /// Held only while a start is being launched, not for the process lifetime.
    start_lock: Mutex<()>,
    last: Mutex<Option<LaunchHandle>>,
    events: EventBus,
}

impl VmTrigger {
    pub fn new(config: &VmConfig, events: EventBus) -> Self {
        Self {
            workdir: config.workdir.clone(),
            up_command: config.up_command.clone(),
            halt_command: config.halt_command.clone(),
            log_path: config.log_path.clone(),
            poll_interval: Duration::from_millis(config.log_poll_interval_ms),
            start_lock: Mutex::new(()),
            last: Mutex::new(None),
            events,
        }
    }

    /// Launch the `up` command unless another start is mid-launch.
    ///
    /// Returns as soon as the process is spawned; a second start after that
    /// point launches another process even if the first is still running.
    pub fn start(&self) -> Result<LaunchHandle, LaunchError> {
        let _launching = self.start_lock.try_lock().ok_or_else(|| {
            warn!("VM start rejected: another start is being launched");
            LaunchError::Busy
        })?;
        self.launch(LaunchKind::Up, &self.up_command)
    }

    /// Launch the `halt` command. Never busy.
    pub fn stop(&self) -> Result<LaunchHandle, LaunchError> {
        self.launch(LaunchKind::Halt, &self.halt_command)
    }

    pub fn last_launch(&self) -> Option<LaunchSnapshot> {
        self.last.lock().as_ref().map(LaunchHandle::snapshot)
    }

    /// A fresh follower of the VM log, starting from its first line.
    pub fn tail(&self) -> LogTail {
        LogTail::new(&self.log_path, self.poll_interval)
    }

    /// The scenario README as preformatted, escaped HTML.
    pub async fn guide_html(&self) -> io::Result<String> {
        let content = tokio::fs::read_to_string(self.workdir.join("README.md")).await?;
        Ok(format!("<pre>{}</pre>", escape_html(&content)))
    }

    fn launch(&self, kind: LaunchKind, command: &str) -> Result<LaunchHandle, LaunchError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                error!("Failed to launch VM {} '{}': {}", kind, command, source);
                LaunchError::Spawn {
                    command: command.to_string(),
                    source,
                }
            })?;

        let (status_tx, status_rx) = watch::channel(LaunchStatus::Running);
        let handle = LaunchHandle::new(kind, command.to_string(), status_rx);
        info!(
            "🖥️ VM {} launched (launch {}, pid {:?}) in {}",
            kind,
            handle.id,
            child.id(),
            self.workdir.display()
        );

        self.events.broadcast(LabEvent::VmLaunch {
            launch_id: handle.id.clone(),
            kind,
            command: command.to_string(),
        });
        *self.last.lock() = Some(handle.clone());

        tokio::spawn(pump_output(
            child,
            status_tx,
            self.log_path.clone(),
            handle.clone(),
            self.events.clone(),
        ));
        Ok(handle)
    }
}

/// Copy the child's output into the log, then publish its exit status.
async fn pump_output(
    mut child: Child,
    status: watch::Sender<LaunchStatus>,
    log_path: PathBuf,
    handle: LaunchHandle,
    events: EventBus,
) {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut log = open_log(&log_path).await;
    let header = format!(
        "=== {} {} ({}): {} ===",
        handle.started_at.to_rfc3339(),
        handle.kind,
        handle.id,
        handle.command
    );
    write_line(&mut log, &header).await;

    // A backgrounded grandchild can hold the pipes open after the command exits.
    let exit = loop {
        let line = tokio::select! {
            line = line_rx.recv() => line,
            exit = child.wait() => break exit,
        };
        match line {
            Some(line) => write_line(&mut log, &line).await,
            None => break child.wait().await,
        }
    };

    let deadline = Instant::now() + OUTPUT_GRACE;
    while let Ok(Some(line)) = timeout_at(deadline, line_rx.recv()).await {
        write_line(&mut log, &line).await;
    }

    let final_status = match exit {
        Ok(exit) => match exit.code() {
            Some(exit_code) => LaunchStatus::Completed { exit_code },
            None => LaunchStatus::Failed {
                message: "terminated by signal".to_string(),
            },
        },
        Err(e) => LaunchStatus::Failed {
            message: e.to_string(),
        },
    };
    info!("VM {} launch {} finished: {:?}", handle.kind, handle.id, final_status);

    status.send_replace(final_status.clone());
    events.broadcast(LabEvent::VmFinished {
        launch_id: handle.id.clone(),
        kind: handle.kind,
        status: final_status,
    });
}

/// Split a pipe into lines. Bytes that are not UTF-8 are replaced, never
/// fatal, so the pipe keeps draining while the command runs.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("VM output stream ended: {}", e);
                break;
            }
        }
    }
}

async fn open_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Cannot create log directory {}: {}", parent.display(), e);
        }
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("Cannot open VM log {}: {}", path.display(), e);
            None
        }
    }
}

/// Append one line; the log is abandoned after the first write error.
async fn write_line(log: &mut Option<File>, line: &str) {
    let failed = match log.as_mut() {
        Some(file) => {
            let mut result = file.write_all(format!("{}\n", line).as_bytes()).await;
            if result.is_ok() {
                result = file.flush().await;
            }
            result.err()
        }
        None => None,
    };
    if let Some(e) = failed {
        warn!("Writing VM log failed, output is no longer recorded: {}", e);
        *log = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(up: &str, halt: &str) -> (VmTrigger, PathBuf) {
        let log_path =
            std::env::temp_dir().join(format!("labgate-vm-{}/vm.log", uuid::Uuid::new_v4()));
        let config = VmConfig {
            workdir: std::env::temp_dir(),
            up_command: up.to_string(),
            halt_command: halt.to_string(),
            log_path: log_path.clone(),
            log_poll_interval_ms: 10,
        };
        (VmTrigger::new(&config, EventBus::default()), log_path)
    }

    async fn cleanup(log_path: &Path) {
        if let Some(dir) = log_path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn test_start_runs_and_logs_output() {
        let (trigger, log_path) = trigger("echo booting; echo warn >&2; exit 2", "true");
        let mut events = trigger.events.subscribe();

        let handle = trigger.start().unwrap();
        assert_eq!(handle.kind, LaunchKind::Up);
        assert_eq!(handle.wait().await, LaunchStatus::Completed { exit_code: 2 });

        let log = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(log.contains("booting"));
        assert!(log.contains("warn"));
        assert!(log.starts_with("==="));

        let launch = events.recv().await.unwrap();
        assert!(matches!(launch.event, LabEvent::VmLaunch { kind: LaunchKind::Up, .. }));
        let finished = events.recv().await.unwrap();
        assert!(matches!(finished.event, LabEvent::VmFinished { .. }));

        let snapshot = trigger.last_launch().unwrap();
        assert_eq!(snapshot.id, handle.id);
        assert_eq!(snapshot.status, LaunchStatus::Completed { exit_code: 2 });

        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_draining() {
        let (trigger, log_path) = trigger(
            "printf 'boot\\377\\n'; sleep 0.2; for i in 0 1 2; do echo after$i; done; exit 0",
            "true",
        );

        let handle = trigger.start().unwrap();
        assert_eq!(handle.wait().await, LaunchStatus::Completed { exit_code: 0 });

        let log = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(log.contains("boot\u{FFFD}"), "{}", log);
        assert!(log.contains("after0"));
        assert!(log.contains("after2"));

        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_backgrounded_child_does_not_block_completion() {
        let (trigger, log_path) = trigger("sleep 5 & echo detached; exit 3", "true");

        let handle = trigger.start().unwrap();
        let status = tokio::time::timeout(Duration::from_secs(4), handle.wait())
            .await
            .expect("launch should finish while the background child still runs");
        assert_eq!(status, LaunchStatus::Completed { exit_code: 3 });

        let log = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(log.contains("detached"));

        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_start_is_busy_while_launch_lock_held() {
        let (trigger, log_path) = trigger("echo up", "echo halt");

        let held = trigger.start_lock.try_lock().unwrap();
        assert!(matches!(trigger.start(), Err(LaunchError::Busy)));
        assert!(trigger.last_launch().is_none());

        // Halt ignores the start lock.
        let halt = trigger.stop().unwrap();
        assert_eq!(halt.kind, LaunchKind::Halt);
        drop(held);

        halt.wait().await;
        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_lock_released_after_launch() {
        let (trigger, log_path) = trigger("sleep 1", "true");

        let first = trigger.start().unwrap();
        let second = trigger.start().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.status(), LaunchStatus::Running);

        first.wait().await;
        second.wait().await;
        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (mut trigger, log_path) = trigger("true", "true");
        trigger.workdir = PathBuf::from("/nonexistent/labgate/workdir");
        assert!(matches!(trigger.start(), Err(LaunchError::Spawn { .. })));
        assert!(trigger.last_launch().is_none());
        cleanup(&log_path).await;
    }

    #[tokio::test]
    async fn test_guide_is_escaped() {
        let dir = std::env::temp_dir().join(format!("labgate-guide-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("README.md"), "# Guide\n<script>x</script>")
            .await
            .unwrap();

        let (mut trigger, _) = trigger("true", "true");
        trigger.workdir = dir.clone();
        let html = trigger.guide_html().await.unwrap();
        assert!(html.starts_with("<pre># Guide"));
        assert!(html.contains("&lt;script&gt;"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
