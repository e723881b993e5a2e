// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Polling follower for a growing log file.

use futures::Stream;
use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Follows a file from the start, yielding complete lines as they appear.
///
/// A missing file reads as empty. If the file shrinks (rotated or
/// truncated) reading restarts from the beginning.
pub struct LogTail {
    path: PathBuf,
    poll_interval: Duration,
    offset: u64,
    partial: String,
    ready: VecDeque<String>,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            offset: 0,
            partial: String::new(),
            ready: VecDeque::new(),
        }
    }

    /// Complete lines written since the last call.
    pub async fn read_available(&mut self) -> io::Result<Vec<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if len < self.offset {
            debug!("{} shrank, restarting from the top", self.path.display());
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;
        self.partial.push_str(&String::from_utf8_lossy(&buf));

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(lines)
    }

    /// Wait for the next line, polling as needed. Never returns `Ok` without a line.
    pub async fn next_line(&mut self) -> io::Result<String> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(line);
            }
            let lines = self.read_available().await?;
            if lines.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            } else {
                self.ready.extend(lines);
            }
        }
    }

    /// Endless stream of lines; ends only after an I/O error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        futures::stream::unfold(Some(self), |tail| async move {
            let mut tail = match tail {
                Some(tail) => tail,
                None => return None,
            };
            match tail.next_line().await {
                Ok(line) => Some((Ok(line), Some(tail))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
