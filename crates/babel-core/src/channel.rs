//! Interactive channels to long-lived interpreter processes
//!
//! A channel is a line-oriented stream: input goes in through `send`, and
//! everything the process prints accumulates in an [`OutputBuffer`]
//! addressed by absolute offsets. On unix stdout and stderr share one pipe,
//! so diagnostics keep their place relative to ordinary output.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Notify;

#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use tokio::net::unix::pipe;

use crate::config::InterpreterConfig;
use crate::error::{BabelError, Result};

/// Growable output log addressed by absolute offsets.
///
/// Offsets keep counting after [`discard_before`](Self::discard_before)
/// drops consumed text, so positions handed out earlier stay valid.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    base: usize,
    text: String,
    pending: Vec<u8>,
    eof: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes, holding back an incomplete trailing UTF-8 sequence.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let lossy = String::from_utf8_lossy(&self.pending).into_owned();
                self.text.push_str(&lossy);
                self.pending.clear();
                return;
            }
        };
        let complete: Vec<u8> = self.pending.drain(..valid).collect();
        self.text.push_str(&String::from_utf8_lossy(&complete));
    }

    pub fn push_str(&mut self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    /// Absolute offset one past the last byte received.
    pub fn end(&self) -> usize {
        self.base + self.text.len()
    }

    /// Everything from `offset` on. Offsets before the retained window are
    /// clamped to its start.
    pub fn read_from(&self, offset: usize) -> String {
        let start = offset.saturating_sub(self.base).min(self.text.len());
        let start = floor_char_boundary(&self.text, start);
        self.text[start..].to_string()
    }

    /// Forget text before `offset`.
    pub fn discard_before(&mut self, offset: usize) {
        let cut = offset.saturating_sub(self.base).min(self.text.len());
        let cut = floor_char_boundary(&self.text, cut);
        self.text.drain(..cut);
        self.base += cut;
    }

    pub fn mark_eof(&mut self) {
        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.text.push_str(&rest);
            self.pending.clear();
        }
        self.eof = true;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// A persistent, stateful stream to an interpreter.
#[async_trait]
pub trait InteractiveChannel: Send + Sync {
    /// Write `input` followed by a newline.
    async fn send(&self, input: &str) -> Result<()>;

    /// Absolute offset of the end of the output received so far.
    fn output_end(&self) -> usize;

    /// Output received from `offset` on.
    fn output_from(&self, offset: usize) -> String;

    /// Drop output before `offset` once it has been consumed.
    fn discard_before(&self, offset: usize);

    /// The process closed its output streams.
    fn is_eof(&self) -> bool;

    /// Resolves when new output arrives or the stream closes.
    async fn output_changed(&self);

    async fn is_alive(&self) -> bool;

    async fn terminate(&self);
}

/// Creates channels for new sessions.
#[async_trait]
pub trait ChannelSpawner: Send + Sync {
    async fn spawn(&self, session_id: &str) -> Result<Arc<dyn InteractiveChannel>>;
}

/// Channel backed by a child process with piped stdio.
pub struct ProcessChannel {
    command: String,
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    output: Arc<Mutex<OutputBuffer>>,
    notify: Arc<Notify>,
}

impl ProcessChannel {
    /// Spawn `command args…` and start collecting its output.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .env("TERM", "dumb")
            .env("NO_COLOR", "1")
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        let merged = merge_output(&mut cmd)?;
        #[cfg(not(unix))]
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| BabelError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        })?;
        // The command holds our copy of the pipe's write end; EOF needs it gone.
        drop(cmd);

        let output = Arc::new(Mutex::new(OutputBuffer::new()));
        let notify = Arc::new(Notify::new());
        let stdin = child.stdin.take();

        let mut readers: Vec<Box<dyn AsyncRead + Unpin + Send>> = Vec::new();
        #[cfg(unix)]
        readers.push(Box::new(merged));
        #[cfg(not(unix))]
        {
            if let Some(stdout) = child.stdout.take() {
                readers.push(Box::new(stdout));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(Box::new(stderr));
            }
        }

        // EOF is recorded once every reader finishes.
        let open_streams = Arc::new(Mutex::new(readers.len()));
        for reader in readers {
            Self::spawn_reader(reader, output.clone(), notify.clone(), open_streams.clone());
        }

        tracing::debug!("Spawned interactive '{}' (pid {:?})", command, child.id());

        Ok(Self {
            command: command.to_string(),
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            output,
            notify,
        })
    }

    fn spawn_reader<R>(
        mut reader: R,
        output: Arc<Mutex<OutputBuffer>>,
        notify: Arc<Notify>,
        open_streams: Arc<Mutex<usize>>,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        output.lock().push_bytes(&buf[..n]);
                        notify.notify_one();
                    }
                }
            }
            let mut open = open_streams.lock();
            *open -= 1;
            if *open == 0 {
                output.lock().mark_eof();
            }
            drop(open);
            notify.notify_one();
        });
    }
}

#[async_trait]
impl InteractiveChannel for ProcessChannel {
    async fn send(&self, input: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| BabelError::SessionClosed {
            session: self.command.clone(),
            output: String::new(),
        })?;

        let mut line = input.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn output_end(&self) -> usize {
        self.output.lock().end()
    }

    fn output_from(&self, offset: usize) -> String {
        self.output.lock().read_from(offset)
    }

    fn discard_before(&self, offset: usize) {
        self.output.lock().discard_before(offset);
    }

    fn is_eof(&self) -> bool {
        self.output.lock().is_eof()
    }

    async fn output_changed(&self) {
        self.notify.notified().await;
    }

    async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    async fn terminate(&self) {
        self.stdin.lock().await.take();
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!("Kill of '{}' failed: {}", self.command, e);
        }
    }
}

/// Point the child's stdout and stderr at one pipe and return its read end.
#[cfg(unix)]
fn merge_output(cmd: &mut Command) -> Result<pipe::Receiver> {
    let (reader, writer) = std::io::pipe()?;
    cmd.stdout(writer.try_clone()?).stderr(writer);
    Ok(pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?)
}

/// Spawns the configured interpreter in REPL mode.
pub struct ProcessSpawner {
    interpreter: InterpreterConfig,
}

impl ProcessSpawner {
    pub fn new(interpreter: InterpreterConfig) -> Self {
        Self { interpreter }
    }
}

#[async_trait]
impl ChannelSpawner for ProcessSpawner {
    async fn spawn(&self, session_id: &str) -> Result<Arc<dyn InteractiveChannel>> {
        tracing::info!(
            "Starting {} for session {}",
            self.interpreter.command,
            session_id
        );
        let channel = ProcessChannel::spawn(&self.interpreter.command, &self.interpreter.repl_args)?;
        Ok(Arc::new(channel))
    }
}
