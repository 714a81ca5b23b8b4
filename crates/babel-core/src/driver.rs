//! Sentinel-synchronized exchange over an interactive channel
//!
//! One evaluation is a flush (probe, wait for the sentinel, drop everything
//! before it), a submit (body, then probe again) and a wait for the second
//! sentinel. The lines captured in between are cleaned of prompts and echoed
//! input and reduced according to the [`ResultMode`].

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::channel::InteractiveChannel;
use crate::config::{InterpreterConfig, SessionConfig};
use crate::error::{BabelError, Result};

/// What an evaluation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
    /// The last value, parsed into a structured result.
    #[default]
    Value,
    /// Everything printed, as text.
    Output,
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultMode::Value => write!(f, "value"),
            ResultMode::Output => write!(f, "output"),
        }
    }
}

impl FromStr for ResultMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "value" => Ok(ResultMode::Value),
            "output" => Ok(ResultMode::Output),
            other => Err(format!("unknown result type '{}' (expected value or output)", other)),
        }
    }
}

/// Cooperative cancellation for a pending evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

async fn wait_cancelled(cancel: Option<&CancelToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Output located before a sentinel.
struct SentinelHit {
    /// Text between the search start and the sentinel.
    captured: String,
    /// Absolute offset just past the sentinel line.
    resume_at: usize,
}

pub struct ReplDriver {
    sentinel: String,
    probe: String,
    prompt: Regex,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReplDriver {
    pub fn new(interpreter: &InterpreterConfig, session: &SessionConfig) -> Result<Self> {
        let prompt = Regex::new(&interpreter.prompt_pattern)
            .map_err(|e| BabelError::Config(format!("invalid prompt pattern: {}", e)))?;
        Ok(Self {
            sentinel: interpreter.sentinel.clone(),
            probe: interpreter.probe_statement(),
            prompt,
            timeout: session.eval_timeout,
            poll_interval: session.poll_interval,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `body` in the session behind `channel` and return its text in
    /// the requested `mode`.
    ///
    /// The channel must not be shared with a concurrent evaluation.
    pub async fn evaluate(
        &self,
        session: &str,
        channel: &dyn InteractiveChannel,
        body: &str,
        mode: ResultMode,
        cancel: Option<&CancelToken>,
    ) -> Result<String> {
        self.evaluate_within(session, channel, body, mode, cancel, self.timeout)
            .await
    }

    /// Like [`evaluate`](Self::evaluate) with an explicit bound.
    pub async fn evaluate_within(
        &self,
        session: &str,
        channel: &dyn InteractiveChannel,
        body: &str,
        mode: ResultMode,
        cancel: Option<&CancelToken>,
        timeout: Duration,
    ) -> Result<String> {
        let deadline = Instant::now() + timeout;

        // Flush
        let start = channel.output_end();
        self.send(session, channel, &self.probe, start).await?;
        let flush = self
            .wait_for_sentinel(session, channel, start, deadline, timeout, cancel)
            .await?;
        channel.discard_before(flush.resume_at);
        let echoes = self.detects_echo(&flush.captured);
        tracing::debug!(
            "Session {} flushed ({} stale bytes, echo: {})",
            session,
            flush.captured.len(),
            echoes
        );

        // Submit
        self.send(session, channel, body, flush.resume_at).await?;
        self.send(session, channel, &self.probe, flush.resume_at).await?;

        // Wait
        let hit = self
            .wait_for_sentinel(session, channel, flush.resume_at, deadline, timeout, cancel)
            .await?;
        channel.discard_before(hit.resume_at);

        // Extract + select
        let lines = self.extract_lines(&hit.captured, body, echoes);
        Ok(select(&lines, mode))
    }

    /// A write that fails because the interpreter is gone reports the
    /// output it left behind since `from`.
    async fn send(
        &self,
        session: &str,
        channel: &dyn InteractiveChannel,
        input: &str,
        from: usize,
    ) -> Result<()> {
        let Err(e) = channel.send(input).await else {
            return Ok(());
        };
        if channel.is_eof() || !channel.is_alive().await {
            return Err(BabelError::SessionClosed {
                session: session.to_string(),
                output: channel.output_from(from),
            });
        }
        Err(e)
    }

    async fn wait_for_sentinel(
        &self,
        session: &str,
        channel: &dyn InteractiveChannel,
        from: usize,
        deadline: Instant,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<SentinelHit> {
        loop {
            // EOF is read before the text so the text is complete when EOF holds.
            let eof = channel.is_eof();
            let text = channel.output_from(from);
            if let Some((captured_end, line_end)) = self.find_sentinel(&text) {
                return Ok(SentinelHit {
                    captured: text[..captured_end].to_string(),
                    resume_at: from + line_end,
                });
            }
            if eof {
                tracing::warn!("Session {} closed before the sentinel", session);
                return Err(BabelError::SessionClosed {
                    session: session.to_string(),
                    output: text,
                });
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(BabelError::Cancelled {
                    session: session.to_string(),
                });
            }
            if Instant::now() >= deadline {
                tracing::warn!("Session {} timed out after {:?}", session, timeout);
                return Err(BabelError::SentinelTimeout {
                    session: session.to_string(),
                    after: timeout,
                });
            }

            tokio::select! {
                _ = channel.output_changed() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tokio::time::sleep_until(deadline) => {}
                _ = wait_cancelled(cancel) => {}
            }
        }
    }

    fn strip_prompt<'a>(&self, line: &'a str) -> &'a str {
        let line = line.trim_end_matches('\r');
        match self.prompt.find(line) {
            Some(m) if m.start() == 0 => &line[m.end()..],
            _ => line,
        }
    }

    /// Byte offset of the sentinel in `line` when the line ends with it.
    ///
    /// Output printed without a trailing newline shares the line with the
    /// sentinel; it stays in front of the returned offset. The echoed probe
    /// statement never counts.
    pub fn sentinel_offset(&self, line: &str) -> Option<usize> {
        let line = line.trim_end();
        if self.strip_prompt(line).trim() == self.probe.trim() {
            return None;
        }
        line.strip_suffix(self.sentinel.as_str())
            .map(|prefix| prefix.len())
    }

    pub fn is_sentinel_line(&self, line: &str) -> bool {
        self.sentinel_offset(line).is_some()
    }

    /// End of the captured text and the offset just past the first
    /// complete line that ends with the sentinel.
    fn find_sentinel(&self, text: &str) -> Option<(usize, usize)> {
        let mut line_start = 0;
        while let Some(newline) = text[line_start..].find('\n') {
            let line_end = line_start + newline;
            let line = &text[line_start..line_end];
            if let Some(offset) = self.sentinel_offset(line) {
                // A bare prompt in front of the sentinel is not output.
                let captured_end = if self.strip_prompt(&line[..offset]).trim().is_empty() {
                    line_start
                } else {
                    line_start + offset
                };
                return Some((captured_end, line_end + 1));
            }
            line_start = line_end + 1;
        }
        None
    }

    /// The interpreter echoes input if the flushed probe shows up as a line.
    fn detects_echo(&self, flushed: &str) -> bool {
        let probe = self.probe.trim();
        flushed
            .lines()
            .any(|line| self.strip_prompt(line).trim() == probe)
    }

    /// Prompt-stripped, trimmed lines of `captured` without the echo of
    /// `body` and the probe.
    pub fn extract_lines(&self, captured: &str, body: &str, echoes: bool) -> Vec<String> {
        let mut expected: VecDeque<&str> = if echoes {
            body.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .chain(std::iter::once(self.probe.trim()))
                .collect()
        } else {
            VecDeque::new()
        };

        let mut lines = Vec::new();
        for raw in captured.lines() {
            let line = self.strip_prompt(raw).trim();
            // Echoes arrive in input order.
            if expected.front().is_some_and(|echo| *echo == line) {
                expected.pop_front();
                continue;
            }
            lines.push(line.to_string());
        }
        lines
    }
}

/// Reduce extracted lines to the text for `mode`.
pub fn select(lines: &[String], mode: ResultMode) -> String {
    match mode {
        ResultMode::Value => lines
            .iter()
            .rev()
            .find(|line| !line.is_empty())
            .cloned()
            .unwrap_or_default(),
        ResultMode::Output => {
            let first = lines.iter().position(|line| !line.is_empty());
            let last = lines.iter().rposition(|line| !line.is_empty());
            match (first, last) {
                (Some(first), Some(last)) => lines[first..=last].join("\n"),
                _ => String::new(),
            }
        }
    }
}
