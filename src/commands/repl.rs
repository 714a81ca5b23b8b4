//! `perl6-babel repl`: line-by-line evaluation in one session.

use anyhow::{anyhow, Result};
use babel_core::{EvalRequest, Evaluator, ResultMode};
use clap::ArgMatches;
use rustyline::error::ReadlineError;
use rustyline::Editor;

use super::recorder::Recorder;

const HELP: &str = "\
Commands:
  :mode value|output   switch between the last value and printed output
  :sessions            list running sessions
  :kill [SESSION]      stop a session (default: the current one)
  :record on FILE      append a JSON-lines transcript to FILE
  :record off          stop recording
  :help                show this help
  :quit                leave";

/// What a line asked the loop to do.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Print(String),
    Quit,
}

pub struct ReplState {
    session: String,
    mode: ResultMode,
    recorder: Recorder,
}

impl ReplState {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            mode: ResultMode::Value,
            recorder: Recorder::new(),
        }
    }

    /// Handle one input line: a `:` command or code for the session.
    pub async fn dispatch(&mut self, evaluator: &Evaluator, line: &str) -> Result<Reply> {
        if !line.starts_with(':') {
            let request = EvalRequest::new(line).session(self.session.as_str()).mode(self.mode);
            let evaluation = evaluator.evaluate(&request).await?;
            let text = match self.mode {
                ResultMode::Output => evaluation.value.as_text().unwrap_or_default().to_string(),
                ResultMode::Value => evaluation.value.to_literal(),
            };
            return Ok(Reply::Print(text));
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let arg = parts.get(1).copied().unwrap_or("");

        let reply = match cmd {
            ":mode" => {
                self.mode = arg.parse().map_err(|e: String| anyhow!(e))?;
                Reply::Print(format!("Results: {}", self.mode))
            }
            ":sessions" => {
                let sessions = evaluator.sessions().await;
                if sessions.is_empty() {
                    Reply::Print("No sessions.".to_string())
                } else {
                    let lines: Vec<String> = sessions
                        .iter()
                        .map(|s| {
                            format!(
                                "{}  {}  started {}{}",
                                s.id,
                                s.handle_id,
                                s.created_at.to_rfc3339(),
                                if s.alive { "" } else { "  (dead)" }
                            )
                        })
                        .collect();
                    Reply::Print(lines.join("\n"))
                }
            }
            ":kill" => {
                let target = if arg.is_empty() { self.session.as_str() } else { arg };
                if evaluator.kill(target).await {
                    Reply::Print(format!("Killed {}", target))
                } else {
                    Reply::Print(format!("No session {}", target))
                }
            }
            ":record" if arg == "on" => {
                let path = parts
                    .get(2)
                    .ok_or_else(|| anyhow!("Usage: :record on <file>"))?;
                self.recorder.start_recording(path)?;
                Reply::Print(format!("Recording to {}", path))
            }
            ":record" if arg == "off" => {
                self.recorder.stop_recording();
                Reply::Print("Stopped recording.".to_string())
            }
            ":help" => Reply::Print(HELP.to_string()),
            ":quit" | ":q" => Reply::Quit,
            _ => Reply::Print(format!("Unrecognized command: {}", line)),
        };
        Ok(reply)
    }
}

pub async fn run(evaluator: &Evaluator, matches: &ArgMatches) -> Result<()> {
    let session = matches
        .get_one::<String>("session")
        .cloned()
        .unwrap_or_else(|| evaluator.config().session.default_name.clone());
    let mut state = ReplState::new(session);
    let mut rl = Editor::<()>::new()?;

    if !matches.get_flag("quiet") {
        println!("perl6-babel REPL (session {}, :help for commands)", state.session);
    }

    loop {
        let readline = tokio::task::block_in_place(|| rl.readline("p6> "));
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str());
        state.recorder.record_command(&line);

        match state.dispatch(evaluator, &line).await {
            Ok(Reply::Print(msg)) => {
                println!("{}", msg);
                state.recorder.record_output(&msg);
            }
            Ok(Reply::Quit) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                state.recorder.record_output(&e.to_string());
            }
        }
    }
    Ok(())
}
