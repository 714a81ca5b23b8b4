use anyhow::Result;
use babel_proto::{CommandLog, OutputLog};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Appends REPL input and output to a JSON-lines transcript.
#[derive(Default)]
pub struct Recorder {
    file: Option<File>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_recording(&mut self, path: &str) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        self.file = None;
    }

    pub fn is_recording(&self) -> bool {
        self.file.is_some()
    }

    pub fn record_command(&mut self, command: &str) {
        let log = CommandLog {
            timestamp: Utc::now().to_rfc3339(),
            command: command.to_string(),
        };
        self.write(&log);
    }

    pub fn record_output(&mut self, output: &str) {
        let log = OutputLog {
            timestamp: Utc::now().to_rfc3339(),
            output: output.to_string(),
        };
        self.write(&log);
    }

    fn write<T: serde::Serialize>(&mut self, entry: &T) {
        if let Some(file) = &mut self.file {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(file, "{}", json).ok();
            }
        }
    }
}
