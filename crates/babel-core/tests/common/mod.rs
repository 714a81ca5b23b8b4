#![allow(dead_code)]

use babel_core::BabelConfig;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub fn read_file(path: &str) -> String {
    fs::read_to_string(Path::new(path)).expect("Failed to read file")
}

/// `/bin/sh` standing in for the interpreter: it reads commands from a pipe
/// without prompts or echo, and the one-shot wrapper captures the body's
/// output into the result file.
pub fn sh_config() -> BabelConfig {
    let mut config = BabelConfig::default();
    config.interpreter.command = "sh".to_string();
    config.interpreter.repl_args = Vec::new();
    config.interpreter.print_template = "echo {sentinel}".to_string();
    config.interpreter.wrapper_template =
        "printf '%s\\n' \"$({body})\" > '{out_file}'\n".to_string();
    config.session.eval_timeout = Duration::from_secs(10);
    config.session.poll_interval = Duration::from_millis(10);
    config.external.max_runtime = Duration::from_secs(10);
    config
}
