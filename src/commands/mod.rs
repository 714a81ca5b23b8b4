pub mod eval;
pub mod recorder;
pub mod repl;
pub mod serve;
