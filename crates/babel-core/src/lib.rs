//! Perl 6 code-block evaluation for document hosts
//!
//! Evaluates code either in a persistent interpreter session, synchronized
//! with an out-of-band sentinel, or in a one-shot process, and decodes the
//! interpreter's literal output into a [`ResultValue`].

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod external;
pub mod literal;
pub mod session;
pub mod value;

pub use channel::{ChannelSpawner, InteractiveChannel, OutputBuffer, ProcessChannel, ProcessSpawner};
pub use config::{BabelConfig, ConfigError, LogFormat};
pub use driver::{CancelToken, ReplDriver, ResultMode};
pub use error::{BabelError, ParseError, Result};
pub use evaluator::{EvalRequest, Evaluation, Evaluator};
pub use external::ExternalEvaluator;
pub use literal::{parse_result, try_parse_result, LiteralForm};
pub use session::{canonicalize, Session, SessionInfo, SessionRegistry, NO_SESSION};
pub use value::{ResultValue, ScalarKind, TableRow};
