//! Evaluation facade
//!
//! Owns the session registry, the REPL driver and the one-shot evaluator,
//! and routes each request to one of them.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelSpawner, ProcessSpawner};
use crate::config::BabelConfig;
use crate::driver::{CancelToken, ReplDriver, ResultMode};
use crate::error::{BabelError, Result};
use crate::external::ExternalEvaluator;
use crate::literal::parse_result;
use crate::session::{SessionInfo, SessionRegistry, NO_SESSION};
use crate::value::ResultValue;

/// One code block to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalRequest {
    pub body: String,
    /// `None` or `"none"` runs one-shot; an empty id uses the document's session.
    pub session: Option<String>,
    pub mode: ResultMode,
    /// Name of the calling document, the fallback session name.
    pub document: Option<String>,
    pub timeout: Option<Duration>,
}

impl EvalRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn mode(mut self, mode: ResultMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw interpreter text and the value decoded from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub raw: String,
    pub value: ResultValue,
    /// Canonical id of the session used, if any.
    pub session: Option<String>,
}

pub struct Evaluator {
    config: BabelConfig,
    registry: SessionRegistry,
    driver: ReplDriver,
    external: ExternalEvaluator,
}

impl Evaluator {
    /// Build an evaluator that starts real interpreter processes.
    pub fn new(config: BabelConfig) -> Result<Self> {
        let spawner = Arc::new(ProcessSpawner::new(config.interpreter.clone()));
        Self::with_spawner(config, spawner)
    }

    pub fn with_spawner(config: BabelConfig, spawner: Arc<dyn ChannelSpawner>) -> Result<Self> {
        config.validate()?;
        let registry = SessionRegistry::new(spawner, config.session.boundary_marker);
        let driver = ReplDriver::new(&config.interpreter, &config.session)?;
        let external = ExternalEvaluator::new(&config.interpreter, &config.external);
        Ok(Self {
            config,
            registry,
            driver,
            external,
        })
    }

    pub fn config(&self) -> &BabelConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn evaluate(&self, request: &EvalRequest) -> Result<Evaluation> {
        self.evaluate_with_cancel(request, None).await
    }

    /// Evaluate `request`, giving up early when `cancel` fires.
    pub async fn evaluate_with_cancel(
        &self,
        request: &EvalRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<Evaluation> {
        let session = match request.session.as_deref() {
            None => None,
            Some(id) => self.resolve(id, request.document.as_deref()).await?,
        };

        let raw = match &session {
            Some(id) => {
                let timeout = request.timeout.unwrap_or(self.driver.timeout());
                self.run_in_session(id, &request.body, request.mode, cancel, timeout)
                    .await?
            }
            None => {
                let max_runtime = request.timeout.unwrap_or(self.external.max_runtime());
                self.external
                    .evaluate_within(&request.body, request.mode, max_runtime)
                    .await?
            }
        };

        let value = match request.mode {
            ResultMode::Value => parse_result(&raw),
            ResultMode::Output => ResultValue::string(raw.trim_end_matches(['\n', '\r'])),
        };
        Ok(Evaluation {
            raw,
            value,
            session,
        })
    }

    /// Send `body` into a session without producing a result. Returns the
    /// canonical session id.
    pub async fn load(
        &self,
        body: &str,
        session: Option<&str>,
        document: Option<&str>,
    ) -> Result<String> {
        let id = self
            .resolve(session.unwrap_or(""), document)
            .await?
            .ok_or_else(|| BabelError::SessionNotFound {
                session: NO_SESSION.to_string(),
            })?;
        self.run_in_session(&id, body, ResultMode::Output, None, self.driver.timeout())
            .await?;
        tracing::debug!("Loaded {} bytes into session {}", body.len(), id);
        Ok(id)
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.sessions().await
    }

    /// Terminate one session. Returns whether it existed.
    pub async fn kill(&self, session: &str) -> bool {
        self.registry.remove(session).await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    async fn resolve(&self, id: &str, document: Option<&str>) -> Result<Option<String>> {
        let fallback = document.unwrap_or(&self.config.session.default_name);
        let id = Some(id.trim()).filter(|id| !id.is_empty());
        self.registry.ensure(id, fallback).await
    }

    async fn run_in_session(
        &self,
        id: &str,
        body: &str,
        mode: ResultMode,
        cancel: Option<&CancelToken>,
        timeout: Duration,
    ) -> Result<String> {
        let session = self
            .registry
            .lookup(id)
            .await
            .ok_or_else(|| BabelError::SessionNotFound {
                session: id.to_string(),
            })?;
        let _guard = session.lock().await;
        let channel = session.channel();
        self.driver
            .evaluate_within(id, channel.as_ref(), body, mode, cancel, timeout)
            .await
    }
}
