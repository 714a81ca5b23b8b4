//! `perl6-babel serve`: JSON-RPC over stdio, one message per line.

use std::time::Duration;

use anyhow::Result;
use babel_core::{EvalRequest, Evaluator};
use babel_proto::{
    ErrorObject, ErrorResponse, EvaluateParams, EvaluateResult, KillParams, KillResult,
    LoadParams, LoadResult, Request, Response, SessionsResult, EVALUATION_FAILED, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(evaluator: &Evaluator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(evaluator, &line).await?;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    tracing::debug!("stdin closed; leaving serve loop");
    Ok(())
}

/// Answer one request line with one response line.
pub async fn handle_line(evaluator: &Evaluator, line: &str) -> Result<String> {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let error = ErrorObject::new(PARSE_ERROR, "Parse error").with_data(e.to_string());
            return error_json(0, error);
        }
    };
    tracing::debug!("request {} {}", request.id, request.method);

    match request.method.as_str() {
        "evaluate" => {
            let params: EvaluateParams = match decode_params(&request) {
                Ok(p) => p,
                Err(error) => return error_json(request.id, error),
            };
            let mut eval = EvalRequest::new(params.body).mode(params.result_type.unwrap_or_default());
            eval.session = params.session;
            eval.document = params.document;
            eval.timeout = params.timeout_ms.map(Duration::from_millis);

            match evaluator.evaluate(&eval).await {
                Ok(evaluation) => {
                    let result = EvaluateResult {
                        raw: evaluation.raw,
                        json: evaluation.value.to_json(),
                        value: evaluation.value,
                        session: evaluation.session,
                    };
                    result_json(request.id, &result)
                }
                Err(e) => error_json(request.id, ErrorObject::new(EVALUATION_FAILED, e.to_string())),
            }
        }
        "load" => {
            let params: LoadParams = match decode_params(&request) {
                Ok(p) => p,
                Err(error) => return error_json(request.id, error),
            };
            match evaluator
                .load(&params.body, params.session.as_deref(), params.document.as_deref())
                .await
            {
                Ok(session) => result_json(request.id, &LoadResult { session }),
                Err(e) => error_json(request.id, ErrorObject::new(EVALUATION_FAILED, e.to_string())),
            }
        }
        "sessions" => {
            let sessions = evaluator.sessions().await;
            result_json(request.id, &SessionsResult { sessions })
        }
        "kill" => {
            let params: KillParams = match decode_params(&request) {
                Ok(p) => p,
                Err(error) => return error_json(request.id, error),
            };
            let removed = evaluator.kill(&params.session).await;
            result_json(request.id, &KillResult { removed })
        }
        _ => error_json(request.id, ErrorObject::new(METHOD_NOT_FOUND, "Method not found")),
    }
}

fn decode_params<T: DeserializeOwned>(request: &Request) -> std::result::Result<T, ErrorObject> {
    serde_json::from_value(request.params.clone())
        .map_err(|e| ErrorObject::new(INVALID_PARAMS, "Invalid params").with_data(e.to_string()))
}

fn result_json<T: serde::Serialize>(id: u64, result: &T) -> Result<String> {
    Ok(serde_json::to_string(&Response {
        id,
        result: serde_json::to_value(result)?,
    })?)
}

fn error_json(id: u64, error: ErrorObject) -> Result<String> {
    Ok(serde_json::to_string(&ErrorResponse { id, error })?)
}
