//! `perl6-babel eval` subcommand: evaluate one code block.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use babel_core::{EvalRequest, Evaluation, Evaluator, ResultMode, ResultValue};
use clap::ArgMatches;

/// Run one evaluation and print its result to stdout.
pub async fn run(evaluator: &Evaluator, matches: &ArgMatches) -> Result<()> {
    let body = read_body(matches)?;
    let request = build_request(body, matches)?;
    let evaluation = evaluator.evaluate(&request).await?;

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("json");
    println!("{}", render(&evaluation, request.mode, format)?);
    Ok(())
}

fn read_body(matches: &ArgMatches) -> Result<String> {
    if let Some(file) = matches.get_one::<String>("file") {
        return std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file));
    }
    if let Some(code) = matches.get_one::<String>("code") {
        return Ok(code.clone());
    }
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read code block from stdin")?;
    Ok(body)
}

fn build_request(body: String, matches: &ArgMatches) -> Result<EvalRequest> {
    let mode: ResultMode = matches
        .get_one::<String>("results")
        .map(|s| s.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();

    let mut request = EvalRequest::new(body).mode(mode);
    if let Some(session) = matches.get_one::<String>("session") {
        request = request.session(session.as_str());
    }
    if let Some(document) = matches.get_one::<String>("document") {
        request = request.document(document.as_str());
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        request = request.timeout(Duration::from_secs(*secs));
    }
    Ok(request)
}

fn render(evaluation: &Evaluation, mode: ResultMode, format: &str) -> Result<String> {
    match (format, mode, &evaluation.value) {
        ("literal", ResultMode::Output, ResultValue::Scalar { text, .. }) => Ok(text.clone()),
        ("literal", _, value) => Ok(value.to_literal()),
        (_, _, value) => Ok(serde_json::to_string_pretty(&value.to_json())?),
    }
}
