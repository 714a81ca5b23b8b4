#![cfg(unix)]

mod common;

use std::time::Duration;

use babel_core::{BabelError, CancelToken, EvalRequest, Evaluator, ResultMode, ResultValue};

fn evaluator() -> Evaluator {
    Evaluator::new(common::sh_config()).expect("sh configuration is valid")
}

#[tokio::test]
async fn test_value_is_last_line() {
    let evaluator = evaluator();
    let request = EvalRequest::new("echo first\necho '$[1, 2, 3]'").session("values");
    let evaluation = evaluator.evaluate(&request).await.unwrap();

    assert_eq!(evaluation.raw, "$[1, 2, 3]");
    assert_eq!(
        evaluation.value,
        ResultValue::Sequence(vec![
            ResultValue::number("1"),
            ResultValue::number("2"),
            ResultValue::number("3"),
        ])
    );
    assert_eq!(evaluation.session.as_deref(), Some("*values*"));
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_output_joins_lines() {
    let evaluator = evaluator();
    let request = EvalRequest::new("echo one; echo; echo two")
        .session("output")
        .mode(ResultMode::Output);
    let evaluation = evaluator.evaluate(&request).await.unwrap();

    assert_eq!(evaluation.raw, "one\n\ntwo");
    assert_eq!(evaluation.value, ResultValue::string("one\n\ntwo"));
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_state_persists_within_a_session() {
    let evaluator = evaluator();
    evaluator
        .load("greeting=hello", Some("state"), None)
        .await
        .unwrap();
    let request = EvalRequest::new("echo \"$greeting\"").session("*state*");
    let evaluation = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(evaluation.raw, "hello");

    let other = EvalRequest::new("echo \"[$greeting]\"").session("elsewhere");
    let evaluation = evaluator.evaluate(&other).await.unwrap();
    assert_eq!(evaluation.raw, "[]");
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_ensure_reuses_then_replaces_dead_session() {
    let evaluator = evaluator();
    let registry = evaluator.registry();

    let id = registry.ensure(Some("life"), "doc").await.unwrap().unwrap();
    let handle = registry.lookup(&id).await.unwrap().handle_id();
    let again = registry.ensure(Some("life"), "doc").await.unwrap().unwrap();
    assert_eq!(again, id);
    assert_eq!(registry.lookup(&id).await.unwrap().handle_id(), handle);

    let request = EvalRequest::new("exit 0").session("life");
    let err = evaluator.evaluate(&request).await.unwrap_err();
    assert!(matches!(err, BabelError::SessionClosed { .. }), "got {:?}", err);

    // Give the reaper a moment to observe the exit.
    let session = registry.lookup(&id).await.unwrap();
    for _ in 0..50 {
        if !session.channel().is_alive().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let request = EvalRequest::new("echo back").session("life");
    let evaluation = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(evaluation.raw, "back");
    assert_ne!(registry.lookup(&id).await.unwrap().handle_id(), handle);
    assert_eq!(evaluator.sessions().await.len(), 1);
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_session_timeout_and_recovery() {
    let evaluator = evaluator();
    let slow = EvalRequest::new("sleep 1")
        .session("slow")
        .timeout(Duration::from_millis(200));
    let err = evaluator.evaluate(&slow).await.unwrap_err();
    assert!(matches!(err, BabelError::SentinelTimeout { .. }), "got {:?}", err);

    // Let the late sentinel land before the next flush starts.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let next = EvalRequest::new("echo ready").session("slow");
    let evaluation = evaluator.evaluate(&next).await.unwrap();
    assert_eq!(evaluation.raw, "ready");
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_evaluation() {
    let evaluator = evaluator();
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let request = EvalRequest::new("sleep 2").session("cancel");
    let err = evaluator
        .evaluate_with_cancel(&request, Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, BabelError::Cancelled { .. }), "got {:?}", err);
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_on_one_session_queue() {
    let evaluator = std::sync::Arc::new(evaluator());
    let mut handles = Vec::new();
    for i in 0..4 {
        let evaluator = evaluator.clone();
        handles.push(tokio::spawn(async move {
            let request = EvalRequest::new(format!("echo {}", i)).session("shared");
            evaluator.evaluate(&request).await.unwrap().raw
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results, vec!["0", "1", "2", "3"]);
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_one_shot_value_and_output() {
    let evaluator = evaluator();

    let value = evaluator
        .evaluate(&EvalRequest::new("echo '{a => 1, b => \"x\"}'"))
        .await
        .unwrap();
    assert_eq!(
        value.value,
        ResultValue::Mapping(vec![
            ("a".to_string(), ResultValue::number("1")),
            ("b".to_string(), ResultValue::string("x")),
        ])
    );
    assert!(value.session.is_none());

    let output = evaluator
        .evaluate(&EvalRequest::new("echo hi").session("none").mode(ResultMode::Output))
        .await
        .unwrap();
    assert_eq!(output.raw, "hi\n");
    assert_eq!(output.value, ResultValue::string("hi"));
    assert!(evaluator.sessions().await.is_empty());
}

#[tokio::test]
async fn test_one_shot_failure_reports_stderr() {
    let evaluator = evaluator();
    let err = evaluator
        .evaluate(&EvalRequest::new("echo 'syntax trouble' >&2; exit 2").mode(ResultMode::Output))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "syntax trouble\n");
}

#[tokio::test]
async fn test_output_without_trailing_newline() {
    let evaluator = evaluator();
    let request = EvalRequest::new("printf abc")
        .session("nonl")
        .timeout(Duration::from_secs(2));
    let evaluation = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(evaluation.raw, "abc");

    let request = request.mode(ResultMode::Output);
    let evaluation = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(evaluation.value, ResultValue::string("abc"));
    evaluator.shutdown().await;
}

#[tokio::test]
async fn test_stderr_stays_with_its_evaluation() {
    let evaluator = evaluator();
    for round in 0..100 {
        let request = EvalRequest::new("echo oops >&2")
            .session("diagnostics")
            .mode(ResultMode::Output);
        let evaluation = evaluator.evaluate(&request).await.unwrap();
        assert_eq!(evaluation.raw, "oops", "round {}", round);
    }

    let request = EvalRequest::new("echo out; echo err >&2; echo more")
        .session("diagnostics")
        .mode(ResultMode::Output);
    let evaluation = evaluator.evaluate(&request).await.unwrap();
    assert_eq!(evaluation.raw, "out\nerr\nmore");
    evaluator.shutdown().await;
}
