use agent_run::engine::{AgentBackend, Executor, HttpBackend};
use agent_run::error::{classify, AgentError, ClassifyContext, ErrorKind, FailureCause};
use agent_run::model::{OutputFormat, RunEvent, RunRequest, RunResult, RunStep, Tone};
use agent_run::orchestrator::{RunController, DEFAULT_RUN_TIMEOUT};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn backend(base: &Url) -> HttpBackend {
    HttpBackend::new(base, "agent-run-tests").unwrap()
}

fn request() -> RunRequest {
    RunRequest::new("Plan a product launch", OutputFormat::Plan, Tone::Strict)
        .with_constraints(["budget under 10k"])
}

async fn echo_result(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "runId": "remote-1",
        "status": "success",
        "title": body["goal"],
        "summary": format!("{} / {}", body["outputFormat"].as_str().unwrap_or("?"), body["tone"].as_str().unwrap_or("?")),
        "sections": [{ "heading": "Constraints", "content": body["constraints"] }],
        "confidence": 0.7,
        "createdAt": "2026-10-18T12:00:00Z"
    }))
}

fn classified(base: &Url, outcome: Result<RunResult, FailureCause>) -> AgentError {
    let cause = outcome.expect_err("expected a failure");
    classify(cause, &ClassifyContext::with_backend(base.as_str().trim_end_matches('/')))
}

#[tokio::test]
async fn success_body_round_trips_request_fields() {
    let base = serve(Router::new().route("/agent/run", post(echo_result))).await;
    let backend = backend(&base);
    assert!(backend.endpoint().as_str().ends_with("/agent/run"));
    assert!(!backend.endpoint().as_str().contains("//agent"));

    let result = backend.run(&request()).await.unwrap();
    assert_eq!(result.run_id, "remote-1");
    assert_eq!(result.title, "Plan a product launch");
    assert_eq!(result.summary, "plan / strict");
    assert_eq!(result.sections[0].content, vec!["budget under 10k"]);
    assert_eq!(result.confidence, Some(0.7));
}

#[tokio::test]
async fn structured_error_body_keeps_its_code_and_status() {
    let router = Router::new().route(
        "/agent/run",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "model overloaded", "code": "AGENT_ERROR" })),
            )
        }),
    );
    let base = serve(router).await;
    let err = classified(&base, backend(&base).run(&request()).await);
    assert_eq!(err.kind, ErrorKind::AgentError);
    assert_eq!(err.message, "model overloaded");
    assert_eq!(err.status_code, Some(500));
}

#[tokio::test]
async fn bare_error_status_is_api_error() {
    let router = Router::new().route(
        "/agent/run",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let base = serve(router).await;
    let err = classified(&base, backend(&base).run(&request()).await);
    assert_eq!(err.kind, ErrorKind::ApiError);
    assert_eq!(err.status_code, Some(502));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn success_without_identity_is_invalid_response() {
    let router = Router::new().route(
        "/agent/run",
        post(|| async { Json(json!({ "title": "t", "summary": "s", "sections": [] })) }),
    );
    let base = serve(router).await;
    let err = classified(&base, backend(&base).run(&request()).await);
    assert_eq!(err.kind, ErrorKind::InvalidResponse);
}

#[tokio::test]
async fn non_json_success_is_parse_error() {
    let router = Router::new().route("/agent/run", post(|| async { "<html>oops</html>" }));
    let base = serve(router).await;
    let err = classified(&base, backend(&base).run(&request()).await);
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[tokio::test]
async fn refused_connection_names_the_base_url() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let base = Url::parse(&format!("http://{addr}")).unwrap();

    let controller = RunController::new(
        Executor::Delegated(Arc::new(backend(&base))),
        DEFAULT_RUN_TIMEOUT,
    );
    let err = controller.start(request()).finish(|_| {}).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NetworkError);
    assert!(err.message.contains(&addr.to_string()), "{}", err.message);
}

async fn never_answers() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(60)).await;
    Json(json!({}))
}

#[tokio::test]
async fn cancel_abandons_in_flight_request() {
    let base = serve(Router::new().route("/agent/run", post(never_answers))).await;
    let controller = RunController::new(
        Executor::Delegated(Arc::new(backend(&base))),
        DEFAULT_RUN_TIMEOUT,
    );
    let mut handle = controller.start(request());
    match handle.next_event().await {
        Some(RunEvent::Status(s)) => assert_eq!(s.current_step, RunStep::Calling),
        other => panic!("unexpected {other:?}"),
    }
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), handle.finish(|_| {}))
        .await
        .expect("cancel should settle promptly")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn slow_backend_hits_the_run_ceiling() {
    let base = serve(Router::new().route("/agent/run", post(never_answers))).await;
    let controller = RunController::new(
        Executor::Delegated(Arc::new(backend(&base))),
        Duration::from_millis(200),
    );
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        controller.start(request()).finish(|_| {}),
    )
    .await
    .expect("timeout should settle promptly")
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
}
