mod common;
use common::{failed_job, job, FakeJobApi};

use dremioai::app::App;
use dremioai::errors::ToolErrorKind;
use dremioai::services::settings::Settings;
use serde_json::json;
use std::sync::Arc;

fn build_app(allow_dml: bool) -> App {
    let mut settings = Settings::default();
    settings.engine.poll_interval_ms = 1;
    settings.connection.allow_dml = allow_dml;
    App::initialize(settings).expect("app")
}

#[tokio::test]
async fn run_sql_query_returns_rows_columns_and_dtypes() {
    let app = build_app(false);
    let api = Arc::new(
        FakeJobApi::new("job-sql")
            .with_states(vec![job("RUNNING", None), job("COMPLETED", Some(2))])
            .with_table_rows(2),
    );
    let ctx = app.tool_executor.context().with_job_api(api.clone());

    let envelope = app
        .tool_executor
        .execute_with(&ctx, "RunSqlQuery", json!({"sql": "SELECT id, created_at FROM t"}))
        .await
        .expect("run");

    let result = &envelope["result"];
    assert_eq!(result["row_count"], json!(2));
    assert_eq!(result["columns"], json!(["id", "created_at"]));
    assert_eq!(result["dtypes"], json!({"id": "BIGINT", "created_at": "TIMESTAMP"}));
    assert_eq!(result["rows"][1]["id"], json!(1));
    assert_eq!(result["rows"][0]["created_at"], json!("2025-05-01T10:00:00+00:00"));

    assert_eq!(envelope["meta"]["tool"], json!("RunSqlQuery"));
    assert!(envelope["meta"]["trace_id"].as_str().map(|id| !id.is_empty()).unwrap_or(false));
    assert_eq!(
        api.submitted_sql(),
        vec!["/* dremioai: submitter=RunSqlQuery */\nSELECT id, created_at FROM t".to_string()]
    );
}

#[tokio::test]
async fn mutations_are_refused_unless_enabled() {
    let app = build_app(false);
    let api = Arc::new(FakeJobApi::new("job-dml").with_states(vec![job("COMPLETED", Some(0))]));
    let ctx = app.tool_executor.context().with_job_api(api.clone());

    let err = app
        .tool_executor
        .execute_with(&ctx, "RunSqlQuery", json!({"sql": "DROP TABLE t"}))
        .await
        .expect_err("rejected");
    assert_eq!(err.kind, ToolErrorKind::Denied);
    assert_eq!(err.code, "UNSAFE_QUERY");
    assert!(api.submitted_sql().is_empty());

    let permissive = build_app(true);
    let ctx = permissive.tool_executor.context().with_job_api(api.clone());
    let envelope = permissive
        .tool_executor
        .execute_with(&ctx, "RunSqlQuery", json!({"sql": "DROP TABLE t"}))
        .await
        .expect("allowed");
    assert_eq!(envelope["result"]["row_count"], json!(0));
    assert_eq!(api.submitted_sql().len(), 1);
}

#[tokio::test]
async fn failed_jobs_come_back_as_data() {
    let app = build_app(false);
    let api = Arc::new(
        FakeJobApi::new("job-bad").with_states(vec![failed_job(
            "FAILED",
            Some("Column 'x' not found"),
            None,
        )]),
    );
    let ctx = app.tool_executor.context().with_job_api(api);

    let envelope = app
        .tool_executor
        .execute_with(&ctx, "RunSqlQuery", json!({"sql": "SELECT x FROM t"}))
        .await
        .expect("payload");
    assert_eq!(
        envelope["result"],
        json!({
            "error": "Job job-bad failed: Column 'x' not found",
            "message": "The query failed. Please check the syntax and try again",
        })
    );
}

#[tokio::test]
async fn arguments_are_validated_before_dispatch() {
    let app = build_app(false);
    let api = Arc::new(FakeJobApi::new("job-none"));
    let ctx = app.tool_executor.context().with_job_api(api.clone());

    let err = app
        .tool_executor
        .execute_with(&ctx, "RunSqlQuery", json!({}))
        .await
        .expect_err("missing sql");
    assert_eq!(err.kind, ToolErrorKind::InvalidParams);
    assert!(err.message.contains("Invalid arguments for RunSqlQuery"));
    assert!(api.submitted_sql().is_empty());
}

#[tokio::test]
async fn static_tools_answer_without_a_cluster() {
    let app = build_app(false);
    let envelope = app
        .tool_executor
        .execute("GetNameOfJobsRecentTable", serde_json::Value::Null)
        .await
        .expect("name");
    assert_eq!(envelope["result"], json!({"name": "sys.jobs_recent"}));

    let hints = app
        .tool_executor
        .read_resource("dremio://hints")
        .await
        .expect("hints");
    assert!(hints["result"].as_str().unwrap_or_default().starts_with("Dremio cluster"));
}

#[tokio::test]
async fn catalog_calls_without_uri_are_not_configured() {
    let app = build_app(false);
    let err = app
        .tool_executor
        .execute("GetSchemaOfTable", json!({"table_name": "space.t"}))
        .await
        .expect_err("no uri");
    assert_eq!(err.code, "NOT_CONFIGURED");
    assert_eq!(err.kind, ToolErrorKind::Denied);
}
