//! Integration tests for the remote backend and provisioning client.

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use scopestate_backend::{
    Backend, BackendError, CreateDatabaseOptions, RemoteApi, RemoteBackend, SqlValue, Statement,
};
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn api_for(server: &MockServer) -> RemoteApi {
    RemoteApi::new(&server.base_url(), "acc", "secret-token").unwrap()
}

#[tokio::test]
async fn test_execute_sends_statement_and_translates_rows() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/accounts/acc/d1/database/db-1/raw")
                .header("authorization", "Bearer secret-token")
                .json_body(json!({
                    "sql": "SELECT id, seq FROM resources WHERE scope = ?",
                    "params": ["[\"app\"]"]
                }));
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": [{
                    "results": {
                        "columns": ["id", "seq"],
                        "rows": [["a", 1], ["b", 2]]
                    }
                }]
            }));
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1");
    let rows = backend
        .execute(
            &Statement::new("SELECT id, seq FROM resources WHERE scope = ?").bind("[\"app\"]"),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].text(0).unwrap(), "a");
    assert_eq!(rows[1].get(1).unwrap(), &SqlValue::Integer(2));
}

#[tokio::test]
async fn test_failure_aggregates_every_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/accounts/acc/d1/database/db-1/raw");
            then.status(400).json_body(json!({
                "success": false,
                "result": null,
                "errors": [
                    {"code": 7500, "message": "no such table: resources"},
                    {"code": 7401, "message": "query aborted"}
                ]
            }));
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1");
    let err = backend
        .execute(&Statement::new("SELECT * FROM resources"))
        .await
        .unwrap_err();

    match &err {
        BackendError::Remote { status, errors } => {
            assert_eq!(*status, 400);
            assert_eq!(errors.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("7500: no such table: resources"));
    assert!(msg.contains("7401: query aborted"));
}

#[tokio::test]
async fn test_unsuccessful_body_with_ok_status_is_an_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/accounts/acc/d1/database/db-1/raw");
            then.status(200).json_body(json!({
                "success": false,
                "errors": [{"code": 7500, "message": "FOREIGN KEY constraint failed"}]
            }));
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1");
    let err = backend
        .execute(&Statement::new("INSERT INTO resources (id) VALUES ('x')"))
        .await
        .unwrap_err();
    assert!(err.is_foreign_key_violation());
}

#[tokio::test]
async fn test_missing_result_is_reported() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/accounts/acc/d1/database/db-1/raw");
            then.status(200)
                .json_body(json!({"success": true, "errors": [], "result": []}));
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1");
    let err = backend
        .execute(&Statement::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::MissingResult(_)));
}

#[tokio::test]
async fn test_batch_sends_one_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/accounts/acc/d1/database/db-1/raw")
                .json_body(json!({
                    "batch": [
                        {"sql": "CREATE TABLE IF NOT EXISTS t (id TEXT)", "params": []},
                        {"sql": "SELECT 1", "params": []}
                    ]
                }));
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": [
                    {"results": {"columns": [], "rows": []}},
                    {"results": {"columns": ["1"], "rows": [[1]]}}
                ]
            }));
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1");
    let results = backend
        .batch(&[
            Statement::new("CREATE TABLE IF NOT EXISTS t (id TEXT)"),
            Statement::new("SELECT 1"),
        ])
        .await
        .unwrap();

    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(results.len(), 2);
    assert_eq!(results[1][0].integer(0).unwrap(), 1);
}

#[tokio::test]
async fn test_batch_over_limit_rejected_without_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;

    let backend = RemoteBackend::new(api_for(&server), "db-1").with_max_batch_statements(1);
    let err = backend
        .batch(&[Statement::new("SELECT 1"), Statement::new("SELECT 2")])
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Config(_)));
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn test_list_databases_filters_exact_name() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/accounts/acc/d1/database")
                .query_param("name", "state");
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": [
                    {"uuid": "u-1", "name": "state"},
                    {"uuid": "u-2", "name": "state-archive"}
                ]
            }));
        })
        .await;

    let databases = api_for(&server)
        .list_databases_by_name("state")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].uuid, "u-1");
}

#[tokio::test]
async fn test_create_database_disables_read_replication() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/accounts/acc/d1/database")
                .json_body(json!({"name": "state", "read_replication": {"mode": "disabled"}}));
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": {"uuid": "new-db", "name": "state"}
            }));
        })
        .await;

    let created = api_for(&server)
        .create_database("state", &CreateDatabaseOptions::default())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(created.uuid.as_deref(), Some("new-db"));
}

#[tokio::test]
async fn test_non_json_error_body_kept_in_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/accounts/acc/d1/database");
            then.status(502).body("bad gateway");
        })
        .await;

    let err = api_for(&server)
        .list_databases_by_name("state")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("bad gateway"));
}
