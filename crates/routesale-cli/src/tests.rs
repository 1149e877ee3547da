use std::path::PathBuf;

use chrono::{Duration, Utc};
use routesale_core::models::{CustomerId, OrderId, OrderStatus, QueuedOperation};
use routesale_core::{EngineConfig, Role};
use serde_json::json;
use tempfile::TempDir;

use crate::cli::{CompletionShell, GuardArgs, OrderCommands};
use crate::commands::common::{
    format_queue_lines, parse_date, parse_id, parse_since, version_guard, Session,
};
use crate::commands::completions::render_completions;
use crate::commands::order::{create_order, list_orders, run_order, with_manager};
use crate::commands::queue::{enqueue_operation, flush_queue, open_queue};
use crate::commands::sync::{fetch_changes, push_batch};
use crate::error::CliError;

fn session_in(dir: &TempDir, role: Option<&str>) -> Session {
    Session::new(
        dir.path().join("routesale.db"),
        EngineConfig::default(),
        Some("biz-1".to_string()),
        Some("seller-1".to_string()),
        role.map(str::to_string),
    )
}

fn push_customer(session: &Session) -> CustomerId {
    let batch = json!([{
        "operationId": "op-customer",
        "entity": "customers",
        "action": "insert",
        "entityId": "tmp_customer",
        "payload": {"name": "Corner Store"},
        "clientTimestamp": "2026-10-18T08:00:00Z"
    }]);
    let response = push_batch(session, &batch.to_string()).unwrap();
    assert_eq!(response.summary.succeeded, 1, "{:?}", response.results);
    response.results[0]
        .entity_id
        .as_deref()
        .unwrap()
        .parse()
        .unwrap()
}

fn create_request(customer_id: CustomerId) -> String {
    let delivery_date = (Utc::now() + Duration::days(2)).date_naive();
    json!({
        "customerId": customer_id,
        "deliveryDate": delivery_date,
        "items": [
            {"variantId": "bread-500g", "quantity": 4, "unitPrice": 10},
            {"variantId": "milk-1l", "quantity": 2, "unitPrice": 5}
        ]
    })
    .to_string()
}

#[test]
fn parse_id_rejects_non_uuid_values() {
    let parsed: Result<OrderId, CliError> = parse_id("order", "not-an-id");
    assert!(matches!(
        parsed,
        Err(CliError::InvalidId { kind: "order", .. })
    ));
}

#[test]
fn parse_since_accepts_rfc3339_only() {
    let since = parse_since(Some("2026-10-18T08:00:00+02:00")).unwrap().unwrap();
    assert_eq!(since.to_rfc3339(), "2026-10-18T06:00:00+00:00");
    assert!(parse_since(None).unwrap().is_none());
    assert!(matches!(
        parse_since(Some("yesterday")),
        Err(CliError::InvalidTimestamp(_))
    ));
}

#[test]
fn parse_date_requires_iso_dates() {
    assert_eq!(parse_date("2026-10-20").unwrap().to_string(), "2026-10-20");
    assert!(matches!(parse_date("20/10/2026"), Err(CliError::InvalidDate(_))));
}

#[test]
fn version_guard_carries_event_id() {
    let guard = version_guard(&GuardArgs {
        base_version: 3,
        event_id: Some("evt-1".to_string()),
    });
    assert_eq!(guard.base_version, 3);
    assert_eq!(guard.client_event_id.as_deref(), Some("evt-1"));
}

#[test]
fn session_context_requires_business_and_user() {
    let session = Session::new(
        PathBuf::from("unused.db"),
        EngineConfig::default(),
        None,
        Some("seller-1".to_string()),
        None,
    );
    assert!(matches!(session.context(), Err(CliError::Config(_))));

    let session = Session::new(
        PathBuf::from("unused.db"),
        EngineConfig::default(),
        Some("biz-1".to_string()),
        Some("seller-1".to_string()),
        Some("Viewer".to_string()),
    );
    assert_eq!(session.context().unwrap().role, Role::Viewer);
}

#[test]
fn completions_name_the_binary() {
    for shell in [CompletionShell::Bash, CompletionShell::Zsh, CompletionShell::Fish] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("routesale"), "{shell:?}");
    }
}

#[test]
fn queue_lines_show_last_error() {
    let operation = QueuedOperation {
        seq: 7,
        id: "op-7".to_string(),
        entity: "payments".parse().unwrap(),
        action: "insert".parse().unwrap(),
        entity_id: "tmp_p".to_string(),
        payload: json!({}),
        client_timestamp: Utc::now(),
        attempts: 2,
        last_error: Some("sale not found".to_string()),
    };
    let lines = format_queue_lines(&[operation]);
    assert_eq!(
        lines,
        vec!["#7  insert payments tmp_p  attempts 2  last error: sale not found".to_string()]
    );
}

#[test]
fn pushed_batch_shows_up_in_change_feed() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir, None);
    let customer_id = push_customer(&session);

    let page = fetch_changes(&session, None, Some(10)).unwrap();
    assert_eq!(page.changes.len(), 1);
    assert_eq!(page.changes[0].entity_id, customer_id.to_string());

    let cursor = page.next_since.unwrap().to_rfc3339();
    let next = fetch_changes(&session, Some(&cursor), Some(10)).unwrap();
    assert!(next.changes.is_empty());
}

#[test]
fn order_commands_drive_the_lifecycle() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir, None);
    let customer_id = push_customer(&session);

    let order = create_order(&session, &create_request(customer_id)).unwrap();
    assert_eq!(order.status, OrderStatus::Draft);
    assert_eq!(order.total_amount, 50);

    run_order(
        &session,
        OrderCommands::Confirm {
            id: order.id.to_string(),
            guard: GuardArgs {
                base_version: 1,
                event_id: None,
            },
        },
    )
    .unwrap();

    let confirmed = list_orders(&session, Some("confirmed"), None, None, 10, 0).unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].version, 2);
    assert!(list_orders(&session, Some("draft"), None, None, 10, 0)
        .unwrap()
        .is_empty());

    let events = with_manager(&session, |manager, db, ctx| {
        manager.events(db, ctx, &order.id)
    })
    .unwrap();
    assert_eq!(events.len(), 2);
}

#[test]
fn stale_version_surfaces_conflict() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir, None);
    let customer_id = push_customer(&session);
    let order = create_order(&session, &create_request(customer_id)).unwrap();

    let result = run_order(
        &session,
        OrderCommands::Cancel {
            id: order.id.to_string(),
            guard: GuardArgs {
                base_version: 5,
                event_id: None,
            },
        },
    );
    assert!(matches!(
        result,
        Err(CliError::Core(routesale_core::Error::Conflict { .. }))
    ));
}

#[test]
fn viewer_cannot_create_orders() {
    let dir = TempDir::new().unwrap();
    let customer_id = push_customer(&session_in(&dir, None));
    let viewer = session_in(&dir, Some("viewer"));

    let result = create_order(&viewer, &create_request(customer_id));
    assert!(matches!(
        result,
        Err(CliError::Core(routesale_core::Error::Forbidden(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn flush_pushes_queue_and_pulls_changes() {
    let dir = TempDir::new().unwrap();
    let session = session_in(&dir, None);
    let queue = open_queue(&session).unwrap();

    enqueue_operation(&queue, "customers", "insert", None, json!({"name": "Kiosk"}))
        .await
        .unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    let summary = flush_queue(&session, queue, true).await.unwrap();
    assert_eq!(summary.report.attempted, 1);
    assert_eq!(summary.report.succeeded, 1);
    assert_eq!(summary.remaining, 0);
    assert_eq!(summary.pulled, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_rejects_unknown_entity() {
    let dir = TempDir::new().unwrap();
    let queue = open_queue(&session_in(&dir, None)).unwrap();

    let result = enqueue_operation(&queue, "invoices", "insert", None, json!({})).await;
    assert!(matches!(
        result,
        Err(CliError::Core(routesale_core::Error::Validation(_)))
    ));
}
