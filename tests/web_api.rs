//! HTTP surface tests driven through the router with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::{processing_status, test_app, LeadBuilder, RecordingTrigger};
use leadflow_core::models::{LeadSource, StageStatus};
use leadflow_core::store::InMemoryLeadStore;

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn app_with(store: &Arc<InMemoryLeadStore>) -> Router {
    test_app(store, &RecordingTrigger::accepting())
}

#[tokio::test]
async fn health_reports_healthy() {
    let store = Arc::new(InMemoryLeadStore::new());
    let (status, body) = send(app_with(&store), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn options_answers_ok_and_unsupported_methods_get_405() {
    let store = Arc::new(InMemoryLeadStore::new());

    for uri in ["/api/leads", "/api/leads/retry", "/api/metrics/dashboard"] {
        let (status, _) = send(app_with(&store), Method::OPTIONS, uri, None).await;
        assert_eq!(status, StatusCode::OK, "OPTIONS {uri}");
    }

    let (status, body) = send(app_with(&store), Method::DELETE, "/api/leads", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "METHOD_NOT_ALLOWED");

    let (status, _) = send(app_with(&store), Method::GET, "/api/leads/retry", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_route_gets_404_envelope() {
    let store = Arc::new(InMemoryLeadStore::new());
    let (status, body) = send(app_with(&store), Method::GET, "/api/nothing-here", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_leads_paginates_with_derived_status() {
    let store = Arc::new(InMemoryLeadStore::new());
    for _ in 0..3 {
        let lead = LeadBuilder::new(LeadSource::Apollo).build();
        store.insert_processing_status(processing_status(
            &lead,
            StageStatus::Completed,
            StageStatus::Completed,
            StageStatus::Completed,
        ));
        store.insert_lead(lead);
    }
    store.insert_lead(LeadBuilder::new(LeadSource::Linkedin).build());

    let (status, body) = send(
        app_with(&store),
        Method::GET,
        "/api/leads?source=apollo&limit=2",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["overallStatus"], "completed");
    assert_eq!(body["data"][0]["leadSource"], "apollo");
    assert_eq!(body["data"][0]["syncStatus"]["overallSynced"], false);
    assert!(body["data"][0].get("lead_source").is_none());
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["has_more"], true);
}

#[tokio::test]
async fn lead_detail_and_its_errors() {
    let store = Arc::new(InMemoryLeadStore::new());
    let lead = LeadBuilder::new(LeadSource::Linkedin).build();
    let id = lead.id;
    store.insert_lead(lead);

    let (status, body) = send(
        app_with(&store),
        Method::GET,
        &format!("/api/leads/linkedin/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.to_string());
    assert_eq!(body["data"]["overallStatus"], "not_started");
    assert_eq!(body["data"]["syncStatus"]["overallSynced"], false);
    assert_eq!(body["data"]["hasRecentError"], false);
    assert_eq!(body["data"]["recentErrors"], json!([]));

    let (status, _) = send(
        app_with(&store),
        Method::GET,
        &format!("/api/leads/apollo/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app_with(&store), Method::GET, "/api/leads/apollo/nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn retry_with_unknown_leads_returns_404_with_missing_ids() {
    let store = Arc::new(InMemoryLeadStore::new());
    let known = LeadBuilder::new(LeadSource::Apollo).build();
    let known_id = known.id;
    store.insert_lead(known);
    let missing = Uuid::new_v4();

    let (status, body) = send(
        app_with(&store),
        Method::POST,
        "/api/leads/retry",
        Some(json!({
            "leadIds": [known_id, missing],
            "source": "apollo",
            "retryType": "full",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"]["missing_ids"], json!([missing]));
    assert!(store.retry_attempts().is_empty());
}

#[tokio::test]
async fn retry_queues_the_batch() {
    let store = Arc::new(InMemoryLeadStore::new());
    let trigger = RecordingTrigger::accepting();
    let lead = LeadBuilder::new(LeadSource::Apollo).processed().build();
    let id = lead.id;
    store.insert_lead(lead);

    let (status, body) = send(
        test_app(&store, &trigger),
        Method::POST,
        "/api/leads/retry",
        Some(json!({
            "leadIds": [id, id],
            "source": "apollo",
            "retryType": "outreach_only",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queued"], 1);
    assert_eq!(body["data"]["retryType"], "outreach_only");
    assert_eq!(body["data"]["webhook"]["triggered"], true);
    assert_eq!(trigger.payloads().len(), 1);
}

#[tokio::test]
async fn retry_rejects_invalid_input() {
    let store = Arc::new(InMemoryLeadStore::new());

    let cases = [
        json!({ "leadIds": [], "source": "apollo", "retryType": "full" }),
        json!({ "leadIds": [Uuid::new_v4()], "source": "twitter", "retryType": "full" }),
        json!({ "leadIds": [Uuid::new_v4()], "source": "apollo", "retryType": "sometimes" }),
        json!({ "leadIds": ["not-a-uuid"], "source": "apollo", "retryType": "full" }),
    ];
    for case in cases {
        let (status, body) =
            send(app_with(&store), Method::POST, "/api/leads/retry", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn sync_status_requires_emails() {
    let store = Arc::new(InMemoryLeadStore::new());
    store.insert_lead(
        LeadBuilder::new(LeadSource::Apollo)
            .email("ada@example.com")
            .instantly_synced()
            .build(),
    );

    let (status, _) = send(
        app_with(&store),
        Method::POST,
        "/api/leads/sync-status",
        Some(json!({ "emails": ["  ", ""] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app_with(&store),
        Method::POST,
        "/api/leads/sync-status",
        Some(json!({ "emails": ["ada@example.com", "ghost@example.com"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ada@example.com"]["overallSynced"], true);
    assert_eq!(body["data"]["ghost@example.com"]["overallSynced"], false);
}

#[tokio::test]
async fn metrics_endpoints_answer_with_envelopes() {
    let store = Arc::new(InMemoryLeadStore::new());

    let (status, body) = send(
        app_with(&store),
        Method::GET,
        "/api/metrics/dashboard?timeRange=30d",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["timeRange"], "30d");
    assert_eq!(body["data"]["degradedSections"], json!([]));

    let (status, body) = send(
        app_with(&store),
        Method::GET,
        "/api/metrics/trends?timeRange=bogus&groupBy=hour",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["timeRange"], "24h");
    assert_eq!(body["data"]["groupBy"], "hour");

    let (status, _) = send(app_with(&store), Method::GET, "/api/metrics/costs", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        app_with(&store),
        Method::GET,
        "/api/metrics/activity?limit=5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn store_outage_maps_to_503() {
    let store = Arc::new(InMemoryLeadStore::new());
    store.fail_operation("list_leads");

    let (status, body) = send(app_with(&store), Method::GET, "/api/leads", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    // detail is exposed outside production
    assert!(body["details"]["detail"]
        .as_str()
        .unwrap()
        .contains("injected failure"));
}
