mod helpers;

use actix_web::{http::StatusCode, App};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tx_tracker_logic::{
    chain_id::ChainId,
    chains::ResolveError,
    database::TxRepository,
    metrics::Metrics,
    test_utils::{tx_detail, vaa_record, ScriptedResolver},
};
use tx_tracker_server::http_configure;

#[tokio::test]
async fn health_returns_ok() {
    let app = helpers::test_app(Arc::new(ScriptedResolver::succeeding(tx_detail("abc"))));
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;

    let request = actix_web::test::TestRequest::get().uri("/health").to_request();
    let response: Value = actix_web::test::call_and_read_body_json(&service, request).await;
    assert_eq!(json!({"status": "OK"}), response);
}

#[tokio::test]
async fn ingest_stores_vaa_and_publishes_event() {
    let app = helpers::test_app(Arc::new(ScriptedResolver::succeeding(tx_detail("abc"))));
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;
    let event = json!({
        "id": "2/0000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585/5",
        "chainId": 2,
        "emitterAddress": "0000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585",
        "sequence": "5",
        "txHash": "0xabc",
        "timestamp": "2024-01-01T00:00:00Z",
    });

    for expected_inserted in [true, false] {
        let request = actix_web::test::TestRequest::post()
            .uri("/api/v1/vaa")
            .set_json(&event)
            .to_request();
        let response = actix_web::test::call_service(&service, request).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: Value = actix_web::test::read_body_json(response).await;
        assert_eq!(body["inserted"], json!(expected_inserted));
    }

    let stored = app
        .repository
        .find_vaa("2/0000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585/5")
        .await
        .unwrap()
        .expect("vaa must be stored");
    assert_eq!(stored.emitter_chain, ChainId::ETHEREUM);
    assert_eq!(
        stored.timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(app.queue.len(), 2);
}

#[tokio::test]
async fn ingest_rejects_inconsistent_id() {
    let app = helpers::test_app(Arc::new(ScriptedResolver::succeeding(tx_detail("abc"))));
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;

    let request = actix_web::test::TestRequest::post()
        .uri("/api/v1/vaa")
        .set_json(json!({
            "id": "1/emitter/5",
            "chainId": 2,
            "emitterAddress": "emitter",
            "sequence": "5",
        }))
        .to_request();
    let response = actix_web::test::call_service(&service, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.queue.is_empty());
}

#[tokio::test]
async fn process_resolves_stored_vaa() {
    let app = helpers::test_app(Arc::new(ScriptedResolver::succeeding(tx_detail("abc"))));
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;
    let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    app.repository
        .insert_vaa(vaa_record("2/emitter/5", timestamp))
        .await
        .unwrap();

    // twice: the administrative trigger always resolves again
    for _ in 0..2 {
        let request = actix_web::test::TestRequest::post()
            .uri("/api/v1/vaa/process")
            .set_json(json!({"id": "2/emitter/5"}))
            .to_request();
        let response: Value = actix_web::test::call_and_read_body_json(&service, request).await;
        assert_eq!(response["result"]["nativeTxHash"], json!("abc"));
        assert_eq!(response["result"]["from"], json!("0xsender"));
    }
    assert_eq!(app.repository.upserts(), 2);
}

fn upstream_unavailable(chain_id: ChainId) -> ResolveError {
    ResolveError::UpstreamUnavailable {
        chain_id,
        reason: "connection refused".to_string(),
    }
}

#[tokio::test]
async fn process_reports_errors_with_status_codes() {
    let cases: [(&str, fn(ChainId) -> ResolveError, StatusCode); 2] = [
        ("2/emitter/5", upstream_unavailable, StatusCode::BAD_GATEWAY),
        (
            "9999/emitter/5",
            ResolveError::ChainNotSupported,
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
    ];

    for (id, error, expected_status) in cases {
        let app = helpers::test_app(Arc::new(ScriptedResolver::failing(error)));
        let service = actix_web::test::init_service(
            App::new().configure(|config| http_configure(config, app.state.clone())),
        )
        .await;
        app.repository
            .insert_vaa(vaa_record(id, Utc::now()))
            .await
            .unwrap();

        let request = actix_web::test::TestRequest::post()
            .uri("/api/v1/vaa/process")
            .set_json(json!({ "id": id }))
            .to_request();
        let response = actix_web::test::call_service(&service, request).await;
        assert_eq!(response.status(), expected_status, "id={id}");
        assert!(app.repository.origin(id).is_none());
    }
}

#[tokio::test]
async fn process_unknown_vaa_is_not_found() {
    let resolver = Arc::new(ScriptedResolver::succeeding(tx_detail("abc")));
    let app = helpers::test_app(resolver.clone());
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;

    let request = actix_web::test::TestRequest::post()
        .uri("/api/v1/vaa/process")
        .set_json(json!({"id": "2/emitter/404"}))
        .to_request();
    let response = actix_web::test::call_service(&service, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(resolver.calls(), 0);
}

#[tokio::test]
async fn metrics_are_exposed_in_text_format() {
    let app = helpers::test_app(Arc::new(ScriptedResolver::succeeding(tx_detail("abc"))));
    app.metrics.inc_vaa_consumed(ChainId::ETHEREUM);
    let service = actix_web::test::init_service(
        App::new().configure(|config| http_configure(config, app.state.clone())),
    )
    .await;

    let request = actix_web::test::TestRequest::get().uri("/metrics").to_request();
    let body = actix_web::test::call_and_read_body(&service, request).await;
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("tx_tracker_vaa_consumed_total"), "{body}");
}
