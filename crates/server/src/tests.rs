use crate::error::{TITLE_AUTHENTICATION, TITLE_CONFLICT, TITLE_NOT_FOUND, TITLE_UNAVAILABLE, TITLE_VALIDATION};
use crate::state::RegistrationOptions;
use crate::streaming::{ResultStatus, StreamSummary, StreamedResult};
use crate::testing::*;
use axum::http::StatusCode;
use fe_counterparty::{Counterparty, CounterpartyRole, MemoryCounterpartyStore};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn buffered() -> RegistrationOptions {
    RegistrationOptions::default()
}

fn batch(kind: &str, docs: Vec<Value>) -> Value {
    json!({ "documentos": { kind: docs } })
}

async fn store_with_acquirer(adq: &str) -> Arc<MemoryCounterpartyStore> {
    let store = Arc::new(MemoryCounterpartyStore::new());
    let mut record = Counterparty::new(OFE, adq);
    record.razon_social = Some("Cliente Uno S.A.S.".into());
    record.direccion = Some("Calle 1 # 2-3".into());
    store.insert(CounterpartyRole::Acquirer, record).await;
    store
}

#[tokio::test]
async fn single_invoice_without_master_data_is_processed() {
    let gateway = Arc::new(ScriptedGateway::default());
    let app = router(app_state(gateway.clone(), None, buffered()));

    let req = json_request(
        "POST",
        "/api/v1/registrar-documentos",
        &batch("FC", vec![invoice("5604", "900123456")]),
    );
    let (status, body) = call(app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["documentos_procesados"].as_array().unwrap().len(), 1);
    assert_eq!(body["documentos_procesados"][0]["cdo_id"], "id-5604");
    assert_eq!(body["documentos_fallidos"], json!([]));
    assert_eq!(body["lote"], "lote-upstream-1");
    assert_eq!(body["message"], "Documentos procesados exitosamente");

    let sent = gateway.registrations();
    assert_eq!(sent.len(), 1);
    let doc = &sent[0].documentos.fc[0];
    assert_eq!(doc.ofe_identificacion, OFE);
}

#[tokio::test]
async fn unknown_acquirer_fails_only_its_document() {
    let gateway = Arc::new(ScriptedGateway::default());
    let store = store_with_acquirer("900123456").await;
    let app = router(app_state(gateway.clone(), Some(store), buffered()));

    let req = json_request(
        "POST",
        "/api/v1/registrar-documentos",
        &batch(
            "FC",
            vec![invoice("5604", "900123456-7"), invoice("5605", "900999999")],
        ),
    );
    let (status, body) = call(app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["documentos_procesados"].as_array().unwrap().len(), 1);
    let failed = body["documentos_fallidos"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["consecutivo"], "5605");
    let reason = failed[0]["errors"][0].as_str().unwrap();
    assert!(reason.contains("Adquiriente"), "{reason}");
    assert!(reason.contains("no encontrado"), "{reason}");
    assert_eq!(body["message"], "Algunos documentos fueron procesados, otros fallaron");

    // The unknown acquirer never reaches the provider.
    let sent = gateway.registrations();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].documentos.fc[0].cdo_consecutivo, "5604");
}

#[tokio::test]
async fn stale_issue_date_is_rejected_before_upstream() {
    let gateway = Arc::new(ScriptedGateway::default());
    let app = router(app_state(gateway.clone(), None, buffered()));

    let mut doc = invoice("5604", "900123456");
    doc["cdo_fecha"] = json!(YESTERDAY);
    doc["cdo_vencimiento"] = json!(TODAY);
    let (status, body) = call(
        app,
        json_request("POST", "/api/v1/registrar-documentos", &batch("FC", vec![doc])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let reason = body["documentos_fallidos"][0]["errors"][0].as_str().unwrap();
    assert!(reason.contains("FAD09e"), "{reason}");
    assert!(gateway.registrations().is_empty());
}

#[tokio::test]
async fn two_document_types_are_rejected() {
    let gateway = Arc::new(ScriptedGateway::default());
    let app = router(app_state(gateway.clone(), None, buffered()));

    let mut note = invoice("77", "900123456");
    note["tde_codigo"] = json!("91");
    let body = json!({
        "documentos": {
            "FC": [invoice("5604", "900123456")],
            "NC": [note]
        }
    });
    let (status, body) = call(app, json_request("POST", "/api/v1/registrar-documentos", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], TITLE_VALIDATION);
    assert!(body["errors"][0].as_str().unwrap().contains("only one document type"));
    assert!(gateway.registrations().is_empty());
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let (status, body) = call(
        app,
        json_request("POST", "/api/v1/registrar-documentos", &json!({ "documentos": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "no documents provided");
}

#[tokio::test]
async fn upstream_authentication_failure_is_bad_gateway() {
    let gateway = Arc::new(ScriptedGateway::failing_auth());
    let app = router(app_state(gateway, None, buffered()));

    let (status, body) = call(
        app,
        json_request(
            "POST",
            "/api/v1/registrar-documentos",
            &batch("FC", vec![invoice("5604", "900123456")]),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], TITLE_AUTHENTICATION);
    assert!(body["errors"][0].as_str().unwrap().contains("authentication failed"));
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/registrar-documentos")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = call(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], TITLE_VALIDATION);
    assert!(body["errors"].as_array().is_some());
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    streaming: bool,
    total_documents: usize,
    results: Vec<StreamedResult>,
    summary: StreamSummary,
}

#[tokio::test]
async fn streamed_results_follow_input_order() {
    let gateway = Arc::new(ScriptedGateway::default());
    let app = router(app_state(gateway.clone(), None, buffered()));

    let mut stale = invoice("5605", "900123456");
    stale["cdo_fecha"] = json!(YESTERDAY);
    let docs = vec![invoice("5604", "900123456"), stale, invoice("5606", "900123456")];
    let response = send(
        app,
        json_request("POST", "/api/v1/registrar-documentos?stream=true", &batch("FC", docs)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let text = body_text(response).await;
    assert!(text.starts_with(r#"{"streaming":true,"total_documents":3,"results":["#), "{text}");
    assert_eq!(text.matches(",\n").count(), 2);

    let envelope: StreamEnvelope = serde_json::from_str(&text).unwrap();
    assert!(envelope.streaming);
    assert_eq!(envelope.total_documents, 3);
    let order: Vec<_> = envelope.results.iter().map(|r| (r.index, r.consecutive.as_str(), r.status)).collect();
    assert_eq!(
        order,
        vec![
            (1, "5604", ResultStatus::Processed),
            (2, "5605", ResultStatus::Failed),
            (3, "5606", ResultStatus::Processed),
        ]
    );
    assert_eq!(envelope.results[0].cdo_id, "id-5604");
    assert!(envelope.results[1].errors[0].contains("document 2"));
    assert!(envelope.results[1].errors[0].contains("FAD09e"));
    assert_eq!(
        envelope.summary,
        StreamSummary {
            total: 3,
            processed: 2,
            failed: 1,
            lote: "lote-upstream-1".into(),
            message: "Algunos documentos fueron procesados, otros fallaron".into(),
        }
    );
    // One upstream call per document.
    assert_eq!(gateway.registrations().len(), 2);
}

#[tokio::test]
async fn stream_without_upstream_lote_uses_fallback_batch_id() {
    let gateway = Arc::new(ScriptedGateway::failing_auth());
    let app = router(app_state(gateway, None, buffered()));
    let docs = vec![invoice("5604", "900123456"), invoice("5605", "900123456")];
    let response = send(
        app,
        json_request("POST", "/api/v1/registrar-documentos?stream=true", &batch("FC", docs)),
    )
    .await;
    let envelope: StreamEnvelope = serde_json::from_str(&body_text(response).await).unwrap();

    assert_eq!(envelope.summary.failed, 2);
    // Unix seconds of the fixed test clock, as in the buffered path.
    assert_eq!(envelope.summary.lote, "lote-1714678620");
    assert!(envelope.results[0].errors[0].contains("authentication failed"));
}

#[tokio::test]
async fn closing_the_stream_cancels_the_document_in_flight() {
    let gateway = Arc::new(ScriptedGateway::slow(Duration::from_millis(100)));
    let app = router(app_state(gateway.clone(), None, buffered()));
    let docs: Vec<Value> = (1..=10).map(|i| invoice(&i.to_string(), "900123456")).collect();

    let response = send(
        app,
        json_request("POST", "/api/v1/registrar-documentos?stream=true", &batch("FC", docs)),
    )
    .await;
    let mut body = response.into_body().into_data_stream();
    let header = body.next().await.unwrap().unwrap();
    assert!(header.starts_with(br#"{"streaming":true"#));
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains(r#""consecutive":"1""#));
    drop(body);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let sent: Vec<String> = gateway
        .registrations()
        .iter()
        .map(|r| r.documentos.fc[0].cdo_consecutivo.clone())
        .collect();
    assert_eq!(sent, vec!["1".to_string()]);
}

#[tokio::test]
async fn dropped_buffered_request_stops_pending_groups() {
    let gateway = Arc::new(ScriptedGateway::slow(Duration::from_millis(200)));
    let options = RegistrationOptions {
        worker_pool_size: 1,
        ..RegistrationOptions::default()
    };
    let app = router(app_state(gateway.clone(), None, options));
    let docs: Vec<Value> = (1..=4).map(|i| invoice(&i.to_string(), "900123456")).collect();

    let request = send(app, json_request("POST", "/api/v1/registrar-documentos", &batch("FC", docs)));
    assert!(tokio::time::timeout(Duration::from_millis(50), request).await.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(gateway.registrations().is_empty());
}

#[tokio::test]
async fn streaming_default_can_be_switched_off_per_request() {
    let options = RegistrationOptions {
        streaming_default: true,
        ..RegistrationOptions::default()
    };
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, options));
    let (status, body) = call(
        app,
        json_request(
            "POST",
            "/api/v1/registrar-documentos?stream=false",
            &batch("FC", vec![invoice("5604", "900123456")]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("streaming").is_none());
    assert_eq!(body["documentos_procesados"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn correlation_id_is_echoed_or_generated() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));

    let mut req = get_request("/api/v1/health");
    req.headers_mut()
        .insert("x-correlation-id", "corr-abc-123".parse().unwrap());
    let response = send(app.clone(), req).await;
    assert_eq!(response.headers()["x-correlation-id"], "corr-abc-123");

    let response = send(app, get_request("/api/v1/health")).await;
    let generated = response.headers()["x-correlation-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn health_reports_database_and_audit_sink() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let (status, body) = call(app, get_request("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "disabled");
    assert_eq!(body["audit_sink"], "memory");

    let store = Arc::new(MemoryCounterpartyStore::new());
    let app = router(app_state(Arc::new(ScriptedGateway::default()), Some(store), buffered()));
    let (_, body) = call(app, get_request("/api/v1/health")).await;
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn acquirer_crud_round_trip() {
    let store = Arc::new(MemoryCounterpartyStore::new());
    let app = router(app_state(Arc::new(ScriptedGateway::default()), Some(store), buffered()));

    let record = json!({
        "ofe_identificacion": "860011153-6",
        "adq_identificacion": "900123456-7",
        "razon_social": "Cliente Uno S.A.S.",
        "responsabilidades_fiscales": ["O-13"]
    });
    let (status, created) = call(app.clone(), json_request("POST", "/api/v1/adquirientes", &record)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["identificacion"], "900123456");
    assert_eq!(created["estado"], "ACTIVO");

    let (status, body) = call(app.clone(), json_request("POST", "/api/v1/adquirientes", &record)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], TITLE_CONFLICT);
    assert!(body["errors"][0].as_str().unwrap().contains("ya existe"));

    let (status, found) = call(app.clone(), get_request("/api/v1/adquirientes/860011153/900123456-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["razon_social"], "Cliente Uno S.A.S.");

    let update = json!({ "razon_social": "Cliente Uno Renombrado" });
    let (status, updated) = call(
        app.clone(),
        json_request("PUT", "/api/v1/adquirientes/860011153/900123456", &update),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["razon_social"], "Cliente Uno Renombrado");
    assert_eq!(updated["identificacion"], "900123456");

    let (status, body) = call(
        app.clone(),
        json_request("PUT", "/api/v1/adquirientes/860011153/111", &update),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["errors"][0].as_str().unwrap().contains("no existe"));

    let (status, page) = call(app, get_request("/api/v1/adquirientes?ofe=860011153&search=renombrado")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn suppliers_are_separate_from_acquirers() {
    let store = store_with_acquirer("900123456").await;
    let app = router(app_state(Arc::new(ScriptedGateway::default()), Some(store), buffered()));

    let (status, body) = call(app, get_request("/api/v1/proveedores/860011153/900123456")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], TITLE_NOT_FOUND);
    assert!(body["errors"][0].as_str().unwrap().starts_with("Proveedor"));
}

#[tokio::test]
async fn counterparty_routes_need_a_store() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let (status, body) = call(app, get_request("/api/v1/adquirientes")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], TITLE_UNAVAILABLE);
}

#[tokio::test]
async fn issued_invoices_use_list_envelope() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let query = json!({ "CompanyNit": OFE, "InitialDate": "2024-05-01", "FinalDate": "2024-05-02" });
    let (status, body) = call(app.clone(), json_request("POST", "/api/v1/facturas", &query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "200");
    assert_eq!(body["message"], "Exitoso");
    assert_eq!(body["total"], 1);

    let bad = json!({ "CompanyNit": OFE, "InitialDate": "01/05/2024", "FinalDate": "2024-05-02" });
    let (status, body) = call(app, json_request("POST", "/api/v1/facturas", &bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("InitialDate"));
}

#[tokio::test]
async fn missing_document_by_number_is_not_found() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let query = json!({ "CompanyNit": OFE, "DocumentNumber": "SETT9999" });
    let (status, body) = call(app, json_request("POST", "/api/v1/facturas/by-number", &query)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], TITLE_NOT_FOUND);
}

#[tokio::test]
async fn received_documents_gain_download_links_on_request() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let query = json!({ "CompanyNit": OFE, "InitialDate": "2024-05-01", "FinalDate": "2024-05-02" });

    let (_, plain) = call(app.clone(), json_request("POST", "/api/v1/facturas/received", &query)).await;
    assert!(plain["data"][0].get("urlPDF").is_none());

    let (status, body) = call(app, json_request("POST", "/api/v1/facturas/received?download=1", &query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(
        body["data"][0]["urlPDF"],
        "https://files.local/860011153/cufe-recibido-1.pdf"
    );
    assert!(body["data"][1].get("urlPDF").is_none());
}

#[tokio::test]
async fn download_by_query_and_body() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));

    let (status, body) = call(app.clone(), get_request("/api/v1/facturas/download?cufe=abc123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cufe"], "abc123");
    assert_eq!(body["urlXML"], "https://files.local/860011153/abc123.xml");

    let (status, body) = call(
        app.clone(),
        json_request("POST", "/api/v1/facturas/download", &json!({ "id": "def456" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urlPDF"], "https://files.local/860011153/def456.pdf");

    let (status, _) = call(app, get_request("/api/v1/facturas/download")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn events_are_registered_for_the_configured_issuer() {
    let app = router(app_state(Arc::new(ScriptedGateway::default()), None, buffered()));
    let event = json!({
        "EventType": "ACUSE",
        "DocumentoNumeroCompleto": "SETT5604",
        "NombreGenerador": "Ana",
        "ApellidoGenerador": "Pérez",
        "IdentificacionGenerador": "1020304050",
        "FechaGeneracionEvento": "2024-05-02 10:00:00"
    });
    let (status, body) = call(app.clone(), json_request("POST", "/api/v1/eventos", &event)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "200");
    assert_eq!(body["message"], "Exitoso");
    assert_eq!(body["data"]["mensaje"], "ACUSE registrado por 860011153");

    let mut claim = event.clone();
    claim["EventType"] = json!("RECLAMO");
    let (status, body) = call(app, json_request("POST", "/api/v1/eventos", &claim)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("CodigoRechazo"));
}
