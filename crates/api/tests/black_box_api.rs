use reqwest::StatusCode;
use serde_json::{Value, json};

use tenantbill_infra::config::BillingConfig;
use tenantbill_infra::services::BillingServices;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let app = tenantbill_api::app::build_app(BillingServices::in_memory(BillingConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        (res.status(), res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        (res.status(), res.json().await.unwrap_or(Value::Null))
    }

    async fn register(&self, name: &str, plan: Option<&str>) -> String {
        let (status, body) = self
            .post(
                "/tenants",
                json!({ "name": name, "plan": plan, "billingEmail": format!("{}@venues.test", name.to_lowercase()) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn invoice_lifecycle_keeps_last_billing_in_sync() {
    let srv = TestServer::spawn().await;
    let tenant = srv.register("Hall", Some("pro")).await;

    let (status, jan) = srv
        .post(&format!("/tenants/{tenant}/invoices"), json!({ "period": "2026-01" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(jan["status"], "unbilled");
    assert_eq!(jan["amount"], 16_500);
    assert_eq!(jan["lineItems"][0]["name"], "Pro plan");

    let jan_id = jan["id"].as_str().unwrap();
    let (status, _) = srv
        .post(&format!("/invoices/{jan_id}/status"), json!({ "status": "paid" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, feb) = srv
        .post(&format!("/tenants/{tenant}/invoices"), json!({ "period": "2026-02" }))
        .await;
    let feb_id = feb["id"].as_str().unwrap();

    let (_, doc) = srv.get(&format!("/tenants/{tenant}")).await;
    assert_eq!(doc["lastBilling"]["period"], "2026-02");
    assert_eq!(doc["lastBilling"]["status"], "unbilled");

    let res = srv
        .client
        .put(srv.url(&format!("/invoices/{feb_id}/line-items")))
        .json(&json!({ "lineItems": [
            { "name": "Seats", "unitPrice": 1000, "quantity": 2 },
            { "name": "Support", "unitPrice": 500, "quantity": 1 }
        ] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let edited: Value = res.json().await.unwrap();
    assert_eq!(edited["amount"], 2750);

    let res = srv
        .client
        .delete(srv.url(&format!("/invoices/{feb_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, doc) = srv.get(&format!("/tenants/{tenant}")).await;
    assert_eq!(doc["lastBilling"]["period"], "2026-01");
    assert_eq!(doc["lastBilling"]["status"], "paid");

    srv.client
        .delete(srv.url(&format!("/invoices/{jan_id}")))
        .send()
        .await
        .unwrap();
    let (_, doc) = srv.get(&format!("/tenants/{tenant}")).await;
    assert!(doc.get("lastBilling").is_none());
}

#[tokio::test]
async fn batch_endpoints_report_counts() {
    let srv = TestServer::spawn().await;
    srv.register("Alpha", Some("standard")).await;
    srv.register("Beta", Some("pro")).await;
    srv.register("Trial", Some("free")).await;

    let (status, report) = srv.post("/billing/2026-02/invoices", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["period"], "2026-02");
    assert_eq!(report["eligible"], 2);
    assert_eq!(report["succeeded"], 2);

    assert_eq!(report["skipped"], 0);

    let (_, rerun) = srv.post("/billing/2026-02/invoices", json!({})).await;
    assert_eq!(rerun["eligible"], 0);

    let (status, preview) = srv.get("/billing/2026-02/preview").await;
    assert_eq!(status, StatusCode::OK);
    let entries = preview.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["tenant"]["name"], "Alpha");
    assert_eq!(entries[0]["amounts"]["subtotal"], 5_000);

    let (_, sent) = srv.post("/billing/2026-02/mark-sent", json!({})).await;
    assert_eq!(sent["succeeded"], 2);

    let (_, docs) = srv.get("/billing/2026-02/documents").await;
    assert_eq!(docs[0]["invoice"]["status"], "billed");
    assert!(docs[0]["issuer"]["name"].is_string());

    let (status, sweep) = srv.post("/maintenance/resync", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sweep["tenants"], 3);
    assert_eq!(sweep["failed"], 0);
}

#[tokio::test]
async fn errors_use_json_codes() {
    let srv = TestServer::spawn().await;
    let no_plan = srv.register("NoPlan", None).await;

    let (status, body) = srv
        .post(&format!("/tenants/{no_plan}/invoices"), json!({ "period": "2026-02" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .post(&format!("/tenants/{no_plan}/invoices"), json!({ "period": "2026-13" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_period");

    let (status, body) = srv.get("/tenants/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let missing = tenantbill_core::InvoiceId::new();
    let (status, body) = srv.get(&format!("/invoices/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "invoice_not_found");

    let paying = srv.register("Paying", Some("pro")).await;
    srv.post(&format!("/tenants/{paying}/invoices"), json!({ "period": "2026-02" }))
        .await;
    let (status, body) = srv
        .post(&format!("/tenants/{paying}/invoices"), json!({ "period": "2026-02" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn profile_patch_never_touches_last_billing() {
    let srv = TestServer::spawn().await;
    let tenant = srv.register("Venue", Some("standard")).await;
    srv.post(&format!("/tenants/{tenant}/invoices"), json!({ "period": "2026-03" }))
        .await;

    let res = srv
        .client
        .patch(srv.url(&format!("/tenants/{tenant}")))
        .json(&json!({ "name": "Venue Ltd", "plan": null, "lastBilling": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let doc: Value = res.json().await.unwrap();

    assert_eq!(doc["name"], "Venue Ltd");
    assert!(doc["plan"].is_null());
    assert_eq!(doc["lastBilling"]["period"], "2026-03");

    let (status, outcome) = srv.post(&format!("/tenants/{tenant}/resync"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "unchanged");
}
