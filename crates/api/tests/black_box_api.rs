use reqwest::StatusCode;
use serde_json::{Value, json};

use stockbook_api::app::build_app;
use stockbook_api::config::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same wiring as prod (in-memory store), bound to an ephemeral port.
        let app = build_app(&AppConfig::default()).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let router = app.router;
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
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

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap();
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).json(&body)).await
    }

    async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.patch(self.url(path)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).json(&body)).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path))).await
    }

    /// Catalog product, the usual series and one warehouse. Returns the warehouse id.
    async fn seed(&self) -> String {
        let (status, _) = self
            .put(
                "/catalog/products/WIDGET",
                json!({
                    "sku": "WIDGET",
                    "name": "Widget",
                    "base_price_b2c": 1000,
                    "base_price_b2b": 800,
                    "cost": 400,
                    "active": true
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        for (code, scope) in [("B2C", "sale_b2c"), ("B2B", "sale_b2b"), ("RET", "return"), ("DEP", "deposit")] {
            let (status, body) = self
                .post("/series", json!({ "code": code, "scope": scope, "prefix": format!("{code}-") }))
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
        }

        let (status, body) = self
            .post("/locations", json!({ "kind": "warehouse", "name": "Main" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn purchase(&self, warehouse: &str, qty: i64) -> Value {
        let (status, body) = self
            .post(
                "/movements",
                json!({ "type": "purchase", "to": warehouse, "lines": [{ "sku": "WIDGET", "quantity": qty }] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let (status, _) = srv.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sale_lifecycle_with_stock_check_and_override() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;
    srv.purchase(&warehouse, 3).await;

    let (status, body) = srv.get(&format!("/balances/{warehouse}/WIDGET")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 3);

    let (status, body) = srv.get("/quote?sku=WIDGET&channel=b2b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 800);

    let sale = json!({ "type": "b2c_sale", "from": warehouse, "lines": [{ "sku": "WIDGET", "quantity": 5 }] });
    let (status, body) = srv.post("/movements", sale.clone()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["class"], "fix_input");
    assert_eq!(body["overridable"], true);

    let mut forced = sale;
    forced["allow_negative_stock"] = json!(true);
    let (status, body) = srv.post("/movements", forced).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["reference"], "B2C-000001");
    assert_eq!(body["payment"]["status"], "paid");
    assert_eq!(body["payment"]["paid"], 5000);

    let id = body["id"].as_str().unwrap();
    let (status, body) = srv.get(&format!("/movements/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"][0]["unit_price"], 1000);

    let (_, body) = srv.get(&format!("/balances/{warehouse}")).await;
    assert_eq!(body["WIDGET"], -2);
}

#[tokio::test]
async fn payment_and_return_rules_are_enforced() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;
    srv.purchase(&warehouse, 2).await;

    let (status, sale) = srv
        .post(
            "/movements",
            json!({ "type": "b2b_sale", "from": warehouse, "lines": [{ "sku": "WIDGET", "quantity": 2 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert_eq!(sale["payment"]["status"], "pending");
    let id = sale["id"].as_str().unwrap();

    let (status, body) = srv
        .post(&format!("/movements/{id}/payment"), json!({ "status": "partial", "paid_amount": 1600 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_payment_amount");

    let (status, body) = srv
        .post(&format!("/movements/{id}/payment"), json!({ "status": "partial", "paid_amount": 600 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, receivables) = srv.get("/reports/receivables").await;
    assert_eq!(receivables[0]["outstanding"], 1000);

    let ret = |qty: i64| json!({ "warehouse": warehouse, "lines": [{ "sku": "WIDGET", "quantity": qty }] });
    let (status, body) = srv.post(&format!("/movements/{id}/returns"), ret(3)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "return_exceeds_sold");

    let (status, body) = srv.post(&format!("/movements/{id}/returns"), ret(2)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["type"], "b2b_return");
    assert_eq!(body["reference"], "RET-000001");

    let (_, summary) = srv.get("/reports/sales?group_by=sku").await;
    assert_eq!(summary[0]["units"], 0);
}

#[tokio::test]
async fn deposit_workflow_over_http() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;
    srv.purchase(&warehouse, 4).await;

    let (status, deposit) = srv
        .post(
            "/deposits",
            json!({
                "customer_name": "Corner Shop",
                "warehouse": warehouse,
                "lines": [{ "sku": "WIDGET", "quantity": 3 }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{deposit}");
    assert_eq!(deposit["movement"]["reference"], "DEP-000001");
    let retail = deposit["location"]["id"].as_str().unwrap();

    let (status, body) = srv
        .post(
            &format!("/deposits/{retail}/convert"),
            json!({ "channel": "B2C", "lines": [{ "sku": "WIDGET", "quantity": 2 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = srv
        .post(
            &format!("/deposits/{retail}/return"),
            json!({ "warehouse": warehouse, "lines": [{ "sku": "WIDGET", "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = srv.get(&format!("/deposits/{retail}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"]["WIDGET"].as_i64().unwrap_or(0), 0);

    let (_, body) = srv.get(&format!("/balances/{warehouse}/WIDGET")).await;
    assert_eq!(body["balance"], 2);
}

#[tokio::test]
async fn admin_endpoints_manage_series_rules_and_locations() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;

    let (status, body) = srv.post("/series/sale_b2c/allocate", json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["reference"], "B2C-000001");

    let (status, body) = srv.patch("/series/B2C", json!({ "next_number": 100 })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (_, body) = srv.post("/series/sale_b2c/allocate", json!({})).await;
    assert_eq!(body["reference"], "B2C-000100");

    let (status, _) = srv.post("/series/web/allocate", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, rule) = srv
        .post(
            "/price-rules",
            json!({
                "name": "spring sale",
                "target": "public",
                "scope": { "type": "all" },
                "kind": { "type": "percent", "value": 2500 }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{rule}");
    let (_, quote) = srv.get("/quote?sku=WIDGET&channel=B2C").await;
    assert_eq!(quote["price"], 750);

    let rule_id = rule["id"].as_str().unwrap();
    let (status, _) = srv.put(&format!("/price-rules/{rule_id}"), json!({ "active": false })).await;
    assert_eq!(status, StatusCode::OK);
    let (_, quote) = srv.get("/quote?sku=WIDGET&channel=B2C").await;
    assert_eq!(quote["price"], 1000);
    let (status, _) = srv.delete(&format!("/price-rules/{rule_id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    srv.purchase(&warehouse, 1).await;
    let (status, body) = srv.delete(&format!("/locations/{warehouse}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = srv.delete(&format!("/locations/{warehouse}?cascade=true")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["movements_deleted"], 1);
    assert_eq!(body["location_deleted"], true);
}

#[tokio::test]
async fn purge_removes_old_history() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;

    let (status, _) = srv
        .post(
            "/movements",
            json!({
                "type": "purchase",
                "to": warehouse,
                "date": "2022-03-01T09:00:00Z",
                "lines": [{ "sku": "WIDGET", "quantity": 5 }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    srv.purchase(&warehouse, 1).await;

    let (status, report) = srv.post("/admin/purge", json!({ "before": "2023-01-01T00:00:00Z" })).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["movements_deleted"], 1);

    let (_, body) = srv.get(&format!("/balances/{warehouse}/WIDGET")).await;
    assert_eq!(body["balance"], 1);
}

#[tokio::test]
async fn malformed_requests_get_structured_errors() {
    let srv = TestServer::spawn().await;
    let warehouse = srv.seed().await;

    let (status, body) = srv.get("/movements/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = srv.get("/movements/0190f5a4-3b1c-7c3e-9a55-5d1e2f3a4b5c").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv
        .post(
            "/movements",
            json!({ "type": "purchase", "to": warehouse, "lines": [{ "sku": "NOPE", "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_sku");

    let (status, body) = srv
        .post(
            "/movements",
            json!({ "type": "transfer", "from": warehouse, "to": warehouse, "lines": [{ "sku": "WIDGET", "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_location_pair");

    let (status, body) = srv.get("/quote?sku=WIDGET&channel=wholesale").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["class"], "fix_input");
}
