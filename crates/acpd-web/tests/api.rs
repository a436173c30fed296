//! End-to-end route tests against a live Postgres seeded with the builtin
//! baseline. Each test reseeds, so they must not interleave; point
//! DATABASE_URL at a scratch database and run with
//! `cargo test -p acpd-web -- --ignored --test-threads=1`.

use acpd_seed::{reset_to_baseline, Baseline};
use acpd_store::{connect, run_migrations, StoreConfig};
use acpd_web::{app, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn seeded_app() -> Router {
    let config = StoreConfig::from_env().expect("DATABASE_URL must point at a scratch database");
    let pool = connect(&config).await.expect("connecting to scratch database");
    run_migrations(&pool).await.expect("applying migrations");
    let baseline = Baseline::builtin().unwrap();
    reset_to_baseline(&pool, &baseline).await.expect("seeding baseline");
    app(AppState::new(pool))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn patch_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
#[ignore]
async fn category_routes_list_and_detail() {
    let app = seeded_app().await;

    let resp = app.clone().oneshot(get("/api/cost-categories")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["period"]["periodKey"], "ytd");
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 10);
    assert_eq!(categories[0]["slug"], "inpatient");
    assert_eq!(categories[0]["performanceStatus"], "red");
    assert!(categories[0]["spendingPmpmActual"].is_number());

    let resp = app
        .clone()
        .oneshot(get("/api/cost-categories?status=green"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["categories"].as_array().unwrap().len(), 3);

    // slug switches the route to detail mode
    let resp = app
        .clone()
        .oneshot(get("/api/cost-categories?slug=inpatient"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["slug"], "inpatient");
    assert_eq!(body["hospitals"].as_array().unwrap().len(), 3);
    assert_eq!(body["drgs"].as_array().unwrap().len(), 3);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 1);

    // drill-down lists a category lacks are omitted, not empty
    let resp = app
        .clone()
        .oneshot(get("/api/cost-categories?slug=acute-rehab"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert!(body.get("hospitals").is_none());
    assert!(body.get("drgs").is_none());
    assert!(body.get("dischargingHospitals").is_none());

    let resp = app
        .oneshot(get("/api/cost-categories?slug=dental"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("dental"));
}

#[tokio::test]
#[ignore]
async fn insights_route_returns_the_dashboard_payload() {
    let app = seeded_app().await;

    let resp = app
        .clone()
        .oneshot(get("/api/performance-insights"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["period"]["periodKey"], "ytd");
    assert_eq!(body["metrics"].as_array().unwrap().len(), 5);
    assert_eq!(body["overspending"].as_array().unwrap().len(), 4);
    assert_eq!(body["efficient"].as_array().unwrap().len(), 3);
    assert_eq!(body["kpis"].as_array().unwrap().len(), 4);
    let top = body["topRecommendations"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["estimatedSavings"], 1_850_000.0);
    assert_eq!(top[0]["affectedCategories"][0]["slug"], "inpatient");

    let resp = app
        .clone()
        .oneshot(get("/api/performance-insights?period=last_quarter"))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["period"]["periodKey"], "last_quarter");

    let resp = app
        .oneshot(get("/api/performance-insights?period=next_year"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn recommendation_routes_list_detail_and_status_patch() {
    let app = seeded_app().await;

    let resp = app.clone().oneshot(get("/api/recommendations")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0]["priority"], "high");
    assert_eq!(rows[0]["estimatedSavings"], 1_850_000.0);
    assert_eq!(rows[0]["affectedCategories"].as_array().unwrap().len(), 2);
    let id = rows[0]["id"].as_i64().unwrap();

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/recommendations?id={id}")))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["id"].as_i64(), Some(id));
    assert_eq!(body["bestPractices"].as_array().unwrap().len(), 2);
    assert_eq!(body["testimonials"].as_array().unwrap().len(), 1);
    assert_eq!(body["implementationSteps"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["allowedNext"],
        serde_json::json!(["acknowledged", "accepted", "rejected"])
    );

    let resp = app
        .clone()
        .oneshot(patch_json(
            "/api/recommendations/status",
            serde_json::json!({ "id": id, "status": "acknowledged", "changedBy": "care-team" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["previousStatus"], "not_started");
    assert_eq!(body["status"], "acknowledged");
    assert_eq!(body["transitionValid"], true);
    assert_eq!(body["changedBy"], "care-team");

    // off-graph moves still persist but are flagged
    let resp = app
        .clone()
        .oneshot(patch_json(
            "/api/recommendations/status",
            serde_json::json!({ "id": id, "status": "completed" }),
        ))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["transitionValid"], false);

    let resp = app
        .oneshot(patch_json(
            "/api/recommendations/status",
            serde_json::json!({ "id": 999_999, "status": "accepted" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn admin_reset_reseeds_and_reports_counts() {
    let app = seeded_app().await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert!(body["runId"].is_string());
    assert_eq!(body["periodsCreated"], 3);
    assert_eq!(body["categoriesCreated"], 30);
    assert_eq!(body["metricsCreated"], 15);
    assert_eq!(body["opportunitiesCreated"], 24);
    assert_eq!(body["recommendationsCreated"], 6);
    assert_eq!(body["resourcesCreated"], 9);
    assert_eq!(body["kpisCreated"], 12);
    assert_eq!(body["drilldownRowsCreated"], 17);

    // edits made before the reset are gone afterwards
    let resp = app.clone().oneshot(get("/api/recommendations")).await.unwrap();
    let body = json_body(resp).await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] == "not_started"));

    let resp = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
}
