//! HTTP surface tests driven through the router with `oneshot`.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use plankweb_common::result_doc::{BindingSite, ResidueRef, ResultDocument};
use plankweb_common::{Fingerprint, JobId, StatusRecord, TaskKey, TaskName};
use plankweb_orchestrator::{InputMaterializer, Orchestrator, OrchestratorPool, OrchestratorSettings};
use plankweb_store::{
    Allocation, IdentityStore, InMemoryIdentityStore, ResultAggregator, StatusTracker, StoreError,
};
use plankweb_test_utils::{assert_eq, job, RecordingDispatch, StaticSource, TestWorkspace, TWO_CHAIN_PDB};
use plankweb_web::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const PDB_URL: &str = "https://files.rcsb.org/download/2SRC.pdb";

struct Harness {
    ws: TestWorkspace,
    dispatch: Arc<RecordingDispatch>,
    results: Arc<ResultAggregator>,
    app: Router,
}

fn harness_with(identity: Arc<dyn IdentityStore>) -> Harness {
    let ws = TestWorkspace::new();
    let dispatch = Arc::new(RecordingDispatch::new(ws.tracker_dyn()));
    let source = Arc::new(StaticSource::new().with(PDB_URL, TWO_CHAIN_PDB));
    let materializer = Arc::new(InputMaterializer::new(ws.artifacts.clone(), source));
    let settings = OrchestratorSettings {
        conversion_poll: Duration::from_millis(5),
        conservation_poll: Duration::from_millis(5),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(ws.tracker_dyn(), dispatch.clone(), materializer, settings);
    let pool = OrchestratorPool::start(Arc::new(orchestrator), 1);
    let results = Arc::new(ResultAggregator::new(ws.artifacts.clone()));

    let app = build_router(AppState::new(identity, ws.tracker_dyn(), results.clone(), pool));
    Harness { ws, dispatch, results, app }
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryIdentityStore::new()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_job(app: &Router, body: Value) -> (StatusCode, Value) {
    let request = Request::post("/api/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

fn pdb_submission() -> Value {
    json!({ "inputMethod": "pdb", "inputProtein": "2SRC", "inputUrl": PDB_URL })
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_submit_deduplicates_and_starts_orchestration() {
    let h = harness();

    let (status, body) = post_job(&h.app, pdb_submission()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "id": "pdb_2src", "existed": false }));

    let (status, body) = post_job(&h.app, pdb_submission()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "id": "pdb_2src", "existed": true }));

    // The pool picks the job up in the background.
    let foldseek = TaskKey::new(TaskName::Foldseek);
    let mut waited = Duration::ZERO;
    while h.dispatch.count(&foldseek) == 0 {
        assert!(waited < Duration::from_secs(5), "orchestrator never dispatched");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(h.ws.artifacts.has_input(&job("pdb_2src"), "structure.pdb").await.unwrap());
}

#[tokio::test]
async fn test_invalid_submissions_are_400() {
    let h = harness();
    let cases = [
        json!({ "inputProtein": "2SRC", "inputUrl": PDB_URL }),
        json!({ "inputMethod": "uniprot", "inputUrl": PDB_URL }),
        json!({ "inputMethod": "sequence", "inputProtein": "A".repeat(401), "inputUrl": PDB_URL }),
        json!({ "inputMethod": "pdb", "inputProtein": "2SRC" }),
    ];
    for case in cases {
        let (status, body) = post_job(&h.app, case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", case);
        assert!(body["error"].is_string());
    }
    assert!(h.dispatch.keys().is_empty());
}

struct UnavailableIdentity;

#[async_trait]
impl IdentityStore for UnavailableIdentity {
    async fn get_or_create(&self, _fingerprint: &Fingerprint) -> Result<Allocation, StoreError> {
        Err(StoreError::Unavailable("identity file locked".to_string()))
    }

    async fn lookup(&self, _fingerprint: &Fingerprint) -> Result<Option<JobId>, StoreError> {
        Err(StoreError::Unavailable("identity file locked".to_string()))
    }
}

#[tokio::test]
async fn test_identity_failure_is_500() {
    let h = harness_with(Arc::new(UnavailableIdentity));
    let (status, body) = post_job(&h.app, pdb_submission()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Failed to get ID"));
}

#[tokio::test]
async fn test_lookup_never_allocates() {
    let h = harness();
    let (status, body) = get(&h.app, "/api/id?input_method=pdb&input_protein=2SRC").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": null }));

    post_job(&h.app, pdb_submission()).await;
    let (_, body) = get(&h.app, "/api/id?input_method=0&input_protein=2src").await;
    assert_eq!(body, json!({ "id": "pdb_2src" }));

    let (status, _) = get(&h.app, "/api/id?input_method=pdb").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_routes() {
    let h = harness();
    let id = job("pdb_9xyz");

    let (status, _) = get(&h.app, "/api/status/ds_p2rank/pdb_9xyz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&h.app, "/api/jobs/pdb_9xyz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let variant = TaskKey::with_variant(TaskName::P2Rank, "conservation");
    h.ws.tracker.write(&id, &variant, &StatusRecord::completed("3 pockets")).await.unwrap();

    let (status, body) = get(&h.app, "/api/status/ds_p2rank/pdb_9xyz?variant=conservation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 1);
    assert_eq!(body["infoMessage"], "3 pockets");
    let (status, _) = get(&h.app, "/api/status/ds_p2rank/pdb_9xyz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&h.app, "/api/jobs/pdb_9xyz").await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body.as_array().unwrap();
    let recorded: Vec<&Value> = tasks.iter().filter(|t| !t["status"].is_null()).collect();
    assert_eq!(recorded.len(), 1);

    let (status, _) = get(&h.app, "/api/status/ds_teleport/pdb_9xyz").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&h.app, "/api/status/ds_p2rank/pdb_9xyz?variant=..").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_result_routes() {
    let h = harness();
    let id = job("pdb_2src");
    let key = TaskKey::new(TaskName::P2Rank);
    let doc = ResultDocument::builder(id.clone(), "A", "p2rank")
        .sequence("MKG")
        .binding_sites(vec![BindingSite {
            id: "pocket1".to_string(),
            confidence: 0.8,
            residues: vec![ResidueRef { sequence_index: 1, structure_index: Some(2) }],
            rank: Some(1),
            score: Some(4.5),
        }])
        .build()
        .unwrap();
    h.results.store(&id, &key, &doc).await.unwrap();

    let (status, body) = get(&h.app, "/api/results/ds_p2rank/pdb_2src/A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bindingSites"][0]["id"], "pocket1");
    assert_eq!(body["metadata"]["dataSource"], "p2rank");

    let (status, _) = get(&h.app, "/api/results/ds_p2rank/pdb_2src/B").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&h.app, "/api/results/ds_p2rank/pdb_2src/A?variant=conservation").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
