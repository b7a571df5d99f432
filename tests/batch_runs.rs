//! End-to-end batch runs against a mock annotation service.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use softmention::annotate::Annotator;
use softmention::dispatch::{self, DispatchConfig, DispatchEvent};
use softmention::harvest::{HarvestStore, HARVEST_STORE_NAME, HARVEST_TABLE};
use softmention::paths::{collection_artifact_path, collection_input_path};
use softmention::service::{AnnotationService, RetryPolicy};
use softmention::sources::{failed_candidates, CollectionCandidates, DirectoryCandidates};
use softmention::state::{ProcessingStatus, StateStore};

const CONFIG: DispatchConfig = DispatchConfig {
    batch_size: 2,
    concurrency: 2,
};

fn annotator_for(server: &MockServer, store: Arc<StateStore>) -> Arc<Annotator> {
    let service = AnnotationService::new(
        server.uri(),
        Duration::from_secs(5),
        RetryPolicy {
            base_delay: Duration::ZERO,
            max_retries: 0,
        },
    )
    .unwrap();
    Arc::new(Annotator::new(service, store, None))
}

fn events() -> tokio::sync::mpsc::Sender<DispatchEvent> {
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    tx
}

async fn mock_mentions(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/service/annotateSoftwarePDF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Build a harvester record store fixture and the matching sharded PDFs.
fn populate_collection(data_dir: &Path, entries: &[(&str, &str)]) {
    let db = redb::Database::create(data_dir.join(HARVEST_STORE_NAME)).unwrap();
    let txn = db.begin_write().unwrap();
    {
        let mut table = txn.open_table(HARVEST_TABLE).unwrap();
        for (id, record) in entries {
            table.insert(*id, *record).unwrap();
        }
    }
    txn.commit().unwrap();

    for (id, _) in entries {
        let input = collection_input_path(data_dir, id);
        std::fs::create_dir_all(input.parent().unwrap()).unwrap();
        std::fs::write(&input, format!("%PDF-1.4 {id}")).unwrap();
    }
}

#[tokio::test]
async fn second_run_makes_no_http_calls() {
    let docs = tempdir().unwrap();
    let state = tempdir().unwrap();
    for i in 0..3 {
        std::fs::write(docs.path().join(format!("doc{i}.pdf")), format!("doc {i}")).unwrap();
    }

    let server = MockServer::start().await;
    mock_mentions(&server, json!({"mentions": [{"name": "R"}]})).await;

    let store = Arc::new(StateStore::open(state.path()).unwrap());
    let annotator = annotator_for(&server, store.clone());

    let first = dispatch::run(
        annotator.clone(),
        DirectoryCandidates::new(docs.path(), &store),
        CONFIG,
        events(),
    )
    .await
    .unwrap();
    assert_eq!(first.dispatched, 3);
    assert_eq!(first.succeeded, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    // Everything is recorded as done, so the second pass filters every
    // candidate out before it can reach the service.
    let second = dispatch::run(
        annotator,
        DirectoryCandidates::new(docs.path(), &store),
        CONFIG,
        events(),
    )
    .await
    .unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn reset_causes_redispatch() {
    let docs = tempdir().unwrap();
    let state = tempdir().unwrap();
    std::fs::write(docs.path().join("doc.pdf"), "doc").unwrap();

    let server = MockServer::start().await;
    // Zero mentions: success is recorded but no artifact lands on disk, so
    // the rerun decision rests on the state store alone.
    mock_mentions(&server, json!({"mentions": []})).await;

    let store = StateStore::open(state.path()).unwrap();
    let store = Arc::new(store);
    let annotator = annotator_for(&server, store.clone());
    dispatch::run(
        annotator,
        DirectoryCandidates::new(docs.path(), &store),
        CONFIG,
        events(),
    )
    .await
    .unwrap();
    assert_eq!(store.count().unwrap(), 1);

    let store = Arc::into_inner(store).unwrap().reset().unwrap();
    assert_eq!(store.count().unwrap(), 0);

    let store = Arc::new(store);
    let annotator = annotator_for(&server, store.clone());
    let rerun = dispatch::run(
        annotator,
        DirectoryCandidates::new(docs.path(), &store),
        CONFIG,
        events(),
    )
    .await
    .unwrap();
    assert_eq!(rerun.dispatched, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn existing_artifact_is_reconciled_without_a_call() {
    let docs = tempdir().unwrap();
    let state = tempdir().unwrap();
    std::fs::write(docs.path().join("doc.pdf"), "doc").unwrap();
    // Artifact left behind by an earlier interrupted run, unknown to the
    // state store.
    std::fs::write(docs.path().join("doc.software.json"), "{}").unwrap();

    let server = MockServer::start().await;
    let store = Arc::new(StateStore::open(state.path()).unwrap());
    let annotator = annotator_for(&server, store.clone());

    let stats = dispatch::run(
        annotator,
        DirectoryCandidates::new(docs.path(), &store),
        CONFIG,
        events(),
    )
    .await
    .unwrap();

    assert_eq!(stats.dispatched, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(store.count().unwrap(), 1);
    let (_, status) = store.scan().unwrap().into_iter().next().unwrap();
    assert_eq!(status, ProcessingStatus::Success);
}

#[tokio::test]
async fn collection_run_writes_sharded_artifacts() {
    let data = tempdir().unwrap();
    let state = tempdir().unwrap();
    populate_collection(
        data.path(),
        &[
            (
                "aabbccdd00112233aabbccdd00112233aabbccdd",
                r#"{"title":"Paper A","doi":"10.1/a"}"#,
            ),
            ("ffeeddcc00112233ffeeddcc00112233ffeeddcc", "{}"),
        ],
    );

    let server = MockServer::start().await;
    mock_mentions(&server, json!({"mentions": [{"name": "NumPy"}]})).await;

    let store = Arc::new(StateStore::open(state.path()).unwrap());
    let annotator = annotator_for(&server, store.clone());
    let harvest = HarvestStore::open(data.path()).unwrap();

    let stats = dispatch::run(
        annotator,
        CollectionCandidates::new(&harvest, &store, data.path()),
        CONFIG,
        events(),
    )
    .await
    .unwrap();
    assert_eq!(stats.succeeded, 2);

    let artifact_path =
        collection_artifact_path(data.path(), "aabbccdd00112233aabbccdd00112233aabbccdd");
    let artifact: Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact_path).unwrap()).unwrap();
    assert_eq!(artifact["id"], "aabbccdd00112233aabbccdd00112233aabbccdd");
    assert_eq!(artifact["metadata"]["title"], "Paper A");

    // The identifier-only record gets no metadata block.
    let bare_path =
        collection_artifact_path(data.path(), "ffeeddcc00112233ffeeddcc00112233ffeeddcc");
    let bare: Value = serde_json::from_str(&std::fs::read_to_string(&bare_path).unwrap()).unwrap();
    assert!(bare.get("metadata").is_none());
}

#[tokio::test]
async fn reprocessing_recovers_failed_documents() {
    let data = tempdir().unwrap();
    let state = tempdir().unwrap();
    populate_collection(
        data.path(),
        &[(
            "aabbccdd00112233aabbccdd00112233aabbccdd",
            r#"{"title":"Paper A"}"#,
        )],
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/annotateSoftwarePDF"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(StateStore::open(state.path()).unwrap());
    let annotator = annotator_for(&server, store.clone());
    {
        let harvest = HarvestStore::open(data.path()).unwrap();
        let stats = dispatch::run(
            annotator.clone(),
            CollectionCandidates::new(&harvest, &store, data.path()),
            CONFIG,
            events(),
        )
        .await
        .unwrap();
        assert_eq!(stats.failed, 1);
    }

    // Service recovered; the failed entry is rebuilt with its harvester
    // metadata and resubmitted like a fresh candidate.
    server.reset().await;
    mock_mentions(&server, json!({"mentions": [{"name": "R"}]})).await;

    let retry = failed_candidates(&store, data.path()).unwrap();
    assert_eq!(retry.len(), 1);
    let stats = dispatch::run(annotator, retry.into_iter().map(Ok), CONFIG, events())
        .await
        .unwrap();
    assert_eq!(stats.succeeded, 1);

    assert_eq!(
        store
            .get("aabbccdd00112233aabbccdd00112233aabbccdd")
            .unwrap(),
        Some(ProcessingStatus::Success)
    );
    let artifact_path =
        collection_artifact_path(data.path(), "aabbccdd00112233aabbccdd00112233aabbccdd");
    let artifact: Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact_path).unwrap()).unwrap();
    assert_eq!(artifact["metadata"]["title"], "Paper A");
}
