mod common;

use chrono::Utc;
use common::*;
use lineage_bridge::model::{DetailWrite, EventStatus, TableKind};
use lineage_bridge::pipeline::{EventReceiver, MissingIdentityPolicy, ProcessOutcome, ReceiveOutcome, SkipReason};
use lineage_bridge::store::{BlobRef, BlobStore, MetadataStore};
use serde_json::json;

fn blob(file_name: &str) -> BlobRef {
    BlobRef::new(CONTAINER, file_name)
}

#[tokio::test]
async fn test_end_to_end_event_is_published_and_recorded() {
    let harness = Harness::new(vec![]);
    harness.seed("r1_j1.json", &basic_event());

    let outcome = harness.processor.process(&blob("r1_j1.json"), &token()).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Processed {
            relationships: 2,
            detail: DetailWrite::Created
        }
    );

    let requests = harness.catalog.requests();
    assert_eq!(requests.len(), 2);

    let input = &requests[0];
    assert_eq!(input.guid, "-1");
    assert_eq!(input.type_name, "dataset_process_inputs");
    assert_eq!(input.end1.type_name, "fabric_lakehouse");
    assert!(input.end1.unique_attributes.qualified_name.ends_with("/lakehouses/G1"));
    assert_eq!(input.end2.type_name, "fabric_synapse_notebook");

    let output = &requests[1];
    assert_eq!(output.type_name, "process_dataset_outputs");
    assert_eq!(output.end1.type_name, "fabric_synapse_notebook");
    assert!(output.end2.unique_attributes.qualified_name.ends_with("/lakehouses/G2"));

    let record = harness.record("r1_j1.json");
    assert_eq!(record.status, EventStatus::Processed);
    assert_eq!(record.message, "SUCCESS");

    let detail = harness.store.get_detail(TEAM, "r1_j1.json").unwrap().unwrap();
    assert_eq!(detail.output_tables, "path");
    assert_eq!(detail.output_table_kinds, vec![TableKind::Unknown]);
    assert_eq!(detail.output_columns, vec!["col_a"]);
    assert_eq!(detail.input_datasets, vec!["G1"]);
    assert_eq!(detail.output_datasets, vec!["G2"]);
    assert_eq!(detail.process_name, "Unknown Process");
}

#[tokio::test]
async fn test_identity_facets_shape_qualified_names() {
    let harness = Harness::new(vec![]);
    harness.seed("e.json", &with_identity(basic_event(), "P-1", "WS-1"));

    harness.processor.process(&blob("e.json"), &token()).await.unwrap();

    let requests = harness.catalog.requests();
    assert_eq!(
        requests[0].end1.unique_attributes.qualified_name,
        format!("{}/groups/WS-1/lakehouses/G1", BASE)
    );
    assert_eq!(
        requests[0].end2.unique_attributes.qualified_name,
        format!("{}/groups/WS-1/synapsenotebooks/P-1", BASE)
    );

    let detail = harness.store.get_detail(TEAM, "e.json").unwrap().unwrap();
    assert_eq!(detail.process_name, "nb_orders");
    assert_eq!(detail.intermediate_process.as_deref(), Some("P-1"));
}

#[tokio::test]
async fn test_malformed_dataset_fails_without_detail() {
    let harness = Harness::new(vec![]);
    let mut event = basic_event();
    event["outputs"][0]["name"] = json!("onlyonepart");
    harness.seed("bad.json", &event);

    let outcome = harness.processor.process(&blob("bad.json"), &token()).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

    let record = harness.record("bad.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert!(record.message.starts_with("[400]"), "{}", record.message);
    assert!(harness.catalog.requests().is_empty());
    assert!(harness.store.get_detail(TEAM, "bad.json").unwrap().is_none());
}

#[tokio::test]
async fn test_unparseable_payload_fails() {
    let harness = Harness::new(vec![]);
    harness.seed("x.json", &json!({"run": {"runId": "r"}}));
    harness.blobs.write(CONTAINER, "x.json", b"{\"outputs\": [").unwrap();

    harness.processor.process(&blob("x.json"), &token()).await.unwrap();
    let record = harness.record("x.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert!(record.message.starts_with("[400]"));
}

#[tokio::test]
async fn test_processed_record_is_never_reprocessed() {
    let harness = Harness::new(vec![]);
    harness.seed("r1_j1.json", &basic_event());

    harness.processor.process(&blob("r1_j1.json"), &token()).await.unwrap();
    let before = harness.record("r1_j1.json");
    let detail_before = harness.store.get_detail(TEAM, "r1_j1.json").unwrap();

    let again = harness.processor.process(&blob("r1_j1.json"), &token()).await.unwrap();
    assert_eq!(
        again,
        ProcessOutcome::Skipped(SkipReason::AlreadyTerminal(EventStatus::Processed))
    );
    assert_eq!(harness.catalog.requests().len(), 2);
    assert_eq!(harness.record("r1_j1.json"), before);
    assert_eq!(harness.store.get_detail(TEAM, "r1_j1.json").unwrap(), detail_before);
}

#[tokio::test]
async fn test_untracked_blob_is_skipped() {
    let harness = Harness::new(vec![]);
    let outcome = harness.processor.process(&blob("unknown.json"), &token()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::NotTracked));
    assert!(harness.catalog.requests().is_empty());
}

#[tokio::test]
async fn test_conflict_on_redelivery_still_processes() {
    let harness = Harness::new(vec![
        Reply::Status(201, "created"),
        Reply::Status(201, "created"),
        Reply::Status(409, "already exists"),
        Reply::Status(409, "already exists"),
    ]);
    harness.seed("first.json", &basic_event());
    harness.seed("second.json", &basic_event());

    harness.processor.process(&blob("first.json"), &token()).await.unwrap();
    harness.processor.process(&blob("second.json"), &token()).await.unwrap();

    for file_name in ["first.json", "second.json"] {
        let record = harness.record(file_name);
        assert_eq!(record.status, EventStatus::Processed);
        assert_eq!(record.message, "SUCCESS");
    }
    assert_eq!(harness.catalog.requests().len(), 4);
}

#[tokio::test]
async fn test_sink_failure_marks_failed_and_keeps_other_fields() {
    let harness = Harness::new(vec![Reply::Status(201, "created"), Reply::Status(500, "boom")]);
    harness.seed("r1_j1.json", &basic_event());

    let outcome = harness.processor.process(&blob("r1_j1.json"), &token()).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            message: "[500] boom".to_string()
        }
    );

    let record = harness.record("r1_j1.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert_eq!(record.message, "[500] boom");
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.file_path, format!("{}/r1_j1.json", CONTAINER));
    assert!(!record.is_archived);
    assert!(harness.store.get_detail(TEAM, "r1_j1.json").unwrap().is_none());
}

#[tokio::test]
async fn test_failure_outranks_conflict_and_all_calls_are_made() {
    let harness = Harness::new(vec![Reply::Status(400, "bad end"), Reply::Status(409, "exists")]);
    harness.seed("e.json", &basic_event());

    harness.processor.process(&blob("e.json"), &token()).await.unwrap();

    assert_eq!(harness.catalog.requests().len(), 2);
    let record = harness.record("e.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert_eq!(record.message, "[400] bad end");
}

#[tokio::test]
async fn test_transport_error_counts_as_failure() {
    let harness = Harness::new(vec![Reply::Status(201, "created"), Reply::Transport]);
    harness.seed("e.json", &basic_event());

    harness.processor.process(&blob("e.json"), &token()).await.unwrap();
    let record = harness.record("e.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert!(record.message.contains("connection reset"));
}

#[tokio::test]
async fn test_fail_policy_rejects_missing_identity() {
    let harness = Harness::with_policy(vec![], MissingIdentityPolicy::Fail);
    harness.seed("e.json", &basic_event());

    let outcome = harness.processor.process(&blob("e.json"), &token()).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

    let record = harness.record("e.json");
    assert_eq!(record.status, EventStatus::Failed);
    assert!(record.message.contains("trident.artifact.id"), "{}", record.message);
    assert!(harness.catalog.requests().is_empty());
}

#[tokio::test]
async fn test_missing_blob_is_propagated() {
    let harness = Harness::new(vec![]);
    harness.seed("e.json", &basic_event());
    let err = harness
        .processor
        .process(&BlobRef::new("elsewhere", "e.json"), &token())
        .await
        .unwrap_err();
    assert!(!err.is_parse());
    assert_eq!(harness.record("e.json").status, EventStatus::Unprocessed);
}

#[tokio::test]
async fn test_received_events_are_processed_by_pending_pass() {
    let harness = Harness::new(vec![]);
    let receiver = EventReceiver::new(harness.blobs.clone(), harness.store.clone(), CONTAINER, TEAM);

    let mut accepted = basic_event();
    accepted["job"]["name"] = json!("nb_orders.execute_insert_into_statement");
    let mut ignored = basic_event();
    ignored["job"]["name"] = json!("nb_orders.collect_limit");

    let first = receiver
        .receive(&serde_json::to_vec(&accepted).unwrap(), Utc::now())
        .unwrap();
    let second = receiver
        .receive(&serde_json::to_vec(&ignored).unwrap(), Utc::now())
        .unwrap();
    let ReceiveOutcome::Accepted { file_name, .. } = first else {
        panic!("expected the insert statement to be accepted");
    };
    assert!(matches!(second, ReceiveOutcome::Ignored { .. }));
    assert!(file_name.starts_with("r1_nb_orders_"));

    let (mut credential, _) = credential(chrono::Duration::hours(1));
    let results = harness
        .processor
        .process_pending(CONTAINER, &mut credential)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, file_name);
    assert!(matches!(results[0].1, Ok(ProcessOutcome::Processed { .. })));

    let pending = harness
        .store
        .list_events(TEAM, Some(EventStatus::Unprocessed))
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_pending_pass_refreshes_expiring_token_between_events() {
    let harness = Harness::new(vec![]);
    harness.seed("a.json", &basic_event());
    harness.seed("b.json", &basic_event());

    // Valid for one minute, inside the five minute refresh skew.
    let (mut credential, issued) = credential(chrono::Duration::seconds(60));
    let results = harness
        .processor
        .process_pending(CONTAINER, &mut credential)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|(_, outcome)| matches!(outcome, Ok(ProcessOutcome::Processed { .. }))));
    assert_eq!(issued.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(harness.catalog.tokens(), vec!["token-1", "token-1", "token-2", "token-2"]);
}

#[tokio::test]
async fn test_pending_pass_reuses_long_lived_token() {
    let harness = Harness::new(vec![]);
    harness.seed("a.json", &basic_event());
    harness.seed("b.json", &basic_event());

    let (mut credential, issued) = credential(chrono::Duration::hours(1));
    harness
        .processor
        .process_pending(CONTAINER, &mut credential)
        .await
        .unwrap();

    assert_eq!(issued.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(harness.catalog.tokens().iter().all(|t| t == "token-1"));
}
