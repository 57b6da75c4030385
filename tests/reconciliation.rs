mod common;

use std::sync::Arc;

use common::{attributes, axis_photo, axis_vector, flaky_service, service, Faults};
use registry::RecordStore;
use serde_json::json;
use visage::{ErrorKind, ServiceError};

#[test]
fn failed_record_commit_removes_the_embedding() {
    let store_faults = Arc::new(Faults::default());
    let (service, index, store) =
        flaky_service(0.5, Arc::new(Faults::default()), store_faults.clone());

    Faults::set(&store_faults.fail_create, true);
    let err = service
        .enroll(attributes("Mina"), &axis_photo(0, 0.0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    assert!(index.is_empty());
    assert_eq!(store.count().unwrap(), 0);
    assert!(!service.identify(&axis_photo(0, 0.0), None).unwrap().found);

    Faults::set(&store_faults.fail_create, false);
    let enrolled = service.enroll(attributes("Mina"), &axis_photo(0, 0.0)).unwrap();
    assert!(index.contains(&enrolled.record.id).unwrap());
}

#[test]
fn failed_compensation_is_reported_as_drift() {
    let index_faults = Arc::new(Faults::default());
    let store_faults = Arc::new(Faults::default());
    let (service, index, _) = flaky_service(0.5, index_faults.clone(), store_faults.clone());

    Faults::set(&store_faults.fail_create, true);
    Faults::set(&index_faults.fail_delete, true);
    let err = service
        .enroll(attributes("Mina"), &axis_photo(0, 0.0))
        .unwrap_err();
    assert!(matches!(err, ServiceError::CompensationFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::ReconciliationDrift);

    // The orphan is left behind and shows up in the audit.
    assert_eq!(index.len(), 1);
    let report = service.audit().unwrap();
    assert_eq!(report.orphaned_embeddings.len(), 1);
}

#[test]
fn delete_aborts_when_the_index_fails() {
    let index_faults = Arc::new(Faults::default());
    let (service, index, store) =
        flaky_service(0.5, index_faults.clone(), Arc::new(Faults::default()));
    let enrolled = service.enroll(attributes("Ravi"), &axis_photo(1, 0.0)).unwrap();

    Faults::set(&index_faults.fail_delete, true);
    let err = service.delete(&enrolled.record.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    assert!(store.get_by_id(&enrolled.record.id).unwrap().is_some());
    assert!(index.contains(&enrolled.record.id).unwrap());
    assert!(service.identify(&axis_photo(1, 0.0), None).unwrap().found);
}

#[test]
fn delete_removes_both_sides_and_repeats_as_a_no_op() {
    let (service, index, store) = service(0.5);
    let enrolled = service.enroll(attributes("Ravi"), &axis_photo(1, 0.0)).unwrap();
    let id = enrolled.record.id;

    let outcome = service.delete(&id).unwrap();
    assert!(outcome.embedding_removed);
    assert!(outcome.record_removed);
    assert!(index.is_empty());
    assert_eq!(store.count().unwrap(), 0);

    for axis in 0..common::DIM {
        let found = service.identify(&axis_photo(axis, 0.0), Some(0.0)).unwrap();
        assert!(!found.found);
    }

    let again = service.delete(&id).unwrap();
    assert!(!again.embedding_removed);
    assert!(!again.record_removed);
}

#[test]
fn delete_cleans_up_orphans_and_legacy_keys() {
    let (service, index, store) = service(0.5);

    index.insert("orphan", &axis_vector(2, 0.0), json!({})).unwrap();
    let outcome = service.delete("orphan").unwrap();
    assert!(outcome.embedding_removed);
    assert!(!outcome.record_removed);

    store
        .create(registry::PersonRecord::new("p-9", attributes("Legacy")).with_vector_id("v-9"))
        .unwrap();
    index.insert("v-9", &axis_vector(3, 0.0), json!({})).unwrap();
    let outcome = service.delete("p-9").unwrap();
    assert!(outcome.embedding_removed && outcome.record_removed);
    assert!(index.is_empty());
}

#[test]
fn delete_by_legacy_alias_removes_the_record_too() {
    let (service, index, store) = service(0.5);
    store
        .create(registry::PersonRecord::new("p-9", attributes("Legacy")).with_vector_id("v-9"))
        .unwrap();
    index.insert("v-9", &axis_vector(3, 0.0), json!({ "person_id": "p-9" })).unwrap();

    let outcome = service.delete("v-9").unwrap();
    assert!(outcome.embedding_removed);
    assert!(outcome.record_removed);
    assert!(index.is_empty());
    assert!(store.get_by_id("p-9").unwrap().is_none());
    assert!(service.audit().unwrap().is_consistent());
}

#[test]
fn delete_by_alias_is_ignored_without_legacy_lookup() {
    let index = Arc::new(index::EmbeddingIndex::open(common::index_config()).unwrap());
    let store = Arc::new(registry::InMemoryRecordStore::new());
    let mut cfg = visage::config::MatcherYamlConfig::with_threshold(0.5);
    cfg.legacy_key_fallback = false;
    let service = visage::IdentityService::new(
        Arc::clone(&index),
        store.clone(),
        Arc::new(common::TextFaceExtractor),
        &cfg,
    )
    .unwrap();
    store
        .create(registry::PersonRecord::new("p-9", attributes("Legacy")).with_vector_id("v-9"))
        .unwrap();

    let outcome = service.delete("v-9").unwrap();
    assert!(!outcome.embedding_removed && !outcome.record_removed);
    assert!(store.get_by_id("p-9").unwrap().is_some());
}

#[test]
fn failed_replace_keeps_the_previous_face() {
    let index_faults = Arc::new(Faults::default());
    let (service, index, _) =
        flaky_service(0.9, index_faults.clone(), Arc::new(Faults::default()));
    let enrolled = service.enroll(attributes("Ines"), &axis_photo(4, 0.0)).unwrap();
    let id = enrolled.record.id.clone();
    let before = index.get(&id).unwrap().unwrap();

    Faults::set(&index_faults.fail_put, true);
    let err = service.replace_face(&id, &axis_photo(6, 0.0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    assert_eq!(index.get(&id).unwrap().unwrap(), before);
    let outcome = service.identify(&axis_photo(4, 0.0), None).unwrap();
    assert_eq!(outcome.identity.unwrap().id, id);
    assert!(!service.identify(&axis_photo(6, 0.0), None).unwrap().found);
}

#[test]
fn replace_face_swaps_the_embedding() {
    let (service, index, _) = service(0.9);
    let enrolled = service.enroll(attributes("Ines"), &axis_photo(4, 0.0)).unwrap();
    let id = enrolled.record.id.clone();

    let replaced = service.replace_face(&id, &axis_photo(6, 0.0)).unwrap();
    assert_eq!(replaced.record.id, id);
    assert!(replaced.record.updated_at >= enrolled.record.updated_at);
    assert_eq!(index.len(), 1);

    assert!(!service.identify(&axis_photo(4, 0.0), None).unwrap().found);
    let outcome = service.identify(&axis_photo(6, 0.0), None).unwrap();
    assert_eq!(outcome.identity.unwrap().id, id);

    let missing = service.replace_face("nobody", &axis_photo(6, 0.0)).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn reset_then_enroll_behaves_like_fresh() {
    let (service, index, store) = service(0.9);
    for axis in 0..4 {
        service
            .enroll(attributes(&format!("p{axis}")), &axis_photo(axis, 0.0))
            .unwrap();
    }

    let report = service.reset().unwrap();
    assert!(report.is_complete());
    assert_eq!(report.embeddings_removed, 4);
    assert_eq!(report.records_removed, 4);
    assert!(index.is_empty());
    assert_eq!(store.count().unwrap(), 0);

    let fresh = service.enroll(attributes("new"), &axis_photo(0, 0.0)).unwrap();
    let outcome = service.identify(&axis_photo(0, 0.0), None).unwrap();
    assert_eq!(outcome.identity.unwrap().id, fresh.record.id);
    assert!(!service.identify(&axis_photo(1, 0.0), None).unwrap().found);
    assert_eq!(service.stats().unwrap().embeddings, 1);
}

#[test]
fn reset_stops_when_the_index_cannot_be_cleared() {
    let index_faults = Arc::new(Faults::default());
    let (service, index, store) =
        flaky_service(0.5, index_faults.clone(), Arc::new(Faults::default()));
    service.enroll(attributes("a"), &axis_photo(0, 0.0)).unwrap();

    Faults::set(&index_faults.fail_clear, true);
    assert_eq!(service.reset().unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(index.len(), 1);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn partial_reset_names_what_was_cleared() {
    let store_faults = Arc::new(Faults::default());
    let (service, index, store) =
        flaky_service(0.5, Arc::new(Faults::default()), store_faults.clone());
    service.enroll(attributes("a"), &axis_photo(0, 0.0)).unwrap();

    Faults::set(&store_faults.fail_clear, true);
    match service.reset().unwrap_err() {
        ServiceError::PartialReset { report, .. } => {
            assert!(report.index_cleared);
            assert!(!report.records_cleared);
            assert!(!report.is_complete());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(index.is_empty());
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(service.audit().unwrap().unindexed_records.len(), 1);
}

#[test]
fn audit_lists_both_kinds_of_drift() {
    let (service, index, store) = service(0.5);
    let kept = service.enroll(attributes("kept"), &axis_photo(0, 0.0)).unwrap();
    assert!(service.audit().unwrap().is_consistent());

    index.insert("orphan", &axis_vector(1, 0.0), json!({})).unwrap();
    store
        .create(registry::PersonRecord::new("no-face", attributes("nf")))
        .unwrap();

    let report = service.audit().unwrap();
    assert_eq!(report.orphaned_embeddings, vec!["orphan"]);
    assert_eq!(report.unindexed_records, vec!["no-face"]);
    assert!(!report.orphaned_embeddings.contains(&kept.record.id));
}
