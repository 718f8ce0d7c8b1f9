use super::artifact::ModelArtifact;
use super::storage::{LoadOutcome, ModelStore};
use super::validate::{validate_artifact, ArtifactExpectation, ModelError, StaleReason};
use crate::logic::detectors::DetectorKind;
use crate::logic::features::layout::{layout_hash, FEATURE_COUNT, FEATURE_VERSION};

fn expectation() -> ArtifactExpectation {
    ArtifactExpectation {
        kind: DetectorKind::Statistical,
        feature_width: FEATURE_COUNT,
        hyperparameters: serde_json::json!({ "method": "zscore", "threshold": 3.0 }),
    }
}

fn artifact() -> ModelArtifact {
    let state = vec![0.25f64, 1.0 / 7.0, 1e300];
    ModelArtifact::build(
        DetectorKind::Statistical,
        FEATURE_COUNT,
        expectation().hyperparameters,
        42,
        &state,
    )
    .unwrap()
}

#[test]
fn test_fresh_artifact_validates() {
    let a = artifact();
    assert_eq!(a.feature_version, FEATURE_VERSION);
    assert_eq!(a.layout_hash, layout_hash());
    assert!(validate_artifact(&a, &expectation()).is_ok());
}

#[test]
fn test_reject_width_mismatch() {
    let mut a = artifact();
    a.feature_width = FEATURE_COUNT + 1;
    a.checksum = a.compute_checksum();

    match validate_artifact(&a, &expectation()) {
        Err(ModelError::Incompatible(StaleReason::FeatureWidth { expected, actual })) => {
            assert_eq!(expected, FEATURE_COUNT);
            assert_eq!(actual, FEATURE_COUNT + 1);
        }
        other => panic!("Expected FeatureWidth, got {:?}", other),
    }
}

#[test]
fn test_reject_layout_hash_mismatch() {
    let mut a = artifact();
    a.layout_hash = !layout_hash();
    a.checksum = a.compute_checksum();
    assert!(matches!(
        validate_artifact(&a, &expectation()),
        Err(ModelError::Incompatible(StaleReason::LayoutMismatch { .. }))
    ));
}

#[test]
fn test_reject_changed_hyperparameters() {
    let mut expected = expectation();
    expected.hyperparameters = serde_json::json!({ "method": "iqr", "threshold": 3.0 });
    assert!(matches!(
        validate_artifact(&artifact(), &expected),
        Err(ModelError::Incompatible(StaleReason::Hyperparameters))
    ));
}

#[test]
fn test_reject_wrong_detector() {
    let mut expected = expectation();
    expected.kind = DetectorKind::Boundary;
    assert!(matches!(
        validate_artifact(&artifact(), &expected),
        Err(ModelError::Incompatible(StaleReason::DetectorMismatch { .. }))
    ));
}

#[test]
fn test_save_load_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path().join("models"));
    let original = artifact();

    let path = store.save(&original).unwrap();
    assert!(path.exists());

    let loaded = store.load(DetectorKind::Statistical).unwrap().unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.decode_state::<Vec<f64>>().unwrap(), vec![0.25, 1.0 / 7.0, 1e300]);

    match store.load_validated(&expectation()) {
        LoadOutcome::Valid(a) => assert_eq!(a.checksum, original.checksum),
        other => panic!("Expected Valid, got {:?}", other),
    }
}

#[test]
fn test_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    assert!(store.load(DetectorKind::Boundary).unwrap().is_none());
    assert!(matches!(store.load_validated(&expectation()), LoadOutcome::Missing));
}

#[test]
fn test_corrupt_file_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    std::fs::write(store.path_for(DetectorKind::Statistical), b"{ not json").unwrap();
    assert!(matches!(
        store.load_validated(&expectation()),
        LoadOutcome::Stale(StaleReason::Corrupt(_))
    ));
}

#[test]
fn test_tampered_file_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    let mut a = artifact();
    store.save(&a).unwrap();

    a.sample_size = 1;
    let json = serde_json::to_vec(&a).unwrap();
    std::fs::write(store.path_for(DetectorKind::Statistical), json).unwrap();

    assert!(matches!(
        store.load_validated(&expectation()),
        LoadOutcome::Stale(StaleReason::ChecksumMismatch)
    ));
}
