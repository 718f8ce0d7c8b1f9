//! Integration Tests for Detectors
//!
//! All four detectors built from config, fed real extracted features.

#[cfg(test)]
mod integration_tests {
    use crate::logic::config::EngineConfig;
    use crate::logic::detectors::*;
    use crate::logic::features::{FeatureExtractor, FrequencyProfile};
    use crate::logic::governor::ComputeBackend;
    use crate::logic::records::LogRecord;

    fn records() -> Vec<LogRecord> {
        let mut records: Vec<LogRecord> = (0..40)
            .map(|i| {
                LogRecord::new(
                    format!("n{}", i),
                    format!("2024-05-06T{:02}:{:02}:00Z", 9 + i % 8, i % 60),
                    "cron",
                    format!("backup job {} completed", i % 4),
                )
                .with_severity("INFO")
                .with_event_id("100")
            })
            .collect();
        records.push(
            LogRecord::new(
                "x1",
                "2024-05-06T03:00:00Z",
                "sshd",
                "Failed password for invalid user admin from 198.51.100.4 port 22 ssh2",
            )
            .with_severity("HIGH")
            .with_event_id("4625")
            .with_account("admin"),
        );
        records
    }

    fn input() -> DetectorInput {
        let records = records();
        let profile = FrequencyProfile::from_records(&records);
        let batch = FeatureExtractor::new().extract_batch(&records, &profile);
        DetectorInput::from_records(&records, batch.matrix)
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in DetectorKind::ALL {
            assert_eq!(DetectorKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(DetectorKind::from_name("lstm"), None);
        assert_eq!(serde_json::to_string(&DetectorKind::TreePartition).unwrap(), "\"tree_partition\"");
    }

    #[test]
    fn test_every_detector_scores_every_row_in_range() {
        let config = EngineConfig::default();
        let input = input();

        for kind in DetectorKind::ALL {
            let mut detector = build_detector(kind, &config, ComputeBackend::Scalar);
            assert_eq!(detector.kind(), kind);
            if detector.requires_training() {
                detector.fit(&input).unwrap();
            }

            let results = detector.score(&input).unwrap();
            assert_eq!(results.len(), input.rows(), "{}", kind);
            for (result, id) in results.iter().zip(input.record_ids.iter()) {
                assert_eq!(&result.record_id, id);
                assert!((0.0..=1.0).contains(&result.normalized_score), "{} {}", kind, result.normalized_score);
                assert!(!result.failed);
            }

            // The brute-force row is never below the batch median
            let mut sorted: Vec<f64> = results.iter().map(|r| r.normalized_score).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let median = sorted[sorted.len() / 2];
            assert!(results.last().unwrap().normalized_score >= median, "{}", kind);
        }
    }

    #[test]
    fn test_hyperparameters_reflect_config() {
        let mut config = EngineConfig::default();
        config.tree_count = 12;
        config.random_seed = 9;
        let detector = build_detector(DetectorKind::TreePartition, &config, ComputeBackend::Scalar);
        assert_eq!(detector.hyperparameters()["n_trees"], 12);
        assert_eq!(detector.hyperparameters()["seed"], 9);

        let boundary = build_detector(DetectorKind::Boundary, &config, ComputeBackend::Scalar);
        assert_eq!(boundary.hyperparameters()["backend"], "scalar");
    }

    #[test]
    fn test_calibration_edges() {
        let calibration = ScoreCalibration::from_training(&[0.1, 0.2, 0.3, 0.4, 0.9], 0.0);
        assert_eq!(calibration.low, 0.3);
        assert_eq!(calibration.high, 0.9);
        assert_eq!(calibration.normalize(0.1), 0.0);
        assert_eq!(calibration.normalize(0.9), 1.0);
        assert_eq!(calibration.normalize(5.0), 1.0);
        assert!((calibration.normalize(0.6) - 0.5).abs() < 1e-12);

        let flat = ScoreCalibration::from_training(&[0.5, 0.5], 0.0);
        assert_eq!(flat.normalize(0.5), 0.0);
        assert_eq!(flat.normalize(0.6), 1.0);

        // A spread below the floor does not stretch to 1
        let narrow = ScoreCalibration::from_training(&[0.50, 0.51, 0.52, 0.53, 0.56], 0.15);
        assert_eq!(narrow.low, 0.52);
        assert!((narrow.high - 0.67).abs() < 1e-12);
        assert!((narrow.normalize(0.56) - 0.04 / 0.15).abs() < 1e-12);
        assert_eq!(narrow.normalize(0.7), 1.0);

        // A wide spread is unaffected by the floor
        let wide = ScoreCalibration::from_training(&[0.1, 0.2, 0.3, 0.4, 0.9], 0.15);
        assert_eq!(wide.high, 0.9);
    }
}
