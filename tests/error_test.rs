//! Tests for error types

use trueno_runs::Error;

#[test]
fn test_experiment_not_found_error() {
    let error = Error::ExperimentNotFound {
        id: "42".to_string(),
        database: "sacred".to_string(),
    };
    assert_eq!(
        format!("{error}"),
        "Experiment with id 42 does not exist in database \"sacred\"."
    );
    assert!(error.is_not_found());
}

#[test]
fn test_missing_field_error() {
    let error = Error::MissingField {
        path: "config.value".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Missing field"));
    assert!(error_str.contains("config.value"));
    assert!(error.is_not_found());
}

#[test]
fn test_no_content_type_mapping_error() {
    let error = Error::NoContentTypeMapping("application/x-unknown".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("No artifact kind"));
    assert!(error_str.contains("application/x-unknown"));
    assert!(!error.is_not_found());
}

#[test]
fn test_unsupported_render_error() {
    let error = Error::UnsupportedRender {
        kind: "PDFArtifact".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("PDFArtifact does not support rendering"));
    assert!(error_str.contains("save()"));
}

#[test]
fn test_immutable_record_error() {
    let error = Error::ImmutableRecord {
        field: "result".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("immutable"));
    assert!(error_str.contains("result"));
}

#[test]
fn test_no_experiments_error() {
    let error = Error::NoExperiments {
        database: "runs_test".to_string(),
    };
    assert!(format!("{error}").contains("runs_test"));
}

#[test]
fn test_query_and_input_errors() {
    let error = Error::InvalidQuery("unsupported operator $where".to_string());
    assert!(format!("{error}").contains("Invalid query"));

    let error = Error::InvalidInput("cache_capacity must be at least 1".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("cache_capacity"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("connection refused".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("connection refused"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidInput("test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("InvalidInput"));
}
