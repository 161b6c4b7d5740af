use sheetflow::core::error::AppError;
use sheetflow::core::types::{ErrorCategory, ErrorSeverity, NodeStatus};

#[test]
fn test_error_creation_all_categories() {
    let categories = vec![
        ErrorCategory::ConfigError,
        ErrorCategory::ResolutionFailure,
        ErrorCategory::NodeExecutionFailure,
        ErrorCategory::ValidationError,
        ErrorCategory::SerializationError,
        ErrorCategory::IoError,
        ErrorCategory::InternalError,
    ];

    for category in categories {
        let error = AppError::new(category, "test message");
        assert_eq!(error.category, category);
        assert_eq!(error.message, "test message");
        assert!(error.context.is_empty());
        assert!(error.code.starts_with("ERR-"));
        assert!(error.occurred_at <= chrono::Utc::now());
        assert!(error.source.is_none());
    }
}

#[test]
fn test_error_severity_mapping() {
    let test_cases = vec![
        (ErrorCategory::ConfigError, ErrorSeverity::Error),
        (ErrorCategory::ResolutionFailure, ErrorSeverity::Warning),
        (ErrorCategory::NodeExecutionFailure, ErrorSeverity::Error),
        (ErrorCategory::ValidationError, ErrorSeverity::Error),
        (ErrorCategory::SerializationError, ErrorSeverity::Error),
        (ErrorCategory::IoError, ErrorSeverity::Error),
        (ErrorCategory::InternalError, ErrorSeverity::Error),
    ];

    for (category, expected_severity) in test_cases {
        let error = AppError::new(category, "test");
        assert_eq!(error.severity(), expected_severity);
    }
}

#[test]
fn test_only_config_errors_abort_assembly() {
    assert!(AppError::new(ErrorCategory::ConfigError, "unsafe").is_fatal_for_assembly());
    assert!(!AppError::new(ErrorCategory::ResolutionFailure, "missing").is_fatal_for_assembly());
    assert!(!AppError::new(ErrorCategory::NodeExecutionFailure, "boom").is_fatal_for_assembly());
}

#[test]
fn test_display_includes_code_category_and_sorted_context() {
    let error = AppError::new(ErrorCategory::NodeExecutionFailure, "rule failed")
        .with_code("SFL-TEST")
        .with_context("node", "calculate_totals")
        .with_context("module", "calculate_totals");

    let rendered = error.to_string();
    assert!(rendered.starts_with("[SFL-TEST] NodeExecutionFailure: rule failed"));
    let module_at = rendered.find("module").unwrap();
    let node_at = rendered.find("\"node\"").unwrap();
    assert!(module_at < node_at);
}

#[test]
fn test_error_from_io_and_anyhow() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let error: AppError = io.into();
    assert_eq!(error.category, ErrorCategory::IoError);
    assert_eq!(error.code, "IO_ERROR");
    assert!(error.source.is_some());

    let error: AppError = anyhow::anyhow!("plumbing failed").into();
    assert_eq!(error.category, ErrorCategory::InternalError);
    assert_eq!(error.message, "plumbing failed");
}

#[test]
fn test_error_with_source_is_reported() {
    let source: Box<dyn std::error::Error + Send + Sync> = "underlying".into();
    let error = AppError::with_source(ErrorCategory::SerializationError, "bad yaml", source);
    assert!(error.to_string().contains("Caused by: underlying"));
}

#[test]
fn test_node_status_strings() {
    assert_eq!(NodeStatus::Applied.as_str(), "applied");
    assert_eq!(NodeStatus::Failed.as_str(), "failed");
    assert_eq!(
        serde_json::to_string(&NodeStatus::Failed).unwrap(),
        "\"failed\""
    );
}
