use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use school_registry::config::EnrollmentConfig;
use school_registry::error::AppError;
use school_registry::workflows::enrollment::memory::InMemoryReceiptStorage;
use school_registry::workflows::enrollment::receipts::{
    LocalDirectoryStorage, ReceiptPolicy, ReceiptStorage,
};
use school_registry::workflows::enrollment::{
    Clock, CurriculumCatalog, EnrollmentBackends, EnrollmentWorkflow, InMemoryCurriculumCatalog,
    InMemoryHandles, MigrationConfig, SystemClock, WorkflowSettings,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Workflow settings derived from the enrollment section of the app config.
pub(crate) fn workflow_settings(config: &EnrollmentConfig) -> WorkflowSettings {
    WorkflowSettings {
        migration: MigrationConfig {
            lookback: Duration::days(i64::from(config.lookback_days)),
        },
        receipt_policy: ReceiptPolicy::new(config.receipt_max_bytes),
        ..WorkflowSettings::default()
    }
}

pub(crate) fn load_catalog(path: Option<&Path>) -> Result<InMemoryCurriculumCatalog, AppError> {
    match path {
        Some(path) => {
            let catalog = InMemoryCurriculumCatalog::from_path(path)?;
            info!(path = %path.display(), rows = catalog.len(), "curriculum export loaded");
            Ok(catalog)
        }
        None => {
            warn!("CURRICULUM_CSV not set; fee quotes fall back to year-level unit defaults");
            Ok(InMemoryCurriculumCatalog::default())
        }
    }
}

/// Assemble the service workflow: in-memory stores, the configured curriculum export,
/// and receipts on disk when `RECEIPT_DIR` is set.
pub(crate) fn build_workflow(
    config: &EnrollmentConfig,
) -> Result<(EnrollmentWorkflow, InMemoryHandles), AppError> {
    let catalog: Arc<dyn CurriculumCatalog> =
        Arc::new(load_catalog(config.curriculum_csv.as_deref())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let handles = InMemoryHandles::new();
    let receipts: Arc<dyn ReceiptStorage> = match &config.receipt_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "receipts stored on local disk");
            Arc::new(LocalDirectoryStorage::new(dir.clone()))
        }
        None => Arc::new(InMemoryReceiptStorage::default()),
    };

    let backends = EnrollmentBackends {
        receipts,
        ..handles.backends(catalog, clock)
    };
    let workflow = EnrollmentWorkflow::assemble(backends, workflow_settings(config));
    Ok((workflow, handles))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use school_registry::workflows::enrollment::{ProgramCode, YearLevel};
    use std::io::Write;

    #[test]
    fn settings_follow_enrollment_config() {
        let config = EnrollmentConfig {
            lookback_days: 45,
            receipt_max_bytes: 2048,
            ..EnrollmentConfig::default()
        };
        let settings = workflow_settings(&config);
        assert_eq!(settings.migration.lookback, Duration::days(45));
        assert_eq!(settings.receipt_policy.max_bytes(), 2048);
    }

    #[test]
    fn build_workflow_loads_curriculum_export() {
        let path = std::env::temp_dir().join(format!(
            "registry-curriculum-{}.csv",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).expect("temp file");
        writeln!(
            file,
            "program,year_level,semester,subject_code,subject_name,units,instructor,room,schedule,prerequisite"
        )
        .expect("write header");
        writeln!(file, "BSIT,1st Year,1st Term,IT101,Introduction to Computing,3,,,,")
            .expect("write row");
        drop(file);

        let config = EnrollmentConfig {
            curriculum_csv: Some(path.clone()),
            ..EnrollmentConfig::default()
        };
        let (workflow, _handles) = build_workflow(&config).expect("workflow builds");
        let program = ProgramCode::parse("BSIT").expect("code");
        let resolution = workflow
            .curriculum
            .resolve_curriculum(&program, YearLevel::First, "1st Term")
            .expect("catalog reachable");
        assert_eq!(resolution.total_units, 3);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_curriculum_export_is_an_error() {
        let config = EnrollmentConfig {
            curriculum_csv: Some("/nonexistent/curriculum.csv".into()),
            ..EnrollmentConfig::default()
        };
        assert!(matches!(
            build_workflow(&config),
            Err(AppError::Curriculum(_))
        ));
    }

    #[test]
    fn timestamps_parse_as_rfc3339() {
        let parsed = parse_timestamp("2025-06-02T16:00:00+08:00").expect("valid timestamp");
        assert_eq!(parsed.to_rfc3339(), "2025-06-02T08:00:00+00:00");
        assert!(parse_timestamp("June 2").is_err());
    }
}
