//! Curriculum lookup tolerant of the inconsistent year-level labels found in reference data.

mod catalog;

pub use catalog::{
    CatalogError, CatalogImportError, CurriculumCatalog, CurriculumEntry,
    InMemoryCurriculumCatalog,
};

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::domain::{ProgramCode, SubjectRecord, YearLevel};

/// Outcome of a curriculum lookup, including which year-level label matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumResolution {
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: String,
    pub subjects: Vec<SubjectRecord>,
    pub total_units: u32,
    pub matched_variant: Option<String>,
    pub attempted_variants: Vec<String>,
}

impl CurriculumResolution {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

pub struct CurriculumResolver {
    catalog: Arc<dyn CurriculumCatalog>,
}

impl CurriculumResolver {
    pub fn new(catalog: Arc<dyn CurriculumCatalog>) -> Self {
        Self { catalog }
    }

    /// Try every surface form of the year level until the catalog returns rows.
    ///
    /// An exhausted variant list yields an empty resolution rather than an error.
    pub fn resolve_curriculum(
        &self,
        program: &ProgramCode,
        year_level: YearLevel,
        semester: &str,
    ) -> Result<CurriculumResolution, CatalogError> {
        let mut attempted = Vec::new();

        for variant in year_level.surface_variants() {
            let rows = self.catalog.entries(program, &variant, semester)?;
            attempted.push(variant.clone());
            if rows.is_empty() {
                continue;
            }

            let subjects: Vec<SubjectRecord> = rows.into_iter().map(subject_from_entry).collect();
            let total_units = subjects
                .iter()
                .fold(0u32, |total, subject| total.saturating_add(subject.units));
            debug!(
                program = %program,
                year_level = %year_level,
                matched_variant = %variant,
                subjects = subjects.len(),
                "curriculum resolved"
            );

            return Ok(CurriculumResolution {
                program: program.clone(),
                year_level,
                semester: semester.trim().to_string(),
                subjects,
                total_units,
                matched_variant: Some(variant),
                attempted_variants: attempted,
            });
        }

        debug!(
            program = %program,
            year_level = %year_level,
            attempts = attempted.len(),
            "no curriculum rows matched any year-level variant"
        );
        Ok(CurriculumResolution {
            program: program.clone(),
            year_level,
            semester: semester.trim().to_string(),
            subjects: Vec::new(),
            total_units: 0,
            matched_variant: None,
            attempted_variants: attempted,
        })
    }

    /// Fill placeholder metadata on request subjects from reference rows.
    pub fn enrich_subjects(
        &self,
        program: &ProgramCode,
        subjects: Vec<SubjectRecord>,
    ) -> Result<Vec<SubjectRecord>, CatalogError> {
        subjects
            .into_iter()
            .map(|subject| {
                let reference = self.catalog.find_subject(program, &subject.code)?;
                Ok(match reference {
                    Some(entry) => enrich_subject(subject, &entry),
                    None => subject,
                })
            })
            .collect()
    }
}

/// True when a value carries no real information ("", "TBA", "NULL").
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("tba")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("n/a")
}

/// Merge reference metadata into a subject without clobbering real values.
pub fn enrich_subject(mut subject: SubjectRecord, entry: &CurriculumEntry) -> SubjectRecord {
    overwrite_if_resolved(&mut subject.instructor, entry.instructor.as_deref());
    overwrite_if_resolved(&mut subject.room, entry.room.as_deref());
    overwrite_if_resolved(&mut subject.schedule, entry.schedule.as_deref());

    if subject.name.trim().is_empty() && !entry.subject_name.is_empty() {
        subject.name = entry.subject_name.clone();
    }
    if subject.units == 0 {
        subject.units = entry.units;
    }
    subject
}

fn overwrite_if_resolved(field: &mut String, resolved: Option<&str>) {
    if let Some(value) = resolved {
        if !is_placeholder(value) {
            *field = value.trim().to_string();
        }
    }
}

fn subject_from_entry(entry: CurriculumEntry) -> SubjectRecord {
    let or_tba = |value: Option<String>| match value {
        Some(value) if !is_placeholder(&value) => value,
        _ => "TBA".to_string(),
    };

    SubjectRecord {
        code: entry.subject_code,
        name: entry.subject_name,
        units: entry.units,
        schedule: or_tba(entry.schedule),
        instructor: or_tba(entry.instructor),
        room: or_tba(entry.room),
    }
}
