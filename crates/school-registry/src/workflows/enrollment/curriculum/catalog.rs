use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Deserializer, Serialize};

use crate::workflows::enrollment::domain::ProgramCode;
use crate::workflows::enrollment::normalizer::normalize_text;

/// Reference row describing one subject offered in a program term.
///
/// `year_level` keeps the raw label the reference data was keyed by; the
/// resolver is responsible for trying the different surface forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumEntry {
    pub program: ProgramCode,
    pub year_level: String,
    pub semester: String,
    pub subject_code: String,
    pub subject_name: String,
    pub units: u32,
    pub instructor: Option<String>,
    pub room: Option<String>,
    pub schedule: Option<String>,
    pub prerequisite: Option<String>,
}

/// Read-only lookup over curriculum reference data.
pub trait CurriculumCatalog: Send + Sync {
    /// Rows whose year-level label equals `year_level_label` after trimming,
    /// ignoring ASCII case.
    fn entries(
        &self,
        program: &ProgramCode,
        year_level_label: &str,
        semester: &str,
    ) -> Result<Vec<CurriculumEntry>, CatalogError>;

    /// Any row in the program carrying the given subject code.
    fn find_subject(
        &self,
        program: &ProgramCode,
        subject_code: &str,
    ) -> Result<Option<CurriculumEntry>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("curriculum catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogImportError {
    #[error("failed to read curriculum export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid curriculum CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("curriculum row {row} has no program")]
    MissingProgram { row: usize },
}

/// Curriculum reference data held in memory, keyed by program code.
#[derive(Debug, Default)]
pub struct InMemoryCurriculumCatalog {
    entries: RwLock<HashMap<ProgramCode, Vec<CurriculumEntry>>>,
}

impl InMemoryCurriculumCatalog {
    pub fn new(entries: impl IntoIterator<Item = CurriculumEntry>) -> Self {
        let catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load an export with the columns `program, year_level, semester, subject_code,
    /// subject_name, units, instructor, room, schedule, prerequisite`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let catalog = Self::default();

        for (index, row) in csv_reader.deserialize::<CurriculumRow>().enumerate() {
            let row = row?;
            let program = ProgramCode::parse(&row.program)
                .map_err(|_| CatalogImportError::MissingProgram { row: index + 1 })?;
            catalog.insert(CurriculumEntry {
                program,
                year_level: normalize_text(&row.year_level),
                semester: normalize_text(&row.semester),
                subject_code: normalize_text(&row.subject_code),
                subject_name: normalize_text(&row.subject_name),
                units: row.units.unwrap_or(0),
                instructor: row.instructor,
                room: row.room,
                schedule: row.schedule,
                prerequisite: row.prerequisite,
            });
        }

        Ok(catalog)
    }

    pub fn insert(&self, entry: CurriculumEntry) {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.entry(entry.program.clone()).or_default().push(entry);
    }

    pub fn len(&self) -> usize {
        let guard = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CurriculumCatalog for InMemoryCurriculumCatalog {
    fn entries(
        &self,
        program: &ProgramCode,
        year_level_label: &str,
        semester: &str,
    ) -> Result<Vec<CurriculumEntry>, CatalogError> {
        let guard = self
            .entries
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?;
        let year_level_label = year_level_label.trim();
        let semester = normalize_text(semester);

        Ok(guard
            .get(program)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.year_level.eq_ignore_ascii_case(year_level_label))
                    .filter(|row| row.semester.eq_ignore_ascii_case(&semester))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_subject(
        &self,
        program: &ProgramCode,
        subject_code: &str,
    ) -> Result<Option<CurriculumEntry>, CatalogError> {
        let guard = self
            .entries
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?;
        let subject_code = subject_code.trim();

        Ok(guard.get(program).and_then(|rows| {
            rows.iter()
                .find(|row| row.subject_code.eq_ignore_ascii_case(subject_code))
                .cloned()
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CurriculumRow {
    program: String,
    year_level: String,
    semester: String,
    subject_code: String,
    #[serde(default)]
    subject_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    units: Option<u32>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    instructor: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    room: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    schedule: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    prerequisite: Option<String>,
}

fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
