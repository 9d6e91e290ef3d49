use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::money::Money;
use super::normalizer::{normalize_text, program_code_for_name, year_ordinal};

/// Identifier assigned by the request store on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

/// Identifier of an enrolled-student ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(pub u64);

/// Account identifier used for notification delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enrollment classification that drives the fee schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentType {
    #[default]
    Regular,
    Irregular,
}

impl StudentType {
    pub const fn label(self) -> &'static str {
        match self {
            StudentType::Regular => "regular",
            StudentType::Irregular => "irregular",
        }
    }
}

impl FromStr for StudentType {
    type Err = DomainParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(StudentType::Regular),
            "irregular" => Ok(StudentType::Irregular),
            _ => Err(DomainParseError::StudentType(raw.to_string())),
        }
    }
}

/// Canonical program code ("BSIT"), resolved once from either a code or a long name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramCode(String);

impl ProgramCode {
    pub fn parse(raw: &str) -> Result<Self, DomainParseError> {
        let normalized = normalize_text(raw);
        if normalized.is_empty() {
            return Err(DomainParseError::Program(raw.to_string()));
        }

        let code = match program_code_for_name(&normalized) {
            Some(code) => code.to_string(),
            None => normalized.to_ascii_uppercase(),
        };
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ProgramCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProgramCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProgramCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ordinal year of study, parsed from any of the textual forms used across subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum YearLevel {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
}

impl YearLevel {
    pub const ALL: [YearLevel; 5] = [
        YearLevel::First,
        YearLevel::Second,
        YearLevel::Third,
        YearLevel::Fourth,
        YearLevel::Fifth,
    ];

    pub fn parse(raw: &str) -> Result<Self, DomainParseError> {
        match year_ordinal(raw) {
            Some(1) => Ok(YearLevel::First),
            Some(2) => Ok(YearLevel::Second),
            Some(3) => Ok(YearLevel::Third),
            Some(4) => Ok(YearLevel::Fourth),
            Some(5) => Ok(YearLevel::Fifth),
            _ => Err(DomainParseError::YearLevel(raw.to_string())),
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            YearLevel::First => 1,
            YearLevel::Second => 2,
            YearLevel::Third => 3,
            YearLevel::Fourth => 4,
            YearLevel::Fifth => 5,
        }
    }

    pub const fn ordinal(self) -> &'static str {
        match self {
            YearLevel::First => "1st",
            YearLevel::Second => "2nd",
            YearLevel::Third => "3rd",
            YearLevel::Fourth => "4th",
            YearLevel::Fifth => "5th",
        }
    }

    const fn word(self) -> &'static str {
        match self {
            YearLevel::First => "First",
            YearLevel::Second => "Second",
            YearLevel::Third => "Third",
            YearLevel::Fourth => "Fourth",
            YearLevel::Fifth => "Fifth",
        }
    }

    /// Display label used when the level is written back out ("1st Year").
    pub fn label(self) -> String {
        format!("{} Year", self.ordinal())
    }

    /// Surface forms reference data may be keyed by, in lookup priority order.
    pub fn surface_variants(self) -> Vec<String> {
        let ordinal = self.ordinal();
        let word = self.word();
        vec![
            format!("{ordinal} Year"),
            ordinal.to_string(),
            format!("{ordinal}Year"),
            format!("{ordinal} year"),
            format!("{ordinal}year"),
            format!("{} YEAR", ordinal.to_ascii_uppercase()),
            format!("{word} Year"),
            format!("{} year", word.to_ascii_lowercase()),
            self.number().to_string(),
        ]
    }
}

impl fmt::Display for YearLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Year", self.ordinal())
    }
}

impl Serialize for YearLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for YearLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        YearLevel::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Term label ("1st Term", "2nd Semester"); compared without regard to case or spacing.
#[derive(Debug, Clone, Eq)]
pub struct Semester(String);

impl Semester {
    pub fn parse(raw: &str) -> Result<Self, DomainParseError> {
        let normalized = normalize_text(raw);
        if normalized.is_empty() {
            return Err(DomainParseError::Semester(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn matches(&self, raw: &str) -> bool {
        normalize_text(raw).eq_ignore_ascii_case(&self.0)
    }
}

impl PartialEq for Semester {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::hash::Hash for Semester {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Semester {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Semester {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Semester::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// School year label `"{Y}-{Y+1}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcademicYear(pub String);

impl AcademicYear {
    pub fn starting_in(year: i32) -> Self {
        Self(format!("{}-{}", year, year + 1))
    }

    pub fn containing(moment: DateTime<Utc>) -> Self {
        Self::starting_in(moment.year())
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised while parsing boundary strings into canonical values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainParseError {
    #[error("program is required")]
    Program(String),
    #[error("unrecognized year level '{0}'")]
    YearLevel(String),
    #[error("semester is required")]
    Semester(String),
    #[error("unrecognized student type '{0}'")]
    StudentType(String),
    #[error("unsupported status '{0}'")]
    Status(String),
}

/// Subject line carried on a request and copied into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub units: u32,
    #[serde(default = "tba")]
    pub schedule: String,
    #[serde(default = "tba")]
    pub instructor: String,
    #[serde(default = "tba")]
    pub room: String,
}

pub(crate) fn tba() -> String {
    "TBA".to_string()
}

/// Reviewer-facing status of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = DomainParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(DomainParseError::Status(raw.to_string())),
        }
    }
}

/// Progress of a request through ledger migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    NotMigrated,
    Migrating,
    Migrated,
}

/// Stored payment receipt reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptRef(pub String);

/// Metadata recorded alongside the receipt reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptMetadata {
    pub reference: ReceiptRef,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A submitted enrollment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub id: RequestId,
    pub student_id: String,
    pub student_type: StudentType,
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub subjects: Vec<SubjectRecord>,
    pub total_fees: Money,
    pub payment_receipt: ReceiptMetadata,
    pub status: RequestStatus,
    pub remarks: Option<String>,
    pub migration_status: MigrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentRequest {
    pub fn identity_for(&self, academic_year: &AcademicYear) -> IdentityTuple {
        IdentityTuple {
            student_id: self.student_id.clone(),
            program: self.program.clone(),
            year_level: self.year_level,
            semester: self.semester.clone(),
            academic_year: academic_year.clone(),
        }
    }

    /// Human label for notifications ("1st Term 2025-2026").
    pub fn semester_label(&self, academic_year: Option<&AcademicYear>) -> String {
        match academic_year {
            Some(year) => format!("{} {}", self.semester, year),
            None => self.semester.to_string(),
        }
    }
}

/// Lifecycle of a ledger row after migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Active,
    Dropped,
    Graduated,
}

impl LedgerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LedgerStatus::Active => "active",
            LedgerStatus::Dropped => "dropped",
            LedgerStatus::Graduated => "graduated",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = DomainParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LedgerStatus::Active),
            "dropped" => Ok(LedgerStatus::Dropped),
            "graduated" => Ok(LedgerStatus::Graduated),
            _ => Err(DomainParseError::Status(raw.to_string())),
        }
    }
}

/// Authoritative enrollment row produced by migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledStudent {
    pub id: LedgerEntryId,
    pub enrollment_request_id: RequestId,
    pub student_id: String,
    pub student_type: StudentType,
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub subjects: Vec<SubjectRecord>,
    pub total_fees: Money,
    pub enrollment_date: DateTime<Utc>,
    pub academic_year: AcademicYear,
    pub status: LedgerStatus,
}

impl EnrolledStudent {
    pub fn identity(&self) -> IdentityTuple {
        IdentityTuple {
            student_id: self.student_id.clone(),
            program: self.program.clone(),
            year_level: self.year_level,
            semester: self.semester.clone(),
            academic_year: self.academic_year.clone(),
        }
    }
}

/// Ledger row before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnrolledStudent {
    pub enrollment_request_id: RequestId,
    pub student_id: String,
    pub student_type: StudentType,
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub subjects: Vec<SubjectRecord>,
    pub total_fees: Money,
    pub enrollment_date: DateTime<Utc>,
    pub academic_year: AcademicYear,
}

impl NewEnrolledStudent {
    pub fn from_request(request: &EnrollmentRequest, academic_year: AcademicYear) -> Self {
        Self {
            enrollment_request_id: request.id,
            student_id: request.student_id.clone(),
            student_type: request.student_type,
            program: request.program.clone(),
            year_level: request.year_level,
            semester: request.semester.clone(),
            subjects: request.subjects.clone(),
            total_fees: request.total_fees,
            enrollment_date: request.created_at,
            academic_year,
        }
    }

    pub fn identity(&self) -> IdentityTuple {
        IdentityTuple {
            student_id: self.student_id.clone(),
            program: self.program.clone(),
            year_level: self.year_level,
            semester: self.semester.clone(),
            academic_year: self.academic_year.clone(),
        }
    }
}

/// Key under which at most one active ledger row may exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityTuple {
    pub student_id: String,
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub academic_year: AcademicYear,
}

impl IdentityTuple {
    pub fn with_student_id(&self, student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for IdentityTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {} / {} / {}",
            self.student_id, self.program, self.year_level, self.semester, self.academic_year
        )
    }
}
