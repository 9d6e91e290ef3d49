use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::enrollment::clock::FixedClock;
use crate::workflows::enrollment::curriculum::{CurriculumEntry, InMemoryCurriculumCatalog};
use crate::workflows::enrollment::domain::{
    EnrollmentRequest, ProgramCode, ReceiptMetadata, ReceiptRef, SubjectRecord, UserId,
};
use crate::workflows::enrollment::memory::InMemoryLedger;
use crate::workflows::enrollment::notifications::StudentProfile;
use crate::workflows::enrollment::requests::NewEnrollmentRequest;
use crate::workflows::enrollment::workflow::{
    EnrollmentWorkflow, InMemoryHandles, WorkflowSettings,
};

pub(super) const LINKED_STUDENT: &str = "2021-0001";
pub(super) const LINKED_USER: UserId = UserId(42);

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn entry(year_level: &str, code: &str, units: u32) -> CurriculumEntry {
    CurriculumEntry {
        program: ProgramCode::parse("BSIT").expect("program code"),
        year_level: year_level.to_string(),
        semester: "1st Term".to_string(),
        subject_code: code.to_string(),
        subject_name: format!("Course {code}"),
        units,
        instructor: Some("Prof. Reyes".to_string()),
        room: Some("NULL".to_string()),
        schedule: Some("MWF 08:00-09:00".to_string()),
        prerequisite: None,
    }
}

/// BSIT first term: seven 3-unit subjects keyed "1st Year" and seven keyed "2nd".
pub(super) fn catalog() -> InMemoryCurriculumCatalog {
    let first_year = (1..=7).map(|n| entry("1st Year", &format!("IT1{n:02}"), 3));
    let second_year = (1..=7).map(|n| entry("2nd", &format!("IT2{n:02}"), 3));
    InMemoryCurriculumCatalog::new(first_year.chain(second_year))
}

pub(super) struct Harness {
    pub(super) workflow: Arc<EnrollmentWorkflow>,
    pub(super) handles: InMemoryHandles,
    pub(super) clock: Arc<FixedClock>,
}

impl Harness {
    /// Submit a request for BSIT 1st Year 1st Term and approve it.
    pub(super) fn approved(&self, student_id: &str) -> EnrollmentRequest {
        let request = self
            .workflow
            .requests
            .create(submission(student_id))
            .expect("submission accepted");
        self.workflow
            .requests
            .update_status(request.id, "approved", None)
            .expect("approval succeeds")
            .request
    }
}

pub(super) fn harness() -> Harness {
    harness_with(InMemoryLedger::default(), WorkflowSettings::default())
}

pub(super) fn harness_with(ledger: InMemoryLedger, settings: WorkflowSettings) -> Harness {
    let clock = Arc::new(FixedClock::new(now()));
    let handles = InMemoryHandles::with_ledger(ledger);
    handles.directory.add_user(LINKED_USER, "ana.santos@school.test");
    handles.directory.add_profile(StudentProfile {
        profile_id: 9001,
        student_number: LINKED_STUDENT.to_string(),
        email: Some("Ana.Santos@school.test".to_string()),
    });
    handles.connections.connect(LINKED_USER);

    let workflow = EnrollmentWorkflow::assemble(
        handles.backends(Arc::new(catalog()), clock.clone()),
        settings,
    );
    Harness {
        workflow: Arc::new(workflow),
        handles,
        clock,
    }
}

pub(super) fn receipt() -> ReceiptMetadata {
    ReceiptMetadata {
        reference: ReceiptRef("receipts/20250601080000-0001-gcash.png".to_string()),
        original_name: "gcash.png".to_string(),
        content_type: "image/png".to_string(),
        size_bytes: 48_213,
    }
}

pub(super) fn subject(code: &str) -> SubjectRecord {
    SubjectRecord {
        code: code.to_string(),
        name: String::new(),
        units: 0,
        schedule: "TBA".to_string(),
        instructor: "TBA".to_string(),
        room: "Lab 2".to_string(),
    }
}

pub(super) fn submission(student_id: &str) -> NewEnrollmentRequest {
    NewEnrollmentRequest {
        student_id: student_id.to_string(),
        student_type: Some("regular".to_string()),
        program: "Bachelor of Science in Information Technology".to_string(),
        year_level: "1st Year".to_string(),
        semester: "1st Term".to_string(),
        subjects: vec![subject("IT101"), subject("IT102")],
        total_fees: None,
        payment_receipt: Some(receipt()),
    }
}

pub(super) fn advance(harness: &Harness, seconds: i64) {
    harness.clock.advance(Duration::seconds(seconds));
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
