use crate::infra::{load_catalog, parse_timestamp};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use school_registry::config::AppConfig;
use school_registry::error::AppError;
use school_registry::workflows::enrollment::domain::SubjectRecord;
use school_registry::workflows::enrollment::{
    CurriculumResolver, EnrollmentWorkflow, FeeBreakdown, FeeCalculator,
    FeeSchedule, FixedClock, InMemoryCurriculumCatalog, MigrationSummary, NewEnrollmentRequest,
    ProgramCode, StudentType, WorkflowSettings, YearLevel,
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_CURRICULUM: &str = "program,year_level,semester,subject_code,subject_name,units,instructor,room,schedule,prerequisite\n\
BSIT,1st Year,1st Term,IT101,Introduction to Computing,3,,Lab 1,MWF 08:00-09:00,\n\
BSIT,1st Year,1st Term,IT102,Computer Programming 1,3,,Lab 2,TTh 09:00-10:30,\n\
BSIT,1st Year,1st Term,GE1,Understanding the Self,3,,Room 204,MWF 10:00-11:00,\n\
BSIT,1st Year,1st Term,PE1,Physical Fitness,2,,Gym,Sat 07:00-09:00,\n";

#[derive(Args, Debug)]
pub(crate) struct FeeQuoteArgs {
    /// Program code or full program name
    #[arg(long, value_parser = ProgramCode::parse)]
    pub(crate) program: ProgramCode,
    /// Year level, e.g. "1st Year", "2nd", "third year"
    #[arg(long, value_parser = YearLevel::parse)]
    pub(crate) year_level: YearLevel,
    /// Term label, e.g. "1st Term"
    #[arg(long)]
    pub(crate) term: String,
    /// regular or irregular
    #[arg(long, default_value = "regular")]
    pub(crate) student_type: StudentType,
    /// Units to bill instead of the curriculum total
    #[arg(long)]
    pub(crate) units: Option<u32>,
    /// Curriculum CSV export (defaults to CURRICULUM_CSV)
    #[arg(long)]
    pub(crate) curriculum_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CurriculumArgs {
    /// Program code or full program name
    #[arg(long, value_parser = ProgramCode::parse)]
    pub(crate) program: ProgramCode,
    #[arg(long, value_parser = YearLevel::parse)]
    pub(crate) year_level: YearLevel,
    #[arg(long)]
    pub(crate) term: String,
    /// Curriculum CSV export (defaults to CURRICULUM_CSV)
    #[arg(long)]
    pub(crate) curriculum_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Curriculum CSV export; a built-in BSIT sample is used when omitted.
    #[arg(long)]
    pub(crate) curriculum_csv: Option<PathBuf>,
    /// Reference time for the demo (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

fn resolver_for(curriculum_csv: Option<PathBuf>) -> Result<Arc<CurriculumResolver>, AppError> {
    let path = match curriculum_csv {
        Some(path) => Some(path),
        None => AppConfig::load()?.enrollment.curriculum_csv,
    };
    let catalog = load_catalog(path.as_deref())?;
    Ok(Arc::new(CurriculumResolver::new(Arc::new(catalog))))
}

pub(crate) fn run_fee_quote(args: FeeQuoteArgs) -> Result<(), AppError> {
    let calculator =
        FeeCalculator::new(FeeSchedule::default(), resolver_for(args.curriculum_csv)?);
    let quote = calculator.calculate_fees(
        &args.program,
        args.year_level,
        &args.term,
        args.student_type,
        args.units,
    );
    render_fee_quote(&quote);
    Ok(())
}

pub(crate) fn run_curriculum_show(args: CurriculumArgs) -> Result<(), AppError> {
    let resolver = resolver_for(args.curriculum_csv)?;
    let resolution = resolver
        .resolve_curriculum(&args.program, args.year_level, &args.term)
        .map_err(command_failure)?;

    println!(
        "{} {} {}",
        resolution.program, resolution.year_level, resolution.semester
    );
    match &resolution.matched_variant {
        Some(variant) => println!("Matched year label: {variant}"),
        None => println!(
            "No subjects found; tried {}",
            resolution.attempted_variants.join(", ")
        ),
    }
    for subject in &resolution.subjects {
        render_subject(subject);
    }
    println!("Total units: {}", resolution.total_units);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        curriculum_csv,
        as_of,
    } = args;

    let catalog = match curriculum_csv {
        Some(path) => load_catalog(Some(&path))?,
        None => sample_catalog()?,
    };
    let clock = Arc::new(FixedClock::new(as_of.unwrap_or_else(Utc::now)));
    let (workflow, handles) = EnrollmentWorkflow::in_memory(
        Arc::new(catalog),
        clock.clone(),
        WorkflowSettings::default(),
    );

    println!("Enrollment workflow demo");
    let receipt = workflow
        .receipts
        .store_receipt(b"%PDF-1.7 demo receipt", "GCash receipt.pdf")
        .map_err(command_failure)?;
    println!("- stored receipt {}", receipt.reference.0);

    let submissions = [
        ("2023-0101", "approved"),
        ("2023-0101", "approved"),
        ("2023-0101-A", "approved"),
        ("2024-0202", "approved"),
        ("2024-0303", "rejected"),
        ("2024-0404", "pending"),
    ];
    for (student_id, decision) in submissions {
        let request = workflow
            .requests
            .create(NewEnrollmentRequest {
                student_id: student_id.to_string(),
                program: "BSIT".to_string(),
                year_level: "1st Year".to_string(),
                semester: "1st Term".to_string(),
                subjects: ["IT101", "IT102", "GE1"]
                    .into_iter()
                    .map(|code| SubjectRecord {
                        code: code.to_string(),
                        name: String::new(),
                        units: 0,
                        schedule: "TBA".to_string(),
                        instructor: "TBA".to_string(),
                        room: "TBA".to_string(),
                    })
                    .collect(),
                payment_receipt: Some(receipt.clone()),
                ..NewEnrollmentRequest::default()
            })
            .map_err(command_failure)?;
        if decision != "pending" {
            workflow
                .requests
                .update_status(request.id, decision, None)
                .map_err(command_failure)?;
        }
        println!(
            "- request #{} for {} ({} due) marked {}",
            request.id, student_id, request.total_fees, decision
        );
        clock.advance(Duration::minutes(5));
    }

    let first = workflow.migration.migrate_approved()?;
    render_migration("First migration run", &first);
    let second = workflow.migration.migrate_approved()?;
    render_migration("Second migration run", &second);

    let cleanup = workflow.ledger.cleanup_duplicates().map_err(command_failure)?;
    println!(
        "\nLedger cleanup removed {} row(s) across {} group(s)",
        cleanup.removed_count, cleanup.duplicate_groups
    );

    let ledger = workflow.ledger.list(None).map_err(command_failure)?;
    println!("Active ledger rows: {}", ledger.len());
    for row in &ledger {
        println!(
            "  - #{} {} {} {} {} ({})",
            row.id, row.student_id, row.program, row.year_level, row.semester, row.academic_year
        );
    }
    println!(
        "Notifications recorded: {}",
        handles.notifications.all().len()
    );

    Ok(())
}

fn command_failure(err: impl std::fmt::Display) -> AppError {
    AppError::Io(std::io::Error::other(err.to_string()))
}

fn render_fee_quote(quote: &FeeBreakdown) {
    println!(
        "{} {} {} ({})",
        quote.program,
        quote.year_level,
        quote.term,
        quote.student_type.label()
    );
    println!(
        "Tuition: {} units x {} = {}",
        quote.total_units, quote.per_unit_rate, quote.tuition
    );
    for line in &quote.fixed_fees {
        println!("  {:<14} {:>10}  {}", line.label, line.amount.to_string(), line.note);
    }
    println!("Total: {}", quote.total);
}

fn render_subject(subject: &SubjectRecord) {
    println!(
        "  {:<8} {:<40} {:>2}u  {} | {} | {}",
        subject.code,
        subject.name,
        subject.units,
        subject.schedule,
        subject.instructor,
        subject.room
    );
}

fn render_migration(title: &str, summary: &MigrationSummary) {
    println!("\n{title} ({})", summary.academic_year);
    println!("- {}", summary.headline());
    for entry in &summary.migrated {
        println!(
            "  + request #{} -> ledger #{} ({})",
            entry.request_id, entry.ledger_entry_id, entry.student_id
        );
    }
    for duplicate in &summary.duplicates {
        println!("  = request #{}: {}", duplicate.request_id, duplicate.reason);
    }
    for error in &summary.errors {
        println!("  ! request #{}: {}", error.request_id, error.message);
    }
    println!(
        "- notifications: {} sent, {} skipped, {} failed",
        summary.notifications.sent, summary.notifications.skipped, summary.notifications.failed
    );
}

fn sample_catalog() -> Result<InMemoryCurriculumCatalog, AppError> {
    let catalog = InMemoryCurriculumCatalog::from_reader(Cursor::new(SAMPLE_CURRICULUM))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_catalog_covers_first_term() {
        let catalog = sample_catalog().expect("sample loads");
        assert_eq!(catalog.len(), 4);

        let resolver = CurriculumResolver::new(Arc::new(catalog));
        let program = ProgramCode::parse("BSIT").expect("code");
        let resolution = resolver
            .resolve_curriculum(&program, YearLevel::First, "1st Term")
            .expect("catalog reachable");
        assert_eq!(resolution.total_units, 11);
    }

    #[test]
    fn demo_runs_against_the_sample_catalog() {
        let args = DemoArgs {
            curriculum_csv: None,
            as_of: Some(parse_timestamp("2025-06-02T08:00:00Z").expect("timestamp")),
        };
        run_demo(args).expect("demo completes");
    }
}
