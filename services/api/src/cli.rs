use crate::demo::{
    run_curriculum_show, run_demo, run_fee_quote, CurriculumArgs, DemoArgs, FeeQuoteArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use school_registry::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "School Registry",
    about = "Run the enrollment service or inspect curriculum and fees from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Quote tuition and fixed fees for a term
    Fees {
        #[command(subcommand)]
        command: FeesCommand,
    },
    /// Inspect the curriculum catalog
    Curriculum {
        #[command(subcommand)]
        command: CurriculumCommand,
    },
    /// Run an end-to-end demo: submissions, approvals, migration, and cleanup
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum FeesCommand {
    /// Print an itemized fee quote
    Quote(FeeQuoteArgs),
}

#[derive(Subcommand, Debug)]
enum CurriculumCommand {
    /// Resolve the subjects offered for a program, year level, and term
    Show(CurriculumArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fees {
            command: FeesCommand::Quote(args),
        } => run_fee_quote(args),
        Command::Curriculum {
            command: CurriculumCommand::Show(args),
        } => run_curriculum_show(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use school_registry::workflows::enrollment::{StudentType, YearLevel};

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["school-registry"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_fee_quote_arguments() {
        let cli = Cli::try_parse_from([
            "school-registry",
            "fees",
            "quote",
            "--program",
            "Bachelor of Science in Information Technology",
            "--year-level",
            "2nd year",
            "--term",
            "1st Term",
            "--student-type",
            "irregular",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Fees {
                command: FeesCommand::Quote(args),
            }) => {
                assert_eq!(args.program.as_str(), "BSIT");
                assert_eq!(args.year_level, YearLevel::Second);
                assert_eq!(args.student_type, StudentType::Irregular);
                assert_eq!(args.units, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_year_levels() {
        let result = Cli::try_parse_from([
            "school-registry",
            "curriculum",
            "show",
            "--program",
            "BSIT",
            "--year-level",
            "senior",
            "--term",
            "1st Term",
        ]);
        assert!(result.is_err());
    }
}
