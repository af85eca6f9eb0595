use crate::demo::{run_demo, run_roster_export, DemoArgs, RosterArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use course_enrollment::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Course Enrollment Coordinator",
    about = "Serve and demonstrate capacity-limited course enrollment from the command line",
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
    /// Walk through an enroll, waitlist and promotion scenario against the demo catalog
    Demo(DemoArgs),
    /// Export a course roster from the demo catalog as CSV on stdout
    Roster(RosterArgs),
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
        Command::Demo(args) => run_demo(args),
        Command::Roster(args) => run_roster_export(args),
    }
}
