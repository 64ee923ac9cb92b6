use crate::server;
use crate::session::{
    run_add, run_remove, run_show, run_update, AddCandidateArgs, AddReviewerArgs, AddTestArgs,
    RemoveArgs, ShowArgs, UpdateArgs,
};
use clap::{Args, Parser, Subcommand};
use position_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "position-desk",
    about = "Edit a job position, its candidates, reviewers, and test questions against the positions service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a position and print it with all of its collections
    Show(ShowArgs),
    /// Edit the scalar fields of a position
    Update(UpdateArgs),
    /// Add a candidate, reviewer, or test question to a position
    Add {
        #[command(subcommand)]
        member: AddCommand,
    },
    /// Remove a candidate, reviewer, or test question from a position
    Remove(RemoveArgs),
    /// Run the in-memory positions service for local use
    ServeStub(ServeArgs),
}

#[derive(Subcommand, Debug)]
pub(crate) enum AddCommand {
    /// Invite a candidate
    Candidate(AddCandidateArgs),
    /// Invite a reviewer
    Reviewer(AddReviewerArgs),
    /// Attach a test question
    Test(AddTestArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the stub service
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the stub service
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Show(args) => run_show(args).await,
        Command::Update(args) => run_update(args).await,
        Command::Add { member } => run_add(member).await,
        Command::Remove(args) => run_remove(args).await,
        Command::ServeStub(args) => server::run(args).await,
    }
}
