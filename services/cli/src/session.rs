//! One synchronizer session per command: load, mutate, settle, report.

use crate::cli::AddCommand;
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use position_desk::config::{AppConfig, GatewayConfig};
use position_desk::error::AppError;
use position_desk::positions::codec::{self, parse_form_date};
use position_desk::positions::{
    CandidateForm, HttpPositionGateway, MemberForm, MemberId, MemberKind, MutationAction,
    Position, PositionId, PositionSynchronizer, ReviewerForm, SyncError, SyncEvent,
    TestQuestionForm,
};
use position_desk::telemetry;
use std::fmt;
use std::sync::Arc;
use tracing::info;

type Session = PositionSynchronizer<HttpPositionGateway>;

#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    /// Identifier of the position to work on
    #[arg(long)]
    pub(crate) position: i64,
    /// Override POSITIONS_API_URL for this invocation
    #[arg(long)]
    pub(crate) api_url: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ShowArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
}

#[derive(Args, Debug)]
pub(crate) struct UpdateArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long)]
    pub(crate) number: Option<String>,
    #[arg(long)]
    pub(crate) name: Option<String>,
    #[arg(long)]
    pub(crate) company_info: Option<String>,
    #[arg(long)]
    pub(crate) instruction: Option<String>,
    #[arg(long)]
    pub(crate) about: Option<String>,
    /// Opening date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_form_date)]
    pub(crate) open_date: Option<NaiveDate>,
    /// Closing date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_form_date)]
    pub(crate) close_date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct AddCandidateArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) email: String,
    #[arg(long, default_value = "")]
    pub(crate) phone: String,
    /// Invitation date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_form_date)]
    pub(crate) invitation_date: Option<NaiveDate>,
    /// Invitation expiry date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_form_date)]
    pub(crate) expired_date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct AddReviewerArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long)]
    pub(crate) name: String,
    #[arg(long)]
    pub(crate) email: String,
    /// Reviewer reference number
    #[arg(long, default_value = "")]
    pub(crate) number: String,
    /// Invitation date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_form_date)]
    pub(crate) invitation_date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct AddTestArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Question text
    #[arg(long)]
    pub(crate) question: String,
    /// Allotted answer time in whole minutes
    #[arg(long)]
    pub(crate) minutes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum KindArg {
    Candidate,
    Reviewer,
    Test,
}

impl From<KindArg> for MemberKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Candidate => MemberKind::Candidate,
            KindArg::Reviewer => MemberKind::Reviewer,
            KindArg::Test => MemberKind::TestQuestion,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct RemoveArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long, value_enum)]
    pub(crate) kind: KindArg,
    /// Server identifier of the member to remove
    #[arg(long)]
    pub(crate) member: i64,
}

async fn open(target: &TargetArgs) -> Result<Session, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(url) = target.api_url.as_deref() {
        config.gateway = GatewayConfig::new(url, config.gateway.timeout)?;
    }
    telemetry::init(&config.telemetry)?;

    let gateway = HttpPositionGateway::new(&config.gateway)?;
    info!(
        base_url = gateway.base_url(),
        position_id = target.position,
        "opening position session"
    );
    let mut session = PositionSynchronizer::new(Arc::new(gateway));
    session.load(PositionId(target.position)).await?;
    Ok(session)
}

/// Wait for every remote call, print what happened, and fail if anything was undone.
async fn finish(mut session: Session) -> Result<(), AppError> {
    let events = session.settle().await;
    for event in &events {
        println!("{}", describe_event(event));
    }
    if let Some(position) = session.snapshot() {
        println!();
        print!("{}", PositionView(&position));
    }

    let failure = events.into_iter().find_map(|event| match event {
        SyncEvent::RolledBack { error, .. } | SyncEvent::CleanupFailed { error, .. } => {
            Some(error)
        }
        _ => None,
    });
    match failure {
        Some(error) => Err(AppError::Gateway(error)),
        None => Ok(()),
    }
}

pub(crate) async fn run_show(args: ShowArgs) -> Result<(), AppError> {
    let session = open(&args.target).await?;
    let position = session
        .snapshot()
        .ok_or(SyncError::NotReady(session.state()))?;
    print!("{}", PositionView(&position));
    Ok(())
}

pub(crate) async fn run_update(args: UpdateArgs) -> Result<(), AppError> {
    let mut session = open(&args.target).await?;
    let mut fields = session
        .fields()
        .cloned()
        .ok_or(SyncError::NotReady(session.state()))?;

    if let Some(number) = args.number {
        fields.number = number;
    }
    if let Some(name) = args.name {
        fields.name = name;
    }
    if let Some(company_info) = args.company_info {
        fields.company_info = company_info;
    }
    if let Some(instruction) = args.instruction {
        fields.instruction = instruction;
    }
    if let Some(about) = args.about {
        fields.about = about;
    }
    if let Some(date) = args.open_date {
        fields.open_date = codec::from_form_date(date);
    }
    if let Some(date) = args.close_date {
        fields.close_date = codec::from_form_date(date);
    }

    session.update_fields(fields)?;
    finish(session).await
}

pub(crate) async fn run_add(command: AddCommand) -> Result<(), AppError> {
    let (target, form) = match command {
        AddCommand::Candidate(args) => (
            args.target,
            MemberForm::Candidate(CandidateForm {
                name: args.name,
                email: args.email,
                phone: args.phone,
                invitation_date: args.invitation_date,
                expired_date: args.expired_date,
            }),
        ),
        AddCommand::Reviewer(args) => (
            args.target,
            MemberForm::Reviewer(ReviewerForm {
                name: args.name,
                email: args.email,
                number: args.number,
                invitation_date: args.invitation_date,
            }),
        ),
        AddCommand::Test(args) => (
            args.target,
            MemberForm::TestQuestion(TestQuestionForm {
                name: args.question,
                time: args.minutes,
            }),
        ),
    };

    let mut session = open(&target).await?;
    session.add_member(form)?;
    finish(session).await
}

pub(crate) async fn run_remove(args: RemoveArgs) -> Result<(), AppError> {
    let mut session = open(&args.target).await?;
    let kind = MemberKind::from(args.kind);
    let id = MemberId(args.member);
    let key = match kind {
        MemberKind::Candidate => session.candidates().key_of(id),
        MemberKind::Reviewer => session.reviewers().key_of(id),
        MemberKind::TestQuestion => session.tests().key_of(id),
    }
    .ok_or_else(|| {
        AppError::Input(format!(
            "position {} has no {kind} with id {}",
            args.target.position, id.0
        ))
    })?;

    session.remove_member(kind, key)?;
    finish(session).await
}

fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::FieldsPersisted { mutation } => format!("{mutation} position fields saved"),
        SyncEvent::MemberCreated { mutation, kind, id, .. } => {
            format!("{mutation} {kind} created with id {}", id.0)
        }
        SyncEvent::MemberDeleted { mutation, kind, id } => {
            format!("{mutation} {kind} {} deleted", id.0)
        }
        SyncEvent::RolledBack {
            mutation,
            action,
            error,
        } => {
            let action = match action {
                MutationAction::UpdateFields => "field update".to_string(),
                MutationAction::AddMember(kind) => format!("{kind} add"),
                MutationAction::RemoveMember(kind) => format!("{kind} removal"),
            };
            format!("{mutation} {action} undone: {error}")
        }
        SyncEvent::CleanupFailed {
            mutation,
            kind,
            id,
            error,
        } => format!("{mutation} {kind} {} left on the service: {error}", id.0),
        SyncEvent::Discarded { mutation } => format!("{mutation} outcome ignored"),
    }
}

/// Plain-text rendering of a position with calendar dates.
struct PositionView<'a>(&'a Position);

impl fmt::Display for PositionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = self.0;
        writeln!(
            f,
            "Position {} [{}] {}",
            position.id.0, position.number, position.name
        )?;
        writeln!(
            f,
            "  open {} / close {}",
            codec::display_date(&position.open_date),
            codec::display_date(&position.close_date)
        )?;
        if !position.company_info.is_empty() {
            writeln!(f, "  company: {}", position.company_info)?;
        }
        if !position.instruction.is_empty() {
            writeln!(f, "  instruction: {}", position.instruction)?;
        }
        if !position.about.is_empty() {
            writeln!(f, "  about: {}", position.about)?;
        }

        writeln!(f, "Candidates ({})", position.candidates.len())?;
        for candidate in &position.candidates {
            let invited = candidate
                .invitation_date
                .as_ref()
                .map(codec::display_date)
                .unwrap_or_else(|| "-".to_string());
            let expires = candidate
                .expired_date
                .as_ref()
                .map(codec::display_date)
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "  #{} {} <{}> invited {} expires {}",
                candidate.id.0, candidate.name, candidate.email, invited, expires
            )?;
        }

        writeln!(f, "Reviewers ({})", position.reviewers.len())?;
        for reviewer in &position.reviewers {
            writeln!(
                f,
                "  #{} {} <{}> {}",
                reviewer.id.0, reviewer.name, reviewer.email, reviewer.number
            )?;
        }

        writeln!(f, "Test questions ({})", position.tests.len())?;
        for question in &position.tests {
            writeln!(
                f,
                "  #{} {} ({} min)",
                question.id.0,
                question.name,
                question.time / 60
            )?;
        }
        Ok(())
    }
}
