//! Cluster event protocol.
//!
//! Five message shapes are exchanged between instances. Every event carries the
//! id of the instance that published it, and is transferred by value.

use crate::ids::{InstanceId, JobId};
use crate::model::{CacheJobInfo, CacheJobStatus};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};

/// Subject for broadcast job-status responses.
pub const STATUS_BROADCAST_SUBJECT: &str = "jobs.status.all";
/// Pattern matching every command subject.
pub const COMMANDS_PATTERN: &str = "jobs.command.>";

/// Subject for job-status responses addressed to a single instance.
pub fn status_subject(target: &InstanceId) -> String {
    format!("jobs.status.{}", target.subject_token())
}

/// Subject patterns an instance subscribes to: every command, broadcast
/// responses, and responses addressed to it.
pub fn subscription_patterns(instance: &InstanceId) -> Vec<String> {
    vec![
        COMMANDS_PATTERN.to_string(),
        STATUS_BROADCAST_SUBJECT.to_string(),
        status_subject(instance),
    ]
}

/// All events exchanged between cluster instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheJobEvent {
    LaunchJob(LaunchJobCommand),
    AbortJob(AbortJobCommand),
    PruneJobs(PruneJobsCommand),
    DescribeJobs(DescribeJobsCommand),
    DescribeJobsResponse(DescribeJobsResponse),
}

impl CacheJobEvent {
    /// The instance that published the event.
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            CacheJobEvent::LaunchJob(e) => &e.instance_id,
            CacheJobEvent::AbortJob(e) => &e.instance_id,
            CacheJobEvent::PruneJobs(e) => &e.instance_id,
            CacheJobEvent::DescribeJobs(e) => &e.instance_id,
            CacheJobEvent::DescribeJobsResponse(e) => &e.instance_id,
        }
    }

    /// The addressee, `None` meaning every instance.
    pub fn target_instance_id(&self) -> Option<&InstanceId> {
        match self {
            CacheJobEvent::DescribeJobs(e) => e.target_instance_id.as_ref(),
            CacheJobEvent::DescribeJobsResponse(e) => e.target_instance_id.as_ref(),
            _ => None,
        }
    }

    /// Whether the event is meant for `instance`.
    pub fn is_addressed_to(&self, instance: &InstanceId) -> bool {
        self.target_instance_id()
            .is_none_or(|target| target == instance)
    }

    /// Returns the transport subject for this event.
    pub fn subject(&self) -> String {
        match self {
            CacheJobEvent::LaunchJob(_) => "jobs.command.launch".to_string(),
            CacheJobEvent::AbortJob(_) => "jobs.command.abort".to_string(),
            CacheJobEvent::PruneJobs(_) => "jobs.command.prune".to_string(),
            CacheJobEvent::DescribeJobs(_) => "jobs.command.describe".to_string(),
            CacheJobEvent::DescribeJobsResponse(e) => match &e.target_instance_id {
                Some(target) => status_subject(target),
                None => STATUS_BROADCAST_SUBJECT.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheJobEvent::LaunchJob(_) => "launch_job",
            CacheJobEvent::AbortJob(_) => "abort_job",
            CacheJobEvent::PruneJobs(_) => "prune_jobs",
            CacheJobEvent::DescribeJobs(_) => "describe_jobs",
            CacheJobEvent::DescribeJobsResponse(_) => "describe_jobs_response",
        }
    }
}

/// Asks every instance to launch the same job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchJobCommand {
    pub instance_id: InstanceId,
    pub job: CacheJobInfo,
}

/// Asks every instance to abort a job, if it runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AbortJobCommand {
    pub instance_id: InstanceId,
    pub job_id: JobId,
}

/// Asks every instance to prune its own finished jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PruneJobsCommand {
    pub instance_id: InstanceId,
}

/// Asks instances to reply with a [`DescribeJobsResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DescribeJobsCommand {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub target_instance_id: Option<InstanceId>,
    #[serde(default)]
    pub include_terminated: bool,
}

/// An instance advertising the status of some or all of its jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DescribeJobsResponse {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub target_instance_id: Option<InstanceId>,
    pub jobs: Vec<CacheJobStatus>,
}

impl From<LaunchJobCommand> for CacheJobEvent {
    fn from(event: LaunchJobCommand) -> Self {
        CacheJobEvent::LaunchJob(event)
    }
}

impl From<AbortJobCommand> for CacheJobEvent {
    fn from(event: AbortJobCommand) -> Self {
        CacheJobEvent::AbortJob(event)
    }
}

impl From<PruneJobsCommand> for CacheJobEvent {
    fn from(event: PruneJobsCommand) -> Self {
        CacheJobEvent::PruneJobs(event)
    }
}

impl From<DescribeJobsCommand> for CacheJobEvent {
    fn from(event: DescribeJobsCommand) -> Self {
        CacheJobEvent::DescribeJobs(event)
    }
}

impl From<DescribeJobsResponse> for CacheJobEvent {
    fn from(event: DescribeJobsResponse) -> Self {
        CacheJobEvent::DescribeJobsResponse(event)
    }
}

/// JSON schema of the wire protocol.
pub fn schema() -> RootSchema {
    schemars::schema_for!(CacheJobEvent)
}

/// Whether a subject matches a subscription pattern.
///
/// Tokens are separated by `.`; `*` matches exactly one token and a trailing
/// `>` matches one or more.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    let mut pattern_tokens = pattern.split('.').peekable();

    while let Some(p) = pattern_tokens.next() {
        if p == ">" && pattern_tokens.peek().is_none() {
            return subject_tokens.next().is_some();
        }
        match subject_tokens.next() {
            Some(s) if p == "*" || p == s => continue,
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}
