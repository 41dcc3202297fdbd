use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome category of preparing, executing or tearing down a task
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatusType {
    /// Only returned from `prepare`
    Pending,
    Failed,
    /// The task was interrupted by the user
    Interrupted,
    Succeeded,
    /// A background job was started that has to be torn down later
    Started,
    Skipped,
    UpToDate,
    /// Succeeded with warnings
    Warning,
}

impl TaskStatusType {
    pub fn is_not_ok(self) -> bool {
        matches!(
            self,
            TaskStatusType::Pending | TaskStatusType::Failed | TaskStatusType::Interrupted
        )
    }

    pub fn is_ok(self) -> bool {
        !self.is_not_ok()
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatusType::Pending => "PENDING",
            TaskStatusType::Failed => "FAILED",
            TaskStatusType::Interrupted => "INTERRUPTED",
            TaskStatusType::Succeeded => "SUCCEEDED",
            TaskStatusType::Started => "STARTED",
            TaskStatusType::Skipped => "SKIPPED",
            TaskStatusType::UpToDate => "UP TO DATE",
            TaskStatusType::Warning => "WARNING",
        }
    }
}

impl fmt::Display for TaskStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status type with an optional human readable message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TaskStatus {
    #[serde(rename = "type")]
    pub kind: TaskStatusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(kind: TaskStatusType, message: Option<String>) -> Self {
        Self { kind, message }
    }

    pub fn pending() -> Self {
        Self::new(TaskStatusType::Pending, None)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::Failed, Some(message.into()))
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::Interrupted, Some(message.into()))
    }

    pub fn succeeded() -> Self {
        Self::new(TaskStatusType::Succeeded, None)
    }

    pub fn started(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::Started, Some(message.into()))
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::Skipped, Some(message.into()))
    }

    pub fn up_to_date(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::UpToDate, Some(message.into()))
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(TaskStatusType::Warning, Some(message.into()))
    }

    /// Map a process exit code to `Succeeded` or `Failed`. The failure message quotes the
    /// command the way a shell would.
    pub fn from_exit_code(command: Option<&[String]>, code: i32) -> Self {
        if code == 0 {
            return Self::succeeded();
        }
        let message = command.map(|argv| {
            let quoted: Vec<String> = argv
                .iter()
                .map(|arg| shell_escape::escape(arg.as_str().into()).into_owned())
                .collect();
            format!("command \"{}\" returned exit code {code}", quoted.join(" "))
        });
        Self::new(TaskStatusType::Failed, message)
    }

    pub fn is_ok(&self) -> bool {
        self.kind.is_ok()
    }

    pub fn is_not_ok(&self) -> bool {
        self.kind.is_not_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.kind == TaskStatusType::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.kind == TaskStatusType::Failed
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind == TaskStatusType::Interrupted
    }

    pub fn is_succeeded(&self) -> bool {
        self.kind == TaskStatusType::Succeeded
    }

    pub fn is_started(&self) -> bool {
        self.kind == TaskStatusType::Started
    }

    pub fn is_skipped(&self) -> bool {
        self.kind == TaskStatusType::Skipped
    }

    pub fn is_up_to_date(&self) -> bool {
        self.kind == TaskStatusType::UpToDate
    }

    pub fn is_warning(&self) -> bool {
        self.kind == TaskStatusType::Warning
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({message})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A named marker attached to a task, e.g. `skip` with the reason it is skipped.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskTag {
    pub name: String,
    pub reason: String,
    pub origin: Option<String>,
}

impl TaskTag {
    /// Tag name that makes the executor skip a task without preparing it.
    pub const SKIP: &'static str = "skip";

    pub fn new(name: impl Into<String>, reason: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            origin,
        }
    }
}
