use super::context::{Context, TaskResolutionError};
use super::project::{Project, ProjectError};
use super::status::{TaskStatus, TaskTag};
use crate::address::Address;
use crate::executor::Interrupt;
use crate::property::{Property, PropertyError, PropertySpec, Value, ValueKind};
use regex::{Captures, Regex};
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::debug;

static DESCRIPTION_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// The behaviour behind an executable task.
///
/// `prepare` runs on the scheduling loop and should be quick. `execute` and `teardown` run on
/// a blocking worker thread and may take as long as they need, checking [`TaskIo::interrupt`]
/// to stop early.
pub trait TaskAction: Send + Sync {
    /// Properties instantiated for every task created with this action.
    fn schema(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    /// Decide whether the task needs to run. `None` means pending.
    fn prepare(&self, _task: &Task) -> Option<TaskStatus> {
        None
    }

    fn execute(&self, task: &Task, io: &TaskIo) -> anyhow::Result<TaskStatus>;

    /// Only called for tasks whose execution returned `Started`. `None` means succeeded.
    fn teardown(&self, _task: &Task, _io: &TaskIo) -> anyhow::Result<Option<TaskStatus>> {
        Ok(None)
    }
}

type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Output channel and interrupt handle passed to a running task.
#[derive(Clone)]
pub struct TaskIo {
    sink: OutputSink,
    interrupt: Interrupt,
}

impl TaskIo {
    pub fn new<F>(sink: F, interrupt: Interrupt) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            interrupt,
        }
    }

    /// Discards all output.
    pub fn silent(interrupt: Interrupt) -> Self {
        Self::new(|_| {}, interrupt)
    }

    pub fn write(&self, chunk: &str) {
        (self.sink)(chunk)
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}

impl fmt::Debug for TaskIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskIo")
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipMode {
    /// The dependency must have succeeded before the dependant runs
    Strict,
    /// Only orders execution when both tasks are part of the same run
    OrderOnly,
}

/// Either side of a declared relationship. Addresses are resolved lazily, relative to the
/// declaring task's project.
#[derive(Debug, Clone)]
pub enum TaskRef {
    Task(Arc<Task>),
    Address(Address),
}

impl From<Arc<Task>> for TaskRef {
    fn from(task: Arc<Task>) -> Self {
        TaskRef::Task(task)
    }
}

impl From<&Arc<Task>> for TaskRef {
    fn from(task: &Arc<Task>) -> Self {
        TaskRef::Task(Arc::clone(task))
    }
}

impl From<Address> for TaskRef {
    fn from(address: Address) -> Self {
        TaskRef::Address(address)
    }
}

impl From<&Address> for TaskRef {
    fn from(address: &Address) -> Self {
        TaskRef::Address(address.clone())
    }
}

/// A resolved edge between the task that reported it and `other`.
///
/// Unless `inverse` is set, `other` must run first.
#[derive(Debug, Clone)]
pub struct TaskRelationship {
    pub other: Arc<Task>,
    pub strict: bool,
    pub inverse: bool,
}

enum DeclaredTarget {
    Task(Weak<Task>),
    Address(Address),
}

struct DeclaredRelationship {
    target: DeclaredTarget,
    strict: bool,
    inverse: bool,
}

pub(crate) enum TaskKind {
    Group(RwLock<Vec<Arc<Task>>>),
    Action(Box<dyn TaskAction>),
}

#[derive(Default)]
struct TaskState {
    default: bool,
    selected: bool,
    description: Option<String>,
    tags: Vec<TaskTag>,
    relationships: Vec<DeclaredRelationship>,
}

/// A unit of work that belongs to a project.
pub struct Task {
    address: Address,
    name: String,
    project: Weak<Project>,
    kind: TaskKind,
    properties: Vec<Property>,
    state: RwLock<TaskState>,
}

impl Task {
    pub(crate) fn new(
        address: Address,
        name: String,
        project: Weak<Project>,
        kind: TaskKind,
    ) -> Result<Self, PropertyError> {
        let properties = match &kind {
            TaskKind::Action(action) => action
                .schema()
                .iter()
                .map(|spec| spec.instantiate(&address))
                .collect::<Result<Vec<_>, _>>()?,
            TaskKind::Group(_) => Vec::new(),
        };
        Ok(Self {
            address,
            name,
            project,
            kind,
            properties,
            state: RwLock::new(TaskState::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> Option<Arc<Project>> {
        self.project.upgrade()
    }

    fn project_address(&self) -> Address {
        self.address.parent().unwrap_or_else(|_| Address::root())
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, TaskKind::Group(_))
    }

    /// Members of a group task, empty for any other task.
    pub fn members(&self) -> Vec<Arc<Task>> {
        match &self.kind {
            TaskKind::Group(members) => members
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            TaskKind::Action(_) => Vec::new(),
        }
    }

    /// Add `task` to this group. Adding a member twice has no effect.
    pub fn add_member(&self, task: &Arc<Task>) -> Result<(), ProjectError> {
        let TaskKind::Group(members) = &self.kind else {
            return Err(ProjectError::NotAGroup(self.address.clone()));
        };
        let mut members = members.write().unwrap_or_else(PoisonError::into_inner);
        if !members.iter().any(|m| m.address == task.address) {
            members.push(Arc::clone(task));
        }
        Ok(())
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Whether the task runs when no task is selected explicitly.
    pub fn is_default(&self) -> bool {
        self.read().default
    }

    pub fn set_default(&self, default: bool) {
        self.write().default = default;
    }

    /// Whether the task was selected explicitly for this build.
    pub fn is_selected(&self) -> bool {
        self.read().selected
    }

    pub fn set_selected(&self, selected: bool) {
        self.write().selected = selected;
    }

    pub fn description(&self) -> Option<String> {
        self.read().description.clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.write().description = Some(description.into());
    }

    /// The description with `{property}` placeholders replaced by property values. Empty
    /// properties render as `<empty>`, paths below the working directory as relative paths.
    pub fn describe(&self) -> Option<String> {
        let description = self.description()?;
        let cwd = std::env::current_dir().ok();
        let rendered = DESCRIPTION_PLACEHOLDER.replace_all(&description, |caps: &Captures<'_>| {
            let Some(property) = self.property(&caps[1]) else {
                return caps[0].to_string();
            };
            match property.get() {
                Ok(Value::Path(path)) => cwd
                    .as_deref()
                    .and_then(|cwd| path.strip_prefix(cwd).ok())
                    .unwrap_or(&path)
                    .display()
                    .to_string(),
                Ok(value) => value.to_string(),
                Err(_) => "<empty>".to_string(),
            }
        });
        Some(rendered.into_owned())
    }

    pub fn add_tag(&self, name: impl Into<String>, reason: impl Into<String>, origin: Option<String>) {
        let tag = TaskTag::new(name, reason, origin);
        debug!(
            "Adding tag {:?} (reason: {:?}, origin: {:?}) to {}",
            tag.name, tag.reason, tag.origin, self.address
        );
        let mut state = self.write();
        if !state.tags.contains(&tag) {
            state.tags.push(tag);
        }
    }

    /// Remove `tag` if present.
    pub fn remove_tag(&self, tag: &TaskTag) {
        let mut state = self.write();
        let before = state.tags.len();
        state.tags.retain(|t| t != tag);
        if state.tags.len() < before {
            debug!("Removed tag {:?} from {}", tag.name, self.address);
        }
    }

    pub fn get_tags(&self, name: &str) -> Vec<TaskTag> {
        self.read()
            .tags
            .iter()
            .filter(|t| t.name == name)
            .cloned()
            .collect()
    }

    /// Declare that this task depends on `target`.
    pub fn depends_on(&self, target: impl Into<TaskRef>, mode: RelationshipMode) {
        self.declare(target.into(), mode, false);
    }

    /// Declare that `target` depends on this task.
    pub fn required_by(&self, target: impl Into<TaskRef>, mode: RelationshipMode) {
        self.declare(target.into(), mode, true);
    }

    fn declare(&self, target: TaskRef, mode: RelationshipMode, inverse: bool) {
        let target = match target {
            TaskRef::Task(task) => DeclaredTarget::Task(Arc::downgrade(&task)),
            TaskRef::Address(address) => DeclaredTarget::Address(address),
        };
        self.write().relationships.push(DeclaredRelationship {
            target,
            strict: mode == RelationshipMode::Strict,
            inverse,
        });
    }

    /// All relationships this task knows about: group members, relationships implied by
    /// property lineage, and declared relationships with addresses resolved through `ctx`.
    pub fn get_relationships(&self, ctx: &Context) -> Result<Vec<TaskRelationship>, TaskResolutionError> {
        let mut out: Vec<TaskRelationship> = self
            .members()
            .into_iter()
            .map(|other| TaskRelationship {
                other,
                strict: true,
                inverse: false,
            })
            .collect();

        for property in &self.properties {
            for (supplier, _) in property.lineage() {
                let owner = if let Some(other) = supplier.as_property() {
                    if other.ptr_eq(property) || other.owner() == &self.address {
                        continue;
                    }
                    other.owner().clone()
                } else if let Some(address) = supplier.as_task() {
                    address.clone()
                } else {
                    continue;
                };
                match ctx.find_task(&owner) {
                    Some(other) => out.push(TaskRelationship {
                        other,
                        strict: true,
                        inverse: false,
                    }),
                    None => debug!("{} refers to {owner}, which is not a task", property),
                }
            }
        }

        let declared: Vec<(TaskRef, bool, bool)> = self
            .read()
            .relationships
            .iter()
            .filter_map(|rel| {
                let target = match &rel.target {
                    DeclaredTarget::Task(task) => TaskRef::Task(task.upgrade()?),
                    DeclaredTarget::Address(address) => TaskRef::Address(address.clone()),
                };
                Some((target, rel.strict, rel.inverse))
            })
            .collect();

        for (target, strict, inverse) in declared {
            match target {
                TaskRef::Task(other) => out.push(TaskRelationship { other, strict, inverse }),
                TaskRef::Address(address) => {
                    let resolved = ctx
                        .resolve_tasks(Some(std::slice::from_ref(&address)), &self.project_address(), false)
                        .map_err(|source| TaskResolutionError::InTask {
                            task: self.address.clone(),
                            source: Box::new(source),
                        })?;
                    out.extend(resolved.into_iter().map(|other| TaskRelationship {
                        other,
                        strict,
                        inverse,
                    }));
                }
            }
        }
        Ok(out)
    }

    /// Values of `kind` produced by this task's output properties, flattening sequences. A
    /// group also reports its members' outputs. Only meaningful after execution.
    pub fn get_outputs(&self, kind: ValueKind) -> Result<Vec<Value>, PropertyError> {
        let mut out = Vec::new();
        for property in self.properties.iter().filter(|p| p.is_output()) {
            if property.provides(kind) {
                out.extend(property.get_of_type(kind)?);
            }
        }
        for member in self.members() {
            out.extend(member.get_outputs(kind)?);
        }
        Ok(out)
    }

    /// Freeze all non-output properties ahead of execution.
    pub fn finalize(&self) {
        for property in self.properties.iter().filter(|p| !p.is_output()) {
            property.finalize();
        }
    }

    pub fn prepare(&self) -> Option<TaskStatus> {
        match &self.kind {
            TaskKind::Group(_) => Some(TaskStatus::skipped("is a group")),
            TaskKind::Action(action) => action.prepare(self),
        }
    }

    pub fn execute(&self, io: &TaskIo) -> anyhow::Result<TaskStatus> {
        match &self.kind {
            TaskKind::Group(_) => anyhow::bail!("group {} cannot be executed", self.address),
            TaskKind::Action(action) => action.execute(self, io),
        }
    }

    pub fn teardown(&self, io: &TaskIo) -> anyhow::Result<Option<TaskStatus>> {
        match &self.kind {
            TaskKind::Group(_) => Ok(None),
            TaskKind::Action(action) => action.teardown(self, io),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.address)
    }
}
