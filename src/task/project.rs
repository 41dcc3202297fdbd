use super::task::{RelationshipMode, Task, TaskAction, TaskKind};
use crate::address::{Address, AddressParseError, Element, is_valid_name, normalize_name};
use crate::property::PropertyError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::warn;

/// Errors raised while declaring or looking up project members
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("{project} already has a member '{name}'")]
    DuplicateMember { project: Address, name: String },

    #[error("task not found: {0}")]
    TaskNotFound(Address),

    #[error("project not found: {0}")]
    ProjectNotFound(Address),

    #[error("{0} must be a group")]
    NotAGroup(Address),

    #[error("{0} does not refer to a project")]
    NotAProject(Address),

    #[error(transparent)]
    InvalidName(#[from] AddressParseError),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

#[derive(Clone)]
enum Member {
    Task(Arc<Task>),
    Project(Arc<Project>),
}

impl Member {
    fn name(&self) -> &str {
        match self {
            Member::Task(task) => task.name(),
            Member::Project(project) => project.name(),
        }
    }
}

/// A named node in the project tree. Owns its tasks and subprojects, which share a single
/// namespace and are kept in declaration order.
pub struct Project {
    address: Address,
    name: String,
    directory: PathBuf,
    build_root: PathBuf,
    parent: Weak<Project>,
    me: Weak<Project>,
    members: RwLock<Vec<Member>>,
    description: RwLock<Option<String>>,
}

impl Project {
    pub(crate) fn new_root(directory: PathBuf, build_root: PathBuf) -> Arc<Self> {
        let name = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Arc::new_cyclic(|me| Self {
            address: Address::root(),
            name,
            directory,
            build_root,
            parent: Weak::new(),
            me: me.clone(),
            members: RwLock::new(Vec::new()),
            description: RwLock::new(None),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Member>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Member>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The last address element, or the directory name for the root project.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Per-project directory for build artifacts below the context's build directory.
    pub fn build_directory(&self) -> PathBuf {
        self.address
            .elements()
            .iter()
            .fold(self.build_root.clone(), |dir, element| dir.join(element.value()))
    }

    pub fn parent(&self) -> Option<Arc<Project>> {
        self.parent.upgrade()
    }

    pub fn description(&self) -> Option<String> {
        self.description.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write().unwrap_or_else(PoisonError::into_inner) = Some(description.into());
    }

    fn member_address(&self, name: &str) -> Result<Address, ProjectError> {
        Ok(self.address.append(Element::new(name, false)?))
    }

    fn insert_task(&self, name: &str, kind: TaskKind) -> Result<Arc<Task>, ProjectError> {
        let address = self.member_address(name)?;
        let mut members = self.write();
        if members.iter().any(|m| m.name() == name) {
            return Err(ProjectError::DuplicateMember {
                project: self.address.clone(),
                name: name.to_string(),
            });
        }
        let task = Arc::new(Task::new(address, name.to_string(), self.me.clone(), kind)?);
        members.push(Member::Task(Arc::clone(&task)));
        Ok(task)
    }

    /// Create a task named `name` that runs `action`.
    pub fn task<A>(&self, name: &str, action: A) -> Result<Arc<Task>, ProjectError>
    where
        A: TaskAction + 'static,
    {
        self.insert_task(name, TaskKind::Action(Box::new(action)))
    }

    /// Like [`Project::task`], but an invalid name is rewritten into a valid one with a warning
    /// instead of failing.
    pub fn task_legacy<A>(&self, name: &str, action: A) -> Result<Arc<Task>, ProjectError>
    where
        A: TaskAction + 'static,
    {
        let mut name = name.to_string();
        if !is_valid_name(&name) {
            let normalized = normalize_name(&name);
            warn!(
                "Task name `{name}` is invalid and will be normalized to `{normalized}`. Task names may only contain letters, digits, `/`, `_`, `-`, `.` and `*`."
            );
            name = normalized;
        }
        self.task(&name, action)
    }

    /// Get the group `name`, creating it if it doesn't exist.
    pub fn group(&self, name: &str) -> Result<Arc<Task>, ProjectError> {
        if let Some(Member::Task(task)) = self.read().iter().find(|m| m.name() == name).cloned() {
            if !task.is_group() {
                return Err(ProjectError::NotAGroup(task.address().clone()));
            }
            return Ok(task);
        }
        self.insert_task(name, TaskKind::Group(RwLock::new(Vec::new())))
    }

    pub fn get_task(&self, name: &str) -> Result<Arc<Task>, ProjectError> {
        match self.read().iter().find(|m| m.name() == name) {
            Some(Member::Task(task)) => Ok(Arc::clone(task)),
            _ => Err(ProjectError::TaskNotFound(self.member_address(name)?)),
        }
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.read()
            .iter()
            .filter_map(|m| match m {
                Member::Task(task) => Some(Arc::clone(task)),
                Member::Project(_) => None,
            })
            .collect()
    }

    pub fn subprojects(&self) -> Vec<Arc<Project>> {
        self.read()
            .iter()
            .filter_map(|m| match m {
                Member::Project(project) => Some(Arc::clone(project)),
                Member::Task(_) => None,
            })
            .collect()
    }

    pub fn get_subproject(&self, name: &str) -> Option<Arc<Project>> {
        self.subprojects().into_iter().find(|p| p.name() == name)
    }

    /// Get the subproject `name`, creating an empty one rooted at `directory` (or
    /// `<this directory>/<name>`) if it doesn't exist.
    pub fn subproject(&self, name: &str, directory: Option<PathBuf>) -> Result<Arc<Project>, ProjectError> {
        let address = self.member_address(name)?;
        let mut members = self.write();
        match members.iter().find(|m| m.name() == name) {
            Some(Member::Project(project)) => return Ok(Arc::clone(project)),
            Some(Member::Task(_)) => return Err(ProjectError::NotAProject(address)),
            None => {}
        }
        let directory = directory.unwrap_or_else(|| self.directory.join(name));
        let project = Arc::new_cyclic(|me| Project {
            address,
            name: name.to_string(),
            directory,
            build_root: self.build_root.clone(),
            parent: self.me.clone(),
            me: me.clone(),
            members: RwLock::new(Vec::new()),
            description: RwLock::new(None),
        });
        members.push(Member::Project(Arc::clone(&project)));
        Ok(project)
    }

    /// Declare the conventional lifecycle groups and the relationships between them.
    pub fn apply_standard_groups(&self) -> Result<(), ProjectError> {
        use RelationshipMode::{OrderOnly, Strict};

        let define = |name: &str, description: &str, default: bool| -> Result<Arc<Task>, ProjectError> {
            let group = self.group(name)?;
            group.set_description(description);
            group.set_default(default);
            Ok(group)
        };

        let apply = define("apply", "Tasks that perform automatic updates to the project consistency.", false)?;
        let fmt = define("fmt", "Tasks that that perform code formatting operations.", false)?;
        fmt.depends_on(&apply, Strict);

        let check = define("check", "Tasks that perform project consistency checks.", true)?;
        let gen_ = define("gen", "Tasks that perform code generation.", true)?;

        let lint = define("lint", "Tasks that perform code linting.", true)?;
        lint.depends_on(&check, Strict);
        lint.depends_on(&gen_, Strict);

        let build = define("build", "Tasks that produce build artefacts.", false)?;
        build.depends_on(&lint, OrderOnly);
        build.depends_on(&gen_, Strict);

        let audit = define("audit", "Tasks that perform auditing on built artefacts and code", false)?;
        audit.depends_on(&build, Strict);
        audit.depends_on(&gen_, Strict);

        let test = define("test", "Tasks that perform unit tests.", true)?;
        test.depends_on(&build, OrderOnly);
        test.depends_on(&gen_, Strict);

        let integration_test = define("integrationTest", "Tasks that perform integration tests.", false)?;
        integration_test.depends_on(&test, OrderOnly);
        integration_test.depends_on(&gen_, Strict);

        let publish = define("publish", "Tasks that publish build artefacts.", false)?;
        publish.depends_on(&integration_test, OrderOnly);
        publish.depends_on(&build, Strict);

        let deploy = define("deploy", "Tasks that deploy applications.", false)?;
        deploy.depends_on(&publish, OrderOnly);

        define("update", "Tasks that update dependencies of the project.", false)?;
        Ok(())
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Project({})", self.address)
    }
}
