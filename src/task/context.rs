use super::project::{Project, ProjectError};
use super::task::Task;
use crate::address::{
    Address, AddressParseError, AddressResolutionError, AddressSpace, ResolveError, resolve_address,
};
use crate::executor::{BuildError, GraphExecutor, LoggingObserver};
use crate::graph::{GraphError, TaskGraph};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Raised when task selectors cannot be turned into tasks
#[derive(Debug, thiserror::Error)]
pub enum TaskResolutionError {
    #[error("'{0}' refers to no tasks.")]
    NoTasks(Address),

    #[error("Impossible to resolve the empty address.")]
    EmptyAddress,

    #[error("'relative_to' must be an absolute address (got '{0}')")]
    NotAbsolute(Address),

    #[error(transparent)]
    Unresolved(#[from] AddressResolutionError),

    #[error(transparent)]
    Parse(#[from] AddressParseError),

    #[error("in task {task}: {source}")]
    InTask {
        task: Address,
        source: Box<TaskResolutionError>,
    },
}

impl From<ResolveError> for TaskResolutionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::EmptyQuery => TaskResolutionError::EmptyAddress,
            ResolveError::Unresolved(err) => TaskResolutionError::Unresolved(err),
        }
    }
}

/// A node of the project tree as seen by address resolution.
#[derive(Debug, Clone)]
pub enum Node {
    Project(Arc<Project>),
    Task(Arc<Task>),
}

struct ProjectSpace<'a> {
    root: &'a Arc<Project>,
}

impl AddressSpace for ProjectSpace<'_> {
    type Node = Node;

    fn root(&self) -> Node {
        Node::Project(Arc::clone(self.root))
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        match node {
            Node::Project(project) => project.parent().map(Node::Project),
            Node::Task(task) => task.project().map(Node::Project),
        }
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        match node {
            Node::Project(project) => project
                .subprojects()
                .into_iter()
                .map(Node::Project)
                .chain(project.tasks().into_iter().map(Node::Task))
                .collect(),
            Node::Task(_) => Vec::new(),
        }
    }

    fn address(&self, node: &Node) -> Address {
        match node {
            Node::Project(project) => project.address().clone(),
            Node::Task(task) => task.address().clone(),
        }
    }
}

/// The root of a build: the project tree plus build-wide settings.
pub struct Context {
    root: Arc<Project>,
    build_directory: PathBuf,
    finalized: AtomicBool,
}

impl Context {
    pub fn new(project_directory: impl Into<PathBuf>, build_directory: impl Into<PathBuf>) -> Self {
        let build_directory = build_directory.into();
        Self {
            root: Project::new_root(project_directory.into(), build_directory.clone()),
            build_directory,
            finalized: AtomicBool::new(false),
        }
    }

    pub fn root_project(&self) -> &Arc<Project> {
        &self.root
    }

    pub fn build_directory(&self) -> &Path {
        &self.build_directory
    }

    /// All projects, depth first in declaration order, starting with the root.
    pub fn iter_projects(&self) -> Vec<Arc<Project>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(project) = stack.pop() {
            let mut children = project.subprojects();
            children.reverse();
            out.push(project);
            stack.extend(children);
        }
        out
    }

    /// Look up a project by absolute address.
    pub fn get_project(&self, address: &Address) -> Result<Arc<Project>, ProjectError> {
        if !address.is_absolute() {
            return Err(ProjectError::ProjectNotFound(address.clone()));
        }
        let mut project = Arc::clone(&self.root);
        for element in address.elements() {
            project = project
                .get_subproject(element.value())
                .ok_or_else(|| ProjectError::ProjectNotFound(address.clone()))?;
        }
        Ok(project)
    }

    /// Look up a task by its absolute, concrete address.
    pub fn find_task(&self, address: &Address) -> Option<Arc<Task>> {
        let project = self.get_project(&address.parent().ok()?).ok()?;
        project.get_task(address.name().ok()?).ok()
    }

    /// Resolve task selectors relative to the project at `relative_to`.
    ///
    /// A single relative element such as `lint` is shorthand for `**:lint`. Matched projects
    /// contribute their default tasks. `None` selects the default tasks of the current project
    /// and all its subprojects. With `set_selected`, tasks matched directly (not through a
    /// project's defaults) are marked as selected.
    pub fn resolve_tasks(
        &self,
        selectors: Option<&[Address]>,
        relative_to: &Address,
        set_selected: bool,
    ) -> Result<Vec<Arc<Task>>, TaskResolutionError> {
        if !relative_to.is_absolute() {
            return Err(TaskResolutionError::NotAbsolute(relative_to.clone()));
        }

        let mut results = Vec::new();
        match selectors {
            Some(selectors) => {
                for selector in selectors {
                    results.extend(self.resolve_single(selector, relative_to, set_selected)?);
                }
            }
            None => {
                let current = Address::parse(".:")?;
                results.extend(self.resolve_single(&current, relative_to, set_selected)?);
                // A project without subprojects legitimately has nothing here.
                match self.resolve_single(&Address::parse("**:")?, relative_to, set_selected) {
                    Ok(tasks) => results.extend(tasks),
                    Err(TaskResolutionError::NoTasks(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }

        let mut seen = HashSet::new();
        results.retain(|task| seen.insert(task.address().clone()));
        Ok(results)
    }

    fn resolve_single(
        &self,
        selector: &Address,
        relative_to: &Address,
        set_selected: bool,
    ) -> Result<Vec<Arc<Task>>, TaskResolutionError> {
        if selector.is_empty() {
            return Err(TaskResolutionError::EmptyAddress);
        }

        let mut address = selector.clone();
        if !address.is_absolute()
            && !address.is_container()
            && address.len() == 1
            && !address.elements()[0].is_recursive_wildcard()
        {
            address = Address::recursive_wildcard().concat(&address);
        }
        if !address.is_absolute() {
            address = relative_to.concat(&address).normalize(true);
        }

        let space = ProjectSpace { root: &self.root };
        let matches = resolve_address(&space, &space.root(), &address)?.into_matches();

        let mut tasks = Vec::new();
        let mut projects = Vec::new();
        for node in matches {
            match node {
                Node::Task(task) => tasks.push(task),
                Node::Project(project) => projects.push(project),
            }
        }
        if set_selected {
            for task in &tasks {
                task.set_selected(true);
            }
        }
        for project in projects {
            tasks.extend(project.tasks().into_iter().filter(|t| t.is_default()));
        }
        if tasks.is_empty() {
            return Err(TaskResolutionError::NoTasks(address));
        }
        debug!("Resolved '{selector}' to {} task(s)", tasks.len());
        Ok(tasks)
    }

    /// Freeze the configuration of every task. Calling it again only logs a warning.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            warn!("Context::finalize() called more than once");
            return;
        }
        for project in self.iter_projects() {
            for task in project.tasks() {
                task.finalize();
            }
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// The full graph of every declared task.
    pub fn build_graph(&self) -> Result<Arc<TaskGraph>, GraphError> {
        Ok(Arc::new(TaskGraph::new(self)?))
    }

    /// Finalize, build the graph for `selectors` (or the default tasks) and run it with the
    /// default executor. Fails with a [`BuildError`] if the graph did not complete.
    pub async fn execute(&self, selectors: Option<&[Address]>) -> anyhow::Result<Arc<TaskGraph>> {
        if !self.is_finalized() {
            self.finalize();
        }
        let goals = self.resolve_tasks(selectors, &Address::root(), selectors.is_some())?;
        let graph = Arc::new(self.build_graph()?.trim(&goals)?);
        GraphExecutor::new()
            .execute_graph(&graph, Arc::new(LoggingObserver::default()))
            .await;
        if !graph.is_complete() {
            return Err(BuildError::from_graph(&graph).into());
        }
        Ok(graph)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("build_directory", &self.build_directory)
            .finish_non_exhaustive()
    }
}
