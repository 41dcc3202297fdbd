use crate::address::Address;
use crate::task::{Context, Task, TaskResolutionError, TaskStatus, TaskStatusType, TaskTag};
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("encountered a dependency cycle: {}", join_addresses(.0, " → "))]
    Cycle(Vec<Address>),

    #[error("already have a status for task `{0}`")]
    StatusAlreadySet(Address),

    #[error("no task for '{0}' in the graph")]
    UnknownTask(Address),

    #[error(transparent)]
    Resolution(#[from] TaskResolutionError),
}

fn join_addresses(addresses: &[Address], separator: &str) -> String {
    addresses
        .iter()
        .map(Address::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Edge data. `strict` edges require the upstream task to succeed, non-strict edges only order
/// execution. `implicit` marks edges derived from group membership rather than declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub strict: bool,
    pub implicit: bool,
}

/// Selects a subset of [`TaskGraph::tasks`]. All enabled conditions must hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Leaf nodes only
    pub goals: bool,
    /// Tasks without a status
    pub pending: bool,
    pub failed: bool,
    /// Tasks that have no status or only a pending one
    pub not_executed: bool,
}

impl TaskFilter {
    pub const ALL: Self = Self {
        goals: false,
        pending: false,
        failed: false,
        not_executed: false,
    };
    pub const GOALS: Self = Self { goals: true, ..Self::ALL };
    pub const PENDING: Self = Self { pending: true, ..Self::ALL };
    pub const FAILED: Self = Self { failed: true, ..Self::ALL };
    pub const NOT_EXECUTED: Self = Self {
        not_executed: true,
        ..Self::ALL
    };
}

#[derive(Debug, Clone, Default)]
struct Structure {
    digraph: StableDiGraph<Address, Edge>,
    index: HashMap<Address, NodeIndex>,
}

impl Structure {
    fn node(&self, address: &Address) -> Option<NodeIndex> {
        self.index.get(address).copied()
    }

    fn add_node(&mut self, address: &Address) -> NodeIndex {
        if let Some(idx) = self.node(address) {
            return idx;
        }
        let idx = self.digraph.add_node(address.clone());
        self.index.insert(address.clone(), idx);
        idx
    }

    fn edge(&self, a: NodeIndex, b: NodeIndex) -> Option<Edge> {
        self.digraph.find_edge(a, b).map(|e| self.digraph[e])
    }

    /// Insert an edge, merging with an existing one: strict if either is, implicit only if both are.
    fn add_edge(&mut self, a: NodeIndex, b: NodeIndex, strict: bool, implicit: bool) {
        match self.digraph.find_edge(a, b) {
            Some(e) => {
                let edge = &mut self.digraph[e];
                edge.strict |= strict;
                edge.implicit &= implicit;
            }
            None => {
                self.digraph.add_edge(a, b, Edge { strict, implicit });
            }
        }
    }

    fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.digraph.neighbors_directed(idx, Incoming).collect()
    }

    fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.digraph.neighbors_directed(idx, Outgoing).collect()
    }

    /// Remove `idx`, connecting each predecessor to each successor.
    fn remove_keep_transitive(&mut self, idx: NodeIndex) {
        let incoming: Vec<(NodeIndex, Edge)> = self
            .digraph
            .edges_directed(idx, Incoming)
            .map(|e| (e.source(), *e.weight()))
            .collect();
        let outgoing: Vec<(NodeIndex, Edge)> = self
            .digraph
            .edges_directed(idx, Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        for (pred, in_edge) in &incoming {
            for (succ, out_edge) in &outgoing {
                if *pred == idx || *succ == idx {
                    continue;
                }
                self.add_edge(
                    *pred,
                    *succ,
                    in_edge.strict || out_edge.strict,
                    in_edge.implicit && out_edge.implicit,
                );
            }
        }
        if let Some(address) = self.digraph.remove_node(idx) {
            self.index.remove(&address);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    results: HashMap<Address, TaskStatus>,
    ok: HashSet<Address>,
    failed: HashSet<Address>,
    background: HashSet<Address>,
    scheduled: HashSet<Address>,
}

impl GraphState {
    fn record(&mut self, address: &Address, status: TaskStatus) {
        self.ok.remove(address);
        self.failed.remove(address);
        self.background.remove(address);
        if status.is_started() {
            self.background.insert(address.clone());
        }
        if status.is_ok() {
            self.ok.insert(address.clone());
        }
        if status.is_failed() {
            self.failed.insert(address.clone());
        }
        self.results.insert(address.clone(), status);
    }

    fn forget(&mut self, address: &Address) {
        self.results.remove(address);
        self.ok.remove(address);
        self.failed.remove(address);
        self.background.remove(address);
        self.scheduled.remove(address);
    }
}

/// Walks tasks and their relationships into a [`Structure`].
struct Builder<'a> {
    ctx: &'a Context,
    structure: Structure,
    tasks: HashMap<Address, Arc<Task>>,
}

impl Builder<'_> {
    fn add_task(&mut self, task: &Arc<Task>) -> Result<NodeIndex, GraphError> {
        let idx = self.structure.add_node(task.address());
        self.tasks.insert(task.address().clone(), Arc::clone(task));

        let members = task.members();
        for rel in task.get_relationships(self.ctx)? {
            let other = match self.structure.node(rel.other.address()) {
                Some(other) => other,
                None => self.add_task(&rel.other)?,
            };
            let (upstream, downstream) = if rel.inverse {
                (Arc::clone(task), Arc::clone(&rel.other))
            } else {
                (Arc::clone(&rel.other), Arc::clone(task))
            };
            let (a, b) = if rel.inverse { (idx, other) } else { (other, idx) };
            self.structure.add_edge(a, b, rel.strict, false);

            if task.is_group() && !rel.inverse && members.iter().any(|m| Arc::ptr_eq(m, &rel.other)) {
                continue;
            }

            // A dependency of a group is a dependency of each of its members.
            if downstream.is_group() {
                let upstream_idx = self.structure.add_node(upstream.address());
                let mut queue: VecDeque<Arc<Task>> = downstream.members().into();
                let mut seen = HashSet::new();
                while let Some(member) = queue.pop_front() {
                    if !seen.insert(member.address().clone()) {
                        continue;
                    }
                    let member_idx = match self.structure.node(member.address()) {
                        Some(member_idx) => member_idx,
                        None => self.add_task(&member)?,
                    };
                    if member.is_group() {
                        queue.extend(member.members());
                        continue;
                    }
                    if upstream.address() != member.address() {
                        self.structure.add_edge(upstream_idx, member_idx, rel.strict, true);
                    }
                }
            }
        }
        Ok(idx)
    }
}

/// Tasks as nodes and their relationships as edges, together with the status of each task in
/// the current build.
///
/// A trimmed graph keeps a reference to the graph it was derived from, so that the full
/// structure and results can be persisted together.
pub struct TaskGraph {
    structure: Structure,
    tasks: Arc<HashMap<Address, Arc<Task>>>,
    parent: Option<Arc<TaskGraph>>,
    state: Mutex<GraphState>,
}

impl TaskGraph {
    /// Build the graph of every task declared in `ctx`.
    pub fn new(ctx: &Context) -> Result<Self, GraphError> {
        let mut builder = Builder {
            ctx,
            structure: Structure::default(),
            tasks: HashMap::new(),
        };
        for project in ctx.iter_projects() {
            for task in project.tasks() {
                if builder.structure.node(task.address()).is_none() {
                    builder.add_task(&task)?;
                }
            }
        }
        debug!(
            "Built task graph with {} task(s) and {} edge(s)",
            builder.structure.digraph.node_count(),
            builder.structure.digraph.edge_count()
        );
        Ok(Self {
            structure: builder.structure,
            tasks: Arc::new(builder.tasks),
            parent: None,
            state: Mutex::new(GraphState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn address_of(&self, idx: NodeIndex) -> &Address {
        &self.structure.digraph[idx]
    }

    fn task_at(&self, idx: NodeIndex) -> Option<Arc<Task>> {
        self.tasks.get(self.address_of(idx)).cloned()
    }

    pub fn len(&self) -> usize {
        self.structure.digraph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.structure.node(address).is_some()
    }

    pub fn parent(&self) -> Option<&Arc<TaskGraph>> {
        self.parent.as_ref()
    }

    /// The untrimmed graph this one was derived from.
    pub fn root(&self) -> &TaskGraph {
        match &self.parent {
            Some(parent) => parent.root(),
            None => self,
        }
    }

    /// Look up any task known to the root graph, whether or not it is part of this graph.
    pub fn get_task(&self, address: &Address) -> Option<Arc<Task>> {
        self.tasks.get(address).cloned()
    }

    /// Node addresses in insertion order.
    pub fn nodes(&self) -> Vec<Address> {
        self.structure
            .digraph
            .node_indices()
            .map(|idx| self.address_of(idx).clone())
            .collect()
    }

    pub fn edges(&self) -> Vec<(Address, Address, Edge)> {
        self.structure
            .digraph
            .edge_references()
            .map(|e| {
                (
                    self.address_of(e.source()).clone(),
                    self.address_of(e.target()).clone(),
                    *e.weight(),
                )
            })
            .collect()
    }

    pub fn get_edge(&self, pred: &Address, succ: &Address) -> Option<Edge> {
        self.structure
            .edge(self.structure.node(pred)?, self.structure.node(succ)?)
    }

    /// Direct predecessors of `task`. With `ignore_groups`, group predecessors are replaced by
    /// their members.
    pub fn get_predecessors(&self, task: &Task, ignore_groups: bool) -> Vec<Arc<Task>> {
        match self.structure.node(task.address()) {
            Some(idx) => self.expand(self.structure.predecessors(idx), ignore_groups),
            None => Vec::new(),
        }
    }

    /// Direct successors of `task`. With `ignore_groups`, group successors are replaced by
    /// their members.
    pub fn get_successors(&self, task: &Task, ignore_groups: bool) -> Vec<Arc<Task>> {
        match self.structure.node(task.address()) {
            Some(idx) => self.expand(self.structure.successors(idx), ignore_groups),
            None => Vec::new(),
        }
    }

    fn expand(&self, nodes: Vec<NodeIndex>, ignore_groups: bool) -> Vec<Arc<Task>> {
        let mut out = Vec::new();
        // petgraph yields neighbours most recent edge first
        for idx in nodes.into_iter().rev() {
            let Some(task) = self.task_at(idx) else {
                continue;
            };
            if ignore_groups && task.is_group() {
                out.extend(task.members());
            } else {
                out.push(task);
            }
        }
        out
    }

    pub fn get_status(&self, address: &Address) -> Option<TaskStatus> {
        self.lock().results.get(address).cloned()
    }

    fn is_empty_group_subtree(&self, idx: NodeIndex, visiting: &mut HashSet<NodeIndex>) -> bool {
        let Some(task) = self.task_at(idx) else {
            return false;
        };
        if !task.is_group() {
            return false;
        }
        if task.members().is_empty() {
            return true;
        }
        if !visiting.insert(idx) {
            return true;
        }
        self.structure
            .predecessors(idx)
            .into_iter()
            .all(|pred| self.is_empty_group_subtree(pred, visiting))
    }

    fn require(
        &self,
        idx: NodeIndex,
        required: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Result<(), GraphError> {
        if let Some(pos) = path.iter().position(|p| *p == idx) {
            let mut cycle: Vec<Address> = path[pos..].iter().map(|i| self.address_of(*i).clone()).collect();
            cycle.push(self.address_of(idx).clone());
            return Err(GraphError::Cycle(cycle));
        }
        if !required.insert(idx) {
            return Ok(());
        }
        path.push(idx);
        for pred in self.structure.predecessors(idx) {
            let strict = self.structure.edge(pred, idx).is_some_and(|e| e.strict);
            if !strict || self.is_empty_group_subtree(pred, &mut HashSet::new()) {
                continue;
            }
            self.require(pred, required, path)?;
        }
        path.pop();
        Ok(())
    }

    /// A copy of this graph reduced to `goals` and everything they strictly depend on.
    ///
    /// Removed nodes are bridged so that ordering between the remaining tasks is preserved.
    /// Groups that are empty, or only depend on empty groups, are not pulled in. The new graph
    /// starts out with this graph's results.
    pub fn trim(self: &Arc<Self>, goals: &[Arc<Task>]) -> Result<TaskGraph, GraphError> {
        let mut required = HashSet::new();
        for goal in goals {
            let idx = self
                .structure
                .node(goal.address())
                .ok_or_else(|| GraphError::UnknownTask(goal.address().clone()))?;
            self.require(idx, &mut required, &mut Vec::new())?;
        }

        let mut structure = self.structure.clone();
        let unrequired: Vec<NodeIndex> = structure
            .digraph
            .node_indices()
            .filter(|idx| !required.contains(idx))
            .collect();
        for idx in unrequired {
            structure.remove_keep_transitive(idx);
        }
        debug!(
            "Trimmed task graph from {} to {} task(s)",
            self.len(),
            structure.digraph.node_count()
        );

        let graph = TaskGraph {
            structure,
            tasks: Arc::clone(&self.tasks),
            parent: Some(Arc::clone(self)),
            state: Mutex::new(GraphState::default()),
        };
        graph.results_from(self);
        Ok(graph)
    }

    /// Resolve `selectors` (or the default tasks) through `ctx` and [`trim`](Self::trim) to them.
    pub fn trim_to(
        self: &Arc<Self>,
        ctx: &Context,
        selectors: Option<&[Address]>,
        set_selected: bool,
    ) -> Result<TaskGraph, GraphError> {
        let goals = ctx.resolve_tasks(selectors, &Address::root(), set_selected)?;
        self.trim(&goals)
    }

    /// Copy the results of `other` for every task in this graph. Results in `other` replace
    /// the ones already recorded here.
    pub fn results_from(&self, other: &TaskGraph) {
        if std::ptr::eq(self, other) {
            return;
        }
        let theirs = other.lock().results.clone();
        let mut state = self.lock();
        for idx in self.structure.digraph.node_indices() {
            let address = self.address_of(idx);
            if let Some(status) = theirs.get(address) {
                state.record(address, status.clone());
            }
        }
    }

    /// Apply stored results. Returns the addresses that are not part of this graph.
    pub fn restore<I>(&self, results: I) -> Vec<Address>
    where
        I: IntoIterator<Item = (Address, TaskStatus)>,
    {
        let mut state = self.lock();
        let mut unknown = Vec::new();
        for (address, status) in results {
            if self.contains(&address) {
                state.record(&address, status);
            } else {
                unknown.push(address);
            }
        }
        unknown
    }

    /// Results of this graph layered over the results of the graphs it was derived from.
    pub fn merged_results(&self) -> HashMap<Address, TaskStatus> {
        let mut results = self
            .parent
            .as_ref()
            .map(|parent| parent.merged_results())
            .unwrap_or_default();
        results.extend(self.lock().results.clone());
        results
    }

    /// Forget the status of background tasks that a pending task depends on, so they are
    /// started again when the build continues.
    pub fn resume(&self) {
        let mut state = self.lock();
        let mut reset = BTreeSet::new();
        for idx in self.structure.digraph.node_indices() {
            if state.results.contains_key(self.address_of(idx)) {
                continue;
            }
            for pred in self.expand(self.structure.predecessors(idx), true) {
                if state.background.contains(pred.address()) {
                    state.forget(pred.address());
                    reset.insert(pred.address().clone());
                }
            }
        }
        if !reset.is_empty() {
            info!(
                "Reset the status of {} background task(s): {}",
                reset.len(),
                reset.iter().map(Address::to_string).collect::<Vec<_>>().join(" ")
            );
        }
    }

    /// Discard all results.
    pub fn restart(&self) {
        *self.lock() = GraphState::default();
    }

    /// Tasks in insertion order, restricted by `filter`.
    pub fn tasks(&self, filter: TaskFilter) -> Vec<Arc<Task>> {
        let state = self.lock();
        let digraph = &self.structure.digraph;
        digraph
            .node_indices()
            .filter(|idx| {
                let address = &digraph[*idx];
                let status = state.results.get(address);
                (!filter.goals || digraph.neighbors_directed(*idx, Outgoing).next().is_none())
                    && (!filter.pending || status.is_none())
                    && (!filter.failed || status.is_some_and(TaskStatus::is_failed))
                    && (!filter.not_executed || status.is_none_or(TaskStatus::is_pending))
            })
            .filter_map(|idx| self.task_at(idx))
            .collect()
    }

    /// Edges to ignore for readiness: order-only edges out of failed tasks, and order-only
    /// edges out of groups whose members have all finished when one of them failed.
    fn removable_edges(&self, state: &GraphState) -> HashSet<(NodeIndex, NodeIndex)> {
        let mut removable = HashSet::new();
        let mut remove_if_non_strict = |a: NodeIndex, b: NodeIndex| {
            if self.structure.edge(a, b).is_some_and(|e| !e.strict) {
                removable.insert((a, b));
            }
        };
        for failed in &state.failed {
            let Some(idx) = self.structure.node(failed) else {
                continue;
            };
            for succ in self.structure.successors(idx) {
                let Some(task) = self.task_at(succ) else {
                    continue;
                };
                if task.is_group() {
                    let finished = task.members().iter().all(|m| {
                        state.failed.contains(m.address()) || state.ok.contains(m.address())
                    });
                    if !finished {
                        continue;
                    }
                    for group_succ in self.structure.successors(succ) {
                        remove_if_non_strict(succ, group_succ);
                    }
                } else {
                    remove_if_non_strict(idx, succ);
                }
            }
        }
        removable
    }

    fn is_blocked(&self, idx: NodeIndex, state: &GraphState, removable: &HashSet<(NodeIndex, NodeIndex)>) -> bool {
        self.structure
            .digraph
            .edges_directed(idx, Incoming)
            .any(|e| !state.ok.contains(self.address_of(e.source())) && !removable.contains(&(e.source(), idx)))
    }

    /// Tasks in the order they would execute. Unless `all` is set, tasks that already
    /// succeeded are left out and order-only edges out of failed tasks are ignored.
    pub fn execution_order(&self, all: bool) -> Result<Vec<Arc<Task>>, GraphError> {
        let state = self.lock();
        let removable = if all {
            HashSet::new()
        } else {
            self.removable_edges(&state)
        };
        let included = |idx: NodeIndex| all || !state.ok.contains(self.address_of(idx));
        let counts = |e: &petgraph::stable_graph::EdgeReference<'_, Edge>| {
            included(e.source()) && included(e.target()) && !removable.contains(&(e.source(), e.target()))
        };

        let nodes: Vec<NodeIndex> = self.structure.digraph.node_indices().filter(|i| included(*i)).collect();
        let mut in_degree: HashMap<NodeIndex, usize> = nodes
            .iter()
            .map(|idx| {
                let degree = self
                    .structure
                    .digraph
                    .edges_directed(*idx, Incoming)
                    .filter(|e| counts(e))
                    .count();
                (*idx, degree)
            })
            .collect();

        let mut queue: BTreeSet<NodeIndex> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| *idx)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(idx) = queue.pop_first() {
            order.push(idx);
            for edge in self.structure.digraph.edges_directed(idx, Outgoing) {
                if !counts(&edge) {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&edge.target()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.insert(edge.target());
                    }
                }
            }
        }

        if order.len() < nodes.len() {
            let ordered: HashSet<NodeIndex> = order.iter().copied().collect();
            let remaining = nodes
                .iter()
                .filter(|idx| !ordered.contains(idx))
                .map(|idx| self.address_of(*idx).clone())
                .collect();
            return Err(GraphError::Cycle(remaining));
        }
        Ok(order.into_iter().filter_map(|idx| self.task_at(idx)).collect())
    }

    /// Tag tasks to be skipped by the executor.
    ///
    /// `tasks` are tagged as given. For `recursive_tasks`, their dependencies are tagged as
    /// well, except those that are still needed by a goal that is not being skipped. With
    /// `reset`, existing `skip` tags of the same `origin` are removed first; otherwise tasks
    /// carrying one count as skipped when deciding which dependencies are still needed.
    pub fn mark_tasks_as_skipped(
        &self,
        tasks: &[Arc<Task>],
        recursive_tasks: &[Arc<Task>],
        set_status: bool,
        reason: &str,
        origin: &str,
        reset: bool,
    ) {
        let mut red: HashSet<Address> = tasks
            .iter()
            .chain(recursive_tasks)
            .map(|t| t.address().clone())
            .collect();

        for task in self.tasks(TaskFilter::ALL) {
            for tag in task.get_tags(TaskTag::SKIP) {
                if tag.origin.as_deref() != Some(origin) {
                    continue;
                }
                if reset {
                    task.remove_tag(&tag);
                } else {
                    red.insert(task.address().clone());
                }
            }
        }

        let mut blue: HashSet<Address> = tasks.iter().map(|t| t.address().clone()).collect();
        let mut visited = HashSet::new();
        let mut stack: Vec<Arc<Task>> = recursive_tasks.to_vec();
        while let Some(task) = stack.pop() {
            if !visited.insert(task.address().clone()) {
                continue;
            }
            blue.insert(task.address().clone());
            stack.extend(self.get_predecessors(&task, false));
        }

        let mut visited = HashSet::new();
        let mut stack = self.tasks(TaskFilter::GOALS);
        while let Some(task) = stack.pop() {
            if red.contains(task.address()) || !visited.insert(task.address().clone()) {
                continue;
            }
            blue.remove(task.address());
            stack.extend(self.get_predecessors(&task, false));
        }

        let mut marked = 0;
        for task in self.tasks(TaskFilter::ALL) {
            if !blue.contains(task.address()) {
                continue;
            }
            task.add_tag(TaskTag::SKIP, reason, Some(origin.to_string()));
            marked += 1;
            if set_status {
                let mut state = self.lock();
                if !state.results.contains_key(task.address()) {
                    state.record(task.address(), TaskStatus::skipped(reason));
                }
            }
        }
        debug!("Marked {marked} task(s) as skipped ({reason}, origin: {origin})");
    }

    /// Tasks whose dependencies are all satisfied and that were neither executed nor handed
    /// out by an earlier call. Groups that become ready are marked skipped on the spot and
    /// never returned. Empty once nothing further can run.
    pub fn ready(&self) -> Vec<Arc<Task>> {
        let mut state = self.lock();
        loop {
            let removable = self.removable_edges(&state);
            let mut tasks = Vec::new();
            let mut groups = Vec::new();
            for idx in self.structure.digraph.node_indices() {
                let address = self.address_of(idx);
                if state.results.contains_key(address)
                    || state.scheduled.contains(address)
                    || self.is_blocked(idx, &state, &removable)
                {
                    continue;
                }
                let Some(task) = self.task_at(idx) else {
                    continue;
                };
                if task.is_group() {
                    groups.push(task);
                } else {
                    tasks.push(task);
                }
            }

            if tasks.is_empty() && groups.is_empty() {
                return Vec::new();
            }
            for group in &groups {
                state.record(group.address(), TaskStatus::new(TaskStatusType::Skipped, None));
            }
            if !tasks.is_empty() {
                for task in &tasks {
                    state.scheduled.insert(task.address().clone());
                }
                return tasks;
            }
        }
    }

    /// Record the status of `task`. A task may only be given a status once, except that a
    /// `Started` status may be replaced.
    pub fn set_status(&self, task: &Task, status: TaskStatus) -> Result<(), GraphError> {
        let mut state = self.lock();
        if let Some(existing) = state.results.get(task.address()) {
            if !existing.is_started() {
                return Err(GraphError::StatusAlreadySet(task.address().clone()));
            }
        }
        debug!("{} -> {status}", task.address());
        state.record(task.address(), status);
        Ok(())
    }

    /// Record the status of `task`, replacing any existing one.
    pub fn force_status(&self, task: &Task, status: TaskStatus) {
        self.lock().record(task.address(), status);
    }

    /// True once every task in the graph has an ok status.
    pub fn is_complete(&self) -> bool {
        let state = self.lock();
        self.structure
            .digraph
            .node_weights()
            .all(|address| state.ok.contains(address))
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.len())
            .field("trimmed", &self.parent.is_some())
            .finish()
    }
}
