use crate::address::Address;
use crate::graph::{TaskFilter, TaskGraph};

/// Raised when a build finished without completing its graph.
///
/// `failed_tasks` are the tasks that failed themselves. `not_executed` are the tasks that
/// never ran because something they depend on did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", summarize(self))]
pub struct BuildError {
    pub failed_tasks: Vec<Address>,
    pub interrupted_tasks: Vec<Address>,
    pub not_executed: Vec<Address>,
}

impl BuildError {
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let collect = |filter: TaskFilter| -> Vec<Address> {
            let mut out: Vec<Address> = graph
                .tasks(filter)
                .into_iter()
                .filter(|task| !task.is_group())
                .map(|task| task.address().clone())
                .collect();
            out.sort_by_key(|a| a.to_string());
            out
        };

        let interrupted_tasks = collect(TaskFilter::ALL)
            .into_iter()
            .filter(|a| graph.get_status(a).is_some_and(|s| s.is_interrupted()))
            .collect();

        Self {
            failed_tasks: collect(TaskFilter::FAILED),
            interrupted_tasks,
            not_executed: collect(TaskFilter::NOT_EXECUTED),
        }
    }
}

fn summarize(err: &BuildError) -> String {
    let quoted = |addresses: &[Address]| {
        addresses
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    match err.failed_tasks.len() {
        0 if !err.interrupted_tasks.is_empty() => {
            format!("build interrupted ({})", quoted(&err.interrupted_tasks))
        }
        0 => "the build did not complete".to_string(),
        1 => format!("task {} failed", quoted(&err.failed_tasks)),
        _ => format!("tasks {} failed", quoted(&err.failed_tasks)),
    }
}
