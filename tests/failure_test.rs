use kiln::cli::{BuildOptions, GraphOptions};
use kiln::executor::{BuildError, GraphExecutor, NullObserver};
use kiln::graph::TaskFilter;
use kiln::integration::BuildSession;
use kiln::task::{Context, FnTask, RelationshipMode, TaskStatus};
use kiln::Address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn addr(text: &str) -> Address {
    Address::parse(text).unwrap()
}

/// `c` depends on `b`, `d` is independent. `b` fails while `broken` is set.
fn declare(ctx: &Context, broken: &Arc<AtomicBool>, log: &Arc<Mutex<Vec<String>>>) {
    let root = ctx.root_project();
    let record = |name: &'static str| {
        let log = Arc::clone(log);
        let broken = Arc::clone(broken);
        FnTask::new(move |_, _| {
            log.lock().unwrap().push(name.to_string());
            if name == "b" && broken.load(Ordering::SeqCst) {
                return Ok(TaskStatus::failed("b is broken"));
            }
            Ok(TaskStatus::succeeded())
        })
    };
    let b = root.task("b", record("b")).unwrap();
    let c = root.task("c", record("c")).unwrap();
    let d = root.task("d", record("d")).unwrap();
    c.depends_on(&b, RelationshipMode::Strict);
    c.set_default(true);
    d.set_default(true);
}

#[tokio::test]
async fn test_failure_only_blocks_dependants() {
    let broken = Arc::new(AtomicBool::new(true));
    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = Context::new("/work", "/work/build");
    declare(&ctx, &broken, &log);
    ctx.finalize();

    let graph = ctx.build_graph().unwrap();
    GraphExecutor::new()
        .execute_graph(&graph, Arc::new(NullObserver))
        .await;

    assert!(!graph.is_complete());
    assert!(graph.get_status(&addr(":b")).unwrap().is_failed());
    assert!(graph.get_status(&addr(":c")).is_none());
    assert!(graph.get_status(&addr(":d")).unwrap().is_succeeded());

    let not_executed: Vec<Address> = graph
        .tasks(TaskFilter::NOT_EXECUTED)
        .iter()
        .map(|t| t.address().clone())
        .collect();
    assert_eq!(not_executed, vec![addr(":c")]);

    let error = BuildError::from_graph(&graph);
    assert_eq!(error.failed_tasks, vec![addr(":b")]);
    assert_eq!(error.not_executed, vec![addr(":c")]);
    assert!(error.interrupted_tasks.is_empty());
    assert_eq!(error.to_string(), "task \":b\" failed");
}

#[tokio::test]
async fn test_failed_build_is_saved_and_resumable() {
    let dir = TempDir::new().unwrap();
    let broken = Arc::new(AtomicBool::new(true));
    let log = Arc::new(Mutex::new(Vec::new()));

    let open = |name: &str| {
        let options = BuildOptions {
            project_dir: Some(dir.path().to_path_buf()),
            state_name: Some(name.to_string()),
            ..BuildOptions::default()
        };
        let ctx = Context::new(options.project_dir(), options.build_dir());
        declare(&ctx, &broken, &log);
        BuildSession::from_context(ctx, options)
    };

    let err = open("first")
        .run(&GraphOptions::default(), Arc::new(NullObserver))
        .await
        .unwrap_err();
    let build_error = err.downcast_ref::<BuildError>().unwrap();
    assert_eq!(build_error.failed_tasks, vec![addr(":b")]);
    assert!(dir.path().join("build/.kiln/buildenv/state-first.json").is_file());

    let mut executed = std::mem::take(&mut *log.lock().unwrap());
    executed.sort();
    assert_eq!(executed, vec!["b", "d"]);

    // Failed results are kept, so resuming alone reports the same failure without running
    // anything.
    broken.store(false, Ordering::SeqCst);
    let resume = GraphOptions {
        resume: true,
        ..GraphOptions::default()
    };
    let err = open("second")
        .run(&resume, Arc::new(NullObserver))
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<BuildError>().unwrap().failed_tasks, vec![addr(":b")]);
    assert!(log.lock().unwrap().is_empty());

    let restart = GraphOptions {
        restart: true,
        ..resume
    };
    let graph = open("third")
        .run(&restart, Arc::new(NullObserver))
        .await
        .unwrap();
    assert!(graph.is_complete());
    let mut executed = std::mem::take(&mut *log.lock().unwrap());
    executed.sort();
    assert_eq!(executed, vec!["b", "c", "d"]);
}
