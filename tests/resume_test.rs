use kiln::cli::{BuildOptions, GraphOptions};
use kiln::executor::NullObserver;
use kiln::integration::BuildSession;
use kiln::task::{Context, FnTask, RelationshipMode, TaskStatus};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

fn recording(log: &Log, name: &str) -> FnTask {
    let log = Arc::clone(log);
    let name = name.to_string();
    FnTask::new(move |_, _| {
        log.lock().unwrap().push(name.clone());
        Ok(TaskStatus::succeeded())
    })
}

fn options(dir: &Path, state_name: &str) -> BuildOptions {
    BuildOptions {
        project_dir: Some(dir.to_path_buf()),
        state_name: Some(state_name.to_string()),
        ..BuildOptions::default()
    }
}

/// A fresh session over `a`, `b` and `c`, where `c` depends on `a` and `b`.
fn session_with(options: BuildOptions, log: &Log) -> BuildSession {
    let ctx = Context::new(options.project_dir(), options.build_dir());
    let root = ctx.root_project();
    let a = root.task("a", recording(log, "a")).unwrap();
    let b = root.task("b", recording(log, "b")).unwrap();
    let c = root.task("c", recording(log, "c")).unwrap();
    c.depends_on(&a, RelationshipMode::Strict);
    c.depends_on(&b, RelationshipMode::Strict);
    BuildSession::from_context(ctx, options)
}

fn session(dir: &Path, state_name: &str, log: &Log) -> BuildSession {
    session_with(options(dir, state_name), log)
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

async fn run(dir: &Path, state_name: &str, log: &Log, selector: &str, resume: bool) {
    let options = GraphOptions {
        resume,
        ..GraphOptions::with_selectors([selector])
    };
    session(dir, state_name, log)
        .run(&options, Arc::new(NullObserver))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resume_executes_one_task_per_invocation() {
    let dir = TempDir::new().unwrap();
    let log = Log::default();

    run(dir.path(), "first", &log, "a", false).await;
    assert_eq!(take(&log), vec!["a"]);

    run(dir.path(), "second", &log, "b", true).await;
    assert_eq!(take(&log), vec!["b"]);

    run(dir.path(), "third", &log, "c", true).await;
    assert_eq!(take(&log), vec!["c"]);

    let state_dir = dir.path().join("build/.kiln/buildenv");
    let files: Vec<String> = std::fs::read_dir(&state_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["state-third.json"]);
}

#[tokio::test]
async fn test_without_state_everything_runs() {
    let dir = TempDir::new().unwrap();
    let log = Log::default();

    run(dir.path(), "only", &log, "c", false).await;
    let mut executed = take(&log);
    assert_eq!(executed.pop().as_deref(), Some("c"));
    executed.sort();
    assert_eq!(executed, vec!["a", "b"]);
}

#[tokio::test]
async fn test_restart_ignores_saved_results() {
    let dir = TempDir::new().unwrap();
    let log = Log::default();

    run(dir.path(), "first", &log, "c", false).await;
    take(&log);

    let options = GraphOptions {
        resume: true,
        restart: true,
        ..GraphOptions::with_selectors(["c"])
    };
    session(dir.path(), "second", &log)
        .run(&options, Arc::new(NullObserver))
        .await
        .unwrap();
    assert_eq!(take(&log).len(), 3);
}

#[tokio::test]
async fn test_state_from_additional_directories() {
    let dir = TempDir::new().unwrap();
    let shared = TempDir::new().unwrap();
    let log = Log::default();

    let first = BuildOptions {
        state_dir: Some(shared.path().to_path_buf()),
        ..options(dir.path(), "ci")
    };
    session_with(first, &log)
        .run(&GraphOptions::with_selectors(["a"]), Arc::new(NullObserver))
        .await
        .unwrap();
    assert_eq!(take(&log), vec!["a"]);

    let second = BuildOptions {
        additional_state_dirs: vec![shared.path().to_path_buf()],
        ..options(dir.path(), "local")
    };
    let resume = GraphOptions {
        resume: true,
        ..GraphOptions::with_selectors(["c"])
    };
    session_with(second, &log)
        .run(&resume, Arc::new(NullObserver))
        .await
        .unwrap();
    assert_eq!(take(&log), vec!["b", "c"]);
    assert!(dir.path().join("build/.kiln/buildenv/state-local.json").is_file());
}
