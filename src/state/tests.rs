#[cfg(test)]
mod tests {
    use crate::address::Address;
    use crate::graph::TaskGraph;
    use crate::state::*;
    use crate::task::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn addr(text: &str) -> Address {
        Address::parse(text).unwrap()
    }

    fn noop() -> FnTask {
        FnTask::new(|_, _| Ok(TaskStatus::succeeded()))
    }

    /// `c` depends on `a` and `b`.
    fn sample() -> (Context, Arc<TaskGraph>) {
        let ctx = Context::new("/work", "/work/build");
        let root = ctx.root_project();
        let a = root.task("a", noop()).unwrap();
        let b = root.task("b", noop()).unwrap();
        let c = root.task("c", noop()).unwrap();
        c.depends_on(&a, RelationshipMode::Strict);
        c.depends_on(&b, RelationshipMode::Strict);
        let graph = ctx.build_graph().unwrap();
        (ctx, graph)
    }

    fn task(ctx: &Context, address: &str) -> Arc<Task> {
        ctx.find_task(&addr(address)).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let (ctx, graph) = sample();
        graph.set_status(&task(&ctx, ":a"), TaskStatus::succeeded()).unwrap();
        graph.set_status(&task(&ctx, ":b"), TaskStatus::interrupted("stop")).unwrap();
        graph.set_status(&task(&ctx, ":c"), TaskStatus::started("pid 1")).unwrap();

        let path = save(dir.path(), "first", &graph).await.unwrap();
        assert_eq!(path, dir.path().join("state-first.json"));

        let state = load(&[dir.path().to_path_buf()]).await.unwrap().unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.name, "first");
        assert_eq!(state.graph.nodes.len(), 3);
        assert_eq!(state.graph.edges.len(), 2);
        assert_eq!(state.get_status(&addr(":a")), Some(&TaskStatus::succeeded()));
        assert_eq!(state.get_status(&addr(":b")), None);
        assert_eq!(state.graph.background, vec![addr(":c")]);
    }

    #[tokio::test]
    async fn test_capture_stores_the_full_graph() {
        let (ctx, graph) = sample();
        let trimmed = graph.trim(&[task(&ctx, ":a")]).unwrap();
        trimmed.set_status(&task(&ctx, ":a"), TaskStatus::succeeded()).unwrap();

        let state = BuildState::capture("x", &trimmed);
        assert_eq!(state.graph.nodes.len(), 3);
        assert_eq!(state.graph.results.len(), 1);
    }

    #[tokio::test]
    async fn test_save_removes_stale_state_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state-old.json"), "{}").unwrap();
        std::fs::write(dir.path().join("state-old.json.tmp"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let (_, graph) = sample();
        save(dir.path(), "new", &graph).await.unwrap();

        assert!(!dir.path().join("state-old.json").exists());
        assert!(!dir.path().join("state-old.json.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("state-new.json").exists());
    }

    #[tokio::test]
    async fn test_load_without_state() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(load(&[dir.path().to_path_buf(), missing]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_merges_later_files_over_earlier_ones() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let (ctx, graph) = sample();
        graph.set_status(&task(&ctx, ":a"), TaskStatus::failed("boom")).unwrap();
        graph.set_status(&task(&ctx, ":b"), TaskStatus::succeeded()).unwrap();
        save(first.path(), "1", &graph).await.unwrap();

        let (ctx, graph) = sample();
        graph.set_status(&task(&ctx, ":a"), TaskStatus::succeeded()).unwrap();
        save(second.path(), "2", &graph).await.unwrap();

        let state = load(&[second.path().to_path_buf(), first.path().to_path_buf()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.name, "1");
        assert_eq!(state.get_status(&addr(":a")), Some(&TaskStatus::succeeded()));
        assert_eq!(state.get_status(&addr(":b")), Some(&TaskStatus::succeeded()));
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_versions() {
        let dir = TempDir::new().unwrap();
        let (_, graph) = sample();
        let mut state = BuildState::capture("future", &graph);
        state.version = 99;
        std::fs::write(
            dir.path().join("state-future.json"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();

        let err = load(&[dir.path().to_path_buf()]).await.unwrap_err();
        assert!(matches!(err, StateError::UnsupportedVersion { version: 99, .. }));
    }

    #[tokio::test]
    async fn test_load_reports_corrupt_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state-broken.json"), "not json").unwrap();
        let err = load(&[dir.path().to_path_buf()]).await.unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[test]
    fn test_drift_is_empty_for_the_same_graph() {
        let (_, graph) = sample();
        let state = BuildState::capture("x", &graph);
        let (_, fresh) = sample();
        assert!(state.drift(&fresh).is_empty());
    }

    #[tokio::test]
    async fn test_drift_reports_changed_structure() {
        let (old_ctx, graph) = sample();
        graph.set_status(&task(&old_ctx, ":a"), TaskStatus::succeeded()).unwrap();
        let dir = TempDir::new().unwrap();
        save(dir.path(), "x", &graph).await.unwrap();
        let state = load(&[dir.path().to_path_buf()]).await.unwrap().unwrap();

        // `c` now depends only on `a`, `b` is gone and `d` is new.
        let ctx = Context::new("/work", "/work/build");
        let root = ctx.root_project();
        let a = root.task("a", noop()).unwrap();
        let c = root.task("c", noop()).unwrap();
        root.task("d", noop()).unwrap();
        c.depends_on(&a, RelationshipMode::Strict);
        let changed = ctx.build_graph().unwrap();

        let drift = state.drift(&changed);
        assert_eq!(drift.added, vec![addr(":d")]);
        assert_eq!(drift.removed, vec![addr(":b")]);
        assert_eq!(drift.changed_edges, 1);
        assert!(!drift.is_empty());

        state.apply_to(&changed);
        assert!(changed.get_status(&addr(":a")).unwrap().is_succeeded());
    }

    #[test]
    fn test_apply_skips_unknown_tasks() {
        let (ctx, graph) = sample();
        graph.set_status(&task(&ctx, ":a"), TaskStatus::succeeded()).unwrap();
        let mut state = BuildState::capture("x", &graph);
        state.graph.results.push(StoredResult {
            address: addr(":gone"),
            status: TaskStatus::succeeded(),
        });

        let (_, fresh) = sample();
        state.apply_to(&fresh);
        assert!(fresh.get_status(&addr(":a")).unwrap().is_succeeded());
        assert!(!fresh.contains(&addr(":gone")));
    }
}
