//! Built-in task actions.

use super::status::TaskStatus;
use super::task::{Task, TaskAction, TaskIo};
use crate::property::{PropertySpec, TypeDescriptor, Value};
use anyhow::{Context as _, anyhow, bail};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Does nothing. Skipped unless its `skip` property is set to false.
#[derive(Debug, Default, Clone)]
pub struct VoidTask;

impl TaskAction for VoidTask {
    fn schema(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new("skip", TypeDescriptor::Bool).with_default(true),
            PropertySpec::new("message", TypeDescriptor::Str).with_default("is a VoidTask"),
        ]
    }

    fn prepare(&self, task: &Task) -> Option<TaskStatus> {
        let skip = task
            .property("skip")
            .and_then(|p| p.get().ok())
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        if !skip {
            return None;
        }
        let message = task
            .property("message")
            .and_then(|p| p.get().ok())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "is a VoidTask".to_string());
        Some(TaskStatus::skipped(message))
    }

    fn execute(&self, _task: &Task, _io: &TaskIo) -> anyhow::Result<TaskStatus> {
        Ok(TaskStatus::succeeded())
    }
}

type TaskFn = dyn Fn(&Task, &TaskIo) -> anyhow::Result<TaskStatus> + Send + Sync;

/// A task whose body is a closure.
pub struct FnTask {
    func: Box<TaskFn>,
    schema: Vec<PropertySpec>,
}

impl FnTask {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Task, &TaskIo) -> anyhow::Result<TaskStatus> + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
            schema: Vec::new(),
        }
    }

    pub fn with_property(mut self, spec: PropertySpec) -> Self {
        self.schema.push(spec);
        self
    }
}

impl TaskAction for FnTask {
    fn schema(&self) -> Vec<PropertySpec> {
        self.schema.clone()
    }

    fn execute(&self, task: &Task, io: &TaskIo) -> anyhow::Result<TaskStatus> {
        (self.func)(task, io)
    }
}

/// Runs a subprocess.
///
/// Properties: `command` (argv), `cwd`, `env` (`KEY=VALUE` entries), `background` and
/// `timeout_secs`. In the foreground the process output is forwarded line by line to the task
/// output and the process is killed when the build is interrupted or the timeout elapses. In
/// background mode the task returns `Started` right after spawning, and the process is killed
/// when the task is torn down.
#[derive(Debug, Default)]
pub struct CommandTask {
    child: Mutex<Option<std::process::Child>>,
}

struct Invocation {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    background: bool,
    timeout: Option<Duration>,
}

impl CommandTask {
    pub fn new() -> Self {
        Self::default()
    }

    fn invocation(task: &Task) -> anyhow::Result<Invocation> {
        let get = |name: &str| -> anyhow::Result<Value> {
            let property = task
                .property(name)
                .ok_or_else(|| anyhow!("{task} has no property '{name}'"))?;
            Ok(property.get()?)
        };

        let argv: Vec<String> = get("command")?
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|v| v.to_string())
            .collect();
        if argv.is_empty() {
            bail!("{task} has an empty command");
        }

        let cwd = match get("cwd")? {
            Value::Path(path) => Some(path),
            _ => None,
        };

        let mut env = Vec::new();
        for entry in get("env")?.as_list().unwrap_or_default() {
            let entry = entry.to_string();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid environment entry '{entry}', expected KEY=VALUE"))?;
            env.push((key.to_string(), value.to_string()));
        }

        let background = get("background")?.as_bool().unwrap_or(false);
        let timeout = get("timeout_secs")?
            .as_int()
            .map(|secs| Duration::from_secs(secs.max(0) as u64));

        Ok(Invocation {
            argv,
            cwd,
            env,
            background,
            timeout,
        })
    }

    fn spawn_background(&self, task: &Task, invocation: &Invocation) -> anyhow::Result<TaskStatus> {
        let mut command = std::process::Command::new(&invocation.argv[0]);
        command.args(&invocation.argv[1..]).stdin(Stdio::null());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        command.envs(invocation.env.iter().map(|(k, v)| (k, v)));
        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn background process for {task}"))?;
        let pid = child.id();
        info!("Started background process {pid} for {task}");
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(TaskStatus::started(format!("pid {pid}")))
    }
}

async fn forward<R>(reader: R, io: TaskIo) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        io.write(&format!("{line}\n"));
    }
    Ok(())
}

async fn run_foreground(invocation: &Invocation, io: &TaskIo) -> anyhow::Result<TaskStatus> {
    debug!("Executing command: {:?}", invocation.argv);

    let mut command = Command::new(&invocation.argv[0]);
    command
        .args(&invocation.argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.cwd {
        command.current_dir(dir);
    }
    for (key, value) in &invocation.env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn {:?}", invocation.argv[0]))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (out_io, err_io) = (io.clone(), io.clone());

    // Dropping this future drops the child, which kills it.
    let run = async move {
        let pump_out = async move {
            match stdout {
                Some(reader) => forward(reader, out_io).await,
                None => Ok(()),
            }
        };
        let pump_err = async move {
            match stderr {
                Some(reader) => forward(reader, err_io).await,
                None => Ok(()),
            }
        };
        let (status, out, err) = tokio::join!(child.wait(), pump_out, pump_err);
        out?;
        err?;
        status
    };

    let deadline = async {
        match invocation.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = run => {
            let status = status?;
            Ok(TaskStatus::from_exit_code(Some(invocation.argv.as_slice()), status.code().unwrap_or(-1)))
        }
        _ = io.interrupt().triggered() => {
            warn!("Killed {:?} after interrupt", invocation.argv[0]);
            Ok(TaskStatus::interrupted("the build was interrupted"))
        }
        _ = deadline => Ok(TaskStatus::failed(format!(
            "command timed out after {:?}",
            invocation.timeout.unwrap_or_default()
        ))),
    }
}

impl TaskAction for CommandTask {
    fn schema(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::new("command", TypeDescriptor::list(TypeDescriptor::Str))
                .with_help("program and arguments"),
            PropertySpec::new("cwd", TypeDescriptor::optional(TypeDescriptor::Path)).with_default(Value::None),
            PropertySpec::new("env", TypeDescriptor::list(TypeDescriptor::Str))
                .with_default(Value::List(Vec::new())),
            PropertySpec::new("background", TypeDescriptor::Bool).with_default(false),
            PropertySpec::new("timeout_secs", TypeDescriptor::optional(TypeDescriptor::Int))
                .with_default(Value::None),
        ]
    }

    fn execute(&self, task: &Task, io: &TaskIo) -> anyhow::Result<TaskStatus> {
        let invocation = Self::invocation(task)?;
        let program = &invocation.argv[0];
        if !program.contains(std::path::MAIN_SEPARATOR) && which::which(program).is_err() {
            return Ok(TaskStatus::failed(format!("command not found: {program}")));
        }

        if invocation.background {
            return self.spawn_background(task, &invocation);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(run_foreground(&invocation, io)),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(run_foreground(&invocation, io)),
        }
    }

    fn teardown(&self, task: &Task, _io: &TaskIo) -> anyhow::Result<Option<TaskStatus>> {
        let child = self.child.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut child) = child else {
            return Ok(None);
        };
        if let Some(status) = child.try_wait()? {
            debug!("Background process for {task} already exited with {status}");
            return Ok(None);
        }
        info!("Stopping background process {} for {task}", child.id());
        child.kill()?;
        child.wait()?;
        Ok(None)
    }
}
