//! `kiln.toml` project manifests
//!
//! A manifest declares the tasks of one project and points at the directories of its
//! subprojects, each of which carries its own `kiln.toml`:
//!
//! ```toml
//! description = "Example project"
//! standard_groups = true
//! subprojects = ["lib"]
//!
//! [[task]]
//! name = "compile"
//! command = ["cc", "-c", "main.c"]
//! group = "build"
//! depends_on = [":lib:compile"]
//!
//! [[task]]
//! name = "server"
//! command = ["python3", "-m", "http.server"]
//! background = true
//! ```
//!
//! Entries in `depends_on` and `order_only` are task selectors resolved relative to the
//! declaring project once the graph is built, so `lib:` or `**:fmt` work as well as
//! absolute addresses.

use crate::address::Address;
use crate::env;
use crate::property::{PropertyError, Value};
use crate::task::{CommandTask, Context, Project, ProjectError, RelationshipMode, Task, VoidTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no {} found in {}", env::MANIFEST_FILE_NAME, .0.display())]
    NotFound(PathBuf),

    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("task `{0}` has kind \"command\" but no command")]
    MissingCommand(String),

    #[error("task `{task}` has kind \"{kind}\" and cannot take a command")]
    UnexpectedCommand { task: String, kind: ManifestTaskKind },

    #[error("subproject directory {} has no usable name", .0.display())]
    InvalidSubproject(PathBuf),

    #[error("invalid address in task `{task}`: {source}")]
    Address {
        task: String,
        #[source]
        source: crate::address::AddressParseError,
    },

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestTaskKind {
    Command,
    Void,
    Group,
}

impl std::fmt::Display for ManifestTaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ManifestTaskKind::Command => "command",
            ManifestTaskKind::Void => "void",
            ManifestTaskKind::Group => "group",
        })
    }
}

/// One `[[task]]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskManifest {
    pub name: String,
    /// Defaults to `command` when a command is given and `void` otherwise
    #[serde(default)]
    pub kind: Option<ManifestTaskKind>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub background: bool,
    /// Relative to the project directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
    #[serde(default)]
    pub default: bool,
    /// Group of the same project this task becomes a member of
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub order_only: Vec<String>,
}

impl TaskManifest {
    pub fn kind(&self) -> ManifestTaskKind {
        self.kind.unwrap_or(if self.command.is_empty() {
            ManifestTaskKind::Void
        } else {
            ManifestTaskKind::Command
        })
    }

    fn addresses(&self, entries: &[String]) -> Result<Vec<Address>, ManifestError> {
        entries
            .iter()
            .map(|entry| {
                Address::parse(entry).map_err(|source| ManifestError::Address {
                    task: self.name.clone(),
                    source,
                })
            })
            .collect()
    }

    fn create(&self, project: &Project) -> Result<Arc<Task>, ManifestError> {
        let kind = self.kind();
        if kind != ManifestTaskKind::Command && !self.command.is_empty() {
            return Err(ManifestError::UnexpectedCommand {
                task: self.name.clone(),
                kind,
            });
        }

        let task = match kind {
            ManifestTaskKind::Group => project.group(&self.name)?,
            ManifestTaskKind::Void => project.task_legacy(&self.name, VoidTask)?,
            ManifestTaskKind::Command => {
                if self.command.is_empty() {
                    return Err(ManifestError::MissingCommand(self.name.clone()));
                }
                let task = project.task_legacy(&self.name, CommandTask::new())?;
                self.configure_command(project, &task)?;
                task
            }
        };
        Ok(task)
    }

    fn configure_command(&self, project: &Project, task: &Task) -> Result<(), ManifestError> {
        let set = |name: &str, value: Value| -> Result<(), ManifestError> {
            match task.property(name) {
                Some(property) => Ok(property.set(value)?),
                None => Err(PropertyError::Empty {
                    subject: format!("{task}.{name}"),
                    message: Some("no such property".to_string()),
                }
                .into()),
            }
        };

        set(
            "command",
            Value::List(self.command.iter().map(|arg| Value::from(arg.as_str())).collect()),
        )?;
        set("background", Value::Bool(self.background))?;
        if let Some(cwd) = &self.cwd {
            set("cwd", Value::Path(project.directory().join(cwd)))?;
        }
        if !self.env.is_empty() {
            set(
                "env",
                Value::List(
                    self.env
                        .iter()
                        .map(|(key, value)| Value::Str(format!("{key}={value}")))
                        .collect(),
                ),
            )?;
        }
        if let Some(secs) = self.timeout_secs {
            set("timeout_secs", Value::Int(secs))?;
        }
        Ok(())
    }
}

/// The contents of one `kiln.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub description: Option<String>,
    /// Declare the conventional lifecycle groups (`build`, `test`, ...)
    #[serde(default)]
    pub standard_groups: bool,
    /// Directories of subprojects, relative to this manifest
    #[serde(default)]
    pub subprojects: Vec<PathBuf>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskManifest>,
}

impl Manifest {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read the manifest of the project in `project_dir`.
    pub fn from_dir(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = env::manifest_path(project_dir);
        if !path.is_file() {
            return Err(ManifestError::NotFound(project_dir.to_path_buf()));
        }
        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&content, &path)
    }

    /// Declare the tasks of this manifest in `project`. Subprojects are not visited.
    pub fn declare(&self, project: &Project) -> Result<(), ManifestError> {
        if let Some(description) = &self.description {
            project.set_description(description.clone());
        }
        if self.standard_groups {
            project.apply_standard_groups()?;
        }

        for spec in &self.tasks {
            let task = spec.create(project)?;
            if spec.default {
                task.set_default(true);
            }
            if let Some(description) = &spec.description {
                task.set_description(description.clone());
            }
            if let Some(group) = &spec.group {
                project.group(group)?.add_member(&task)?;
            }
            for address in spec.addresses(&spec.depends_on)? {
                task.depends_on(address, RelationshipMode::Strict);
            }
            for address in spec.addresses(&spec.order_only)? {
                task.depends_on(address, RelationshipMode::OrderOnly);
            }
            debug!("Declared {task} ({})", spec.kind());
        }
        Ok(())
    }
}

fn subproject_name(directory: &Path) -> Result<String, ManifestError> {
    directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ManifestError::InvalidSubproject(directory.to_path_buf()))
}

fn load_into(project: &Arc<Project>) -> Result<usize, ManifestError> {
    let manifest = Manifest::from_dir(project.directory())?;
    manifest.declare(project)?;
    let mut count = 1;
    for directory in &manifest.subprojects {
        let directory = project.directory().join(directory);
        let name = subproject_name(&directory)?;
        let child = project.subproject(&name, Some(directory))?;
        count += load_into(&child)?;
    }
    Ok(count)
}

/// Create a [`Context`] for `project_dir` and declare every project found by following the
/// `subprojects` of its manifest.
pub fn load_context(project_dir: &Path, build_dir: &Path) -> Result<Context, ManifestError> {
    let ctx = Context::new(project_dir, build_dir);
    let count = load_into(ctx.root_project())?;
    info!(
        "Loaded {count} project(s) from {}",
        env::manifest_path(project_dir).display()
    );
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Manifest {
        Manifest::from_toml_str(content, Path::new("kiln.toml")).unwrap()
    }

    #[test]
    fn test_kind_defaults_to_command_when_a_command_is_given() {
        let manifest = parse(
            r#"
            [[task]]
            name = "compile"
            command = ["cc", "main.c"]

            [[task]]
            name = "marker"
            "#,
        );
        assert_eq!(manifest.tasks[0].kind(), ManifestTaskKind::Command);
        assert_eq!(manifest.tasks[1].kind(), ManifestTaskKind::Void);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = Manifest::from_toml_str("[[task]]\nname = \"a\"\ncomand = [\"ls\"]\n", Path::new("kiln.toml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_declare_sets_command_properties() {
        let manifest = parse(
            r#"
            [[task]]
            name = "serve"
            command = ["python3", "-m", "http.server"]
            background = true
            cwd = "www"
            env = { PORT = "8000" }
            timeout_secs = 5
            "#,
        );
        let ctx = Context::new("/work", "/work/build");
        manifest.declare(ctx.root_project()).unwrap();

        let task = ctx.root_project().get_task("serve").unwrap();
        let get = |name: &str| task.property(name).unwrap().get().unwrap();
        assert_eq!(
            get("command"),
            Value::List(vec!["python3".into(), "-m".into(), "http.server".into()])
        );
        assert_eq!(get("background"), Value::Bool(true));
        assert_eq!(get("cwd"), Value::Path(PathBuf::from("/work/www")));
        assert_eq!(get("env"), Value::List(vec!["PORT=8000".into()]));
        assert_eq!(get("timeout_secs"), Value::Int(5));
    }

    #[test]
    fn test_command_kind_requires_a_command() {
        let manifest = parse("[[task]]\nname = \"a\"\nkind = \"command\"\n");
        let ctx = Context::new("/work", "/work/build");
        let err = manifest.declare(ctx.root_project()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingCommand(name) if name == "a"));
    }

    #[test]
    fn test_void_kind_rejects_a_command() {
        let manifest = parse("[[task]]\nname = \"a\"\nkind = \"void\"\ncommand = [\"ls\"]\n");
        let ctx = Context::new("/work", "/work/build");
        assert!(matches!(
            manifest.declare(ctx.root_project()),
            Err(ManifestError::UnexpectedCommand { .. })
        ));
    }

    #[test]
    fn test_group_membership_and_standard_groups() {
        let manifest = parse(
            r#"
            description = "demo"
            standard_groups = true

            [[task]]
            name = "compile"
            command = ["true"]
            group = "build"

            [[task]]
            name = "docs"
            kind = "group"
            default = true
            description = "Documentation"
            "#,
        );
        let ctx = Context::new("/work", "/work/build");
        let root = ctx.root_project();
        manifest.declare(root).unwrap();

        assert_eq!(root.description().as_deref(), Some("demo"));
        let build = root.get_task("build").unwrap();
        let members: Vec<String> = build.members().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(members, vec!["compile"]);

        let docs = root.get_task("docs").unwrap();
        assert!(docs.is_group());
        assert!(docs.is_default());
        assert_eq!(docs.description().as_deref(), Some("Documentation"));
    }

    #[test]
    fn test_invalid_dependency_address() {
        let manifest = parse("[[task]]\nname = \"a\"\ndepends_on = [\"b::c\"]\n");
        let ctx = Context::new("/work", "/work/build");
        assert!(matches!(
            manifest.declare(ctx.root_project()),
            Err(ManifestError::Address { task, .. }) if task == "a"
        ));
    }
}
