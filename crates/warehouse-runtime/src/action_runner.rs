use std::path::{Path, PathBuf};
use std::sync::Arc;

use warehouse_model::{Transformation, View};
use warehouse_scheduler::{ActionRunner, CoordinatorHandle, RuntimeError, ToCoordinator, UserIdentity};

/// A filesystem-rooted `ActionRunner`. Every view path is resolved
/// relative to `root`, the way `LocalBuildsRoot` resolves build ids
/// relative to its own directory: paths never escape the root, and
/// absolute-looking view paths (e.g. `/warehouse/clicks`) are treated as
/// root-relative rather than rejected.
///
/// `Compute` transformations are executed as a subprocess described by
/// the transformation's descriptor; `Filesystem` transformations perform
/// the copy or move the descriptor names. Neither the shape of SQL
/// dialects nor a real morphline/Pig executor is in scope here; this
/// is the reference driver a deployment is expected to replace.
#[derive(Debug, Clone)]
pub struct LocalActionRunner {
    root: PathBuf,
}

impl LocalActionRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[derive(Debug, serde::Deserialize)]
struct ComputeDescriptor {
    command: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct FilesystemDescriptor {
    from: String,
    to: String,
    #[serde(default)]
    r#move: bool,
}

#[async_trait::async_trait]
impl ActionRunner for LocalActionRunner {
    #[tracing::instrument(skip_all, fields(view = %view.id, round))]
    async fn submit_transformation(&self, view: Arc<View>, reply_to: CoordinatorHandle, round: u64) {
        let runner = self.clone();
        tokio::spawn(async move {
            let outcome = match &view.transformation {
                Transformation::NoOp => {
                    tracing::warn!(view = %view.id, "submit_transformation called for a NoOp view");
                    Ok(())
                }
                Transformation::Compute { descriptor } => runner.run_compute(descriptor).await,
                Transformation::Filesystem { descriptor } => runner.run_filesystem(descriptor).await,
            };

            match outcome {
                Ok(()) => reply_to.send(ToCoordinator::ActionSuccess { round }),
                Err(err) => reply_to.send(ToCoordinator::ActionFailure {
                    round,
                    reason: err.to_string(),
                }),
            }
        });
    }

    async fn touch(&self, path: &str, _user: &UserIdentity) -> Result<(), RuntimeError> {
        let dest = self.resolve(path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| RuntimeError::Backend(err.to_string()))?;
        }
        tokio::fs::File::create(&dest)
            .await
            .map(|_| ())
            .map_err(|err| RuntimeError::Backend(err.to_string()))
    }

    async fn delete(&self, path: &str, recursive: bool, _user: &UserIdentity) -> Result<(), RuntimeError> {
        let dest = self.resolve(path);
        let result = if recursive {
            tokio::fs::remove_dir_all(&dest).await
        } else {
            tokio::fs::remove_file(&dest).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RuntimeError::Backend(err.to_string())),
        }
    }

    async fn marker_exists(&self, path: &str, _user: &UserIdentity) -> Result<bool, RuntimeError> {
        Ok(tokio::fs::try_exists(self.resolve(path))
            .await
            .map_err(|err| RuntimeError::Backend(err.to_string()))?)
    }
}

impl LocalActionRunner {
    async fn run_compute(&self, descriptor: &serde_json::Value) -> Result<(), RuntimeError> {
        let ComputeDescriptor { command } = serde_json::from_value(descriptor.clone())
            .map_err(|err| RuntimeError::Backend(format!("invalid compute descriptor: {err}")))?;
        let Some((program, args)) = command.split_first() else {
            return Err(RuntimeError::Backend("compute descriptor has an empty command".into()));
        };

        let status = tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .status()
            .await
            .map_err(|err| RuntimeError::Backend(err.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Backend(format!("transformation exited with {status}")))
        }
    }

    async fn run_filesystem(&self, descriptor: &serde_json::Value) -> Result<(), RuntimeError> {
        let FilesystemDescriptor { from, to, r#move } = serde_json::from_value(descriptor.clone())
            .map_err(|err| RuntimeError::Backend(format!("invalid filesystem descriptor: {err}")))?;

        let from = self.resolve(&from);
        let to = self.resolve(&to);
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| RuntimeError::Backend(err.to_string()))?;
        }

        copy_or_move(&from, &to, r#move)
            .await
            .map_err(|err| RuntimeError::Backend(err.to_string()))
    }
}

async fn copy_or_move(from: &Path, to: &Path, r#move: bool) -> std::io::Result<()> {
    tokio::fs::copy(from, to).await?;
    if r#move {
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}
