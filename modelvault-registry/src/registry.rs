//! Model registry: versioned model history plus a single promoted best model.
//!
//! Layout on disk:
//!
//! ```text
//! <versions_root>/<run_id>/<model_name>.model
//! <versions_root>/<run_id>/<metrics_name>.json
//! <best_root>/<run_id>/...            (copy of the promoted version folder)
//! ```
//!
//! Every folder holds at most one entry of each kind. Finding more than one
//! is reported as an error instead of picking one arbitrarily.

use std::path::{Path, PathBuf};

use modelvault_core::config::{validate_file_stem, RegistryConfig};
use modelvault_core::persistence::atomic_write;
use modelvault_core::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::metrics::Metrics;
use crate::promote::{self, SwapPaths};
use crate::run::RunId;

/// File extension of serialized model blobs.
pub const MODEL_EXTENSION: &str = "model";
/// File extension of metrics documents.
pub const METRICS_EXTENSION: &str = "json";

/// Where the registry keeps its folders and how it names files.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryLayout {
    pub versions_root: PathBuf,
    pub best_root: PathBuf,
    pub model_name: String,
    pub metrics_name: String,
    pub metric_key: String,
}

impl RegistryLayout {
    /// Layout from configuration, with folders resolved against `project_root`.
    pub fn from_config(config: &RegistryConfig, project_root: &Path) -> Self {
        Self {
            versions_root: config.versions_path(project_root),
            best_root: config.best_path(project_root),
            model_name: config.model_name.clone(),
            metrics_name: config.metrics_name.clone(),
            metric_key: config.metric_key.clone(),
        }
    }

    /// Default layout under `project_root`.
    pub fn under(project_root: &Path) -> Self {
        Self::from_config(&RegistryConfig::default(), project_root)
    }
}

/// One saved version folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub run_id: RunId,
    pub path: PathBuf,
    /// Empty when the folder has no metrics file.
    pub metrics: Metrics,
}

/// Versions models on local disk and tracks the best one.
#[derive(Debug)]
pub struct ModelRegistry {
    layout: RegistryLayout,
    swap: SwapPaths,
    run_id: RunId,
}

impl ModelRegistry {
    /// Open (or initialize) a registry.
    ///
    /// Creates both roots if absent and never deletes existing versions.
    /// A best-model swap interrupted by a crash is completed or rolled back.
    pub fn open(layout: RegistryLayout, run_id: RunId) -> Result<Self> {
        const OP: &str = "open";

        let swap = swap_paths(&layout.best_root)?;
        std::fs::create_dir_all(&layout.versions_root)
            .map_err(RegistryError::io(OP, &layout.versions_root))?;
        let versions_root = layout
            .versions_root
            .canonicalize()
            .map_err(RegistryError::io(OP, &layout.versions_root))?;
        // Promotion replaces the best root wholesale; versions inside it would be lost.
        if swap.overlaps(&versions_root) {
            return Err(RegistryError::OverlappingRoots {
                versions_root,
                best_root: swap.best_root,
            });
        }

        // Recovery must run before the best root is (re)created.
        if promote::recover(&swap)? {
            warn!(best_root = %swap.best_root.display(), "Recovered best model after interrupted promotion");
        }
        let best_root = swap.best_root.clone();
        std::fs::create_dir_all(&best_root).map_err(RegistryError::io(OP, &best_root))?;

        let layout = RegistryLayout {
            versions_root,
            best_root,
            ..layout
        };
        info!(
            run_id = %run_id,
            versions = %layout.versions_root.display(),
            best = %layout.best_root.display(),
            "Model registry ready"
        );
        Ok(Self {
            layout,
            swap,
            run_id,
        })
    }

    /// Open a registry from configuration for a run starting now.
    pub fn from_config(config: &RegistryConfig, project_root: &Path) -> Result<Self> {
        config.validate()?;
        Self::open(RegistryLayout::from_config(config, project_root), RunId::now())
    }

    pub fn layout(&self) -> &RegistryLayout {
        &self.layout
    }

    pub fn versions_root(&self) -> &Path {
        &self.layout.versions_root
    }

    pub fn best_root(&self) -> &Path {
        &self.layout.best_root
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Start a new run; subsequent saves go to a new version folder.
    pub fn begin_run(&mut self, run_id: RunId) {
        debug!(previous = %self.run_id, next = %run_id, "Starting new registry run");
        self.run_id = run_id;
    }

    /// Folder of the current run.
    pub fn version_path(&self) -> PathBuf {
        self.layout.versions_root.join(&self.run_id)
    }

    /// Save a model and its metrics into the current run's version folder.
    ///
    /// Returns the absolute path of the version folder. Saving twice in the
    /// same run overwrites the folder's artifacts.
    pub fn save_model<M: Serialize + ?Sized>(
        &self,
        model: &M,
        metrics: &Metrics,
        model_name: &str,
        metrics_name: &str,
    ) -> Result<PathBuf> {
        const OP: &str = "save_model";

        validate_file_stem("model_name", model_name)?;
        validate_file_stem("metrics_name", metrics_name)?;
        metrics.ensure_finite()?;

        info!(run_id = %self.run_id, "Saving new model and metrics to versioned folder");
        let folder = self.version_path();
        std::fs::create_dir_all(&folder).map_err(RegistryError::io(OP, &folder))?;

        let model_file = folder.join(format!("{model_name}.{MODEL_EXTENSION}"));
        let metrics_file = folder.join(format!("{metrics_name}.{METRICS_EXTENSION}"));
        remove_stale_artifacts(&folder, &[&model_file, &metrics_file])?;

        let blob = serde_json::to_vec(model).map_err(RegistryError::serde(OP, &model_file))?;
        atomic_write(&model_file, &blob).map_err(RegistryError::io(OP, &model_file))?;

        let document =
            serde_json::to_vec_pretty(metrics).map_err(RegistryError::serde(OP, &metrics_file))?;
        atomic_write(&metrics_file, &document).map_err(RegistryError::io(OP, &metrics_file))?;

        info!(folder = %folder.display(), "Model and metrics saved");
        Ok(folder)
    }

    /// `save_model` with the configured file names.
    pub fn save_model_default<M: Serialize + ?Sized>(
        &self,
        model: &M,
        metrics: &Metrics,
    ) -> Result<PathBuf> {
        self.save_model(
            model,
            metrics,
            &self.layout.model_name,
            &self.layout.metrics_name,
        )
    }

    /// Save the candidate, then promote it if it beats the current best.
    ///
    /// The candidate always lands in the version history. It becomes the best
    /// model when there is no best model yet (or the best has no metrics), or
    /// when its `metric_key` score is strictly greater than the incumbent's.
    /// Missing keys score 0.0 and ties keep the incumbent.
    pub fn compare_and_update_best<M: Serialize + ?Sized>(
        &self,
        new_model: &M,
        new_metrics: &Metrics,
        metric_key: &str,
        model_name: &str,
        metrics_name: &str,
    ) -> Result<bool> {
        let version = self.save_model(new_model, new_metrics, model_name, metrics_name)?;

        // The incumbent folder name is not interpreted; only its metrics matter.
        let best_metrics = match single_subdir(&self.layout.best_root)? {
            Some(folder) => load_metrics(&folder)?.filter(|metrics| !metrics.is_empty()),
            None => None,
        };

        let Some(best_metrics) = best_metrics else {
            info!("No best model found, setting current model as best");
            promote::promote(&self.swap, &version, &self.run_id)?;
            return Ok(true);
        };

        let old_score = best_metrics.score(metric_key);
        let new_score = new_metrics.score(metric_key);
        info!(metric = metric_key, old_score, new_score, "Comparing candidate with best model");

        if new_score > old_score {
            info!("New model is better, updating best model");
            promote::promote(&self.swap, &version, &self.run_id)?;
            Ok(true)
        } else {
            info!("New model is not better, keeping current best model");
            Ok(false)
        }
    }

    /// `compare_and_update_best` with the configured metric key and file names.
    pub fn compare_and_update_best_default<M: Serialize + ?Sized>(
        &self,
        new_model: &M,
        new_metrics: &Metrics,
    ) -> Result<bool> {
        self.compare_and_update_best(
            new_model,
            new_metrics,
            &self.layout.metric_key,
            &self.layout.model_name,
            &self.layout.metrics_name,
        )
    }

    /// Load the promoted model, or `None` when nothing has been promoted yet.
    pub fn load_best_model<M: DeserializeOwned>(&self) -> Result<Option<M>> {
        const OP: &str = "load_best_model";

        let Some(folder) = single_subdir(&self.layout.best_root)? else {
            debug!("Best model root is empty");
            return Ok(None);
        };
        let Some(blob_path) = single_file_with_extension(&folder, MODEL_EXTENSION)? else {
            debug!(folder = %folder.display(), "Best model folder has no model blob");
            return Ok(None);
        };

        let blob = std::fs::read(&blob_path).map_err(RegistryError::io(OP, &blob_path))?;
        let model = serde_json::from_slice(&blob).map_err(RegistryError::serde(OP, &blob_path))?;
        debug!(path = %blob_path.display(), bytes = blob.len(), "Loaded best model");
        Ok(Some(model))
    }

    /// The promoted version, if any.
    pub fn best_version(&self) -> Result<Option<ModelVersion>> {
        let Some(folder) = single_subdir(&self.layout.best_root)? else {
            return Ok(None);
        };
        read_version(&folder).map(Some)
    }

    /// Every saved version, oldest first.
    pub fn list_versions(&self) -> Result<Vec<ModelVersion>> {
        let mut versions = Vec::new();
        for folder in visible_entries(&self.layout.versions_root, EntryKind::Dir)? {
            match read_version(&folder) {
                Ok(version) => versions.push(version),
                Err(RegistryError::InvalidRunId { value }) => {
                    warn!(folder = %value, "Skipping folder that is not a run id");
                }
                Err(e) => return Err(e),
            }
        }
        versions.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(versions)
    }
}

/// Swap paths for `best_root`, with its parent made absolute.
fn swap_paths(best_root: &Path) -> Result<SwapPaths> {
    let (parent, name) = match (best_root.parent(), best_root.file_name()) {
        (Some(parent), Some(name)) => (parent, name.to_string_lossy()),
        _ => {
            return Err(ConfigError::Invalid {
                message: format!(
                    "best model root {} must be a named folder",
                    best_root.display()
                ),
            }
            .into())
        }
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    std::fs::create_dir_all(parent).map_err(RegistryError::io("open", parent))?;
    let parent = parent
        .canonicalize()
        .map_err(RegistryError::io("open", parent))?;
    Ok(SwapPaths::new(&parent, &name))
}

fn read_version(folder: &Path) -> Result<ModelVersion> {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let run_id = RunId::parse(&name)?;
    let metrics = load_metrics(folder)?.unwrap_or_default();
    Ok(ModelVersion {
        run_id,
        path: folder.to_path_buf(),
        metrics,
    })
}

/// Metrics stored in `folder`, or `None` when it has no metrics file.
fn load_metrics(folder: &Path) -> Result<Option<Metrics>> {
    const OP: &str = "load_metrics";

    let Some(path) = single_file_with_extension(folder, METRICS_EXTENSION)? else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(&path).map_err(RegistryError::io(OP, &path))?;
    let metrics = serde_json::from_str(&raw).map_err(RegistryError::serde(OP, &path))?;
    Ok(Some(metrics))
}

/// Drop model blobs and metrics files left behind by an earlier save of the
/// same run under different names, so the folder keeps one of each.
fn remove_stale_artifacts(folder: &Path, keep: &[&Path]) -> Result<()> {
    for ext in [MODEL_EXTENSION, METRICS_EXTENSION] {
        for path in files_with_extension(folder, ext)? {
            if !keep.contains(&path.as_path()) {
                std::fs::remove_file(&path).map_err(RegistryError::io("save_model", &path))?;
                debug!(path = %path.display(), "Removed stale artifact");
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum EntryKind {
    Dir,
    File,
}

/// Non-hidden entries of one kind, sorted by name.
fn visible_entries(dir: &Path, kind: EntryKind) -> Result<Vec<PathBuf>> {
    let op = "scan";
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegistryError::io(op, dir)(e)),
    };
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(RegistryError::io(op, dir))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let matches = match kind {
            EntryKind::Dir => path.is_dir(),
            EntryKind::File => path.is_file(),
        };
        if matches {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn files_with_extension(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    Ok(visible_entries(folder, EntryKind::File)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == extension))
        .collect())
}

fn single_file_with_extension(folder: &Path, extension: &'static str) -> Result<Option<PathBuf>> {
    let mut files = files_with_extension(folder, extension)?;
    match files.len() {
        0 => Ok(None),
        1 => Ok(files.pop()),
        count => Err(RegistryError::AmbiguousArtifact {
            folder: folder.to_path_buf(),
            extension,
            count,
        }),
    }
}

fn single_subdir(root: &Path) -> Result<Option<PathBuf>> {
    let mut dirs = visible_entries(root, EntryKind::Dir)?;
    match dirs.len() {
        0 => Ok(None),
        1 => Ok(dirs.pop()),
        _ => Err(RegistryError::AmbiguousBest {
            root: root.to_path_buf(),
            entries: dirs
                .iter()
                .filter_map(|d| d.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .collect(),
        }),
    }
}
