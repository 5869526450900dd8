//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use modelvault_core::blob::{upload_dir, LocalBlobStore};
use modelvault_core::{StorageCredentials, VaultConfig};
use modelvault_registry::{Metrics, ModelRegistry, ModelVersion, RegistryLayout, RunId};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand, printing results to stdout.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_command(command, workspace, &mut out)
}

fn run_command(command: Commands, workspace: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Commands::Init => handle_init(workspace, out),
        Commands::Save {
            model,
            metrics,
            run_id,
        } => handle_save(workspace, &model, &metrics, run_id.as_deref(), out),
        Commands::Promote {
            model,
            metrics,
            metric_key,
            run_id,
        } => handle_promote(
            workspace,
            &model,
            &metrics,
            metric_key.as_deref(),
            run_id.as_deref(),
            out,
        ),
        Commands::Versions => handle_versions(workspace, out),
        Commands::Best => handle_best(workspace, out),
        Commands::LoadBest { out: target } => handle_load_best(workspace, target.as_deref(), out),
        Commands::Push { dest, prefix } => handle_push(workspace, &dest, &prefix, out),
        Commands::Credentials { env_file } => {
            handle_credentials(workspace, env_file.as_deref(), out)
        }
        Commands::Config { action } => handle_config(action, workspace, out),
    }
}

fn load_config(workspace: &Path) -> anyhow::Result<VaultConfig> {
    modelvault_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn open_registry(workspace: &Path, run_id: Option<&str>) -> anyhow::Result<ModelRegistry> {
    let config = load_config(workspace)?;
    let run_id = match run_id {
        Some(raw) => RunId::parse(raw)?,
        None => RunId::now(),
    };
    let layout = RegistryLayout::from_config(&config.registry, workspace);
    Ok(ModelRegistry::open(layout, run_id)?)
}

fn read_model(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Model file {} is not valid JSON", path.display()))
}

fn read_metrics(path: &Path) -> anyhow::Result<Metrics> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| {
        format!(
            "Metrics file {} must be a JSON object of numbers",
            path.display()
        )
    })
}

fn render_version(version: &ModelVersion) -> String {
    if version.metrics.is_empty() {
        format!("{}  (no metrics)", version.run_id)
    } else {
        format!("{}  {}", version.run_id, version.metrics)
    }
}

fn handle_init(workspace: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    match modelvault_core::config::write_default_config(workspace)? {
        Some(path) => writeln!(out, "Created default configuration at: {}", path.display())?,
        None => writeln!(out, "Configuration already present in {}", workspace.display())?,
    }
    let registry = open_registry(workspace, None)?;
    writeln!(out, "Versions folder: {}", registry.versions_root().display())?;
    writeln!(out, "Best model folder: {}", registry.best_root().display())?;
    Ok(())
}

fn handle_save(
    workspace: &Path,
    model: &Path,
    metrics: &Path,
    run_id: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let model = read_model(model)?;
    let metrics = read_metrics(metrics)?;
    let registry = open_registry(workspace, run_id)?;
    let folder = registry.save_model_default(&model, &metrics)?;
    writeln!(out, "Saved version {} at {}", registry.run_id(), folder.display())?;
    Ok(())
}

fn handle_promote(
    workspace: &Path,
    model: &Path,
    metrics: &Path,
    metric_key: Option<&str>,
    run_id: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let model = read_model(model)?;
    let metrics = read_metrics(metrics)?;
    let registry = open_registry(workspace, run_id)?;
    let layout = registry.layout();
    let key = metric_key.unwrap_or(&layout.metric_key);

    let promoted = registry.compare_and_update_best(
        &model,
        &metrics,
        key,
        &layout.model_name,
        &layout.metrics_name,
    )?;
    if promoted {
        writeln!(
            out,
            "Promoted {} as best model ({key}={})",
            registry.run_id(),
            metrics.score(key)
        )?;
    } else {
        writeln!(
            out,
            "Kept current best model; {} recorded in history ({key}={})",
            registry.run_id(),
            metrics.score(key)
        )?;
    }
    Ok(())
}

fn handle_versions(workspace: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    let registry = open_registry(workspace, None)?;
    let versions = registry.list_versions()?;
    if versions.is_empty() {
        writeln!(out, "No versions saved yet.")?;
        return Ok(());
    }
    let best = registry.best_version()?.map(|b| b.run_id);
    for version in &versions {
        let marker = if best.as_ref() == Some(&version.run_id) {
            "*"
        } else {
            " "
        };
        writeln!(out, "{marker} {}", render_version(version))?;
    }
    Ok(())
}

fn handle_best(workspace: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    let registry = open_registry(workspace, None)?;
    match registry.best_version()? {
        Some(best) => {
            writeln!(out, "{}", render_version(&best))?;
            writeln!(out, "  {}", best.path.display())?;
        }
        None => writeln!(out, "No best model yet.")?,
    }
    Ok(())
}

fn handle_load_best(
    workspace: &Path,
    target: Option<&Path>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let registry = open_registry(workspace, None)?;
    let Some(model) = registry.load_best_model::<serde_json::Value>()? else {
        writeln!(out, "No best model yet.")?;
        return Ok(());
    };
    let rendered = serde_json::to_string_pretty(&model)?;
    match target {
        Some(path) => {
            modelvault_core::persistence::atomic_write(path, rendered.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(out, "Wrote best model to {}", path.display())?;
        }
        None => writeln!(out, "{rendered}")?,
    }
    Ok(())
}

fn handle_push(
    workspace: &Path,
    dest: &Path,
    prefix: &str,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let registry = open_registry(workspace, None)?;
    let Some(best) = registry.best_version()? else {
        anyhow::bail!("No best model to push");
    };
    let store = LocalBlobStore::new(dest);
    let key_prefix = format!("{}/{}", prefix.trim_matches('/'), best.run_id);
    let keys = upload_dir(&store, &best.path, key_prefix.trim_start_matches('/'))?;
    writeln!(
        out,
        "Pushed {} files of {} to {}",
        keys.len(),
        best.run_id,
        store.root().display()
    )?;
    for key in keys {
        writeln!(out, "  {key}")?;
    }
    Ok(())
}

fn handle_credentials(
    workspace: &Path,
    env_file: Option<&Path>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let env_file: PathBuf = match env_file {
        Some(path) => path.to_path_buf(),
        None => load_config(workspace)?
            .storage
            .env_file
            .map(|p| workspace.join(p))
            .ok_or_else(|| {
                anyhow::anyhow!("No env file given and storage.env_file is not configured")
            })?,
    };
    let credentials = StorageCredentials::from_env_file(&env_file)?;
    writeln!(out, "Credentials OK: {credentials:?}")?;
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(workspace)?;
            if !modelvault_core::config::config_exists(Some(workspace)) {
                writeln!(out, "# No config file found; built-in defaults plus environment")?;
            }
            let toml_str = toml::to_string_pretty(&config)?;
            writeln!(out, "{toml_str}")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    /// Run `test` against a fresh workspace with an empty environment and a
    /// private home, so user config files and `MODELVAULT_*` variables stay out.
    fn in_workspace(test: impl FnOnce(&Path)) {
        Jail::expect_with(|jail| {
            let workspace = jail.directory().to_path_buf();
            jail.clear_env();
            jail.set_env("HOME", workspace.display());
            jail.set_env("XDG_CONFIG_HOME", workspace.join(".config").display());
            test(&workspace);
            Ok(())
        });
    }

    fn write_json(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn run(workspace: &Path, command: Commands) -> String {
        let mut out = Vec::new();
        run_command(command, workspace, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn promote(workspace: &Path, run_id: &str, accuracy: f64) -> String {
        let model = write_json(workspace, "model_in.json", &format!(r#"{{"id": "{run_id}"}}"#));
        let metrics = write_json(
            workspace,
            "metrics_in.json",
            &format!(r#"{{"accuracy": {accuracy}}}"#),
        );
        run(
            workspace,
            Commands::Promote {
                model,
                metrics,
                metric_key: None,
                run_id: Some(run_id.into()),
            },
        )
    }

    #[test]
    fn test_init_creates_layout() {
        in_workspace(|ws| {
            let output = run(ws, Commands::Init);
            assert!(output.contains("Created default configuration"));
            assert!(ws.join("models").is_dir());
            assert!(ws.join("predictive_model").is_dir());
            assert!(ws.join(".modelvault/config.toml").is_file());
        });
    }

    #[test]
    fn test_promote_then_load_best() {
        in_workspace(|ws| {
            assert!(promote(ws, "run_1", 0.8).contains("Promoted run_1"));
            assert!(promote(ws, "run_2", 0.7).contains("Kept current best model"));

            let target = ws.join("best.json");
            run(
                ws,
                Commands::LoadBest {
                    out: Some(target.clone()),
                },
            );
            let loaded: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(target).unwrap()).unwrap();
            assert_eq!(loaded, serde_json::json!({"id": "run_1"}));

            let listing = run(ws, Commands::Versions);
            assert!(listing.contains("* run_1  accuracy=0.8"));
            assert!(listing.contains("  run_2  accuracy=0.7"));
        });
    }

    #[test]
    fn test_metric_key_from_workspace_config() {
        in_workspace(|ws| {
            promote(ws, "run_1", 0.8);
            std::fs::create_dir_all(ws.join(".modelvault")).unwrap();
            std::fs::write(
                ws.join(".modelvault/config.toml"),
                "[registry]\nmetric_key = \"f1\"\n",
            )
            .unwrap();

            // Neither run reports f1, so both score 0 and the incumbent stays.
            let output = promote(ws, "run_2", 0.9);
            assert!(output.contains("Kept current best model"), "{output}");
            assert!(output.contains("f1=0"), "{output}");
        });
    }

    #[test]
    fn test_best_on_empty_registry() {
        in_workspace(|ws| {
            assert_eq!(run(ws, Commands::Best), "No best model yet.\n");
        });
    }

    #[test]
    fn test_push_mirrors_best_folder() {
        in_workspace(|ws| {
            promote(ws, "run_9", 0.5);
            let dest = ws.join("bucket");

            let output = run(
                ws,
                Commands::Push {
                    dest: dest.clone(),
                    prefix: "serving".into(),
                },
            );
            assert!(output.contains("Pushed 2 files of run_9"));
            assert!(dest.join("serving/run_9/model.model").is_file());
            assert!(dest.join("serving/run_9/metrics.json").is_file());
        });
    }

    #[test]
    fn test_save_rejects_non_object_metrics() {
        in_workspace(|ws| {
            let model = write_json(ws, "m.json", "{}");
            let metrics = write_json(ws, "x.json", "[1, 2]");
            let mut out = Vec::new();
            let err = run_command(
                Commands::Save {
                    model,
                    metrics,
                    run_id: None,
                },
                ws,
                &mut out,
            )
            .unwrap_err();
            assert!(err.to_string().contains("must be a JSON object of numbers"));
        });
    }

    #[test]
    fn test_credentials_missing_file() {
        in_workspace(|ws| {
            let mut out = Vec::new();
            let err = run_command(
                Commands::Credentials {
                    env_file: Some(ws.join("aws.env")),
                },
                ws,
                &mut out,
            )
            .unwrap_err();
            assert!(err.to_string().contains("Configuration file not found"));
        });
    }

    #[test]
    fn test_config_show_after_init() {
        in_workspace(|ws| {
            run(ws, Commands::Init);
            let shown = run(
                ws,
                Commands::Config {
                    action: ConfigAction::Show,
                },
            );
            assert!(shown.contains("[registry]"));
            assert!(shown.contains("best_dir = \"predictive_model\""));
        });
    }

    #[test]
    fn test_render_version_without_metrics() {
        let version = ModelVersion {
            run_id: RunId::parse("run_1").unwrap(),
            path: PathBuf::from("/tmp/models/run_1"),
            metrics: Metrics::new(),
        };
        assert_eq!(render_version(&version), "run_1  (no metrics)");
    }
}
