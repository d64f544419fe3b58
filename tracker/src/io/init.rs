//! Initialization helpers for `.tracker/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{TrackerConfig, write_config};

/// All canonical paths within `.tracker/` for a project root.
#[derive(Debug, Clone)]
pub struct TrackerPaths {
    pub root: PathBuf,
    pub tracker_dir: PathBuf,
    pub tests_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl TrackerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tracker_dir = root.join(".tracker");
        Self {
            root: root.clone(),
            tracker_dir: tracker_dir.clone(),
            tests_dir: tracker_dir.join("tests"),
            config_path: tracker_dir.join("config.toml"),
            gitignore_path: tracker_dir.join(".gitignore"),
        }
    }
}

/// Options for `init_tracker`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, rewrite config and scaffolding. Test documents are kept.
    pub force: bool,
}

const TRACKER_GITIGNORE: &str = "*.tmp\n";

/// Create `.tracker/` scaffolding in `root`.
///
/// Fails if `.tracker/` already exists unless `options.force` is set.
pub fn init_tracker(root: &Path, options: &InitOptions) -> Result<TrackerPaths> {
    let paths = TrackerPaths::new(root);
    if paths.tracker_dir.exists() && !paths.tracker_dir.is_dir() {
        return Err(anyhow!(
            "tracker init: .tracker exists but is not a directory"
        ));
    }
    if paths.tracker_dir.exists() && !options.force {
        return Err(anyhow!(
            "tracker init: .tracker already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.tracker_dir)?;
    create_dir(&paths.tests_dir)?;
    write_file(&paths.gitignore_path, TRACKER_GITIGNORE)?;
    write_config(&paths.config_path, &TrackerConfig::default())?;

    Ok(paths)
}

/// Ensure `.tracker/` layout exists before use.
pub fn ensure_layout(paths: &TrackerPaths) -> Result<()> {
    for dir in [&paths.tracker_dir, &paths.tests_dir] {
        if !dir.is_dir() {
            return Err(anyhow!(
                "missing directory {} (run `tracker init` first)",
                dir.display()
            ));
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
