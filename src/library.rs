use crate::error::{KatError, Result};
use console::style;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

static CODE_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]+-[0-9]+)\b").expect("code regex"));

/// Files below this size are treated as samples/trailers by `rename`.
pub const DEFAULT_MIN_SIZE: u64 = 3 * 1024 * 1024 * 1024;

pub const MOVABLE_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "wmv", "raw"];

/// First `ABC-123` style code in `name` that is not glued to other word
/// characters.
pub fn extract_code(name: &str) -> Option<&str> {
    CODE_RX
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Regular files under `root` with one of `exts`, in a stable order.
pub fn scan(root: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("scan: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), exts))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(KatError::not_found(path))
    }
}

/// `(source, <out>/<CODE>.mp4)` for every coded `*.raw` under `input`.
pub fn encode_pairs(input: &Path, out: &Path) -> Vec<(PathBuf, PathBuf)> {
    info!("Start scanning...");
    scan(input, &["raw"])
        .into_iter()
        .filter_map(|src| {
            let name = src.file_name()?.to_string_lossy().into_owned();
            let Some(code) = extract_code(&name) else {
                debug!("no code in {}, skipping", src.display());
                return None;
            };
            let dest = out.join(format!("{code}.mp4"));
            debug!("Source: {}, Dest: {}", src.display(), dest.display());
            Some((src, dest))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOptions {
    pub prefix: String,
    pub suffix: String,
    pub min_size: u64,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

/// Moves every large enough coded `*.mp4` under `input` to
/// `<out>/<CODE>/<prefix><CODE><suffix>.mp4`. Returns the new paths.
pub fn rename_service(input: &Path, out: &Path, opts: &RenameOptions) -> Result<Vec<PathBuf>> {
    require_dir(input)?;
    require_dir(out)?;
    debug!("InputFolder: {}", input.display());
    debug!("OutFolder: {}", out.display());

    let mut renamed = Vec::new();
    for path in scan(input, &["mp4"]) {
        let size = fs::symlink_metadata(&path)?.len();
        if size < opts.min_size {
            warn!(
                ">>> {} size less than threshold...{}",
                path.display(),
                style("SKIPPING").yellow()
            );
            continue;
        }

        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let Some(code) = extract_code(&name) else {
            warn!(">>> [{:<10}] '{}' not matched", style("SKIPPING").yellow(), path.display());
            continue;
        };

        let dir = out.join(code);
        if !dir.is_dir() {
            fs::create_dir(&dir)?;
        }
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let target = dir.join(format!("{}{code}{}{ext}", opts.prefix, opts.suffix));
        if target.exists() {
            warn!(
                ">>> [{:<10}] '{}' already exists",
                style("SKIPPING").yellow(),
                target.display()
            );
            continue;
        }
        fs::rename(&path, &target)?;
        info!(
            ">>> [{:<10}] '{}' rename to {}",
            style("OK").green(),
            path.display(),
            target.display()
        );
        renamed.push(target);
    }

    info!("All done. Thanks for using my service");
    Ok(renamed)
}

/// Moves coded video files under `input` into `<out>/<CODE>/`, keeping
/// their names. Returns the new paths.
pub fn move_service(input: &Path, out: &Path) -> Result<Vec<PathBuf>> {
    require_dir(input)?;
    require_dir(out)?;

    let mut moved = Vec::new();
    for path in scan(input, MOVABLE_EXTENSIONS) {
        let Some(name) = path.file_name().map(|n| n.to_owned()) else {
            continue;
        };
        let Some(code) = extract_code(&name.to_string_lossy()).map(str::to_owned) else {
            warn!(">>> [{:<10}] '{}' not matched", style("SKIPPING").yellow(), path.display());
            continue;
        };

        let dir = out.join(&code);
        let target = dir.join(&name);
        if target == path {
            continue;
        }
        if target.exists() {
            warn!(
                ">>> [{:<10}] '{}' already exists",
                style("SKIPPING").yellow(),
                target.display()
            );
            continue;
        }
        if !dir.is_dir() {
            fs::create_dir(&dir)?;
        }
        fs::rename(&path, &target)?;
        info!(
            ">>> [{:<10}] '{}' move to {}",
            style("OK").green(),
            path.display(),
            target.display()
        );
        moved.push(target);
    }

    info!("All done. Thanks for using my service");
    Ok(moved)
}
