//! Variable scope export.
//!
//! After a run, the environment and globals snapshots can be written back
//! to disk. Export paths go through a narrow resolver that confines them
//! to the working directory, so a collection option can never direct a
//! write outside of it.

use eyre::WrapErr;
use std::path::{Component, Path, PathBuf};

use courier_core::scope::Layer;

/// Resolve an export path against the working directory, refusing any
/// path that escapes it. Returns the absolute path to write to.
pub fn resolve_export_path(path: &Path, working_dir: &Path) -> eyre::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    };

    // Normalize lexically; the target may not exist yet, so this cannot
    // rely on canonicalization of the full path.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    eyre::bail!("access denied: {} escapes the working directory", path.display());
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(working_dir) {
        eyre::bail!(
            "access denied: {} escapes the working directory",
            path.display()
        );
    }

    Ok(normalized)
}

/// Serialize one variable layer as pretty JSON and write it out.
pub fn export_layer(path: &Path, layer: &Layer) -> eyre::Result<()> {
    let raw = serde_json::to_string_pretty(layer).wrap_err("failed to serialize variables")?;
    std::fs::write(path, raw)
        .wrap_err_with(|| format!("failed to write variables to {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn relative_paths_resolve_under_the_working_dir() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let resolved = resolve_export_path(Path::new("out/env.json"), dir.path())?;
        assert_eq!(resolved, dir.path().join("out/env.json"));
        Ok(())
    }

    #[test]
    fn traversal_outside_the_working_dir_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_export_path(Path::new("../secrets.json"), dir.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("access denied"));
    }

    #[test]
    fn absolute_paths_outside_the_working_dir_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_export_path(Path::new("/etc/passwd"), dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn dot_segments_normalize_in_place() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let resolved = resolve_export_path(Path::new("./a/../env.json"), dir.path())?;
        assert_eq!(resolved, dir.path().join("env.json"));
        Ok(())
    }

    #[test]
    fn exported_layer_round_trips() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("env.json");

        let layer: Layer = [
            ("base_url".to_string(), json!("https://api.example.test")),
            ("token".to_string(), json!("t-123")),
        ]
        .into_iter()
        .collect();

        export_layer(&path, &layer)?;
        let reloaded: Layer = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(reloaded, layer);
        Ok(())
    }
}
