use crate::ink::settings::InkSettings;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub const INK_SETTINGS_FILE_NAME: &str = "ink_settings.json";

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(INK_SETTINGS_FILE_NAME))
}

pub fn resolve_settings_path() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("resolve current executable")?;
    settings_path_from_exe_path(&exe_path)
}

/// Loads settings from the default location, falling back to defaults when
/// the file does not exist yet.
pub fn load() -> Result<InkSettings> {
    let path = resolve_settings_path()?;
    Ok(load_from_path(&path)?.unwrap_or_default())
}

pub fn save(settings: &InkSettings) -> Result<PathBuf> {
    let path = resolve_settings_path()?;
    save_to_path(&path, settings)?;
    Ok(path)
}

pub fn load_from_path(path: &Path) -> Result<Option<InkSettings>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read ink settings file {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(Some(InkSettings::default()));
    }

    let mut loaded: InkSettings = serde_json::from_str(&content)
        .with_context(|| format!("deserialize ink settings file {}", path.display()))?;
    if loaded.sanitize() {
        tracing::warn!(path = %path.display(), "ink settings contained out-of-range values");
    }
    Ok(Some(loaded))
}

pub fn save_to_path(path: &Path, settings: &InkSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create ink settings parent folder {}", parent.display()))?;
    }

    let mut sanitized = settings.clone();
    sanitized.sanitize();
    let json =
        serde_json::to_string_pretty(&sanitized).context("serialize ink settings file")?;
    std::fs::write(path, json)
        .with_context(|| format!("write ink settings file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{load_from_path, save_to_path, settings_path_from_exe_path, INK_SETTINGS_FILE_NAME};
    use crate::ink::model::Color;
    use crate::ink::settings::{BackendKind, InkSettings, NibMode};
    use std::path::Path;

    #[test]
    fn settings_path_is_resolved_next_to_executable() {
        let exe = Path::new("/tmp/annotator/bin/annotator");
        let path = settings_path_from_exe_path(exe).expect("path");
        assert_eq!(
            path,
            Path::new("/tmp/annotator/bin").join(INK_SETTINGS_FILE_NAME)
        );
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loaded = load_from_path(&dir.path().join(INK_SETTINGS_FILE_NAME)).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn empty_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(INK_SETTINGS_FILE_NAME);
        std::fs::write(&path, "  \n").expect("write empty file");
        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, Some(InkSettings::default()));
    }

    #[test]
    fn store_roundtrip_serialization() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join(INK_SETTINGS_FILE_NAME);

        let mut settings = InkSettings::default();
        settings.color = Color::rgba(1, 2, 3, 255);
        settings.nib_mode = NibMode::Dynamic;
        settings.backend = BackendKind::PathSync;

        save_to_path(&path, &settings).expect("save settings");
        let loaded = load_from_path(&path).expect("load settings");
        assert_eq!(loaded, Some(settings));
    }

    #[test]
    fn malformed_file_reports_path_in_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(INK_SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").expect("write malformed file");
        let err = load_from_path(&path).expect_err("malformed settings should fail");
        assert!(format!("{err:#}").contains(INK_SETTINGS_FILE_NAME));
    }
}
