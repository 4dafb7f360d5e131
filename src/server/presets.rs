// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Saved PID preset files
//!
//! Each preset is one JSON file (`{name, gains: [kp, ki, kd]}`) inside a
//! configurable directory, so operators can keep tunings per cut of meat
//! across restarts.

use log::warn;
use std::fs;
use std::path::PathBuf;

use crate::control::error::{ControlError, ControlResult};
use crate::server::models::PresetFile;
use crate::utility::is_safe_filename;

/// File-backed store of saved PID presets.
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, name: &str) -> ControlResult<PathBuf> {
        if !is_safe_filename(name) {
            return Err(ControlError::OutOfRange(format!(
                "Preset name {name:?} must match ^[A-Za-z0-9_\\-\\.]+$"
            )));
        }
        let mut filename = name.to_string();
        if !filename.ends_with(".json") {
            filename.push_str(".json");
        }
        Ok(self.dir.join(filename))
    }

    /// All parseable presets in the directory. Unreadable files are logged
    /// and skipped.
    pub fn list(&self) -> Vec<PresetFile> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut presets = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|contents| {
                    serde_json::from_str::<PresetFile>(&contents).map_err(|e| e.to_string())
                }) {
                Ok(preset) => presets.push(preset),
                Err(err) => warn!("Error reading preset {}: {}", path.display(), err),
            }
        }
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        presets
    }

    /// Load one preset. `Ok(None)` means the name is valid but no file
    /// exists.
    pub fn load(&self, name: &str) -> ControlResult<Option<PresetFile>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            ControlError::StateConflict(format!("Error loading preset {name}: {e}"))
        })?;
        let preset = serde_json::from_str(&contents).map_err(|e| {
            ControlError::StateConflict(format!("Error parsing preset {name}: {e}"))
        })?;
        Ok(Some(preset))
    }

    /// Save a preset, creating the directory on first use.
    pub fn save(&self, preset: &PresetFile) -> ControlResult<()> {
        if preset.gains.len() != 3 {
            return Err(ControlError::OutOfRange(format!(
                "Preset gains must be [kp, ki, kd], got {} values",
                preset.gains.len()
            )));
        }
        let path = self.path_for(&preset.name)?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            ControlError::StateConflict(format!("Failed to create presets directory: {e}"))
        })?;

        let contents = serde_json::to_string_pretty(preset).map_err(|e| {
            ControlError::StateConflict(format!("Failed to serialize preset: {e}"))
        })?;
        fs::write(&path, contents).map_err(|e| {
            ControlError::StateConflict(format!("Failed to write preset {}: {e}", path.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, PresetStore) {
        let dir = tempdir().unwrap();
        let store = PresetStore::new(dir.path().join("presets"));
        (dir, store)
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = store();
        let preset = PresetFile {
            name: "brisket".to_string(),
            gains: vec![2.5, 0.15, 1.2],
        };
        store.save(&preset).unwrap();

        let loaded = store.load("brisket").unwrap().expect("preset exists");
        assert_eq!(loaded.name, "brisket");
        assert_eq!(loaded.gains, vec![2.5, 0.15, 1.2]);
    }

    #[test]
    fn test_load_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.load("ghost").unwrap().is_none());
    }

    #[test]
    fn test_rejects_path_escapes() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(ControlError::OutOfRange(_))
        ));
        let preset = PresetFile {
            name: "a/b".to_string(),
            gains: vec![1.0, 0.1, 0.5],
        };
        assert!(store.save(&preset).is_err());
    }

    #[test]
    fn test_rejects_wrong_gain_count() {
        let (_dir, store) = store();
        let preset = PresetFile {
            name: "short".to_string(),
            gains: vec![1.0, 0.1],
        };
        assert!(matches!(
            store.save(&preset),
            Err(ControlError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_list_skips_unparseable_files() {
        let (_dir, store) = store();
        store
            .save(&PresetFile {
                name: "good".to_string(),
                gains: vec![1.0, 0.1, 0.5],
            })
            .unwrap();
        fs::write(store.dir.join("broken.json"), "{not json").unwrap();
        fs::write(store.dir.join("notes.txt"), "ignored").unwrap();

        let presets = store.list();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].name, "good");
    }
}
