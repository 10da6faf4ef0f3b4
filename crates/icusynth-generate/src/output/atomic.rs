//! Publish a whole directory at once.
//!
//! Files are written into a hidden sibling staging directory. Only when all
//! of them are on disk is the staging directory renamed onto the target, so
//! readers see either the previous complete output or the new one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::errors::GenerationError;

#[derive(Debug)]
pub struct StagingDir {
    staging: PathBuf,
    target: PathBuf,
    published: bool,
}

impl StagingDir {
    pub fn create(target: &Path) -> Result<Self, GenerationError> {
        let name = target
            .file_name()
            .ok_or_else(|| {
                GenerationError::OutputPath(format!("{} has no directory name", target.display()))
            })?
            .to_string_lossy()
            .to_string();
        let parent = parent_of(target);
        std::fs::create_dir_all(&parent)?;

        let staging = parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&staging)?;
        Ok(Self {
            staging,
            target: target.to_path_buf(),
            published: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staging
    }

    pub fn write_bytes(&self, file_name: &str, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.staging.join(file_name))?;
        file.write_all(data)?;
        file.sync_all()
    }

    /// Rename the staging directory onto the target, replacing any previous
    /// output. The previous directory is restored if the final rename fails.
    pub fn publish(mut self) -> Result<PathBuf, GenerationError> {
        sync_dir(&self.staging)?;
        let parent = parent_of(&self.target);

        let previous = if self.target.exists() {
            let name = self
                .target
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let aside = parent.join(format!(".{name}.previous-{}", uuid::Uuid::new_v4()));
            std::fs::rename(&self.target, &aside)?;
            Some(aside)
        } else {
            None
        };

        if let Err(err) = std::fs::rename(&self.staging, &self.target) {
            if let Some(aside) = &previous {
                std::fs::rename(aside, &self.target).ok();
            }
            return Err(err.into());
        }
        self.published = true;

        if let Some(aside) = previous {
            std::fs::remove_dir_all(aside)?;
        }
        sync_dir(&parent)?;
        Ok(self.target.clone())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.published {
            std::fs::remove_dir_all(&self.staging).ok();
        }
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!("icusynth_atomic_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).expect("create root");
        root
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn publish_replaces_previous_output() {
        let root = temp_root();
        let target = root.join("clif_format");
        std::fs::create_dir_all(&target).expect("create target");
        std::fs::write(target.join("stale.csv"), b"old").expect("write stale");

        let staging = StagingDir::create(&target).expect("staging");
        staging.write_bytes("patient.csv", b"patient_id\n").expect("write");
        let published = staging.publish().expect("publish");

        assert_eq!(published, target);
        assert_eq!(entries(&target), vec!["patient.csv".to_string()]);
        assert_eq!(entries(&root), vec!["clif_format".to_string()]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn dropped_staging_leaves_no_trace() {
        let root = temp_root();
        let target = root.join("mimic_format");
        {
            let staging = StagingDir::create(&target).expect("staging");
            staging.write_bytes("patients.csv", b"x").expect("write");
        }
        assert!(entries(&root).is_empty());
        assert!(!target.exists());
        std::fs::remove_dir_all(&root).ok();
    }
}
