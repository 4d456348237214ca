use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::mastery::types::KnowledgeProfile;
use crate::store::{ProfileStore, StoreError};

/// One pretty-printed JSON document per student under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileProfileStore {
    dir: PathBuf,
}

impl JsonFileProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, student_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !student_id.is_empty()
            && student_id.len() <= 128
            && !student_id.starts_with('.')
            && student_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(student_id.to_string()));
        }
        Ok(self.dir.join(format!("{student_id}.json")))
    }
}

impl ProfileStore for JsonFileProfileStore {
    fn read(&self, student_id: &str) -> Result<Option<KnowledgeProfile>, StoreError> {
        let path = self.path_for(student_id)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn write(&self, student_id: &str, profile: &KnowledgeProfile) -> Result<(), StoreError> {
        let path = self.path_for(student_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(profile)?;
        if let Err(err) = std::fs::write(&tmp, body).and_then(|()| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        tracing::debug!(student_id, path = %path.display(), "profile written");
        Ok(())
    }
}
