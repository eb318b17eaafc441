use std::path::{Path, PathBuf};

use crate::auth::record::CredentialRecord;
use crate::error::MailgraphError;

/// Durable persistence for the single credential record.
///
/// Load is corruption-tolerant: an absent or unparsable file degrades to the
/// empty record rather than failing the caller. Save writes to a sibling temp
/// file and renames it into place, so a crash mid-write can never leave a
/// half-written file shadowing a prior valid one.
///
/// Known limitation: there is no cross-process file locking. Independent
/// processes sharing one cache file can clobber each other's refresh-token
/// rotation; last writer wins.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CredentialRecord {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CredentialRecord::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read token cache: {e}");
                return CredentialRecord::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(record) => record,
            Err(e) => {
                // Deliberately does not include file contents.
                tracing::warn!("Token cache is unparsable, treating as empty: {e}");
                CredentialRecord::default()
            }
        }
    }

    pub fn save(&self, record: &CredentialRecord) -> Result<(), MailgraphError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MailgraphError::Persistence(format!("create {parent:?}: {e}")))?;
        }
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| MailgraphError::Persistence(format!("serialize record: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .map_err(|e| MailgraphError::Persistence(format!("write {tmp:?}: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| MailgraphError::Persistence(format!("rename into {:?}: {e}", self.path)))
    }

    /// Operator cache-clear. The lifecycle manager never calls this.
    pub fn clear(&self) -> Result<(), MailgraphError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MailgraphError::Persistence(format!(
                "remove {:?}: {e}",
                self.path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike, Utc};

    fn store_in(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("tokens.json"))
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_and_load_roundtrip_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            // Truncate to seconds so the comparison is not sensitive to
            // RFC 3339 fractional-second formatting.
            expires_on: Some(
                (Utc::now() + Duration::hours(1))
                    .with_nanosecond(0)
                    .unwrap(),
            ),
        };
        store.save(&record).unwrap();
        assert_eq!(store.load(), record);
    }

    #[test]
    fn save_and_load_roundtrip_refresh_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = CredentialRecord {
            access_token: None,
            refresh_token: Some("R1".into()),
            expires_on: None,
        };
        store.save(&record).unwrap();
        assert_eq!(store.load(), record);
    }

    #[test]
    fn save_and_load_roundtrip_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = CredentialRecord::default();
        store.save(&record).unwrap();
        assert_eq!(store.load(), record);
    }

    #[test]
    fn load_unparsable_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json at all {{{").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_replaces_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let first = CredentialRecord {
            refresh_token: Some("R1".into()),
            ..Default::default()
        };
        let second = CredentialRecord {
            refresh_token: Some("R2".into()),
            ..Default::default()
        };
        store.save(&first).unwrap();
        store.save(&second).unwrap();
        assert_eq!(store.load().refresh_token.as_deref(), Some("R2"));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("deep").join("tokens.json"));
        store.save(&CredentialRecord::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&CredentialRecord::default()).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("tokens.json")]);
    }

    #[test]
    fn clear_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&CredentialRecord::default()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }
}
