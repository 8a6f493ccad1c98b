//! On-disk layout versioning
//!
//! The layout version lives in the default column family. A fresh database is
//! stamped with the current version; a database written by a newer layout is
//! refused rather than misread.

use rocksdb::DB;

use crate::error::{CacheError, Result};

/// Database version stored in metadata
const DB_VERSION_KEY: &[u8] = b"_db_version";
pub const CURRENT_VERSION: u32 = 1;

/// Stamp or verify the layout version of an open database
pub fn ensure_schema_version(db: &DB) -> Result<u32> {
    let stored = match db.get(DB_VERSION_KEY)? {
        Some(bytes) => {
            let version_bytes: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CacheError::decode("invalid schema version format"))?;
            Some(u32::from_le_bytes(version_bytes))
        }
        None => None,
    };

    match stored {
        None => {
            log::debug!("Stamping new database with schema v{}", CURRENT_VERSION);
            db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
            Ok(CURRENT_VERSION)
        }
        Some(version) if version == CURRENT_VERSION => Ok(version),
        Some(version) => {
            log::error!(
                "Database schema v{} is not readable by this build (v{})",
                version,
                CURRENT_VERSION
            );
            Err(CacheError::SchemaVersion {
                found: version,
                supported: CURRENT_VERSION,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocksdb::Options;

    fn open(path: &std::path::Path) -> DB {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        DB::open(&opts, path).unwrap()
    }

    #[test]
    fn test_fresh_database_is_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        assert_eq!(ensure_schema_version(&db).unwrap(), CURRENT_VERSION);
        assert_eq!(ensure_schema_version(&db).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_newer_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        db.put(DB_VERSION_KEY, (CURRENT_VERSION + 1).to_le_bytes())
            .unwrap();

        let err = ensure_schema_version(&db).unwrap_err();
        assert!(matches!(err, CacheError::SchemaVersion { .. }));
    }
}
