use std::{fs, path::Path};

use anyhow::bail;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

/// Filesystem part of a `sqlite://` url, without query parameters.
fn file_part(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(URL_PREFIX)?;
    Some(rest.split_once('?').map(|(file, _)| file).unwrap_or(rest))
}

pub fn validate_sqlite_path(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }
    match file_part(path) {
        None => bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`"),
        Some("") => bail!("sqlite path is missing a filesystem component after `sqlite://`"),
        Some(_) => Ok(()),
    }
}

/// Creates the directory the database file lives in so sqlite can create it.
pub fn ensure_sqlite_parent_dir(path: &str) -> anyhow::Result<()> {
    let Some(file) = file_part(path) else {
        return Ok(());
    };
    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_memory_and_file_urls() {
        validate_sqlite_path("sqlite::memory:?cache=shared").expect("memory dsn should validate");
        validate_sqlite_path("sqlite://h2h.db").expect("relative file url should validate");
        validate_sqlite_path("sqlite:///var/lib/h2h/state.db?mode=rwc")
            .expect("absolute file url should validate");
    }

    #[test]
    fn rejects_missing_or_invalid_urls() {
        let err = validate_sqlite_path("h2h.db").expect_err("should reject plain filename");
        assert!(err
            .to_string()
            .contains("must start with `sqlite://` or use `sqlite::memory:`"));

        let err = validate_sqlite_path("sqlite://?mode=rwc").expect_err("should reject empty path");
        assert!(err
            .to_string()
            .contains("missing a filesystem component after `sqlite://`"));
    }

    #[test]
    fn creates_nested_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("state").join("nested").join("h2h.db");
        let url = format!("sqlite://{}?mode=rwc", db.display());

        ensure_sqlite_parent_dir(&url).expect("parent dirs should be created");

        assert!(dir.path().join("state").join("nested").is_dir());
        assert!(!db.exists(), "only directories are created");
    }

    #[test]
    fn memory_urls_touch_nothing() {
        ensure_sqlite_parent_dir("sqlite::memory:").expect("memory url is skipped");
    }
}
