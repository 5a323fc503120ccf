//! Scratch directory holding PNG copies of attendance photos so list views can
//! link to them. Files older than the retention window are purged whenever a
//! records page is loaded.

use std::{
    io,
    path::PathBuf,
    time::{Duration, SystemTime},
};

pub struct ScratchDir {
    root: PathBuf,
    retention: Duration,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, retention })
    }

    /// Writes `bytes` as `<prefix>_<random>.png` and returns the file name.
    pub fn save_png(&self, prefix: &str, bytes: &[u8]) -> io::Result<String> {
        let prefix: String = prefix
            .chars()
            .map(|c| op::ternary!(c.is_ascii_alphanumeric() || c == '-' => c; '_'))
            .collect();
        let name = format!("{prefix}_{:016x}.png", rand::random::<u64>());
        std::fs::write(self.root.join(&name), bytes)?;
        Ok(name)
    }

    /// Resolves a file name previously returned by [`save_png`]. Anything that
    /// could escape the directory is refused.
    ///
    /// [`save_png`]: ScratchDir::save_png
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name.ends_with(".png")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !name.contains("..");
        if !valid {
            return None;
        }
        let path = self.root.join(name);
        op::ternary!(path.is_file() => Some(path); None)
    }

    pub fn purge_expired(&self) -> io::Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.purge_older_than(cutoff)
    }

    /// Removes PNG files last modified before `cutoff`; returns how many.
    pub fn purge_older_than(&self, cutoff: SystemTime) -> io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if modified < cutoff {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("could not purge {}: {e}", path.display()),
                }
            }
        }
        if removed > 0 {
            tracing::debug!("purged {removed} scratch images");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(dir: &tempfile::TempDir) -> ScratchDir {
        ScratchDir::new(dir.path(), Duration::from_secs(24 * 3600)).unwrap()
    }

    #[test]
    fn saved_files_resolve_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = scratch(&dir);
        let name = scratch.save_png("AL0001 in", b"png").unwrap();
        assert!(name.starts_with("AL0001_in_"));
        let path = scratch.resolve(&name).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"png");
    }

    #[test]
    fn traversal_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = scratch(&dir);
        assert!(scratch.resolve("../secret.png").is_none());
        assert!(scratch.resolve("/etc/passwd").is_none());
        assert!(scratch.resolve("missing.png").is_none());
    }

    #[test]
    fn purge_removes_only_old_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = scratch(&dir);
        scratch.save_png("a", b"1").unwrap();
        scratch.save_png("b", b"2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(scratch.purge_expired().unwrap(), 0);

        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(scratch.purge_older_than(future).unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }
}
