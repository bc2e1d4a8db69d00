use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Ephemeral, submission-scoped directory holding the source file while a
/// judging task runs. Release is tied to `Drop`, so the directory is removed
/// on every exit path, including unwinding out of the evaluation.
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Creates the directory for one submission. Exclusive to its judging
    /// task; no workspace is shared across submissions.
    pub fn acquire(submission_id: &str) -> io::Result<Self> {
        let dir = std::env::temp_dir()
            .join("gavel")
            .join(format!("submission-{submission_id}"));
        fs::create_dir_all(&dir)?;

        log::debug!("Acquired workspace {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the submitted source into the workspace and returns its path.
    pub fn write_source(&self, file_name: &str, source_code: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(file_name);
        fs::write(&path, format!("{source_code}\n"))?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Best effort; a leftover directory must never fail the judgment
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("Failed to clean up workspace {}: {e}", self.dir.display());
        } else {
            log::debug!("Released workspace {}", self.dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_written_inside_the_workspace() {
        let workspace = Workspace::acquire("test-write-source").unwrap();
        let path = workspace.write_source("Main.java", "class Main {}").unwrap();

        assert!(path.starts_with(workspace.dir()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "class Main {}\n");
    }

    #[test]
    fn directory_is_removed_on_release() {
        let dir;
        {
            let workspace = Workspace::acquire("test-release").unwrap();
            workspace.write_source("main.py", "print()").unwrap();
            dir = workspace.dir().to_path_buf();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn directory_is_removed_when_the_task_unwinds() {
        let result = std::panic::catch_unwind(|| {
            let workspace = Workspace::acquire("test-unwind").unwrap();
            assert!(workspace.dir().exists());
            panic!("evaluation blew up");
        });

        assert!(result.is_err());
        assert!(
            !std::env::temp_dir()
                .join("gavel")
                .join("submission-test-unwind")
                .exists()
        );
    }
}
