//! Git Workspace (C2, spec.md §4.2).
//!
//! On-disk bare-repository layout under `reposRoot`, plus read-only queries
//! needed by a browsing UI (commits, file tree, file preview) and the
//! checkout-to-scratch-directory operation the SDK builder uses. Every
//! operation shells out to the system `git` binary — this crate never
//! parses Git's pack/object wire format itself, the same choice the teacher
//! crate's own `FsRepository` examples make.

mod mime;
mod path_safety;

pub use path_safety::safe_relative_path;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;

use crate::errors::RegistryError;

/// A single commit as surfaced to the browsing UI (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub committed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeType {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilePreview {
    pub content: Vec<u8>,
    pub mime_type: String,
    pub size: u64,
}

/// One bare Git repository tree, rooted at `reposRoot`.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
}

const PKT_LINE_FORMAT: &str = "%H%x1f%an%x1f%ae%x1f%aI%x1f%B%x1e";

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `reposRoot/<id>`, per spec.md §3's Repository.Path invariant.
    pub fn repo_path(&self, id: uuid::Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    async fn run_git<I, S>(cwd: &Path, args: I) -> Result<std::process::Output, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new("git")
            .current_dir(cwd)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RegistryError::Io)
    }

    fn ensure_success(output: &std::process::Output, what: &str) -> Result<(), RegistryError> {
        if output.status.success() {
            return Ok(());
        }
        Err(RegistryError::internal(format!(
            "{what} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )))
    }

    /// Create a bare repository at `reposRoot/<id>`. Fails `AlreadyExists` if
    /// the target directory is non-empty (spec.md §4.2).
    pub async fn create_bare(&self, id: uuid::Uuid) -> Result<PathBuf, RegistryError> {
        let path = self.repo_path(id);
        if path.exists() {
            let non_empty = std::fs::read_dir(&path)
                .map(|mut it| it.next().is_some())
                .unwrap_or(false);
            if non_empty {
                return Err(RegistryError::already_exists(format!(
                    "repository directory {} already exists",
                    path.display()
                )));
            }
        }

        tokio::fs::create_dir_all(&path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o750)).await?;
        }

        let output = Command::new("git")
            .arg("init")
            .arg("--bare")
            .arg(&path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RegistryError::Io)?;
        Self::ensure_success(&output, "git init --bare")?;
        Ok(path)
    }

    /// Remove the bare repository directory tree entirely.
    pub async fn remove(&self, id: uuid::Uuid) -> Result<(), RegistryError> {
        let path = self.repo_path(id);
        if path.exists() {
            tokio::fs::remove_dir_all(&path).await?;
        }
        Ok(())
    }

    /// Reverse-chronological commit log with exact total count.
    pub async fn get_commits(
        &self,
        path: &Path,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CommitInfo>, u64), RegistryError> {
        if !Self::has_commits(path).await? {
            return Ok((Vec::new(), 0));
        }

        let page = page.max(1);
        let skip = (page - 1) * page_size;

        let count_output = Self::run_git(path, ["rev-list", "--count", "HEAD"]).await?;
        Self::ensure_success(&count_output, "git rev-list --count")?;
        let total: u64 = String::from_utf8_lossy(&count_output.stdout)
            .trim()
            .parse()
            .unwrap_or(0);

        let log_output = Self::run_git(
            path,
            [
                "log".to_string(),
                format!("--skip={skip}"),
                format!("--max-count={page_size}"),
                format!("--pretty=format:{PKT_LINE_FORMAT}"),
                "HEAD".to_string(),
            ],
        )
        .await?;
        Self::ensure_success(&log_output, "git log")?;

        let text = String::from_utf8_lossy(&log_output.stdout);
        let commits = text
            .split('\u{1e}')
            .filter(|rec| !rec.trim().is_empty())
            .filter_map(Self::parse_commit_record)
            .collect();

        Ok((commits, total))
    }

    pub async fn get_recent_commit(
        &self,
        path: &Path,
    ) -> Result<Option<CommitInfo>, RegistryError> {
        let (commits, _) = self.get_commits(path, 1, 1).await?;
        Ok(commits.into_iter().next())
    }

    async fn has_commits(path: &Path) -> Result<bool, RegistryError> {
        let output = Self::run_git(path, ["rev-parse", "--verify", "-q", "HEAD"]).await?;
        Ok(output.status.success())
    }

    fn parse_commit_record(record: &str) -> Option<CommitInfo> {
        let mut fields = record.splitn(5, '\u{1f}');
        let hash = fields.next()?.to_string();
        let author_name = fields.next()?.to_string();
        let author_email = fields.next()?.to_string();
        let date_raw = fields.next()?;
        let message = fields.next().unwrap_or_default().trim().to_string();
        let committed_at = chrono::DateTime::parse_from_rfc3339(date_raw)
            .ok()?
            .with_timezone(&chrono::Utc);
        Some(CommitInfo {
            hash,
            author_name,
            author_email,
            message,
            committed_at,
        })
    }

    /// Directory listing at `subPath` (repository root if `None`).
    pub async fn get_file_tree(
        &self,
        path: &Path,
        sub_path: Option<&str>,
    ) -> Result<Vec<TreeEntry>, RegistryError> {
        let sub_path = sub_path.unwrap_or("");
        let rel = safe_relative_path(sub_path)?;

        if !Self::has_commits(path).await? {
            return Ok(Vec::new());
        }

        let tree_ref = if rel.as_os_str().is_empty() {
            "HEAD".to_string()
        } else {
            format!("HEAD:{}", rel.display())
        };

        let output = Self::run_git(path, ["ls-tree", "--full-tree", &tree_ref]).await?;
        if !output.status.success() {
            return Err(RegistryError::not_found(format!(
                "path {} not found at HEAD",
                rel.display()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut entries = Vec::new();
        for line in text.lines() {
            let Some((meta, name)) = line.split_once('\t') else {
                continue;
            };
            let mut parts = meta.split_whitespace();
            let _mode = parts.next();
            let kind = parts.next().unwrap_or_default();
            let node_type = match kind {
                "tree" => NodeType::Directory,
                _ => NodeType::File,
            };
            let entry_path = if rel.as_os_str().is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", rel.display(), name)
            };
            entries.push(TreeEntry {
                name: name.to_string(),
                path: entry_path,
                node_type,
            });
        }
        Ok(entries)
    }

    /// Content + sniffed MIME type + size of a single file at HEAD.
    pub async fn get_file_preview(
        &self,
        path: &Path,
        file_path: &str,
    ) -> Result<FilePreview, RegistryError> {
        let rel = safe_relative_path(file_path)?;
        let output = Self::run_git(
            path,
            ["show".to_string(), format!("HEAD:{}", rel.display())],
        )
        .await?;
        if !output.status.success() {
            return Err(RegistryError::not_found(format!(
                "file {} not found at HEAD",
                rel.display()
            )));
        }

        let content = output.stdout;
        let mime_type = mime::sniff(&rel, &content);
        let size = content.len() as u64;
        Ok(FilePreview {
            size,
            content: mime::placeholder_if_binary(content),
            mime_type,
        })
    }

    /// Materialize the tree of a single commit into a fresh scratch
    /// directory via `git archive | tar -x`. The caller owns cleanup (the
    /// returned `TempDir` removes itself on drop).
    pub async fn checkout_commit_to_temp(
        &self,
        path: &Path,
        commit_hash: &str,
    ) -> Result<TempDir, RegistryError> {
        let dir = tempfile::Builder::new()
            .prefix("protoreg-checkout-")
            .tempdir()
            .map_err(RegistryError::Io)?;

        let mut archive = Command::new("git")
            .current_dir(path)
            .args(["archive", "--format=tar", commit_hash])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RegistryError::Io)?;

        let mut archive_stdout = archive.stdout.take().ok_or_else(|| {
            RegistryError::internal("git archive produced no stdout pipe".to_string())
        })?;

        let mut extract = Command::new("tar")
            .current_dir(dir.path())
            .arg("-x")
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RegistryError::Io)?;

        let mut extract_stdin = extract.stdin.take().ok_or_else(|| {
            RegistryError::internal("tar produced no stdin pipe".to_string())
        })?;

        let copy = tokio::io::copy(&mut archive_stdout, &mut extract_stdin);
        let (copy_result, archive_status, extract_status) = tokio::join!(
            async {
                let result = copy.await;
                drop(extract_stdin);
                result
            },
            archive.wait(),
            extract.wait(),
        );
        copy_result.map_err(RegistryError::Io)?;
        let archive_status = archive_status.map_err(RegistryError::Io)?;
        let extract_status = extract_status.map_err(RegistryError::Io)?;

        if !archive_status.success() {
            return Err(RegistryError::internal(format!(
                "git archive {commit_hash} failed"
            )));
        }
        if !extract_status.success() {
            return Err(RegistryError::internal("tar extraction failed".to_string()));
        }

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo_with_commit(dir: &Path) {
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .current_dir(dir)
                .args(args)
                .output()
                .unwrap()
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.join("README.md"), "# A\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
    }

    #[tokio::test]
    async fn create_bare_then_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path());
        let id = uuid::Uuid::new_v4();
        let path = ws.create_bare(id).await.unwrap();
        assert!(path.join("HEAD").exists());

        let err = ws.create_bare(id).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));

        ws.remove(id).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_preview_round_trips_readme() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo_with_commit(tmp.path());
        let ws = Workspace::new(tmp.path().parent().unwrap());

        let preview = ws.get_file_preview(tmp.path(), "README.md").await.unwrap();
        assert_eq!(preview.content, b"# A\n");
        assert_eq!(preview.size, 4);
        assert!(preview.mime_type.contains("markdown"));
    }

    #[tokio::test]
    async fn get_commits_orders_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo_with_commit(tmp.path());
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .current_dir(tmp.path())
                .args(args)
                .output()
                .unwrap()
        };
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "second"]);

        let ws = Workspace::new(tmp.path().parent().unwrap());
        let (commits, total) = ws.get_commits(tmp.path(), 1, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(commits[0].message, "second");
        assert_eq!(commits[1].message, "init");
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(path_safety::safe_relative_path("../etc/passwd").is_err());
        assert!(path_safety::safe_relative_path("/etc/passwd").is_err());
        assert!(path_safety::safe_relative_path("a/../../b").is_err());
        assert!(path_safety::safe_relative_path("a/b.proto").is_ok());
    }
}
