//! Version store
//!
//! Wraps an embedded Git repository living inside the base directory so
//! every entry file carries history, diff and read-at-revision. The store
//! treats this as porcelain: stage/commit/log/diff/blob-at-rev and nothing
//! else. When the base directory sits inside another project's working
//! tree, the enclosing `.gitignore` is taught to skip it so the two
//! histories never mix.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use git2::{DiffFormat, DiffOptions, Repository, Signature};

use crate::error::{Result, StoreError};

/// Committer identity used when the repo has no configured signature
const FALLBACK_NAME: &str = "engram";
const FALLBACK_EMAIL: &str = "engram@localhost";

/// A single commit in the store's history
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// Abbreviated commit id
    pub id: String,
    /// Commit message
    pub message: String,
    /// Commit timestamp
    pub time: DateTime<Utc>,
}

/// Embedded Git repository over the base directory
pub struct VersionStore {
    repo: Repository,
    workdir: PathBuf,
}

impl VersionStore {
    /// Open the repository inside `base_dir`, initialising one on first use
    pub fn open_or_init(base_dir: &Path) -> Result<Self> {
        let repo = match Repository::open(base_dir) {
            Ok(r) => r,
            Err(_) => Repository::init(base_dir)?,
        };
        let workdir = repo
            .workdir()
            .ok_or_else(|| StoreError::Init("version store repository is bare".to_string()))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Working directory of the repository
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn signature(&self) -> Result<Signature<'_>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
        }
    }

    /// Stage the given relative paths (deleted files are removed from the
    /// index) and commit. Returns the abbreviated commit id, or `None`
    /// when the tree is unchanged.
    pub fn commit_paths(&self, rel_paths: &[&str], message: &str) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        for rel in rel_paths {
            let on_disk = self.workdir.join(rel);
            if on_disk.exists() {
                index.add_path(Path::new(rel))?;
            } else {
                // tolerate paths that were never tracked
                let _ = index.remove_path(Path::new(rel));
            }
        }
        index.write()?;
        self.commit_index(message)
    }

    /// Stage everything under the working tree and commit
    pub fn commit_all(&self, message: &str) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        self.commit_index(message)
    }

    fn commit_index(&self, message: &str) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None, // unborn HEAD on the first commit
        };

        if let Some(ref p) = parent {
            if p.tree_id() == tree_id {
                return Ok(None);
            }
        }

        let sig = self.signature()?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        tracing::debug!(commit = %oid, "version store commit");
        Ok(Some(short_id(oid)))
    }

    /// Most recent commits, newest first
    pub fn log(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        if self.repo.head().is_err() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;

        let mut out = Vec::new();
        for oid in walk.take(limit) {
            let commit = self.repo.find_commit(oid?)?;
            out.push(CommitInfo {
                id: short_id(commit.id()),
                message: commit.message().unwrap_or("").trim_end().to_string(),
                time: Utc
                    .timestamp_opt(commit.time().seconds(), 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }

    /// Unified diff of uncommitted changes, optionally narrowed to one path
    pub fn diff_workdir(&self, rel_path: Option<&str>) -> Result<String> {
        let mut opts = DiffOptions::new();
        opts.include_untracked(true);
        if let Some(p) = rel_path {
            opts.pathspec(p);
        }

        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(_) => None,
        };

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        let mut buf = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let prefix = match line.origin() {
                '+' | '-' | ' ' => Some(line.origin()),
                _ => None,
            };
            if let Some(p) = prefix {
                let _ = write!(buf, "{}", p);
            }
            let _ = buf.write_all(line.content());
            true
        })?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// File content as of a revision (`HEAD`, `HEAD~2`, abbreviated ids)
    pub fn blob_at_rev(&self, rev: &str, rel_path: &str) -> Result<String> {
        let object = self.repo.revparse_single(rev)?;
        let commit = object.peel_to_commit()?;
        let tree = commit.tree()?;
        let entry = tree
            .get_path(Path::new(rel_path))
            .map_err(|_| StoreError::NotFound(format!("{rev}:{rel_path}")))?;
        let blob = entry
            .to_object(&self.repo)?
            .peel_to_blob()
            .map_err(|_| StoreError::NotFound(format!("{rev}:{rel_path}")))?;
        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }
}

fn short_id(oid: git2::Oid) -> String {
    oid.to_string().chars().take(10).collect()
}

/// Make sure the embedded repository ignores the derived index under
/// `.index/`; only the Markdown tree belongs in history. Returns whether
/// the ignore file was modified.
pub fn ensure_internal_gitignore(base_dir: &Path) -> Result<bool> {
    let gitignore = base_dir.join(".gitignore");
    let current = std::fs::read_to_string(&gitignore).unwrap_or_default();
    if current.lines().any(|l| l.trim() == ".index/" || l.trim() == ".index") {
        return Ok(false);
    }

    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(".index/\n");
    std::fs::write(&gitignore, updated)?;
    Ok(true)
}

/// When `base_dir` sits inside another Git working tree, make sure that
/// project's root `.gitignore` skips the base directory. Returns whether
/// the ignore file was modified.
pub fn ensure_enclosing_gitignore(base_dir: &Path) -> Result<bool> {
    let Some(project_root) = enclosing_git_root(base_dir) else {
        return Ok(false);
    };

    let Ok(rel) = base_dir.strip_prefix(&project_root) else {
        return Ok(false);
    };
    let line = format!("{}/", rel.to_string_lossy().replace('\\', "/"));

    let gitignore = project_root.join(".gitignore");
    let current = std::fs::read_to_string(&gitignore).unwrap_or_default();
    if current.lines().any(|l| l.trim() == line || l.trim() == line.trim_end_matches('/')) {
        return Ok(false);
    }

    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');
    std::fs::write(&gitignore, updated)?;
    Ok(true)
}

/// Nearest ancestor of `base_dir` (excluding itself) containing `.git`
fn enclosing_git_root(base_dir: &Path) -> Option<PathBuf> {
    let mut dir = base_dir.parent()?;
    loop {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn init_commit_and_log() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();

        write(tmp.path(), "semantic/decisions/dec-001-use-bun.md", "body v1");
        let id = vs
            .commit_paths(&["semantic/decisions/dec-001-use-bun.md"], "add dec-001")
            .unwrap();
        assert!(id.is_some());

        let log = vs.log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "add dec-001");
    }

    #[test]
    fn unchanged_tree_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();

        write(tmp.path(), "a.md", "x");
        assert!(vs.commit_paths(&["a.md"], "first").unwrap().is_some());
        assert!(vs.commit_paths(&["a.md"], "again").unwrap().is_none());
    }

    #[test]
    fn blob_at_rev_reads_history() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();

        write(tmp.path(), "a.md", "version one");
        vs.commit_paths(&["a.md"], "v1").unwrap();
        write(tmp.path(), "a.md", "version two");
        vs.commit_paths(&["a.md"], "v2").unwrap();

        assert_eq!(vs.blob_at_rev("HEAD", "a.md").unwrap(), "version two");
        assert_eq!(vs.blob_at_rev("HEAD~1", "a.md").unwrap(), "version one");
        assert!(matches!(
            vs.blob_at_rev("HEAD", "missing.md"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn diff_reports_uncommitted_changes() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();

        write(tmp.path(), "a.md", "old line\n");
        vs.commit_paths(&["a.md"], "v1").unwrap();
        write(tmp.path(), "a.md", "new line\n");

        let patch = vs.diff_workdir(Some("a.md")).unwrap();
        assert!(patch.contains("-old line"));
        assert!(patch.contains("+new line"));
    }

    #[test]
    fn deleting_a_file_commits() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();

        write(tmp.path(), "a.md", "x");
        vs.commit_paths(&["a.md"], "add").unwrap();
        std::fs::remove_file(tmp.path().join("a.md")).unwrap();
        let id = vs.commit_paths(&["a.md"], "remove").unwrap();
        assert!(id.is_some());
        assert!(matches!(
            vs.blob_at_rev("HEAD", "a.md"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn internal_gitignore_skips_the_index() {
        let tmp = TempDir::new().unwrap();
        let vs = VersionStore::open_or_init(tmp.path()).unwrap();
        assert!(ensure_internal_gitignore(tmp.path()).unwrap());
        assert!(!ensure_internal_gitignore(tmp.path()).unwrap());

        write(tmp.path(), ".index/search.sqlite", "binary junk");
        write(tmp.path(), "semantic/notes/note-001.md", "body");
        vs.commit_all("snapshot").unwrap();

        assert!(vs.blob_at_rev("HEAD", "semantic/notes/note-001.md").is_ok());
        assert!(matches!(
            vs.blob_at_rev("HEAD", ".index/search.sqlite"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn enclosing_gitignore_is_maintained() {
        let tmp = TempDir::new().unwrap();
        // enclosing project with .git
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let base = tmp.path().join("memory");
        std::fs::create_dir_all(&base).unwrap();

        assert!(ensure_enclosing_gitignore(&base).unwrap());
        let content = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert!(content.lines().any(|l| l == "memory/"));

        // second call is a no-op
        assert!(!ensure_enclosing_gitignore(&base).unwrap());
    }
}
