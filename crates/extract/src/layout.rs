use std::io;
use std::path::{Path, PathBuf};

/// Extensions whose members are listed, dumped and aggregated
pub const TRACKED_EXTENSIONS: &[&str] = &[".ts", ".coffee", ".js"];

/// Extensions with a syntax-tree dump
pub const TREE_EXTENSIONS: &[&str] = &[".js"];

/// Package manifest extracted from every archive
pub const MANIFEST_FILE: &str = "package.json";

pub const FILES_LISTING: &str = "files.txt";
pub const SLIM_FILES_LISTING: &str = "slim.files.txt";
pub const PACKAGES_LISTING: &str = "packages.txt";

pub fn files_listing(ext: &str) -> String {
    format!("files{ext}.txt")
}

pub fn slim_files_listing(ext: &str) -> String {
    format!("slim.files{ext}.txt")
}

pub fn code_dump(ext: &str) -> String {
    format!("slim.code{ext}.txt")
}

pub fn tree_dump(ext: &str) -> String {
    format!("slim.ast{ext}.json")
}

/// Every non-tree artifact a partial carries, in aggregation order
pub fn aggregated_artifacts() -> Vec<String> {
    let mut names = vec![FILES_LISTING.to_string(), SLIM_FILES_LISTING.to_string()];
    for ext in TRACKED_EXTENSIONS {
        names.push(files_listing(ext));
        names.push(slim_files_listing(ext));
        names.push(code_dump(ext));
    }
    names
}

/// On-disk layout under the repository root
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl CorpusLayout {
    /// Relative roots are resolved against the working directory, since
    /// the archive tool runs with the scratch directory as its cwd
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root.join("current")
    }

    pub fn partials_dir(&self) -> PathBuf {
        self.root.join("partials")
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".corpus.lock")
    }

    pub fn archive_path(&self, package_id: &str) -> PathBuf {
        self.current_dir().join(package_id)
    }

    pub fn partial_dir(&self, package_id: &str) -> PathBuf {
        self.partials_dir().join(package_id)
    }

    /// A partial counts as built once its `files.txt` exists
    pub async fn partial_is_complete(&self, package_id: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.partial_dir(package_id).join(FILES_LISTING)).await
    }

    pub fn scratch_dir(&self, package_id: &str) -> PathBuf {
        self.scratch_root().join(package_id)
    }

    /// Extracted copy of a slim member path (`<package>/<relative>`)
    pub fn scratch_member(&self, member: &str) -> PathBuf {
        self.scratch_root().join(member)
    }
}

/// File names in a directory, in directory order
pub async fn read_dir_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => log::warn!("Skipping non UTF-8 entry {name:?} in {}", dir.display()),
        }
    }
    Ok(names)
}

/// `rm -rf`: a missing directory is not an error
pub async fn remove_dir_all(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Read a listing of newline-terminated entries; an empty file is an empty listing
pub async fn read_listing(path: &Path) -> io::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(parse_listing(&text))
}

pub fn parse_listing(text: &str) -> Vec<String> {
    text.split_terminator('\n').map(str::to_string).collect()
}

/// One entry per line, each newline-terminated, so listings concatenate cleanly
pub async fn write_listing<S: AsRef<str>>(path: &Path, entries: &[S]) -> io::Result<()> {
    let mut text = String::new();
    for entry in entries {
        text.push_str(entry.as_ref());
        text.push('\n');
    }
    tokio::fs::write(path, text).await
}

/// Entries ending with `ext`, order kept
pub fn with_extension<'a, S: AsRef<str>>(entries: &'a [S], ext: &str) -> Vec<&'a str> {
    entries
        .iter()
        .map(S::as_ref)
        .filter(|entry| entry.ends_with(ext))
        .collect()
}
