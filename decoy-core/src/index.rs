/// Content index: the allow-list of servable files under the content root.
///
/// Request paths are only ever compared against this set, never joined onto
/// the filesystem directly, so an attacker-supplied `../../etc/passwd` can at
/// most match a name that was already found *inside* the root.
use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentIndex {
    entries: BTreeSet<String>,
}

impl ContentIndex {
    /// Walk `root` and record every regular file as a `/`-separated relative path.
    ///
    /// Fails if `root` is missing, not a directory or unreadable. Unreadable
    /// subdirectories and non-UTF-8 names are skipped.
    pub fn build(root: &Path) -> io::Result<Self> {
        if !std::fs::metadata(root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        // Surface permission problems on the root itself instead of an empty index.
        std::fs::read_dir(root)?;

        let mut entries = BTreeSet::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable content entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match relative_name(root, entry.path()) {
                Some(name) => {
                    entries.insert(name);
                }
                None => tracing::warn!("Skipping unservable file name {:?}", entry.path()),
            }
        }

        tracing::debug!("Indexed {} files under {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    /// Entries in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ContentIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
