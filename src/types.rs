use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a remote repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl RepositoryId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One node of a remote tree snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Name of the file or folder
    pub name: String,
    /// Path relative to the repository root
    pub path: String,
    /// Type of entry
    pub entry_type: EntryType,
    /// Content hash reported by the remote (git blob sha for GitHub)
    pub content_hash: String,
    /// Size in bytes; directories report 0
    pub size: u64,
}

impl RemoteEntry {
    pub fn file(path: &str, content_hash: &str, size: u64) -> Self {
        Self::new(path, EntryType::File, content_hash, size)
    }

    pub fn dir(path: &str) -> Self {
        Self::new(path, EntryType::Dir, "", 0)
    }

    fn new(path: &str, entry_type: EntryType, content_hash: &str, size: u64) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            name,
            path: path.to_string(),
            entry_type,
            content_hash: content_hash.to_string(),
            size,
        }
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

/// Type of remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_from_path() {
        let entry = RemoteEntry::file("Binaries/Bootstrapper/net8/a.dll", "X", 10);
        assert_eq!(entry.name, "a.dll");
        assert!(entry.is_file());

        let dir = RemoteEntry::dir("top");
        assert_eq!(dir.name, "top");
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn test_repository_display() {
        assert_eq!(RepositoryId::new("acme", "overview").to_string(), "acme/overview");
    }
}
