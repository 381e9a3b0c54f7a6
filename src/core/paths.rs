//! State directory layout.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub locks: PathBuf,
    pub audit_log: PathBuf,
    pub audit_lock: PathBuf,
}

impl StatePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let locks = root.join("locks");
        let audit_log = root.join("audit.log");
        let audit_lock = root.join("audit.lock");
        Self {
            root,
            locks,
            audit_log,
            audit_lock,
        }
    }
}

impl std::fmt::Display for StatePaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "state@{}", self.root.display())
    }
}
