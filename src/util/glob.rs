//! Admin glob matching against `nick!user@host` (spec §6 `admin`, §4.7 admin dispatch).

use globset::Glob;

/// Compile a glob pattern and test it against a `nick!user@host` identity string.
pub struct AdminMatcher {
    matcher: globset::GlobMatcher,
}

impl AdminMatcher {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self { matcher })
    }

    pub fn matches(&self, identity: &str) -> bool {
        self.matcher.is_match(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_full_hostmask_glob() {
        let m = AdminMatcher::new("admin!*@trusted.example.com").unwrap();
        assert!(m.matches("admin!user@trusted.example.com"));
        assert!(!m.matches("admin!user@untrusted.example.com"));
        assert!(!m.matches("notadmin!user@trusted.example.com"));
    }

    #[test]
    fn wildcard_matches_everyone() {
        let m = AdminMatcher::new("*").unwrap();
        assert!(m.matches("anyone!anything@anywhere"));
    }
}
