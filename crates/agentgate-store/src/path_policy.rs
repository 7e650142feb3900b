//! Path containment and naming policy: every filesystem operation a
//! sandbox performs against a workspace is validated here before it touches
//! disk. Two independent checks compose: lexical containment (no `..`
//! escape out of the workspace root) and glob-based allow/deny lists drawn
//! from the gate contract's `required_files`/`forbidden_files`/`naming_rules`.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathViolation {
    /// The candidate path contains a `..` component that walks outside the
    /// workspace root, lexically.
    Traversal,
    /// The candidate path is absolute and outside the workspace root, or its
    /// lexical join with root does not stay under root.
    OutsideRoot,
    /// The candidate matches a `forbidden_files` glob.
    Denied,
    /// `naming_rules` globs are non-empty and the candidate matched none of
    /// them.
    NotAllowed,
}

impl std::fmt::Display for PathViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PathViolation::Traversal => "traversal",
            PathViolation::OutsideRoot => "outside_root",
            PathViolation::Denied => "denied",
            PathViolation::NotAllowed => "not_allowed",
        };
        f.write_str(s)
    }
}

/// Lexically resolve `candidate` against `root` without touching the
/// filesystem (the target may not exist yet — this runs before writes).
/// Rejects any `..` that would climb above `root`.
pub fn validate_path(root: &Path, candidate: &Path) -> Result<PathBuf, PathViolation> {
    let mut resolved = root.to_path_buf();
    let relative = if candidate.is_absolute() {
        candidate
            .strip_prefix(root)
            .map_err(|_| PathViolation::OutsideRoot)?
    } else {
        candidate
    };

    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(root) {
                    return Err(PathViolation::Traversal);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathViolation::OutsideRoot),
        }
    }

    if !resolved.starts_with(root) {
        return Err(PathViolation::OutsideRoot);
    }
    Ok(resolved)
}

/// Compiled glob policy built from a `GateContract`'s forbidden/naming globs.
pub struct PathPolicy {
    forbidden: GlobSet,
    naming: Option<GlobSet>,
}

impl PathPolicy {
    pub fn compile(forbidden_files: &[String], naming_rules: &[String]) -> Result<Self, globset::Error> {
        let forbidden = build_set(forbidden_files)?;
        let naming = if naming_rules.is_empty() {
            None
        } else {
            Some(build_set(naming_rules)?)
        };
        Ok(Self { forbidden, naming })
    }

    /// `relative` is a path relative to the workspace root, already
    /// lexically validated by `validate_path`.
    pub fn check(&self, relative: &Path) -> Result<(), PathViolation> {
        if self.forbidden.is_match(relative) {
            return Err(PathViolation::Denied);
        }
        if let Some(naming) = &self.naming {
            if !naming.is_match(relative) {
                return Err(PathViolation::NotAllowed);
            }
        }
        Ok(())
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_relative_path_resolves_under_root() {
        let root = Path::new("/workspace");
        let resolved = validate_path(root, Path::new("src/main.rs")).unwrap();
        assert_eq!(resolved, Path::new("/workspace/src/main.rs"));
    }

    #[test]
    fn parent_dir_escape_is_rejected() {
        let root = Path::new("/workspace");
        let err = validate_path(root, Path::new("../etc/passwd")).unwrap_err();
        assert_eq!(err, PathViolation::Traversal);
    }

    #[test]
    fn nested_traversal_back_into_root_is_allowed() {
        let root = Path::new("/workspace");
        // src/../main.rs stays within root even though it contains `..`
        let resolved = validate_path(root, Path::new("src/../main.rs")).unwrap();
        assert_eq!(resolved, Path::new("/workspace/main.rs"));
    }

    #[test]
    fn absolute_path_inside_root_resolves() {
        let root = Path::new("/workspace");
        let resolved = validate_path(root, Path::new("/workspace/a/b.txt")).unwrap();
        assert_eq!(resolved, Path::new("/workspace/a/b.txt"));
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let root = Path::new("/workspace");
        let err = validate_path(root, Path::new("/etc/shadow")).unwrap_err();
        assert_eq!(err, PathViolation::OutsideRoot);
    }

    #[test]
    fn forbidden_glob_denies() {
        let policy = PathPolicy::compile(&["**/.env".to_string()], &[]).unwrap();
        assert_eq!(
            policy.check(Path::new("config/.env")),
            Err(PathViolation::Denied)
        );
        assert!(policy.check(Path::new("config/app.toml")).is_ok());
    }

    #[test]
    fn naming_rules_require_a_match_when_present() {
        let policy = PathPolicy::compile(&[], &["src/**/*.rs".to_string()]).unwrap();
        assert!(policy.check(Path::new("src/lib.rs")).is_ok());
        assert_eq!(
            policy.check(Path::new("src/lib.py")),
            Err(PathViolation::NotAllowed)
        );
    }
}
