use crate::error::CanvasError;
use std::path::{Component, Path, PathBuf};

/// Resolves `input` against `root` and requires the result to be `root` itself
/// or somewhere beneath it. Purely lexical: nothing is read from disk, so the
/// answer does not depend on whether the target exists. A relative `root` is
/// taken against the current directory, so the result is always absolute.
pub fn resolve_within(root: &Path, input: impl AsRef<Path>) -> Result<PathBuf, CanvasError> {
    let input = input.as_ref();
    let root = absolute_root(root)?;
    let candidate = normalize(&root.join(input));
    // Path::starts_with compares whole components, so "/tmp/root2" is not under "/tmp/root".
    if candidate.starts_with(&root) {
        Ok(candidate)
    } else {
        Err(CanvasError::OutOfBounds {
            path: input.to_path_buf(),
            root,
        })
    }
}

fn absolute_root(root: &Path) -> Result<PathBuf, CanvasError> {
    if root.is_absolute() {
        return Ok(normalize(root));
    }
    let cwd = std::env::current_dir().map_err(|source| CanvasError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    Ok(normalize(&cwd.join(root)))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/agent-canvas-root")
    }

    #[test]
    fn relative_paths_resolve_under_root() {
        let resolved = resolve_within(&root(), "out/page.html").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/agent-canvas-root/out/page.html"));

        let dotted = resolve_within(&root(), "./a/../b.html").unwrap();
        assert_eq!(dotted, PathBuf::from("/tmp/agent-canvas-root/b.html"));
    }

    #[test]
    fn root_itself_is_allowed() {
        assert_eq!(resolve_within(&root(), ".").unwrap(), root());
        assert_eq!(resolve_within(&root(), "sub/..").unwrap(), root());
    }

    #[test]
    fn absolute_paths_inside_root_are_allowed() {
        let resolved = resolve_within(&root(), "/tmp/agent-canvas-root/x.html").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/agent-canvas-root/x.html"));
    }

    #[test]
    fn escapes_are_out_of_bounds() {
        for input in [
            "../escape.html",
            "a/../../escape.html",
            "/etc/passwd",
            "/tmp/agent-canvas-root-sibling/x.html",
        ] {
            let err = resolve_within(&root(), input).unwrap_err();
            assert!(
                matches!(err, CanvasError::OutOfBounds { .. }),
                "{input} should escape"
            );
            assert_eq!(err.io_kind(), None);
        }
    }

    #[test]
    fn unnormalized_root_is_normalized_first() {
        let resolved = resolve_within(Path::new("/tmp/./agent-canvas-root/"), "x.html").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/agent-canvas-root/x.html"));
    }

    #[test]
    fn relative_root_is_anchored_at_current_dir() {
        let cwd = std::env::current_dir().expect("current dir");
        for relative in [Path::new("."), Path::new("")] {
            let resolved = resolve_within(relative, "x.html").expect("inside relative root");
            assert!(resolved.is_absolute());
            assert_eq!(resolved, normalize(&cwd.join("x.html")));

            let err = resolve_within(relative, "/etc/passwd").unwrap_err();
            assert!(matches!(err, CanvasError::OutOfBounds { .. }));
            let err = resolve_within(relative, "../outside.html").unwrap_err();
            assert!(matches!(err, CanvasError::OutOfBounds { .. }));
        }
    }
}
