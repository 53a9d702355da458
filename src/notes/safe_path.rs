//! Directory-traversal guard for client supplied note paths

use std::path::{Component, Path, PathBuf};

/// Resolve `user_path` against `root`, refusing anything that would land
/// outside of it.
///
/// The input is normalized lexically (`.` dropped, `..` folded into the
/// preceding segment) and stripped of any leading separator before joining.
/// A `..` that cannot be folded away survives at the front of the relative
/// form; every relative form starting with `..` is refused, even a segment
/// such as `..notes` that would technically stay inside the root.
pub fn resolve(user_path: &str, root: &Path) -> Option<PathBuf> {
    let relative = normalize(user_path);
    if relative.starts_with("..") {
        return None;
    }
    if relative.is_empty() {
        return Some(root.to_path_buf());
    }
    Some(root.join(relative))
}

/// Lexical clean of a slash separated path, returned without a leading slash
fn normalize(user_path: &str) -> String {
    let rooted = user_path.starts_with('/') || user_path.starts_with('\\');
    let mut segments: Vec<&str> = Vec::new();

    for component in Path::new(user_path).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => segments.push(part),
                None => return "..".to_string(),
            },
            Component::ParentDir => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // `..` above a rooted path stays at the root
                _ if rooted => {}
                _ => segments.push(".."),
            },
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    segments.join("/")
}

/// Forward-slash relative form of `path` under `root`
pub fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
