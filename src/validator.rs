//! Request token validation.

/// Check whether a raw request token must not be used as a path component.
///
/// Rejects control characters and any `..` segment, treating backslashes as
/// separators and collapsing repeated slashes first.
pub fn is_insecure_path(token: &str) -> bool {
    if token.chars().any(char::is_control) {
        return true;
    }

    let normalized = token.replace('\\', "/");
    normalized
        .split('/')
        .filter(|segment| !segment.is_empty())
        .any(|segment| segment == "..")
}
