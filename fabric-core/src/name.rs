use crate::error::CoreError;

/// Checks that `name` can be used as a single path component.
///
/// Pattern and session names map directly onto files under a base
/// directory, so they must not be empty, contain separators, or be a
/// relative component such as `..`.
///
/// # Errors
/// Returns [`CoreError::InvalidName`] describing the first violation found.
pub fn validate_name(name: &str) -> Result<&str, CoreError> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("relative path components are not allowed")
    } else if name.contains(['/', '\\']) {
        Some("path separators are not allowed")
    } else if name.contains('\0') {
        Some("NUL bytes are not allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoreError::InvalidName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        }),
        None => Ok(name),
    }
}
