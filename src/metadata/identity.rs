//! Assembly display-name handling.

/// Reduces an assembly display name to its simple name.
///
/// `"Lib, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"` becomes `"Lib"`. Names
/// without qualifiers are returned trimmed. A quoted simple name (`"\"My, Lib\", Version=.."`)
/// keeps its embedded comma.
///
/// # Examples
///
/// ```rust
/// use dotresolve::metadata::identity::simplify_assembly_name;
///
/// assert_eq!(
///     simplify_assembly_name("Payload, Version=2.1.0.0, Culture=neutral, PublicKeyToken=null"),
///     "Payload"
/// );
/// assert_eq!(simplify_assembly_name("  Payload "), "Payload");
/// ```
#[must_use]
pub fn simplify_assembly_name(full_name: &str) -> &str {
    let trimmed = full_name.trim();

    if let Some(rest) = trimmed.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            return &rest[..end];
        }
    }

    trimmed
        .split_once(',')
        .map_or(trimmed, |(simple, _)| simple.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_qualifiers() {
        assert_eq!(
            simplify_assembly_name("Lib, Version=1.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"),
            "Lib"
        );
        assert_eq!(simplify_assembly_name("Lib,Version=1.0.0.0"), "Lib");
    }

    #[test]
    fn test_plain_name() {
        assert_eq!(simplify_assembly_name("Lib"), "Lib");
        assert_eq!(simplify_assembly_name(""), "");
    }

    #[test]
    fn test_quoted_name() {
        assert_eq!(
            simplify_assembly_name("\"My, Lib\", Version=1.0.0.0"),
            "My, Lib"
        );
    }
}
