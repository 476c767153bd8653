//! Tool-name policy and derivation.
//!
//! The control plane accepts tool names built from letters, digits,
//! underscores, and hyphens, at most 50 characters. `ToolManager` treats a
//! valid name as a precondition and rejects anything else; callers holding a
//! raw image reference derive a compliant name with [`derive_tool_name`].

use crate::error::{Error, Result};

/// Maximum tool name length accepted by the control plane.
pub const MAX_TOOL_NAME_LEN: usize = 50;

/// Check a tool name against the provider's identifier policy.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration("tool name must not be empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::configuration(format!(
            "tool name '{name}' exceeds {MAX_TOOL_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::configuration(format!(
            "tool name '{name}' contains illegal character '{bad}' \
             (allowed: letters, digits, underscore, hyphen)"
        )));
    }
    Ok(())
}

/// Build a valid tool name from a fully qualified image reference.
///
/// Strategy: `<last repo segment>-<tag>`, sanitized to the allowed alphabet
/// and truncated so the result fits in [`MAX_TOOL_NAME_LEN`]. When the tag
/// alone exceeds the limit the truncated tag is used on its own.
///
/// Example: `registry.example.com/namanjain12/aiohttp_final:abcdef123`
/// becomes `aiohttp_final-abcdef123`.
pub fn derive_tool_name(image: &str) -> String {
    // Strip a registry prefix (first segment containing '.' or ':').
    let parts: Vec<&str> = image.split('/').collect();
    let repo_with_tag = if parts.len() >= 3 && (parts[0].contains('.') || parts[0].contains(':')) {
        parts[1..].join("/")
    } else {
        image.to_string()
    };

    let (repo_part, tag) = match repo_with_tag.rsplit_once(':') {
        Some((repo, tag)) => (repo.to_string(), tag.to_string()),
        None => (repo_with_tag, String::new()),
    };

    // Only the last repository segment carries meaning for the name.
    let repo_name = repo_part.rsplit('/').next().unwrap_or("");
    let repo_name = sanitize(repo_name);
    let tag = sanitize(&tag);

    let name = if tag.is_empty() {
        truncate(&repo_name, MAX_TOOL_NAME_LEN)
    } else if tag.len() + 1 >= MAX_TOOL_NAME_LEN {
        truncate(&tag, MAX_TOOL_NAME_LEN)
    } else {
        let max_repo = MAX_TOOL_NAME_LEN - tag.len() - 1;
        format!("{}-{tag}", truncate(&repo_name, max_repo))
    };

    collapse_hyphens(&name)
}

fn sanitize(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    replaced.trim_matches('-').to_string()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn collapse_hyphens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_hyphen = false;
    for c in s.chars() {
        if c == '-' {
            if !prev_hyphen {
                out.push(c);
            }
            prev_hyphen = true;
        } else {
            out.push(c);
            prev_hyphen = false;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_within_policy() {
        for name in ["a", "my-sandbox", "tool_01", "A-b_C-9", &"x".repeat(50)] {
            assert!(validate_tool_name(name).is_ok(), "'{name}' should pass");
        }
    }

    #[test]
    fn rejects_names_outside_policy() {
        assert!(validate_tool_name("").is_err());
        assert!(validate_tool_name(&"x".repeat(51)).is_err());
        for name in ["has space", "dot.name", "colon:tag", "slash/repo", "emoji🦀"] {
            assert!(validate_tool_name(name).is_err(), "'{name}' should fail");
        }
    }

    #[test]
    fn derives_repo_and_tag() {
        let name =
            derive_tool_name("registry.example.com/namanjain12/aiohttp_final:abcdef123");
        assert_eq!(name, "aiohttp_final-abcdef123");
        validate_tool_name(&name).unwrap();
    }

    #[test]
    fn derives_without_registry_or_tag() {
        assert_eq!(derive_tool_name("python:3.11"), "python-3-11");
        assert_eq!(derive_tool_name("ubuntu"), "ubuntu");
    }

    #[test]
    fn long_names_fit_the_limit() {
        let image = format!("registry.example.com/team/{}:{}", "r".repeat(80), "t".repeat(10));
        let name = derive_tool_name(&image);
        assert!(name.len() <= MAX_TOOL_NAME_LEN);
        assert!(name.ends_with(&"t".repeat(10)));
        validate_tool_name(&name).unwrap();
    }

    #[test]
    fn oversized_tag_wins_alone() {
        let image = format!("repo:{}", "t".repeat(60));
        let name = derive_tool_name(&image);
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
        assert!(name.chars().all(|c| c == 't'));
    }

    #[test]
    fn sanitized_output_collapses_hyphens() {
        let name = derive_tool_name("team/my..repo:v1.0+build");
        assert!(!name.contains("--"));
        validate_tool_name(&name).unwrap();
    }
}
