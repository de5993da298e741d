//! Alternate spellings of catalog model ids.
//!
//! The catalog reports some versions with dots (`claude-opus-4.5`) while callers often
//! use hyphens only (`claude-opus-4-5`), and the other way around.

/// Spellings under which `model_id` should also resolve, without `model_id` itself.
///
/// # Examples
///
/// ```
/// use copilot_relay::models::model_aliases;
///
/// assert!(model_aliases("claude-opus-4-5").contains(&"claude-opus-4.5".to_string()));
/// assert!(model_aliases("claude-opus-4.5").contains(&"claude-opus-4-5".to_string()));
/// ```
pub fn model_aliases(model_id: &str) -> Vec<String> {
    let mut aliases = Vec::new();
    let mut push = |candidate: String| {
        if candidate != model_id && !candidate.is_empty() && !aliases.contains(&candidate) {
            aliases.push(candidate);
        }
    };

    push(model_id.replace('.', "-"));
    push(model_id.replace('-', "."));

    let hyphenated = model_id.replace('.', "-");
    let segments: Vec<&str> = hyphenated.split('-').collect();
    for split in 1..segments.len() {
        let starts_with_digit = segments[split]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        if !starts_with_digit {
            continue;
        }
        let prefix = segments[..split].join("-");
        let suffix = segments[split..].join(".");
        push(format!("{prefix}.{suffix}"));
        push(format!("{prefix}-{suffix}"));
    }

    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenated_version_gains_dotted_alias() {
        let aliases = model_aliases("claude-opus-4-5");
        assert!(aliases.contains(&"claude-opus-4.5".to_string()));
        assert!(aliases.contains(&"claude.opus.4.5".to_string()));
        assert!(!aliases.contains(&"claude-opus-4-5".to_string()));
    }

    #[test]
    fn dotted_version_gains_hyphen_alias() {
        let aliases = model_aliases("gemini-1.5-pro");
        assert!(aliases.contains(&"gemini-1-5-pro".to_string()));
    }

    #[test]
    fn ids_without_separators_have_no_aliases() {
        assert!(model_aliases("o1").is_empty());
    }

    #[test]
    fn aliases_are_unique() {
        let aliases = model_aliases("gpt-4.1");
        let mut deduped = aliases.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(aliases.len(), deduped.len());
        assert!(aliases.contains(&"gpt-4-1".to_string()));
    }
}
