//! Applying pattern/replacement fixes to file contents.

use regex::Regex;

use crate::error::{RecoveryError, RecoveryResult};
use crate::strategist::RecoverySuggestion;

/// Apply a suggestion's pattern to `content`. Fails when the pattern is
/// missing or matches nothing.
pub fn apply_suggestion(suggestion: &RecoverySuggestion, content: &str) -> RecoveryResult<String> {
    let pattern = suggestion
        .match_pattern
        .as_deref()
        .ok_or(RecoveryError::NoPattern)?;
    let replacement = suggestion.replacement.as_deref().unwrap_or_default();

    let re = Regex::new(pattern)?;
    if !re.is_match(content) {
        return Err(RecoveryError::NoMatch(
            suggestion.file.clone().unwrap_or_else(|| "<content>".to_string()),
        ));
    }
    Ok(re.replace_all(content, replacement).into_owned())
}
