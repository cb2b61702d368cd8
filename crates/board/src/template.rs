use std::collections::HashMap;

use serde::Deserialize;

/// Variable name → options → lines. One option is chosen per draw; a
/// whole-line placeholder splices in all of its lines, an inline one takes
/// the first.
pub type VariableMap = HashMap<String, Vec<Vec<String>>>;

/// How to shorten a single row that cannot be split at a space within the
/// column budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    /// Cut at the column limit, mid-word if necessary.
    #[default]
    Hard,
    /// Cut at the last full word boundary that fits.
    Word,
    /// Cut at the last full word boundary and append "...".
    Ellipsis,
}

/// One format variant: the lines of text (with `{variable}` placeholders)
/// that make up a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Format {
    pub format: Vec<String>,
}

/// A renderable message description: format variants plus the static
/// variable options they draw from.
#[derive(Debug, Clone)]
pub struct Template {
    pub formats: Vec<Format>,
    pub variables: VariableMap,
    pub truncation: Truncation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_deserializes_lowercase() {
        assert_eq!(
            serde_json::from_str::<Truncation>("\"ellipsis\"").unwrap(),
            Truncation::Ellipsis
        );
        assert!(serde_json::from_str::<Truncation>("\"bogus\"").is_err());
    }

    #[test]
    fn test_format_deserializes_from_content_json() {
        let f: Format = serde_json::from_str(r#"{"format": ["HELLO {name}"]}"#).unwrap();
        assert_eq!(f.format, vec!["HELLO {name}"]);
    }
}
