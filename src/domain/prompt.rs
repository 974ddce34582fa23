//! Prompt templates served by the backend catalog.

use serde::{Deserialize, Serialize};

/// A reusable prompt template from the catalog.
///
/// The template text is used literally as the completion prompt; the
/// backend substitutes the `{transcription}` placeholder server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub title: String,
    pub template: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        let json = r#"[{"id":"p1","title":"Summarize","template":"Summarize: {transcription}"}]"#;
        let prompts: Vec<PromptTemplate> = serde_json::from_str(json).unwrap();

        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].id, "p1");
        assert_eq!(prompts[0].title, "Summarize");
        assert_eq!(prompts[0].template, "Summarize: {transcription}");
    }
}
