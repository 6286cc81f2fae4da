use std::collections::HashMap;

use tracing::warn;

/// Keyword allow-list for one profile. Matching is a case-insensitive
/// substring search; an empty list lets everything through.
#[derive(Debug, Clone, Default)]
pub struct KeywordsFilter {
    keywords: Vec<String>,
}

impl KeywordsFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Filter for the configured profile. No profile, or a profile name that
    /// is not defined, yields a filter that accepts everything.
    pub fn for_profile(profiles: &HashMap<String, Vec<String>>, profile: Option<&str>) -> Self {
        let Some(name) = profile else {
            return Self::default();
        };

        match profiles.get(name) {
            Some(keywords) => Self::new(keywords),
            None => {
                warn!("Keywords filter profile '{}' is not defined, not filtering", name);
                Self::default()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !self.keywords.is_empty()
    }

    pub fn accepts(&self, text: &str) -> bool {
        if !self.is_active() {
            return true;
        }
        let haystack = text.to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_case_insensitive() {
        let filter = KeywordsFilter::new(["Talamanca", "bages"]);
        assert!(filter.accepts("Festa major de TALAMANCA"));
        assert!(filter.accepts("Notícies del Bages"));
        assert!(!filter.accepts("Barcelona"));
    }

    #[test]
    fn test_profiles() {
        let mut profiles = HashMap::new();
        profiles.insert("talamanca".to_string(), vec!["talamanca".to_string()]);

        let filter = KeywordsFilter::for_profile(&profiles, Some("talamanca"));
        assert!(filter.is_active());
        assert!(!filter.accepts("nothing here"));

        let unknown = KeywordsFilter::for_profile(&profiles, Some("missing"));
        assert!(!unknown.is_active());
        assert!(unknown.accepts("nothing here"));

        assert!(KeywordsFilter::for_profile(&profiles, None).accepts("anything"));
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let filter = KeywordsFilter::new(["", "  "]);
        assert!(!filter.is_active());
    }
}
