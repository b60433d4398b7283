//! Language catalog describing valid solver configurations.
//!
//! The catalog is received once from the solver service (`languages` channel) and stays read-only
//! for the rest of the session. Every query is keyed by its ancestors, so a solver is only ever
//! looked up under the language that declares it and an option under the solver that declares it.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::errors::DomainError;

/// Language → solver → executor/option tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub value: String,
    pub name: String,
    #[serde(default)]
    pub solvers: Vec<SolverEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverEntry {
    pub value: String,
    pub name: String,
    #[serde(default)]
    pub executors: Vec<ExecutorEntry>,
    #[serde(default)]
    pub options: Vec<OptionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorEntry {
    pub value: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub value: String,
    pub name: String,
    /// Whether selecting this option attaches value inputs.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub word_argument: bool,
    #[serde(default)]
    pub description: String,
}

impl Catalog {
    pub fn new(languages: Vec<LanguageEntry>) -> Self {
        Self { languages }
    }

    /// Parse the JSON array delivered on the `languages` channel.
    pub fn from_json(data: &str) -> Result<Self, DomainError> {
        serde_json::from_str(data).map_err(DomainError::MalformedCatalog)
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    pub fn languages(&self) -> &[LanguageEntry] {
        &self.languages
    }

    pub fn first_language(&self) -> Option<&LanguageEntry> {
        self.languages.first()
    }

    pub fn language(&self, language: &str) -> Option<&LanguageEntry> {
        if language.is_empty() {
            return None;
        }
        self.languages.iter().find(|entry| entry.value == language)
    }

    /// Solvers declared by `language`; empty when the language is unset or unknown.
    pub fn solvers_for(&self, language: &str) -> &[SolverEntry] {
        self.language(language)
            .map(|entry| entry.solvers.as_slice())
            .unwrap_or_default()
    }

    pub fn solver(&self, language: &str, solver: &str) -> Option<&SolverEntry> {
        if solver.is_empty() {
            return None;
        }
        self.solvers_for(language)
            .iter()
            .find(|entry| entry.value == solver)
    }

    pub fn executors_for(&self, language: &str, solver: &str) -> &[ExecutorEntry] {
        self.solver(language, solver)
            .map(|entry| entry.executors.as_slice())
            .unwrap_or_default()
    }

    pub fn options_for(&self, language: &str, solver: &str) -> &[OptionEntry] {
        self.solver(language, solver)
            .map(|entry| entry.options.as_slice())
            .unwrap_or_default()
    }

    pub fn option(&self, language: &str, solver: &str, option: &str) -> Option<&OptionEntry> {
        self.options_for(language, solver)
            .iter()
            .find(|entry| entry.value == option)
    }

    pub fn has_executor(&self, language: &str, solver: &str, executor: &str) -> bool {
        self.executors_for(language, solver)
            .iter()
            .any(|entry| entry.value == executor)
    }
}

/// Accepts `true`/`false` as well as string encodings (`"true"`, `"on"`) of a checked flag.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(text) => !matches!(text.trim(), "" | "false" | "off" | "0"),
        Flag::Other(value) => !value.is_null(),
    })
}

#[cfg(test)]
pub(crate) fn fixture() -> Catalog {
    Catalog::from_json(include_str!("../../tests/fixtures/languages.json"))
        .expect("fixture catalog parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solvers_are_scoped_to_their_language() {
        let catalog = fixture();
        let solvers: Vec<_> = catalog
            .solvers_for("asp")
            .iter()
            .map(|solver| solver.value.as_str())
            .collect();
        assert_eq!(solvers, ["dlv", "clingo"]);
        assert!(catalog.solver("datalog", "dlv").is_none());
        assert!(catalog.solvers_for("").is_empty());
        assert!(catalog.solvers_for("prolog").is_empty());
    }

    #[test]
    fn executors_and_options_need_both_ancestors() {
        let catalog = fixture();
        assert_eq!(catalog.executors_for("asp", "dlv").len(), 2);
        assert!(catalog.executors_for("", "dlv").is_empty());
        assert!(catalog.options_for("asp", "").is_empty());
        assert!(catalog.options_for("datalog", "clingo").is_empty());
        assert!(catalog.has_executor("asp", "dlv", "none"));
        assert!(!catalog.has_executor("asp", "clingo", "none"));
    }

    #[test]
    fn word_argument_accepts_string_flags() {
        let catalog = Catalog::from_json(
            r#"[{"value":"asp","name":"ASP","solvers":[{"value":"s","name":"S",
                "options":[{"value":"-a","name":"A","word_argument":"true"},
                           {"value":"-b","name":"B","word_argument":"false"},
                           {"value":"-c","name":"C"}]}]}]"#,
        )
        .unwrap();
        assert!(catalog.option("asp", "s", "-a").unwrap().word_argument);
        assert!(!catalog.option("asp", "s", "-b").unwrap().word_argument);
        assert!(!catalog.option("asp", "s", "-c").unwrap().word_argument);
        assert!(catalog.executors_for("asp", "s").is_empty());
    }

    #[test]
    fn malformed_catalog_is_reported() {
        let err = Catalog::from_json(r#"{"value":"asp"}"#).unwrap_err();
        assert!(matches!(err, DomainError::MalformedCatalog(_)));
    }
}
