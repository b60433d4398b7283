//! Canonical JSON project document used for saving, sharing, local snapshots, and loading.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::catalog::Catalog;
use crate::app::form::{FormFields, WireForm, deserialize_names, materialize_option_row};
use crate::app::settings::RunSettings;
use crate::app::tabs::{Tab, TabSession};
use crate::domain::errors::DomainError;
use crate::domain::model::{OutputPanes, TabId};

/// Top-level keys that mark a JSON object as a project. Any one of them is enough.
pub const PROJECT_KEYS: [&str; 8] = [
    "language",
    "engine",
    "executor",
    "option",
    "program",
    "output_model",
    "output_error",
    "tabname",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(flatten)]
    pub form: WireForm,
    #[serde(default, deserialize_with = "deserialize_names")]
    pub tabname: Vec<String>,
    #[serde(default)]
    pub output_model: String,
    #[serde(default)]
    pub output_error: String,
}

/// What a loaded file or parameter turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Project(ProjectDocument),
    /// Valid JSON without any project key.
    Json(Value),
    /// Not JSON at all.
    Text(String),
}

impl ProjectDocument {
    /// Recognise a project. Objects without any [`PROJECT_KEYS`] entry yield `Ok(None)` so the
    /// caller can treat the payload as plain text instead.
    pub fn recognize(value: &Value) -> Result<Option<Self>, DomainError> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        if !PROJECT_KEYS.iter().any(|key| object.contains_key(*key)) {
            return Ok(None);
        }
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(DomainError::MalformedProject)
    }

    /// Classify raw text as a project, other JSON, or plain text.
    pub fn classify(text: &str) -> Result<Payload, DomainError> {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Ok(Payload::Text(text.to_owned()));
        };
        Ok(match Self::recognize(&value)? {
            Some(project) => Payload::Project(project),
            None => Payload::Json(value),
        })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether every program is blank.
    pub fn is_blank(&self) -> bool {
        self.form
            .program
            .iter()
            .all(|program| program.trim().is_empty())
    }

    /// Whether a stored snapshot is worth offering for restore.
    pub fn has_content(&self) -> bool {
        match self.form.program.as_slice() {
            [] => false,
            [only] => !only.trim().is_empty(),
            _ => true,
        }
    }
}

/// Capture the session state as a project document.
///
/// Every tab contributes its text and name in display order. Selected tabs are written as the ids
/// the tabs will receive when the document is loaded again (`editor1` for the first tab, ...).
pub fn capture(settings: &RunSettings, tabs: &TabSession, output: &OutputPanes) -> ProjectDocument {
    let mut fields = FormFields::from_settings(settings);
    fields.push_indexed("program", tabs.tabs().iter().map(Tab::text));
    fields.push_indexed("tabname", tabs.tabs().iter().map(|tab| tab.name().to_owned()));

    let mut document: ProjectDocument = match serde_json::from_value(fields.to_json()) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(error = %err, "project fields did not decode");
            ProjectDocument::default()
        }
    };

    let selection = tabs.run_selection();
    if !selection.is_empty() {
        let ids = tabs
            .tabs()
            .iter()
            .enumerate()
            .filter(|(_, tab)| selection.contains(&tab.id()))
            .map(|(position, _)| TabId::new(position as u32 + 1).to_string())
            .collect();
        document.form.tab = Some(ids);
    }
    document.output_model = output.model.clone();
    document.output_error = output.error.clone();
    document
}

/// Replace the session state with a project document.
///
/// Tabs are rebuilt first, then the selection set and auto-run flag, then language, solver, and
/// executor in cascade order, and finally the option rows so the cascade does not reset them.
pub fn restore(
    document: &ProjectDocument,
    catalog: &Catalog,
    settings: &mut RunSettings,
    tabs: &mut TabSession,
    output: &mut OutputPanes,
) -> Result<(), DomainError> {
    let form = &document.form;
    tabs.replace_all(form.program.iter().enumerate().map(|(index, text)| {
        let name = document
            .tabname
            .get(index)
            .filter(|name| !name.trim().is_empty())
            .cloned();
        (text.clone(), name)
    }));

    for id in form.tab.iter().flatten() {
        match TabId::parse(id) {
            Some(id) if tabs.get(id).is_some() => {
                tabs.toggle_run_selection(id)?;
            }
            _ => tracing::warn!(tab = %id, "ignoring selection of unknown tab"),
        }
    }
    settings.set_auto_run_on_dot(form.run_auto);

    settings.select_language(catalog, &form.language);
    settings.select_solver(catalog, &form.engine);
    settings.select_executor(catalog, &form.executor);

    settings.clear_options();
    for option in &form.option {
        materialize_option_row(settings, catalog, option)?;
    }

    output.model = document.output_model.clone();
    output.error = document.output_error.clone();
    tracing::debug!(tabs = tabs.len(), options = form.option.len(), "restored project");
    Ok(())
}
