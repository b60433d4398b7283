//! Flat form encoding of the run settings and the run request payload.
//!
//! Run settings are first flattened into bracketed field names (`option[0][name]`,
//! `option[0][value][]`, `program[1]`, ...) exactly as an HTML form would submit them, then
//! folded into nested JSON. Option indices are always derived from list position at encoding
//! time, so removing a row never leaves gaps.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::app::catalog::{Catalog, deserialize_flag};
use crate::app::settings::RunSettings;
use crate::app::tabs::TabSession;
use crate::domain::errors::DomainError;

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*(?:\[(?:\d*|[a-zA-Z0-9_]+)\])*$")
        .expect("field name pattern compiles")
});
static FIELD_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([a-zA-Z0-9_]*)\]").expect("field segment pattern compiles"));

/// Value of the auto-run checkbox when it is submitted.
const CHECKED: &str = "on";

/// Run request payload sent on the `run` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireForm {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub language: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub engine: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub executor: String,
    #[serde(default, deserialize_with = "deserialize_options")]
    pub option: Vec<WireOption>,
    #[serde(default, deserialize_with = "deserialize_texts")]
    pub program: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<Vec<String>>,
    #[serde(
        rename = "runAuto",
        default,
        skip_serializing_if = "is_false",
        deserialize_with = "deserialize_flag"
    )]
    pub run_auto: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOption {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<String>>,
}

impl WireOption {
    /// The "no option chosen" entry sent when no rows exist.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// Ordered list of submitted `(name, value)` form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten the selects, option rows, and the auto-run checkbox.
    pub fn from_settings(settings: &RunSettings) -> Self {
        let mut fields = Self::new();
        fields.push("language", settings.language());
        fields.push("engine", settings.solver());
        fields.push("executor", settings.executor());
        for (index, option) in settings.options().iter().enumerate() {
            fields.push(format!("option[{index}][name]"), &option.name);
            for value in &option.values {
                fields.push(format!("option[{index}][value][]"), value);
            }
        }
        if settings.auto_run_on_dot() {
            fields.push("runAuto", CHECKED);
        }
        fields
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Append `key[0]`, `key[1]`, ... for each value.
    pub fn push_indexed<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.push(format!("{key}[{index}]"), value);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Fold the bracketed names into nested JSON.
    ///
    /// `a[b]` builds objects, `a[3]` places a value at a fixed array index, and `a[]` appends
    /// using a counter kept per parent path. Fields with malformed names are skipped.
    pub fn to_json(&self) -> Value {
        let mut counters: HashMap<String, usize> = HashMap::new();
        let mut root = Value::Object(Map::new());

        for (name, value) in &self.fields {
            if !FIELD_NAME.is_match(name) {
                tracing::debug!(field = %name, "skipping malformed form field");
                continue;
            }
            let head_end = name.find('[').unwrap_or(name.len());
            let mut keys = vec![&name[..head_end]];
            keys.extend(
                FIELD_SEGMENT
                    .captures_iter(&name[head_end..])
                    .filter_map(|caps| caps.get(1))
                    .map(|segment| segment.as_str()),
            );

            let mut merged = Value::String(value.clone());
            let mut parent = name.as_str();
            while let Some(key) = keys.pop() {
                parent = parent
                    .strip_suffix(&format!("[{key}]"))
                    .unwrap_or(parent);
                merged = if key.is_empty() {
                    let counter = counters.entry(parent.to_owned()).or_default();
                    let index = *counter;
                    *counter += 1;
                    indexed(index, merged)
                } else if key.bytes().all(|b| b.is_ascii_digit()) {
                    match key.parse() {
                        Ok(index) => indexed(index, merged),
                        Err(_) => continue,
                    }
                } else {
                    let mut object = Map::new();
                    object.insert(key.to_owned(), merged);
                    Value::Object(object)
                };
            }
            deep_merge(&mut root, merged);
        }
        root
    }
}

fn indexed(index: usize, value: Value) -> Value {
    let mut items = vec![Value::Null; index];
    items.push(value);
    Value::Array(items)
}

/// Merge `source` into `target`; null array holes in `source` leave `target` untouched.
fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.into_iter().enumerate() {
                if value.is_null() {
                    continue;
                }
                if index >= target.len() {
                    target.resize(index + 1, Value::Null);
                }
                if target[index].is_null() {
                    target[index] = value;
                } else {
                    deep_merge(&mut target[index], value);
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Build the run request from the live settings and tabs.
///
/// With `only_active` set, or while no tab is explicitly selected, only the active tab's text is
/// sent. Otherwise every selected tab contributes one `program[i]`, indexed by participation
/// order.
pub fn serialize_form(settings: &RunSettings, tabs: &TabSession, only_active: bool) -> WireForm {
    let mut fields = FormFields::from_settings(settings);
    fields.push_indexed("program", tabs.run_programs(only_active));

    let mut form: WireForm = match serde_json::from_value(fields.to_json()) {
        Ok(form) => form,
        Err(err) => {
            tracing::warn!(error = %err, "form fields did not decode, sending settings directly");
            WireForm::default()
        }
    };
    if form.option.is_empty() {
        form.option.push(WireOption::placeholder());
    }
    let selection = tabs.run_selection();
    if !selection.is_empty() {
        form.tab = Some(selection.iter().map(ToString::to_string).collect());
    }
    form
}

/// Recreate an option row from stored data, driving the same cascade a user selection would.
///
/// Stored values fill the slot attached by a word-argument option first; further values get new
/// slots. Values for options that take no arguments are dropped, and so are the values of an
/// option the current solver does not offer, whose row is left with an empty name.
pub fn materialize_option_row(
    settings: &mut RunSettings,
    catalog: &Catalog,
    option: &WireOption,
) -> Result<usize, DomainError> {
    let row = settings.add_option(catalog);
    if !settings.set_option_name(catalog, row, &option.name)? {
        // Unknown options come back unnamed rather than as the solver's default.
        settings.set_option_name(catalog, row, "")?;
        return Ok(row);
    }

    for (position, value) in option.value.iter().flatten().enumerate() {
        let reuse_slot = position == 0 && !settings.options()[row].values.is_empty();
        let slot = if reuse_slot {
            0
        } else {
            match settings.add_option_value(catalog, row) {
                Ok(slot) => slot,
                Err(DomainError::NoWordArgument(_)) => break,
                Err(err) => return Err(err),
            }
        };
        settings.set_option_value(row, slot, value.as_str())?;
    }
    Ok(row)
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_texts<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.into_iter().map(Option::unwrap_or_default).collect())
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<Vec<WireOption>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Option<WireOption>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.into_iter().flatten().collect())
}

pub(crate) fn deserialize_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_texts(deserializer)
}
