//! Live run settings: the language/solver/executor selection and the option rows.
//!
//! Upstream changes cascade downwards with a first-is-default policy: choosing a language selects
//! its first solver, choosing a solver selects its first executor and resets every option row to
//! the solver's first option. Nothing tries to preserve a previous choice that would still be
//! valid.
//!
//! While no catalog has been received yet the settings accept values verbatim, since there is
//! nothing to validate them against.

use crate::app::catalog::Catalog;
use crate::domain::errors::DomainError;
use crate::domain::model::SolverOption;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSettings {
    language: String,
    solver: String,
    executor: String,
    options: Vec<SolverOption>,
    auto_run_on_dot: bool,
}

impl RunSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn solver(&self) -> &str {
        &self.solver
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn options(&self) -> &[SolverOption] {
        &self.options
    }

    pub fn auto_run_on_dot(&self) -> bool {
        self.auto_run_on_dot
    }

    pub fn set_auto_run_on_dot(&mut self, enabled: bool) {
        self.auto_run_on_dot = enabled;
    }

    /// Select a language and cascade the first-is-default choice downwards.
    ///
    /// Returns `false` when the catalog does not know `language`; the current selection is kept.
    pub fn select_language(&mut self, catalog: &Catalog, language: &str) -> bool {
        if catalog.is_empty() {
            self.language = language.to_owned();
            return true;
        }
        if catalog.language(language).is_none() {
            tracing::warn!(language, "ignoring language missing from catalog");
            return false;
        }
        self.language = language.to_owned();
        self.solver = catalog
            .solvers_for(language)
            .first()
            .map(|solver| solver.value.clone())
            .unwrap_or_default();
        self.cascade_from_solver(catalog);
        true
    }

    /// Select a solver of the current language and cascade to executor and option rows.
    pub fn select_solver(&mut self, catalog: &Catalog, solver: &str) -> bool {
        if catalog.is_empty() {
            self.solver = solver.to_owned();
            return true;
        }
        if catalog.solver(&self.language, solver).is_none() {
            tracing::warn!(language = %self.language, solver, "ignoring solver missing from catalog");
            return false;
        }
        self.solver = solver.to_owned();
        self.cascade_from_solver(catalog);
        true
    }

    pub fn select_executor(&mut self, catalog: &Catalog, executor: &str) -> bool {
        if !catalog.is_empty() && !catalog.has_executor(&self.language, &self.solver, executor) {
            tracing::warn!(solver = %self.solver, executor, "ignoring executor missing from catalog");
            return false;
        }
        self.executor = executor.to_owned();
        true
    }

    /// Append an option row preselected to the solver's first option.
    pub fn add_option(&mut self, catalog: &Catalog) -> usize {
        let name = self.default_option_name(catalog);
        self.options.push(SolverOption::named(name));
        let index = self.options.len() - 1;
        self.attach_word_argument(catalog, index);
        index
    }

    /// Remove an option row; later rows shift down so indices stay contiguous.
    pub fn remove_option(&mut self, index: usize) -> Result<SolverOption, DomainError> {
        if index >= self.options.len() {
            return Err(DomainError::UnknownOption(index));
        }
        Ok(self.options.remove(index))
    }

    pub fn clear_options(&mut self) {
        self.options.clear();
    }

    /// Choose the option of a row.
    ///
    /// Options that take word arguments get an empty value slot when they have none; other
    /// options lose any attached values. Returns `false` when the name is not offered by the
    /// current solver, leaving the row untouched.
    pub fn set_option_name(
        &mut self,
        catalog: &Catalog,
        index: usize,
        name: &str,
    ) -> Result<bool, DomainError> {
        if index >= self.options.len() {
            return Err(DomainError::UnknownOption(index));
        }
        if !catalog.is_empty()
            && !name.is_empty()
            && catalog.option(&self.language, &self.solver, name).is_none()
        {
            tracing::warn!(solver = %self.solver, option = name, "ignoring option missing from catalog");
            return Ok(false);
        }
        self.options[index].name = name.to_owned();
        self.attach_word_argument(catalog, index);
        Ok(true)
    }

    /// Append an empty value slot to a word-argument option row.
    pub fn add_option_value(&mut self, catalog: &Catalog, index: usize) -> Result<usize, DomainError> {
        let option = self
            .options
            .get(index)
            .ok_or(DomainError::UnknownOption(index))?;
        if !catalog.is_empty() && !self.takes_word_argument(catalog, &option.name) {
            return Err(DomainError::NoWordArgument(index));
        }
        let values = &mut self.options[index].values;
        values.push(String::new());
        Ok(values.len() - 1)
    }

    /// Remove a value slot. The last remaining slot is cleared instead of removed.
    pub fn remove_option_value(&mut self, index: usize, value: usize) -> Result<(), DomainError> {
        let values = &mut self
            .options
            .get_mut(index)
            .ok_or(DomainError::UnknownOption(index))?
            .values;
        if value >= values.len() {
            return Err(DomainError::UnknownOptionValue {
                option: index,
                value,
            });
        }
        if values.len() > 1 {
            values.remove(value);
        } else {
            values[value].clear();
        }
        Ok(())
    }

    pub fn set_option_value(
        &mut self,
        index: usize,
        value: usize,
        text: impl Into<String>,
    ) -> Result<(), DomainError> {
        let slot = self
            .options
            .get_mut(index)
            .ok_or(DomainError::UnknownOption(index))?
            .values
            .get_mut(value)
            .ok_or(DomainError::UnknownOptionValue {
                option: index,
                value,
            })?;
        *slot = text.into();
        Ok(())
    }

    /// Labels shown on the option rows, numbered from one in list order.
    pub fn option_badges(&self) -> Vec<String> {
        (1..=self.options.len())
            .map(|number| format!("Option {number}"))
            .collect()
    }

    /// Select the first language, enable auto-run on dot, and drop every option row.
    pub fn reset(&mut self, catalog: &Catalog) {
        self.options.clear();
        if let Some(first) = catalog.first_language() {
            let first = first.value.clone();
            self.select_language(catalog, &first);
        } else {
            self.language.clear();
            self.solver.clear();
            self.executor.clear();
        }
        self.auto_run_on_dot = true;
    }

    fn cascade_from_solver(&mut self, catalog: &Catalog) {
        self.executor = catalog
            .executors_for(&self.language, &self.solver)
            .first()
            .map(|executor| executor.value.clone())
            .unwrap_or_default();

        let name = self.default_option_name(catalog);
        for index in 0..self.options.len() {
            self.options[index].name = name.clone();
            self.attach_word_argument(catalog, index);
        }
    }

    fn default_option_name(&self, catalog: &Catalog) -> String {
        catalog
            .options_for(&self.language, &self.solver)
            .first()
            .map(|option| option.value.clone())
            .unwrap_or_default()
    }

    fn takes_word_argument(&self, catalog: &Catalog, name: &str) -> bool {
        catalog
            .option(&self.language, &self.solver, name)
            .is_some_and(|entry| entry.word_argument)
    }

    fn attach_word_argument(&mut self, catalog: &Catalog, index: usize) {
        if catalog.is_empty() {
            return;
        }
        let takes_words = self.takes_word_argument(catalog, &self.options[index].name);
        let values = &mut self.options[index].values;
        if takes_words {
            if values.is_empty() {
                values.push(String::new());
            }
        } else {
            values.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::catalog::fixture;

    fn selected(settings: &RunSettings) -> (&str, &str, &str) {
        (settings.language(), settings.solver(), settings.executor())
    }

    #[test]
    fn language_change_selects_first_entries() {
        let catalog = fixture();
        let mut settings = RunSettings::new();

        assert!(settings.select_language(&catalog, "asp"));
        assert_eq!(selected(&settings), ("asp", "dlv", "none"));

        assert!(settings.select_solver(&catalog, "clingo"));
        assert_eq!(selected(&settings), ("asp", "clingo", "local"));

        assert!(settings.select_language(&catalog, "datalog"));
        assert_eq!(selected(&settings), ("datalog", "idlv", "local"));
    }

    #[test]
    fn language_change_resets_option_rows_to_first_option() {
        let catalog = fixture();
        let mut settings = RunSettings::new();
        settings.select_language(&catalog, "asp");
        settings.select_solver(&catalog, "clingo");

        let row = settings.add_option(&catalog);
        assert_eq!(settings.options()[row].name, "--models");
        assert_eq!(settings.options()[row].values, vec![String::new()]);
        settings.set_option_value(row, 0, "3").unwrap();

        settings.select_language(&catalog, "asp");
        assert_eq!(settings.solver(), "dlv");
        assert_eq!(settings.options()[row], SolverOption::named("-N"));

        settings.select_language(&catalog, "datalog");
        assert_eq!(settings.options()[row], SolverOption::named(""));
    }

    #[test]
    fn unknown_selections_are_ignored() {
        let catalog = fixture();
        let mut settings = RunSettings::new();
        settings.select_language(&catalog, "asp");

        assert!(!settings.select_language(&catalog, "prolog"));
        assert!(!settings.select_solver(&catalog, "idlv"));
        assert!(!settings.select_executor(&catalog, "remote"));
        assert_eq!(selected(&settings), ("asp", "dlv", "none"));

        assert!(settings.select_executor(&catalog, "local"));
        assert_eq!(settings.executor(), "local");
    }

    #[test]
    fn word_argument_options_manage_value_slots() {
        let catalog = fixture();
        let mut settings = RunSettings::new();
        settings.select_language(&catalog, "asp");
        let row = settings.add_option(&catalog);

        assert!(settings.options()[row].values.is_empty());
        assert!(matches!(
            settings.add_option_value(&catalog, row),
            Err(DomainError::NoWordArgument(0))
        ));

        assert!(settings.set_option_name(&catalog, row, "-filter=").unwrap());
        assert_eq!(settings.options()[row].values.len(), 1);
        assert_eq!(settings.add_option_value(&catalog, row).unwrap(), 1);
        settings.set_option_value(row, 0, "a").unwrap();
        settings.set_option_value(row, 1, "b").unwrap();

        settings.remove_option_value(row, 0).unwrap();
        assert_eq!(settings.options()[row].values, vec!["b".to_string()]);
        settings.remove_option_value(row, 0).unwrap();
        assert_eq!(settings.options()[row].values, vec![String::new()]);

        settings.set_option_name(&catalog, row, "-silent").unwrap();
        assert!(settings.options()[row].values.is_empty());
    }

    #[test]
    fn removing_rows_keeps_positions_contiguous() {
        let catalog = fixture();
        let mut settings = RunSettings::new();
        settings.select_language(&catalog, "asp");
        for _ in 0..3 {
            settings.add_option(&catalog);
        }
        settings.set_option_name(&catalog, 2, "-silent").unwrap();

        settings.remove_option(0).unwrap();
        assert_eq!(settings.options().len(), 2);
        assert_eq!(settings.options()[1].name, "-silent");
        assert_eq!(settings.option_badges(), ["Option 1", "Option 2"]);
        assert!(matches!(
            settings.remove_option(2),
            Err(DomainError::UnknownOption(2))
        ));
    }

    #[test]
    fn reset_selects_first_language_and_clears_rows() {
        let catalog = fixture();
        let mut settings = RunSettings::new();
        settings.select_language(&catalog, "datalog");
        settings.add_option(&catalog);

        settings.reset(&catalog);
        assert_eq!(selected(&settings), ("asp", "dlv", "none"));
        assert!(settings.options().is_empty());
        assert!(settings.auto_run_on_dot());
    }

    #[test]
    fn values_pass_through_without_catalog() {
        let catalog = Catalog::default();
        let mut settings = RunSettings::new();
        assert!(settings.select_language(&catalog, "asp"));
        assert!(settings.select_solver(&catalog, "dlv"));
        assert!(settings.select_executor(&catalog, "none"));
        let row = settings.add_option(&catalog);
        settings.set_option_name(&catalog, row, "-n").unwrap();
        settings.add_option_value(&catalog, row).unwrap();
        assert_eq!(selected(&settings), ("asp", "dlv", "none"));
        assert_eq!(settings.options()[row].values.len(), 1);
    }
}
