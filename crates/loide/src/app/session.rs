//! The session context: everything one editing session owns, and the reactions to user actions
//! and service responses that span several components.

use crossbeam_channel::Receiver;

use crate::app::catalog::Catalog;
use crate::app::form::serialize_form;
use crate::app::project::{self, Payload, ProjectDocument};
use crate::app::run::{ClientEvent, ConnectionState, RunClient, RunOutput, Transport};
use crate::app::settings::RunSettings;
use crate::app::share::{self, ShareError};
use crate::app::tabs::{BufferFactory, TabSession};
use crate::domain::errors::DomainError;
use crate::domain::model::{Notification, OutputPanes, PanePosition, SolverOption, TabId};
use crate::infra::config::Config;
use crate::infra::storage::{LocalStore, keys};

pub const SENDING: &str = "Sending..";
pub const SINGLE_QUOTES_UNSUPPORTED: &str = "Single quotes not yet supported";
pub const PROJECT_LOAD_ERROR: &str = "Error load the project";
pub const URL_LOADED: &str = "Project loaded successfully from the URL";

/// Editor highlighting mode for a language.
pub fn editor_mode(language: &str) -> &'static str {
    match language {
        "asp" => "ace/mode/asp",
        "datalog" => "ace/mode/datalog",
        _ => "ace/mode/text",
    }
}

pub struct Session {
    catalog: Catalog,
    catalog_received: bool,
    settings: RunSettings,
    tabs: TabSession,
    output: OutputPanes,
    notifications: Vec<Notification>,
    store: Option<LocalStore>,
    client: RunClient<Box<dyn Transport>>,
    events: Receiver<ClientEvent>,
    theme: String,
    dark_theme: String,
    dark_mode: bool,
    output_font_size: u32,
}

impl Session {
    pub fn new(config: &Config, transport: Box<dyn Transport>, factory: Box<dyn BufferFactory>) -> Self {
        let mut client = RunClient::new(transport);
        let events = client.subscribe();
        Self {
            catalog: Catalog::default(),
            catalog_received: false,
            settings: RunSettings::new(),
            tabs: TabSession::new(factory, config.editor.appearance()),
            output: OutputPanes::default(),
            notifications: Vec::new(),
            store: None,
            client,
            events,
            theme: config.editor.theme.clone(),
            dark_theme: config.editor.dark_theme.clone(),
            dark_mode: false,
            output_font_size: config.editor.output_font_size,
        }
    }

    /// Attach persistent storage and apply the preferences it holds.
    pub fn with_store(mut self, store: LocalStore) -> Self {
        if let Some(position) = store.get(keys::OUTPUT_POSITION) {
            match position.parse::<PanePosition>() {
                Ok(position) => self.output.position = position,
                Err(err) => tracing::warn!(error = %err, "ignoring stored output position"),
            }
        }
        if let Some(size) = store.get(keys::FONT_SIZE_EDITOR).and_then(|size| size.parse().ok()) {
            self.tabs.set_font_size(size);
        }
        if let Some(size) = store.get(keys::FONT_SIZE_OUTPUT).and_then(|size| size.parse().ok()) {
            self.output_font_size = size;
        }
        self.dark_mode = store.get(keys::MODE) == Some("dark");
        if let Some(theme) = store.get(keys::THEME) {
            self.tabs.set_theme(theme);
        } else if self.dark_mode {
            self.tabs.set_theme(&self.dark_theme);
        }
        self.store = Some(store);
        self
    }

    /// Ask the service for its language catalog.
    pub fn start(&mut self) {
        self.client.request_languages();
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Whether the service has answered the catalog request.
    pub fn has_catalog(&self) -> bool {
        self.catalog_received
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn tabs(&self) -> &TabSession {
        &self.tabs
    }

    pub fn tabs_mut(&mut self) -> &mut TabSession {
        &mut self.tabs
    }

    pub fn output(&self) -> &OutputPanes {
        &self.output
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn pending_runs(&self) -> usize {
        self.client.pending_runs()
    }

    pub fn output_font_size(&self) -> u32 {
        self.output_font_size
    }

    pub fn is_dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// Notifications raised since the last call, oldest first.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn notify(&mut self, reason: impl Into<String>) {
        let notification = Notification::new(reason);
        tracing::info!(reason = %notification.reason, "notification");
        self.notifications.push(notification);
    }

    pub fn select_language(&mut self, language: &str) -> bool {
        let changed = self.settings.select_language(&self.catalog, language);
        self.sync_editor_mode();
        changed
    }

    pub fn select_solver(&mut self, solver: &str) -> bool {
        self.settings.select_solver(&self.catalog, solver)
    }

    pub fn select_executor(&mut self, executor: &str) -> bool {
        self.settings.select_executor(&self.catalog, executor)
    }

    pub fn add_option(&mut self) -> usize {
        self.settings.add_option(&self.catalog)
    }

    pub fn remove_option(&mut self, index: usize) -> Result<SolverOption, DomainError> {
        self.settings.remove_option(index)
    }

    pub fn set_option_name(&mut self, index: usize, name: &str) -> Result<bool, DomainError> {
        self.settings.set_option_name(&self.catalog, index, name)
    }

    pub fn add_option_value(&mut self, index: usize) -> Result<usize, DomainError> {
        self.settings.add_option_value(&self.catalog, index)
    }

    pub fn remove_option_value(&mut self, index: usize, value: usize) -> Result<(), DomainError> {
        self.settings.remove_option_value(index, value)
    }

    pub fn set_option_value(&mut self, index: usize, value: usize, text: &str) -> Result<(), DomainError> {
        self.settings.set_option_value(index, value, text)
    }

    pub fn set_auto_run_on_dot(&mut self, enabled: bool) {
        self.settings.set_auto_run_on_dot(enabled);
    }

    /// First language, auto-run on, no option rows, and the active tab as the run target.
    pub fn reset_run_settings(&mut self) {
        self.settings.reset(&self.catalog);
        self.tabs.select_current_tab_mode();
        self.sync_editor_mode();
    }

    /// React to text typed into a buffer.
    pub fn on_text_inserted(&mut self, inserted: &str) {
        if inserted == "'" {
            self.notify(SINGLE_QUOTES_UNSUPPORTED);
            self.tabs.strip_single_quotes();
            return;
        }
        if inserted == "." && self.settings.auto_run_on_dot() {
            self.run();
        }
    }

    /// Run the selected tabs, or the active tab while none is selected.
    pub fn run(&mut self) {
        self.dispatch_run(false);
    }

    /// Run the active tab regardless of the selection.
    pub fn run_tab(&mut self) {
        self.dispatch_run(true);
    }

    fn dispatch_run(&mut self, only_active: bool) {
        if self.tabs.strip_single_quotes() {
            tracing::debug!("removed single quotes before run");
        }
        self.output.clear();
        self.output.model = SENDING.to_owned();
        let form = serialize_form(&self.settings, &self.tabs, only_active);
        tracing::info!(
            language = %form.language,
            solver = %form.engine,
            programs = form.program.len(),
            "sending run"
        );
        self.client.request_run(&form);
    }

    /// Apply every response received so far. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        self.client.pump();
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    pub fn apply_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Languages(catalog) => {
                self.catalog = catalog;
                self.catalog_received = true;
                self.reset_run_settings();
            }
            ClientEvent::Output(RunOutput { model, error }) => {
                self.output.model = model;
                if error.is_empty() {
                    self.output.open = true;
                } else {
                    self.output.error = error;
                }
            }
            ClientEvent::Problem(problem) | ClientEvent::ConnectError(problem) => {
                self.output.model.clear();
                self.output.error = problem.reason.clone();
                self.notify(problem.reason);
            }
        }
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Dock the output pane at `position`, keeping its contents, and remember the choice.
    pub fn set_output_position(&mut self, position: PanePosition) {
        self.output.position = position;
        self.persist(keys::OUTPUT_POSITION, position.as_str());
    }

    pub fn set_theme(&mut self, theme: &str) {
        self.tabs.set_theme(theme);
        self.persist(keys::THEME, theme);
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.tabs.set_font_size(size);
        self.persist(keys::FONT_SIZE_EDITOR, &size.to_string());
    }

    pub fn set_output_font_size(&mut self, size: u32) {
        self.output_font_size = size;
        self.persist(keys::FONT_SIZE_OUTPUT, &size.to_string());
    }

    /// Switch between the light and dark editor themes.
    pub fn set_dark_mode(&mut self, dark: bool) {
        self.dark_mode = dark;
        let theme = if dark {
            self.dark_theme.clone()
        } else {
            self.theme.clone()
        };
        self.tabs.set_theme(&theme);
        self.persist(keys::MODE, if dark { "dark" } else { "light" });
        self.forget(keys::THEME);
    }

    pub fn project(&self) -> ProjectDocument {
        project::capture(&self.settings, &self.tabs, &self.output)
    }

    pub fn load_project(&mut self, document: &ProjectDocument) -> Result<(), DomainError> {
        project::restore(
            document,
            &self.catalog,
            &mut self.settings,
            &mut self.tabs,
            &mut self.output,
        )?;
        self.sync_editor_mode();
        tracing::info!(tabs = self.tabs.len(), "project loaded");
        Ok(())
    }

    /// Load a dropped or opened file. Projects replace the session; anything else lands in the
    /// active tab, JSON that is not a project as its quoted source text.
    pub fn import_single(&mut self, text: &str) -> Result<(), DomainError> {
        let active = self.tabs.active();
        match ProjectDocument::classify(text)? {
            Payload::Project(document) => self.load_project(&document),
            Payload::Json(_) => {
                let quoted = serde_json::to_string(text).map_err(DomainError::MalformedProject)?;
                self.tabs.set_text(active, &quoted)
            }
            Payload::Text(text) => self.tabs.set_text(active, &text),
        }
    }

    /// Open several dropped files as tabs named after the files.
    pub fn import_files(&mut self, files: &[(String, String)]) -> Option<TabId> {
        let active = self.tabs.import_files(files);
        tracing::debug!(files = files.len(), "imported files");
        active
    }

    /// Snapshot the project into local storage.
    pub fn unload(&mut self) {
        match self.project().to_json_string() {
            Ok(json) => self.persist(keys::PROJECT, &json),
            Err(err) => tracing::warn!(error = %err, "failed to encode project snapshot"),
        }
    }

    /// Whether local storage holds a snapshot with any program text.
    pub fn has_restorable_project(&self) -> bool {
        self.stored_project()
            .and_then(|text| ProjectDocument::classify(text).ok())
            .is_some_and(|payload| match payload {
                Payload::Project(document) => document.has_content(),
                _ => false,
            })
    }

    /// Load the local storage snapshot. Returns whether a project was loaded.
    pub fn restore_project(&mut self) -> bool {
        let Some(text) = self.stored_project().map(str::to_owned) else {
            return false;
        };
        match ProjectDocument::classify(&text) {
            Ok(Payload::Project(document)) => match self.load_project(&document) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "stored project did not load");
                    self.notify(PROJECT_LOAD_ERROR);
                    false
                }
            },
            _ => {
                self.notify(PROJECT_LOAD_ERROR);
                false
            }
        }
    }

    /// Link reopening the current project, or `None` after notifying why there is none.
    pub fn share_url(&mut self, page: &str) -> Option<String> {
        match share::share_url(page, &self.project()) {
            Ok(url) => Some(url),
            Err(err) => {
                self.notify(err.to_string());
                None
            }
        }
    }

    /// Load the project carried by a share link. Returns whether a project was loaded.
    pub fn load_from_url(&mut self, url: &str) -> bool {
        let loaded = share::project_from_url(url).and_then(|document| match document {
            Some(document) => self
                .load_project(&document)
                .map(|()| true)
                .map_err(|_| ShareError::NotAProject),
            None => Ok(false),
        });
        match loaded {
            Ok(true) => {
                self.notify(URL_LOADED);
                true
            }
            Ok(false) => false,
            Err(err) => {
                self.notify(err.to_string());
                false
            }
        }
    }

    fn stored_project(&self) -> Option<&str> {
        self.store.as_ref()?.get(keys::PROJECT)
    }

    fn sync_editor_mode(&mut self) {
        let mode = editor_mode(self.settings.language());
        if self.tabs.appearance().mode != mode {
            self.tabs.set_mode(mode);
        }
    }

    fn persist(&mut self, key: &str, value: &str) {
        if let Some(store) = self.store.as_mut()
            && let Err(err) = store.set(key, value)
        {
            tracing::warn!(key, error = %err, "failed to persist preference");
        }
    }

    fn forget(&mut self, key: &str) {
        if let Some(store) = self.store.as_mut()
            && let Err(err) = store.remove(key)
        {
            tracing::warn!(key, error = %err, "failed to forget preference");
        }
    }
}
