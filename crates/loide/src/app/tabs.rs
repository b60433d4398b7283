//! Open editor tabs, the active tab, and the run selection set.

use std::collections::HashSet;
use std::fmt;

use crate::domain::errors::DomainError;
use crate::domain::model::TabId;

pub const CONFIRM_DELETE_TAB: &str =
    "Are you sure you want to delete this file? This cannot be undone.";
pub const CONFIRM_DELETE_ALL_TABS: &str =
    "Are you sure you want to delete all tabs? This cannot be undone.";

/// Text buffer owned by a tab. Implemented by the host editing widget.
pub trait EditorBuffer: fmt::Debug {
    fn text(&self) -> String;
    fn set_text(&mut self, text: &str);
    fn set_mode(&mut self, mode: &str);
    fn set_theme(&mut self, theme: &str);
    fn set_font_size(&mut self, size: u32);
}

/// Creates buffers for new tabs.
pub trait BufferFactory: fmt::Debug {
    fn create(&mut self, editor_id: &str, text: &str) -> Box<dyn EditorBuffer>;
}

/// Plain in-memory buffer used when no editing widget is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBuffer {
    pub text: String,
    pub mode: String,
    pub theme: String,
    pub font_size: u32,
}

impl EditorBuffer for MemoryBuffer {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_owned();
    }

    fn set_mode(&mut self, mode: &str) {
        self.mode = mode.to_owned();
    }

    fn set_theme(&mut self, theme: &str) {
        self.theme = theme.to_owned();
    }

    fn set_font_size(&mut self, size: u32) {
        self.font_size = size;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBufferFactory;

impl BufferFactory for MemoryBufferFactory {
    fn create(&mut self, _editor_id: &str, text: &str) -> Box<dyn EditorBuffer> {
        Box::new(MemoryBuffer {
            text: text.to_owned(),
            ..MemoryBuffer::default()
        })
    }
}

/// Settings applied to every buffer, including ones created later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAppearance {
    pub mode: String,
    pub theme: String,
    pub font_size: u32,
}

impl Default for BufferAppearance {
    fn default() -> Self {
        Self {
            mode: "ace/mode/text".into(),
            theme: "ace/theme/tomorrow".into(),
            font_size: 15,
        }
    }
}

#[derive(Debug)]
pub struct Tab {
    id: TabId,
    name: String,
    buffer: Box<dyn EditorBuffer>,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn buffer(&self) -> &dyn EditorBuffer {
        self.buffer.as_ref()
    }
}

/// The set of open tabs. Never empty: removing the last tab replaces it with a fresh default one.
#[derive(Debug)]
pub struct TabSession {
    tabs: Vec<Tab>,
    active: TabId,
    run_selection: HashSet<TabId>,
    factory: Box<dyn BufferFactory>,
    appearance: BufferAppearance,
}

impl Default for TabSession {
    fn default() -> Self {
        Self::new(Box::new(MemoryBufferFactory), BufferAppearance::default())
    }
}

impl TabSession {
    /// Create a session holding a single empty default tab.
    pub fn new(factory: Box<dyn BufferFactory>, appearance: BufferAppearance) -> Self {
        let mut session = Self {
            tabs: Vec::new(),
            active: TabId::new(1),
            run_selection: HashSet::new(),
            factory,
            appearance,
        };
        session.push_default_tab();
        session
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn active(&self) -> TabId {
        self.active
    }

    pub fn active_tab(&self) -> &Tab {
        self.get(self.active)
            .or_else(|| self.tabs.first())
            .expect("tab session always holds at least one tab")
    }

    pub fn set_active(&mut self, id: TabId) -> Result<(), DomainError> {
        self.position(id)?;
        self.active = id;
        Ok(())
    }

    pub fn appearance(&self) -> &BufferAppearance {
        &self.appearance
    }

    /// Open a new tab holding `text` and make it active.
    pub fn add_tab(&mut self, text: &str, name: Option<&str>) -> TabId {
        let id = self.allocate_id();
        let name = name
            .map(str::to_owned)
            .unwrap_or_else(|| id.default_name());
        self.insert_tab(id, name, text);
        self.active = id;
        tracing::debug!(tab = %id, "opened tab");
        id
    }

    /// Close a tab, asking `confirm` first unless `skip_confirm` is set.
    ///
    /// The tab before the closed one becomes active (the one after when it was first). Returns
    /// `Ok(false)` when the user declined.
    pub fn delete_tab<F>(&mut self, id: TabId, skip_confirm: bool, confirm: F) -> Result<bool, DomainError>
    where
        F: FnOnce(&str) -> bool,
    {
        let position = self.position(id)?;
        if !skip_confirm && !confirm(CONFIRM_DELETE_TAB) {
            return Ok(false);
        }

        let neighbour = if position > 0 {
            self.tabs.get(position - 1)
        } else {
            self.tabs.get(position + 1)
        };
        if let Some(neighbour) = neighbour {
            self.active = neighbour.id;
        }

        self.tabs.remove(position);
        self.run_selection.remove(&id);
        tracing::debug!(tab = %id, "closed tab");

        if self.tabs.is_empty() {
            self.push_default_tab();
        }
        Ok(true)
    }

    /// Close every tab after a single confirmation.
    pub fn delete_all_tabs<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        if !confirm(CONFIRM_DELETE_ALL_TABS) {
            return false;
        }
        let ids: Vec<TabId> = self.tabs.iter().map(|tab| tab.id).collect();
        for id in ids {
            // The last deletion respawns the default tab.
            if let Err(err) = self.delete_tab(id, true, |_| true) {
                tracing::warn!(error = %err, "failed to delete tab");
            }
        }
        true
    }

    /// Open a copy of a tab's text in a new, active tab.
    pub fn duplicate_tab(&mut self, id: TabId) -> Result<TabId, DomainError> {
        let text = self.text(id)?;
        Ok(self.add_tab(&text, None))
    }

    /// Rename a tab. Names are trimmed and must not be empty; duplicates are allowed.
    pub fn rename_tab(&mut self, id: TabId, name: &str) -> Result<(), DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::EmptyTabName);
        }
        let position = self.position(id)?;
        self.tabs[position].name = name.to_owned();
        Ok(())
    }

    pub fn clear_tab(&mut self, id: TabId) -> Result<(), DomainError> {
        self.set_text(id, "")
    }

    pub fn text(&self, id: TabId) -> Result<String, DomainError> {
        self.get(id)
            .map(Tab::text)
            .ok_or(DomainError::UnknownTab(id))
    }

    pub fn set_text(&mut self, id: TabId, text: &str) -> Result<(), DomainError> {
        let position = self.position(id)?;
        self.tabs[position].buffer.set_text(text);
        Ok(())
    }

    /// Toggle whether a tab takes part in runs. Returns the new membership.
    pub fn toggle_run_selection(&mut self, id: TabId) -> Result<bool, DomainError> {
        self.position(id)?;
        if self.run_selection.remove(&id) {
            Ok(false)
        } else {
            self.run_selection.insert(id);
            Ok(true)
        }
    }

    /// Switch back to running the current tab only.
    pub fn select_current_tab_mode(&mut self) {
        self.run_selection.clear();
    }

    /// `true` while no tab is explicitly selected, so runs use the active tab.
    pub fn is_current_tab_mode(&self) -> bool {
        self.run_selection.is_empty()
    }

    /// Explicitly selected tabs in display order.
    pub fn run_selection(&self) -> Vec<TabId> {
        self.tabs
            .iter()
            .map(|tab| tab.id)
            .filter(|id| self.run_selection.contains(id))
            .collect()
    }

    /// Program texts taking part in a run, in participation order.
    pub fn run_programs(&self, only_active: bool) -> Vec<String> {
        if only_active || self.is_current_tab_mode() {
            return vec![self.active_tab().text()];
        }
        self.tabs
            .iter()
            .filter(|tab| self.run_selection.contains(&tab.id))
            .map(Tab::text)
            .collect()
    }

    /// Replace every tab with new ones built from `(text, name)` pairs; the first becomes active.
    pub fn replace_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        self.tabs.clear();
        self.run_selection.clear();
        for (text, name) in entries {
            self.add_tab(&text, name.as_deref());
        }
        if self.tabs.is_empty() {
            self.push_default_tab();
        }
        self.active = self.tabs[0].id;
    }

    /// Open dropped files as tabs named after the files.
    ///
    /// With a single blank tab open, the first file fills that tab instead of opening a new one.
    pub fn import_files(&mut self, files: &[(String, String)]) -> Option<TabId> {
        if files.is_empty() {
            return None;
        }
        let opened = self.tabs.len();
        let mut last = None;
        for (index, (name, text)) in files.iter().enumerate() {
            if opened == 1 && index == 0 && self.active_tab().text().trim().is_empty() {
                let id = self.active_tab().id;
                let position = self.position(id).ok()?;
                self.tabs[position].buffer.set_text(text);
                self.tabs[position].name = name.clone();
                last = Some(id);
            } else {
                last = Some(self.add_tab(text, Some(name)));
            }
        }
        self.active = if opened == 1 { self.tabs[0].id } else { last? };
        Some(self.active)
    }

    /// Remove single quotes from every buffer. Returns whether anything changed.
    pub fn strip_single_quotes(&mut self) -> bool {
        let mut changed = false;
        for tab in &mut self.tabs {
            let text = tab.buffer.text();
            if text.contains('\'') {
                tab.buffer.set_text(&text.replace('\'', ""));
                changed = true;
            }
        }
        changed
    }

    pub fn set_mode(&mut self, mode: &str) {
        self.appearance.mode = mode.to_owned();
        for tab in &mut self.tabs {
            tab.buffer.set_mode(mode);
        }
    }

    pub fn set_theme(&mut self, theme: &str) {
        self.appearance.theme = theme.to_owned();
        for tab in &mut self.tabs {
            tab.buffer.set_theme(theme);
        }
    }

    pub fn set_font_size(&mut self, size: u32) {
        self.appearance.font_size = size;
        for tab in &mut self.tabs {
            tab.buffer.set_font_size(size);
        }
    }

    fn position(&self, id: TabId) -> Result<usize, DomainError> {
        self.tabs
            .iter()
            .position(|tab| tab.id == id)
            .ok_or(DomainError::UnknownTab(id))
    }

    /// Lowest index above the open tab count that no open tab uses.
    fn allocate_id(&self) -> TabId {
        let mut index = self.tabs.len() as u32 + 1;
        while self.tabs.iter().any(|tab| tab.id.index() == index) {
            index += 1;
        }
        TabId::new(index)
    }

    fn push_default_tab(&mut self) {
        let id = TabId::new(1);
        self.insert_tab(id, id.default_name(), "");
        self.active = id;
    }

    fn insert_tab(&mut self, id: TabId, name: String, text: &str) {
        let mut buffer = self.factory.create(&id.editor_id(), text);
        buffer.set_mode(&self.appearance.mode);
        buffer.set_theme(&self.appearance.theme);
        buffer.set_font_size(self.appearance.font_size);
        self.tabs.push(Tab { id, name, buffer });
    }
}
