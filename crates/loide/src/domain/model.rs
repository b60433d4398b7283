//! Domain models for tabs, solver options, and output panes.

use std::fmt;
use std::str::FromStr;

const PANE_PREFIX: &str = "tab";
const EDITOR_PREFIX: &str = "editor";

/// Identifier of an open tab.
///
/// A tab owns a pane (`tabN`) and an editor buffer (`editorN`) sharing the same index. Run
/// selections and the `tab` wire field refer to the editor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(u32);

impl TabId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn pane_id(self) -> String {
        format!("{PANE_PREFIX}{}", self.0)
    }

    pub fn editor_id(self) -> String {
        format!("{EDITOR_PREFIX}{}", self.0)
    }

    /// Placeholder label given to tabs created without an explicit name.
    pub fn default_name(self) -> String {
        format!("L P {}", self.0)
    }

    /// Parse either an editor id (`editor3`) or a pane id (`tab3`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let digits = value
            .strip_prefix(EDITOR_PREFIX)
            .or_else(|| value.strip_prefix(PANE_PREFIX))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{EDITOR_PREFIX}{}", self.0)
    }
}

/// One configured solver option row.
///
/// An empty `name` is the placeholder for "not yet chosen".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverOption {
    pub name: String,
    pub values: Vec<String>,
}

impl SolverOption {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }
}

/// Where the output pane is docked. Exactly one position is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanePosition {
    #[default]
    East,
    South,
}

impl PanePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanePosition::East => "east",
            PanePosition::South => "south",
        }
    }
}

impl FromStr for PanePosition {
    type Err = PanePositionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "east" => Ok(PanePosition::East),
            "south" => Ok(PanePosition::South),
            other => Err(PanePositionParseError::UnknownPosition(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PanePositionParseError {
    #[error("unknown output pane position '{0}'")]
    UnknownPosition(String),
}

/// Model and error text shown to the user, plus the pane layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPanes {
    pub model: String,
    pub error: String,
    pub position: PanePosition,
    pub open: bool,
}

impl OutputPanes {
    pub fn clear(&mut self) {
        self.model.clear();
        self.error.clear();
    }

    /// Text offered by the "download output" action.
    pub fn download_text(&self) -> String {
        format!("{}\n{}", self.model, self.error)
    }
}

/// Transient message surfaced to the user (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub reason: String,
}

impl Notification {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_id_formats_pane_and_editor_ids() {
        let id = TabId::new(3);
        assert_eq!(id.pane_id(), "tab3");
        assert_eq!(id.editor_id(), "editor3");
        assert_eq!(id.to_string(), "editor3");
        assert_eq!(id.default_name(), "L P 3");
    }

    #[test]
    fn tab_id_parses_both_prefixes() {
        assert_eq!(TabId::parse("editor12"), Some(TabId::new(12)));
        assert_eq!(TabId::parse("tab2"), Some(TabId::new(2)));
        assert_eq!(TabId::parse("editor"), None);
        assert_eq!(TabId::parse("editor-1"), None);
        assert_eq!(TabId::parse("pane1"), None);
    }

    #[test]
    fn pane_position_round_trips_through_str() {
        assert_eq!("SOUTH".parse::<PanePosition>(), Ok(PanePosition::South));
        assert_eq!(PanePosition::East.as_str(), "east");
        assert!("north".parse::<PanePosition>().is_err());
    }
}
