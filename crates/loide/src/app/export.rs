//! Saving projects, tab contents, and run output to files.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::app::project::{Payload, ProjectDocument};
use crate::app::tabs::Tab;
use crate::domain::model::OutputPanes;

pub const OUTPUT_FILE_NAME: &str = "LoIDE_output.txt";
const PROGRAM_FILE_PREFIX: &str = "LogicProgram_";

/// What a save action writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum SaveKind {
    /// The whole project as JSON.
    Project,
    /// The text of one tab.
    Program,
    /// The model and error panes.
    Output,
}

impl SaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveKind::Project => "project",
            SaveKind::Program => "program",
            SaveKind::Output => "output",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SaveKind::Project => "json",
            SaveKind::Program | SaveKind::Output => "txt",
        }
    }
}

impl FromStr for SaveKind {
    type Err = SaveKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project" | "json" => Ok(SaveKind::Project),
            "program" | "tab" => Ok(SaveKind::Program),
            "output" => Ok(SaveKind::Output),
            other => Err(SaveKindParseError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SaveKindParseError {
    #[error("unknown save kind '{0}'")]
    UnknownKind(String),
}

/// Result of a save.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub kind: SaveKind,
    pub rendered: String,
    pub output_path: PathBuf,
}

/// Writes saved artifacts into one directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
    project_name: String,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            project_name: project_name.into(),
        }
    }

    /// Save `document` as `<name>.json`, using the configured project name when `name` is blank.
    pub fn save_project(&self, document: &ProjectDocument, name: Option<&str>) -> Result<ExportResult> {
        let stem = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.project_name.as_str());
        let rendered =
            serde_json::to_string_pretty(document).context("failed to serialize project")?;
        self.write(SaveKind::Project, &file_name(SaveKind::Project, stem), rendered)
    }

    /// Save a tab's text as `LogicProgram_<name>.txt`, whitespace removed from the name.
    pub fn save_tab(&self, tab: &Tab) -> Result<ExportResult> {
        self.write(
            SaveKind::Program,
            &file_name(SaveKind::Program, tab.name()),
            tab.text(),
        )
    }

    pub fn save_output(&self, output: &OutputPanes) -> Result<ExportResult> {
        self.write(SaveKind::Output, OUTPUT_FILE_NAME, output.download_text())
    }

    fn write(&self, kind: SaveKind, file_name: &str, rendered: String) -> Result<ExportResult> {
        if !self.dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.dir).with_context(|| {
                format!("failed to create export directory: {}", self.dir.display())
            })?;
        }
        let path = self.dir.join(file_name);
        fs::write(&path, &rendered)
            .with_context(|| format!("failed to write {} to {}", kind.as_str(), path.display()))?;
        tracing::info!(kind = kind.as_str(), path = %path.display(), "saved");
        Ok(ExportResult {
            kind,
            rendered,
            output_path: path,
        })
    }
}

/// File name a save of `kind` uses for `name`.
pub fn file_name(kind: SaveKind, name: &str) -> String {
    match kind {
        SaveKind::Project => format!("{name}.{}", kind.extension()),
        SaveKind::Program => {
            let compact: String = name.chars().filter(|ch| !ch.is_whitespace()).collect();
            format!("{PROGRAM_FILE_PREFIX}{compact}.{}", kind.extension())
        }
        SaveKind::Output => OUTPUT_FILE_NAME.to_owned(),
    }
}

/// Read and classify a file opened by the user.
pub fn load_file(path: &Path) -> Result<Payload> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    ProjectDocument::classify(&text)
        .with_context(|| format!("invalid project in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tabs::TabSession;

    #[test]
    fn file_names_follow_save_kind() {
        assert_eq!(file_name(SaveKind::Project, "LoIDE_Project"), "LoIDE_Project.json");
        assert_eq!(file_name(SaveKind::Program, "L P 1"), "LogicProgram_LP1.txt");
        assert_eq!(file_name(SaveKind::Output, "ignored"), "LoIDE_output.txt");
    }

    #[test]
    fn save_kind_parses_aliases() {
        assert_eq!("JSON".parse::<SaveKind>(), Ok(SaveKind::Project));
        assert_eq!("tab".parse::<SaveKind>(), Ok(SaveKind::Program));
        assert!("pdf".parse::<SaveKind>().is_err());
    }

    #[test]
    fn saves_tab_and_output() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let exporter = Exporter::new(temp.path().join("out"), "LoIDE_Project");
        let tabs = TabSession::default();

        let saved = exporter.save_tab(tabs.active_tab())?;
        assert!(saved.output_path.ends_with("LogicProgram_LP1.txt"));

        let output = OutputPanes {
            model: "{a}".into(),
            error: "warn".into(),
            ..OutputPanes::default()
        };
        let saved = exporter.save_output(&output)?;
        assert_eq!(fs::read_to_string(saved.output_path)?, "{a}\nwarn");
        Ok(())
    }

    #[test]
    fn blank_project_name_uses_default() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let exporter = Exporter::new(temp.path(), "LoIDE_Project");
        let saved = exporter.save_project(&ProjectDocument::default(), Some("  "))?;
        assert!(saved.output_path.ends_with("LoIDE_Project.json"));
        assert!(matches!(load_file(&saved.output_path)?, Payload::Project(_)));
        Ok(())
    }
}
