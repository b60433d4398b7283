//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::tabs::BufferAppearance;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".loide/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub editor: Editor,
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default = "Server::default_api_url")]
    pub api_url: String,
    /// How long the CLI waits for a response before giving up.
    #[serde(default = "Server::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Server {
    fn default_api_url() -> String {
        "ws://localhost:8084".into()
    }

    fn default_request_timeout_secs() -> u64 {
        30
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    #[serde(default = "Editor::default_theme")]
    pub theme: String,
    #[serde(default = "Editor::default_dark_theme")]
    pub dark_theme: String,
    #[serde(default = "Editor::default_font_size")]
    pub font_size: u32,
    #[serde(default = "Editor::default_font_size")]
    pub output_font_size: u32,
}

impl Editor {
    fn default_theme() -> String {
        "ace/theme/tomorrow".into()
    }

    fn default_dark_theme() -> String {
        "ace/theme/idle_fingers".into()
    }

    fn default_font_size() -> u32 {
        15
    }

    /// Appearance handed to every new editor buffer.
    pub fn appearance(&self) -> BufferAppearance {
        BufferAppearance {
            theme: self.theme.clone(),
            font_size: self.font_size,
            ..BufferAppearance::default()
        }
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self {
            theme: Self::default_theme(),
            dark_theme: Self::default_dark_theme(),
            font_size: Self::default_font_size(),
            output_font_size: Self::default_font_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Default file name stem for saved projects.
    #[serde(default = "Project::default_name")]
    pub name: String,
    /// Directory of the local storage file. Falls back to the user data directory.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl Project {
    fn default_name() -> String {
        "LoIDE_Project".into()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            storage_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logging {
    #[serde(default = "Logging::default_level")]
    pub level: String,
}

impl Logging {
    fn default_level() -> String {
        "info".into()
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    api_url: Option<String>,
    log_level: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            api_url: env::var("LOIDE_API_URL").ok(),
            log_level: env::var("LOIDE_LOG").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(api_url: &str, log_level: &str) -> Self {
        Self {
            api_url: Some(api_url.to_owned()),
            log_level: Some(log_level.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    /// Load defaults and env overrides, then the file at `path` instead of the usual locations.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_layers(None, Some(path.to_path_buf()), EnvOverrides::from_env())
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            server: merge_server(self.server, other.server),
            editor: merge_editor(self.editor, other.editor),
            project: merge_project(self.project, other.project),
            logging: Logging {
                level: choose(self.logging.level, other.logging.level, Logging::default_level),
            },
        }
    }
}

fn merge_server(base: Server, overlay: Server) -> Server {
    Server {
        api_url: choose(base.api_url, overlay.api_url, Server::default_api_url),
        request_timeout_secs: choose(
            base.request_timeout_secs,
            overlay.request_timeout_secs,
            Server::default_request_timeout_secs,
        ),
    }
}

fn merge_editor(base: Editor, overlay: Editor) -> Editor {
    Editor {
        theme: choose(base.theme, overlay.theme, Editor::default_theme),
        dark_theme: choose(base.dark_theme, overlay.dark_theme, Editor::default_dark_theme),
        font_size: choose(base.font_size, overlay.font_size, Editor::default_font_size),
        output_font_size: choose(
            base.output_font_size,
            overlay.output_font_size,
            Editor::default_font_size,
        ),
    }
}

fn merge_project(base: Project, overlay: Project) -> Project {
    Project {
        name: choose(base.name, overlay.name, Project::default_name),
        storage_dir: overlay.storage_dir.or(base.storage_dir),
    }
}

/// Overlay values equal to the built-in default do not override the base layer.
fn choose<T: PartialEq>(base: T, overlay: T, default_fn: fn() -> T) -> T {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("loide/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(api_url) = env.api_url {
        config.server.api_url = api_url;
    }
    if let Some(level) = env.log_level {
        config.logging.level = level;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_no_files() {
        let config = Config::load_with_layers(None, None, EnvOverrides::default())
            .expect("load default config");
        assert_eq!(config.server.api_url, "ws://localhost:8084");
        assert_eq!(config.editor.font_size, 15);
        assert_eq!(config.project.name, "LoIDE_Project");
        assert_eq!(config.project.storage_dir, None);
    }

    #[test]
    fn merge_global_and_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            r#"
[server]
api_url = "ws://solver.example:9000"
[editor]
font_size = 18
"#,
        )?;
        let workspace = temp.path().join("workspace.toml");
        fs::write(
            &workspace,
            r#"
[editor]
theme = "ace/theme/monokai"
[project]
storage_dir = "state"
"#,
        )?;

        let config =
            Config::load_with_layers(Some(global), Some(workspace), EnvOverrides::default())?;
        assert_eq!(config.server.api_url, "ws://solver.example:9000");
        assert_eq!(config.editor.font_size, 18);
        assert_eq!(config.editor.theme, "ace/theme/monokai");
        assert_eq!(config.project.storage_dir, Some(PathBuf::from("state")));
        Ok(())
    }

    #[test]
    fn env_overrides_take_precedence() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let workspace = temp.path().join("config.toml");
        fs::write(&workspace, "[server]\napi_url = \"ws://file:1\"\n")?;

        let overrides = EnvOverrides::for_tests("ws://env:2", "debug");
        let config = Config::load_with_layers(None, Some(workspace), overrides)?;
        assert_eq!(config.server.api_url, "ws://env:2");
        assert_eq!(config.logging.level, "debug");
        Ok(())
    }

    #[test]
    fn invalid_toml_is_reported() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        fs::write(&path, "[server\n")?;
        let err = Config::load_with_layers(None, Some(path), EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("failed to parse TOML config"));
        Ok(())
    }

    #[test]
    fn editor_appearance_uses_configured_theme() {
        let editor = Editor {
            theme: "ace/theme/monokai".into(),
            font_size: 20,
            ..Editor::default()
        };
        let appearance = editor.appearance();
        assert_eq!(appearance.theme, "ace/theme/monokai");
        assert_eq!(appearance.font_size, 20);
        assert_eq!(appearance.mode, "ace/mode/text");
    }
}
