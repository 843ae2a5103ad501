use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tasksift_core::{Combinator, Criterion, SelectOption};

/// Directory holding project configuration and the default database.
pub const CONFIG_DIR: &str = ".tasksift";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DATABASE: &str = "tasks.db";
const DEFAULT_PREVIEW_LIMIT: usize = 20;

/// Top-level project configuration loaded from `.tasksift/config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    /// Database location.
    #[serde(default)]
    pub store: StoreConfig,
    /// Filter editor behaviour.
    #[serde(default)]
    pub editor: EditorConfig,
    /// Project-specific criteria added to the built-in catalog.
    #[serde(default)]
    pub criteria: Vec<CriterionConfig>,
}

impl ProjectConfig {
    /// Load configuration from a project directory; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or when it
    /// defines invalid criteria.
    pub fn from_workdir(workdir: impl AsRef<Path>) -> Result<Self> {
        let config_path = workdir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        Ok(config)
    }

    /// Absolute database path for a project rooted at `workdir`.
    #[must_use]
    pub fn database_path(&self, workdir: impl AsRef<Path>) -> PathBuf {
        let workdir = workdir.as_ref();
        self.store.path.as_ref().map_or_else(
            || workdir.join(CONFIG_DIR).join(DEFAULT_DATABASE),
            |path| workdir.join(path),
        )
    }

    /// Build the configured criteria.
    ///
    /// # Errors
    /// Returns the first criterion that fails to build.
    pub fn custom_criteria(&self) -> Result<Vec<Criterion>> {
        self.criteria.iter().map(CriterionConfig::build).collect()
    }

    fn validate(&self) -> Result<()> {
        self.editor.validate()?;
        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if !seen.insert(criterion.identifier.as_str()) {
                bail!("duplicate criterion identifier: {}", criterion.identifier);
            }
        }
        self.custom_criteria().map(drop)
    }
}

/// `[store]` block.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// Database file, relative to the project directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[editor]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    /// Combinator given to the first row a user adds.
    #[serde(default = "EditorConfig::default_first_combinator")]
    pub first_combinator: Combinator,
    /// Number of matching tasks shown in previews.
    #[serde(default = "EditorConfig::default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            first_combinator: Self::default_first_combinator(),
            preview_limit: Self::default_preview_limit(),
        }
    }
}

impl EditorConfig {
    const fn default_first_combinator() -> Combinator {
        Combinator::Intersect
    }

    const fn default_preview_limit() -> usize {
        DEFAULT_PREVIEW_LIMIT
    }

    /// Combinator for a row appended to a list of `len` rows.
    #[must_use]
    pub const fn combinator_for_new_row(&self, len: usize) -> Combinator {
        if len <= 1 {
            self.first_combinator
        } else {
            Combinator::Intersect
        }
    }

    fn validate(&self) -> Result<()> {
        if self.first_combinator == Combinator::Universe {
            bail!("editor.first_combinator must be one of and, or, not");
        }
        if self.preview_limit == 0 {
            bail!("editor.preview_limit must be greater than zero");
        }
        Ok(())
    }
}

/// Shape of a configured criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKindConfig {
    /// No value.
    Boolean,
    /// One option.
    Single,
    /// One or more options.
    Multi,
    /// Free text.
    Text,
}

/// One `[[criteria]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CriterionConfig {
    /// Identifier stored in persisted filters.
    pub identifier: String,
    /// Label shown in pickers.
    pub title: String,
    /// Criterion kind.
    pub kind: CriterionKindConfig,
    /// Sub-select yielding task ids, with one `?` unless boolean.
    pub sql: String,
    /// Options for select kinds.
    #[serde(default)]
    pub options: Vec<SelectOption>,
    /// Defaults for new tasks, `$?` standing for the selected value.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// Prompt for text kinds.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Input hint for text kinds.
    #[serde(default)]
    pub hint: Option<String>,
}

impl CriterionConfig {
    fn build(&self) -> Result<Criterion> {
        let criterion = match self.kind {
            CriterionKindConfig::Boolean => Criterion::boolean(&self.identifier, &self.title, &self.sql),
            CriterionKindConfig::Single => Criterion::single_select(
                &self.identifier,
                &self.title,
                &self.sql,
                self.options.clone(),
                self.defaults.clone(),
            ),
            CriterionKindConfig::Multi => Criterion::multi_select(
                &self.identifier,
                &self.title,
                &self.sql,
                self.options.clone(),
                self.defaults.clone(),
            ),
            CriterionKindConfig::Text => Criterion::text_input(
                &self.identifier,
                &self.title,
                &self.sql,
                self.prompt.clone().unwrap_or_else(|| self.title.clone()),
                self.hint.clone().unwrap_or_default(),
            ),
        }?;
        if matches!(self.kind, CriterionKindConfig::Single | CriterionKindConfig::Multi) && self.options.is_empty() {
            bail!("criterion `{}` needs at least one option", self.identifier);
        }
        Ok(criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tasksift_core::OptionValueKind;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) -> Result<()> {
        let cfg_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&cfg_dir)?;
        let mut file = fs::File::create(cfg_dir.join(CONFIG_FILE))?;
        writeln!(file, "{contents}")?;
        Ok(())
    }

    #[test]
    fn missing_config_returns_defaults() -> Result<()> {
        let dir = tempdir()?;
        let cfg = ProjectConfig::from_workdir(dir.path())?;
        assert_eq!(cfg.editor.first_combinator, Combinator::Intersect);
        assert_eq!(cfg.editor.preview_limit, DEFAULT_PREVIEW_LIMIT);
        assert!(cfg.criteria.is_empty());
        assert_eq!(
            cfg.database_path(dir.path()),
            dir.path().join(CONFIG_DIR).join(DEFAULT_DATABASE)
        );
        Ok(())
    }

    #[test]
    fn load_editor_store_and_criteria() -> Result<()> {
        let dir = tempdir()?;
        write_config(
            dir.path(),
            r#"
[store]
path = "data/todo.db"

[editor]
first_combinator = "or"
preview_limit = 5

[[criteria]]
identifier = "estimate"
title = "Estimate at most"
kind = "single"
sql = "SELECT tasks._id FROM tasks WHERE tasks.importance <= ?"
options = [{ label = "small", value = "1", value_kind = "resolved" }, { label = "large", value = "3" }]
defaults = { importance = "$?" }
"#,
        )?;

        let cfg = ProjectConfig::from_workdir(dir.path())?;
        assert_eq!(cfg.editor.first_combinator, Combinator::Add);
        assert_eq!(cfg.editor.combinator_for_new_row(1), Combinator::Add);
        assert_eq!(cfg.editor.combinator_for_new_row(2), Combinator::Intersect);
        assert_eq!(cfg.editor.preview_limit, 5);
        assert_eq!(cfg.database_path(dir.path()), dir.path().join("data/todo.db"));
        let criteria = cfg.custom_criteria()?;
        assert_eq!(criteria.len(), 1);
        let options = criteria[0].options();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].value_kind, OptionValueKind::Resolved);
        assert_eq!(options[1].value_kind, OptionValueKind::Text);
        Ok(())
    }

    #[test]
    fn malformed_template_fails_the_load() -> Result<()> {
        let dir = tempdir()?;
        write_config(
            dir.path(),
            r#"
[[criteria]]
identifier = "broken"
title = "Broken"
kind = "text"
sql = "SELECT tasks._id FROM tasks"
"#,
        )?;
        let Err(err) = ProjectConfig::from_workdir(dir.path()) else {
            panic!("template without placeholder should error");
        };
        assert!(format!("{err:#}").contains("malformed SQL template"));
        Ok(())
    }

    #[test]
    fn duplicate_criteria_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(
            dir.path(),
            r#"
[[criteria]]
identifier = "mine"
title = "Mine"
kind = "boolean"
sql = "SELECT tasks._id FROM tasks"

[[criteria]]
identifier = "mine"
title = "Mine again"
kind = "boolean"
sql = "SELECT tasks._id FROM tasks"
"#,
        )?;
        let Err(err) = ProjectConfig::from_workdir(dir.path()) else {
            panic!("duplicate criterion should error");
        };
        assert!(format!("{err:#}").contains("duplicate criterion identifier"));
        Ok(())
    }

    #[test]
    fn universe_is_not_a_valid_first_combinator() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[editor]\nfirst_combinator = \"universe\"")?;
        assert!(ProjectConfig::from_workdir(dir.path()).is_err());
        Ok(())
    }
}
