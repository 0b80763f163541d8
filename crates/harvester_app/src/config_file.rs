use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use engine_logging::engine_info;
use harvester_engine::{ExtractionRules, HarvestConfig, SchemaChoice};
use serde::{Deserialize, Serialize};

/// Everything the binary reads from its RON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub schema: SchemaChoice,
    pub extraction: ExtractionRules,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            schema: SchemaChoice::SearchTimeline,
            extraction: ExtractionRules::default(),
        }
    }
}

pub fn parse(text: &str) -> Result<AppConfig> {
    let config: AppConfig = ron::from_str(text).context("config is not valid RON")?;
    config.harvest.validate()?;
    Ok(config)
}

pub fn load(path: &Path) -> Result<AppConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("in {}", path.display()))?;
    engine_info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Group keys from the config plus an optional group list file.
pub fn merge_group_file(config: &mut AppConfig, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read group list {}", path.display()))?;
    let groups = harvester_core::parse_group_list(&text);
    engine_info!("Read {} groups from {:?}", groups.len(), path);
    config.harvest.groups.extend(groups);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_engine::{Pick, TableSchema};
    use tempfile::TempDir;

    #[test]
    fn parses_partial_config_with_defaults() {
        let config = parse(
            r#"(
                harvest: (
                    groups: ["rust", "Rust", "tokio"],
                    row_limit: Some(50),
                    pacing: (safe_rate_limits: false),
                ),
                schema: image_grid,
                extraction: (
                    identity: [(selector: "a.permalink", attr: Some("href"))],
                    text_fields: [
                        (name: "text", strategies: [(selector: "img", attr: Some("alt"), pick: longest)]),
                    ],
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.harvest.group_keys(), vec!["rust", "tokio"]);
        assert_eq!(config.harvest.row_limit, Some(50));
        assert_eq!(config.harvest.commit_batch, 20);
        assert!(!config.harvest.pacing.safe_rate_limits);
        assert_eq!(config.schema.resolve(), TableSchema::image_grid());
        assert_eq!(config.extraction.text_fields[0].strategies[0].pick, Pick::Longest);
    }

    #[test]
    fn custom_schema_round_trips_through_ron() {
        let config = AppConfig {
            schema: SchemaChoice::Custom(TableSchema::new("posts", ["text"], ["likes"])),
            ..AppConfig::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new()).unwrap();
        assert_eq!(parse(&text).unwrap(), config);
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert!(parse("(harvest: (commit_batch: 0))").is_err());
        assert!(parse("(harvest: (").is_err());
    }

    #[test]
    fn group_file_extends_configured_groups() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("groups.txt");
        fs::write(&path, "# tags to watch\n#rust,#tokio\n// paused\nserde # trailing note\n")
            .unwrap();
        let mut config = AppConfig::default();
        config.harvest.groups.push("Rust".to_string());

        merge_group_file(&mut config, &path).unwrap();
        assert_eq!(config.harvest.group_keys(), vec!["Rust", "tokio", "serde"]);
    }
}
