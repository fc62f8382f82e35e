use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use planner_core::materialization::MaterializationConfig;
use planner_core::timezone::validate_timezone;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding tasks and their occurrences
    pub database_path: String,
    /// Timezone given to new tasks when `--timezone` is omitted (IANA name)
    pub default_timezone: String,
    pub materialization: MaterializationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "planner.db".to_string(),
            default_timezone: detect_system_timezone(),
            materialization: MaterializationConfig::default(),
        }
    }
}

impl Config {
    /// Layers `planner.toml` and `PLANNER_*` variables over the defaults.
    ///
    /// Nested keys use a double underscore, e.g. `PLANNER_MATERIALIZATION__HORIZON_DAYS`.
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("planner.toml"))
            .merge(Env::prefixed("PLANNER_").split("__"))
    }
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(tz) = std::fs::read_to_string("/etc/timezone") {
            let tz = tz.trim();
            if validate_timezone(tz).is_ok() {
                return tz.to_string();
            }
        }
    }

    if let Ok(local_tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&local_tz).is_ok() {
            return local_tz;
        }
    }

    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = Config::new()?;
            assert_eq!(config.database_path, "planner.db");
            assert_eq!(config.materialization, MaterializationConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_and_environment_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "planner.toml",
                r#"
                database_path = "from-file.db"
                default_timezone = "Europe/Berlin"

                [materialization]
                horizon_days = 30
                "#,
            )?;
            jail.set_env("PLANNER_DATABASE_PATH", "from-env.db");
            jail.set_env("PLANNER_MATERIALIZATION__GRACE_DAYS", "7");

            let config = Config::new()?;
            assert_eq!(config.database_path, "from-env.db");
            assert_eq!(config.default_timezone, "Europe/Berlin");
            assert_eq!(config.materialization.horizon_days, 30);
            assert_eq!(config.materialization.grace_days, 7);
            assert_eq!(config.materialization.max_results, 500);
            Ok(())
        });
    }
}
