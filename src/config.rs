use crate::brightness_table::{Band, BrightnessTable};

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const ENV_ADDRESS: &str = "HA_ADDRESS";
pub const ENV_PORT: &str = "HA_PORT";
pub const ENV_TOKEN: &str = "HA_TOKEN";
pub const ENV_ENTITY: &str = "HA_ENTITY";

pub const DEFAULT_CONFIG: &str = r#"(
    // Which display to control: Index(0), Bus(6), Model("DEL", "DELL U2719D") or Serial("8DNNHF2")
    monitor: Index(0),

    // What to do when the sensor or monitor can't be read: Continue (log and use 0) or Abort
    on_error: Continue,

    // Program used to talk DDC/CI to the monitor
    ddcutil: "ddcutil",

    // Replace the built-in lux -> brightness table. Bands are matched in the order listed.
    // bands: Some([
    //     (min: 0, max: 10, percentage: 10),
    //     (min: 10, max: 500, percentage: 60),
    // ]),
    bands: None,
)
"#;

/// Connection settings for the Home Assistant hub, taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaConfig {
    pub address: String,
    pub port: String,
    pub token: String,
    pub entity: String,
}

impl HaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup. Unset variables become empty strings.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default();
        HaConfig {
            address: get(ENV_ADDRESS),
            port: get(ENV_PORT),
            token: get(ENV_TOKEN),
            entity: get(ENV_ENTITY),
        }
    }

    /// Names of the variables that were unset or empty.
    pub fn missing_vars(&self) -> Vec<&'static str> {
        [
            (ENV_ADDRESS, &self.address),
            (ENV_PORT, &self.port),
            (ENV_TOKEN, &self.token),
            (ENV_ENTITY, &self.entity),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

/// Apply the error policy to unset `HA_*` variables: a warning under `Continue`, an error under
/// `Abort`.
pub fn check_missing_vars(ha: &HaConfig, on_error: ErrorPolicy) -> anyhow::Result<()> {
    let missing = ha.missing_vars();
    if missing.is_empty() {
        return Ok(());
    }

    let msg = format!("missing environment variables: {}", missing.join(", "));
    match on_error {
        ErrorPolicy::Continue => {
            tracing::warn!("{msg}");
            Ok(())
        }
        ErrorPolicy::Abort => Err(anyhow::anyhow!(msg)),
    }
}

/// Load variables from an env file into the process environment.
///
/// With no explicit path, a `.env` in the working directory is used if there is one. An explicit
/// path that can't be read is an error.
pub fn load_env_file(path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| anyhow::anyhow!("Could not load env file `{0}`: {e}", path.display()))?;
            tracing::info!("loaded environment from {}", path.display());
        }
        None => match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => tracing::debug!("no .env file found"),
            Err(e) => tracing::warn!("ignoring unreadable .env file: {e}"),
        },
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum MonitorId {
    /// Position in the list of detected displays
    Index(usize),
    Bus(u32),
    /// Manufacturer and model
    Model(String, String),
    Serial(String),
}

impl Default for MonitorId {
    fn default() -> Self {
        MonitorId::Index(0)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the failure and carry on with a zero/empty value
    #[default]
    Continue,
    /// Stop at the first failure
    Abort,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorId,
    pub on_error: ErrorPolicy,
    pub ddcutil: String,
    pub bands: Option<Vec<Band>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            monitor: MonitorId::default(),
            on_error: ErrorPolicy::default(),
            ddcutil: "ddcutil".to_string(),
            bands: None,
        }
    }
}

impl Config {
    pub fn from_str(conf: &str) -> Result<Self, anyhow::Error> {
        Ok(ron::from_str::<Config>(conf)?)
    }

    pub fn read_from_file<P: AsRef<Path>>(file: P) -> Result<Self, anyhow::Error> {
        Ok(ron::de::from_reader(BufReader::new(File::open(file)?))?)
    }

    /// The configured band table, or the built-in one.
    pub fn brightness_table(&self) -> BrightnessTable {
        match &self.bands {
            Some(bands) => BrightnessTable::from_bands(bands.clone()),
            None => BrightnessTable::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
        (
            monitor: Model("DEL", "DELL U2719D"),
            on_error: Abort,
            bands: Some([
                (min: 0, max: 100, percentage: 20),
                (min: 50, max: 500, percentage: 90),
            ]),
        )
    "#;

    #[test]
    fn test_deserialize_config() {
        let parsed = Config::from_str(TEST_CONFIG).unwrap();

        assert_eq!(
            parsed,
            Config {
                monitor: MonitorId::Model("DEL".to_string(), "DELL U2719D".to_string()),
                on_error: ErrorPolicy::Abort,
                ddcutil: "ddcutil".to_string(),
                bands: Some(vec![Band::new(0, 100, 20), Band::new(50, 500, 90)]),
            }
        );
        assert_eq!(20, parsed.brightness_table().percentage_for(75));
    }

    #[test]
    fn test_default_config_parses() {
        let parsed = Config::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
        assert_eq!(BrightnessTable::default(), parsed.brightness_table());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(Config::from_str("()").unwrap(), Config::default());
        assert_eq!(
            Config::from_str("(monitor: Bus(6))").unwrap().monitor,
            MonitorId::Bus(6)
        );
    }

    #[test]
    fn test_ha_config_from_lookup() {
        let vars = HashMap::from([
            (ENV_ADDRESS, "192.168.1.10"),
            (ENV_PORT, "8123"),
            (ENV_TOKEN, "abc"),
            (ENV_ENTITY, "sensor.office_lux"),
        ]);
        let conf = HaConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(
            conf,
            HaConfig {
                address: "192.168.1.10".to_string(),
                port: "8123".to_string(),
                token: "abc".to_string(),
                entity: "sensor.office_lux".to_string(),
            }
        );
        assert!(conf.missing_vars().is_empty());
    }

    #[test]
    fn test_ha_config_missing_vars() {
        let conf = HaConfig::from_lookup(|k| (k == ENV_PORT).then(|| "8123".to_string()));
        assert_eq!(conf.port, "8123");
        assert_eq!(conf.address, "");
        assert_eq!(conf.missing_vars(), vec![ENV_ADDRESS, ENV_TOKEN, ENV_ENTITY]);
    }

    #[test]
    fn test_missing_vars_policy() {
        let partial = HaConfig {
            port: "8123".to_string(),
            ..Default::default()
        };
        assert!(check_missing_vars(&partial, ErrorPolicy::Continue).is_ok());
        let err = check_missing_vars(&partial, ErrorPolicy::Abort).unwrap_err();
        assert!(err.to_string().contains(ENV_ADDRESS));

        let full = HaConfig {
            address: "hass.local".to_string(),
            port: "8123".to_string(),
            token: "abc".to_string(),
            entity: "sensor.lux".to_string(),
        };
        assert!(check_missing_vars(&full, ErrorPolicy::Continue).is_ok());
        assert!(check_missing_vars(&full, ErrorPolicy::Abort).is_ok());
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        assert!(load_env_file(Some(Path::new("/nonexistent/ha-brightness.env"))).is_err());
    }

    #[test]
    fn test_default_env_file_is_optional() {
        // whether or not a .env exists in the working directory, this never fails
        assert!(load_env_file(None).is_ok());
    }

    #[test]
    fn test_env_file_sets_variables() {
        let key = "HA_ADAPTIVE_BRIGHTNESS_TEST_PORT";
        let path = std::env::temp_dir().join(format!("ha-brightness-{}.env", std::process::id()));
        std::fs::write(&path, format!("{key}=8123\n")).unwrap();

        let res = load_env_file(Some(&path));
        std::fs::remove_file(&path).unwrap();

        res.unwrap();
        assert_eq!(std::env::var(key).as_deref(), Ok("8123"));
    }
}
