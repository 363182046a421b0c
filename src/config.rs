use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::augment::{AugmentOptions, TocbotOptions};
use crate::error::{Error, Result};
use crate::release_train::{self, ReleaseTrains};

pub const CONFIG_ENV: &str = "REFDOC_AUGMENT_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub release_train: ReleaseTrainConfig,
    pub page: PageConfig,
    pub widget: TocbotOptions,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseTrainConfig {
    pub default: String,
    pub versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub index_file: String,
    pub tocbot_script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            release_train: ReleaseTrainConfig::default(),
            page: PageConfig::default(),
            widget: TocbotOptions::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ReleaseTrainConfig {
    fn default() -> Self {
        Self {
            default: release_train::DEFAULT_TRAIN.to_string(),
            versions: release_train::default_versions(),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            index_file: "index.html".to_string(),
            tocbot_script: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7878),
        }
    }
}

impl AppConfig {
    /// Loads the config from `explicit`, or from the default location.
    ///
    /// A missing or broken file at the default location falls back to
    /// defaults; an explicitly requested file must exist and parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => config_path(),
        };

        match fs::read_to_string(&path) {
            Ok(raw) => match Self::from_yaml(&raw, &path) {
                Ok(cfg) => {
                    debug!("loaded config from {}", path.display());
                    Ok(cfg)
                }
                Err(err) if explicit.is_none() => {
                    warn!("{err}; using defaults");
                    Ok(AppConfig::default())
                }
                Err(err) => Err(err),
            },
            Err(err) if err.kind() == ErrorKind::NotFound && explicit.is_none() => {
                debug!("no config at {}; using defaults", path.display());
                Ok(AppConfig::default())
            }
            Err(err) => Err(Error::io(path, err)),
        }
    }

    fn from_yaml(raw: &str, path: &Path) -> Result<Self> {
        let mut cfg: AppConfig = serde_yaml::from_str(raw).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let env_map = EnvSource::new(path);
        cfg.resolve_env(&env_map);
        cfg.normalize();
        Ok(cfg)
    }

    fn normalize(&mut self) {
        let defaults = AppConfig::default();

        normalize_string(&mut self.release_train.default, &defaults.release_train.default);
        self.release_train.versions = std::mem::take(&mut self.release_train.versions)
            .into_iter()
            .map(|(version, train)| (version.trim().to_string(), train.trim().to_string()))
            .filter(|(version, train)| !version.is_empty() && !train.is_empty())
            .collect();

        normalize_string(&mut self.page.index_file, &defaults.page.index_file);
        self.page.tocbot_script = self
            .page
            .tocbot_script
            .take()
            .map(|src| src.trim().to_string())
            .filter(|src| !src.is_empty());

        normalize_string(
            &mut self.widget.content_selector,
            &defaults.widget.content_selector,
        );
        normalize_string(
            &mut self.widget.heading_selector,
            &defaults.widget.heading_selector,
        );
        normalize_string(
            &mut self.widget.position_fixed_selector,
            &defaults.widget.position_fixed_selector,
        );
    }

    fn resolve_env(&mut self, source: &EnvSource) {
        resolve_string(
            &mut self.release_train.default,
            "release_train.default",
            source,
        );
        for (version, train) in self.release_train.versions.iter_mut() {
            resolve_string(train, &format!("release_train.versions.{version}"), source);
        }

        resolve_string(&mut self.page.index_file, "page.index_file", source);
        if let Some(src) = self.page.tocbot_script.as_mut() {
            resolve_string(src, "page.tocbot_script", source);
        }

        resolve_string(
            &mut self.widget.content_selector,
            "widget.contentSelector",
            source,
        );
        resolve_string(
            &mut self.widget.heading_selector,
            "widget.headingSelector",
            source,
        );
        resolve_string(
            &mut self.widget.position_fixed_selector,
            "widget.positionFixedSelector",
            source,
        );
    }

    pub fn release_trains(&self) -> ReleaseTrains {
        ReleaseTrains::new(
            self.release_train.versions.clone(),
            self.release_train.default.clone(),
        )
    }

    pub fn augment_options(&self) -> AugmentOptions {
        AugmentOptions {
            index_file: self.page.index_file.clone(),
            tocbot: self.widget.clone(),
            tocbot_script: self.page.tocbot_script.clone(),
        }
    }
}

fn normalize_string(value: &mut String, default: &str) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    };
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    default_config_path()
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|mut dir| {
            dir.push(".refdoc-augment");
            dir.push("config.yaml");
            dir
        })
        .unwrap_or_else(|| PathBuf::from(".refdoc-augment/config.yaml"))
}

/// Writes the commented default config to `path`. Never overwrites.
pub fn write_default_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::ConfigExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
    file.write_all(DEFAULT_CONFIG_TEMPLATE.as_bytes())
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}

const DEFAULT_CONFIG_TEMPLATE: &str = r##"# refdoc-augment configuration
# You can reference environment variables via $VAR or ${VAR}. Values are resolved
# from the process environment, a .env file next to this config, then the current
# working directory, and finally $HOME/.env.
release_train:
  # Used for versions missing from the table below.
  default: Angel.SR3
  versions:
    "1.0.2.RELEASE": Angel.SR2
page:
  index_file: index.html
  # Uncomment when the page template does not load tocbot itself.
  # tocbot_script: js/tocbot/tocbot.min.js
widget:
  contentSelector: "#content"
  headingSelector: "h1, h2, h3, h4, h5"
  positionFixedSelector: body
  fixedSidebarOffset: 90
  smoothScroll: false
server:
  addr: "127.0.0.1:7878"
"##;

struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    fn new(config_path: &Path) -> Self {
        let mut vars: HashMap<String, String> = env::vars().collect();

        Self::merge_env_file(config_path.parent(), &mut vars);
        Self::merge_env_file(env::current_dir().ok().as_deref(), &mut vars);
        Self::merge_env_file(dirs::home_dir().as_deref(), &mut vars);

        Self { vars }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    fn merge_env_file(dir: Option<&Path>, vars: &mut HashMap<String, String>) {
        let Some(dir) = dir else {
            return;
        };
        let env_path = dir.join(".env");
        if let Ok(iter) = dotenvy::from_path_iter(&env_path) {
            for (key, value) in iter.flatten() {
                vars.entry(key).or_insert(value);
            }
        }
    }
}

fn resolve_string(value: &mut String, field: &str, env: &EnvSource) {
    let trimmed = value.trim();
    if let Some(name) = extract_env_ref(trimmed) {
        if let Some(resolved) = env.lookup(name) {
            *value = resolved.to_string();
        } else {
            warn!("environment placeholder ${name} for {field} not found; leaving empty");
            value.clear();
        }
    }
}

fn extract_env_ref(value: &str) -> Option<&str> {
    if let Some(rest) = value.strip_prefix("${") {
        return rest.strip_suffix('}');
    }
    if let Some(rest) = value.strip_prefix('$') {
        if rest.chars().all(is_valid_env_char) && !rest.is_empty() {
            return Some(rest);
        }
    }
    None
}

fn is_valid_env_char(c: char) -> bool {
    matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '_')
}
