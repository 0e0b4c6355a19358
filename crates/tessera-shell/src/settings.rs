use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ShellError, ShellResult};

/// Host name that matches every request.
pub const ANY_HOST: &str = "*";

/// One host name or several.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostBinding {
    One(String),
    Many(Vec<String>),
}

impl Default for HostBinding {
    fn default() -> Self {
        Self::One(ANY_HOST.to_string())
    }
}

impl HostBinding {
    pub fn hosts(&self) -> Vec<&str> {
        match self {
            Self::One(host) => vec![host.as_str()],
            Self::Many(hosts) => hosts.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Settings of one tenant, read from `settings.toml` or `settings.json` in
/// the site directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub name: String,
    /// Site directory. Defaults to the directory the settings came from.
    pub root_path: PathBuf,
    pub host: HostBinding,
    /// Port to answer on; `None` answers on any port.
    pub port: Option<u16>,
    pub tls: Option<TlsConfig>,
    /// Enabled features and their configuration. A feature set to `false`
    /// counts as disabled.
    pub features: IndexMap<String, Value>,
    pub active: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            name: "default".into(),
            root_path: PathBuf::from("."),
            host: HostBinding::default(),
            port: None,
            tls: None,
            features: IndexMap::new(),
            active: true,
        }
    }
}

impl ShellSettings {
    pub fn from_toml_str(text: &str, path: &Path) -> ShellResult<Self> {
        toml::from_str(text).map_err(|e| ShellError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(text: &str, path: &Path) -> ShellResult<Self> {
        serde_json::from_str(text).map_err(|e| ShellError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// The settings file in `dir`, if it has one.
    pub fn file_in(dir: &Path) -> Option<PathBuf> {
        ["settings.toml", "settings.json"]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load the settings for the site in `dir`.
    ///
    /// Without a settings file the defaults apply. An unset `name` becomes
    /// the directory name and an unset `root_path` becomes `dir`.
    pub fn from_dir(dir: &Path) -> ShellResult<Self> {
        let mut settings = match Self::file_in(dir) {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ShellError::Io {
                    path: path.clone(),
                    source,
                })?;
                if path.extension().is_some_and(|ext| ext == "json") {
                    Self::from_json_str(&text, &path)?
                } else {
                    Self::from_toml_str(&text, &path)?
                }
            }
            None => Self::default(),
        };
        let defaults = Self::default();
        if settings.name == defaults.name {
            if let Some(dir_name) = dir.file_name() {
                settings.name = dir_name.to_string_lossy().into_owned();
            }
        }
        if settings.root_path == defaults.root_path {
            settings.root_path = dir.to_path_buf();
        }
        Ok(settings)
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into(), Value::Bool(true));
        self
    }

    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.features
            .get(feature)
            .is_some_and(|config| *config != Value::Bool(false))
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.host.hosts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_settings() {
        let settings = ShellSettings::from_toml_str(
            r#"
                name = "blog"
                host = ["example.com", "www.example.com"]
                port = 8080

                [features]
                comments = { moderation = true }
                search = false

                [tls]
                cert_path = "cert.pem"
                key_path = "key.pem"
            "#,
            Path::new("settings.toml"),
        )
        .unwrap();
        assert_eq!(settings.name, "blog");
        assert_eq!(settings.hosts(), vec!["example.com", "www.example.com"]);
        assert_eq!(settings.port, Some(8080));
        assert!(settings.is_feature_enabled("comments"));
        assert!(!settings.is_feature_enabled("search"));
        assert!(!settings.is_feature_enabled("missing"));
        assert!(settings.active);
        assert_eq!(settings.tls.unwrap().cert_path, PathBuf::from("cert.pem"));
    }

    #[test]
    fn json_settings_with_single_host() {
        let settings = ShellSettings::from_json_str(
            r#"{ "name": "docs", "host": "docs.local", "features": { "f1": {} } }"#,
            Path::new("settings.json"),
        )
        .unwrap();
        assert_eq!(settings.hosts(), vec!["docs.local"]);
        assert_eq!(settings.port, None);
        assert!(settings.is_feature_enabled("f1"));
    }

    #[test]
    fn from_dir_fills_name_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("acme");
        std::fs::create_dir(&site).unwrap();

        let settings = ShellSettings::from_dir(&site).unwrap();
        assert_eq!(settings.name, "acme");
        assert_eq!(settings.root_path, site);
        assert_eq!(settings.hosts(), vec![ANY_HOST]);

        std::fs::write(site.join("settings.json"), r#"{ "name": "acme-site" }"#).unwrap();
        assert_eq!(ShellSettings::from_dir(&site).unwrap().name, "acme-site");
    }

    #[test]
    fn bad_settings_name_the_file() {
        let err = ShellSettings::from_toml_str("port = \"eighty\"", Path::new("site/settings.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("site/settings.toml"));
    }
}
