//! `smsbox.toml` configuration loading, following the same all-`Option`
//! `Raw*` → validated/defaulted split the forwarder service uses.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub group_id: String,
    pub obey_workers: usize,
    pub max_octets: usize,
}

#[derive(Debug, Clone)]
pub struct BearerboxConfig {
    pub host: String,
    pub port: u16,
    pub our_host: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SendsmsHttpConfig {
    pub bind: String,
    pub global_sender: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DlrBackendConfig {
    Sqlite {
        path: String,
        max_conns: usize,
    },
    Mongo {
        uri: String,
        database: String,
        collection: String,
    },
}

/// One `otaconfig` group (spec.md §4.8/§6), selected by `sendota`'s
/// `otaid` parameter.
#[derive(Debug, Clone)]
pub struct OtaConfig {
    pub id: String,
    pub profile: sms_proto::ota::OtaProfile,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub core: CoreConfig,
    pub bearerbox: BearerboxConfig,
    pub sendsms_http: SendsmsHttpConfig,
    pub dlr: DlrBackendConfig,
    pub translations_path: String,
    pub ota_configs: Vec<OtaConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    core: Option<RawCore>,
    bearerbox: Option<RawBearerbox>,
    sendsms_http: Option<RawSendsmsHttp>,
    dlr_sqlite: Option<RawDlrSqlite>,
    dlr_mongo: Option<RawDlrMongo>,
    translations_path: Option<String>,
    #[serde(default)]
    otaconfig: Vec<RawOtaConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawOtaConfig {
    id: Option<String>,
    ip: Option<String>,
    connection: Option<String>,
    phone: Option<String>,
    auth: Option<String>,
    user: Option<String>,
    password: Option<String>,
    speed: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

impl RawOtaConfig {
    fn into_config(self) -> Result<OtaConfig, ConfigError> {
        let id = self
            .id
            .ok_or_else(|| ConfigError::MissingField("otaconfig.id".to_string()))?;
        let connection = match self.connection.as_deref().unwrap_or("continuous") {
            "temporary" => sms_proto::ota::ConnectionMode::Temporary,
            "continuous" => sms_proto::ota::ConnectionMode::Continuous,
            "secure-temporary" => sms_proto::ota::ConnectionMode::SecureTemporary,
            "secure-continuous" => sms_proto::ota::ConnectionMode::SecureContinuous,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "otaconfig.connection".to_string(),
                    reason: format!("unknown connection mode {other:?}"),
                })
            }
        };
        let auth = match self.auth.as_deref().unwrap_or("normal") {
            "normal" => sms_proto::ota::AuthMode::Normal,
            "secure" => sms_proto::ota::AuthMode::Secure,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "otaconfig.auth".to_string(),
                    reason: format!("unknown auth mode {other:?}"),
                })
            }
        };
        let speed = match self.speed.as_deref().unwrap_or("9600") {
            "9600" => sms_proto::ota::Speed::Speed9600,
            "14400" => sms_proto::ota::Speed::Speed14400,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "otaconfig.speed".to_string(),
                    reason: format!("unknown speed {other:?}"),
                })
            }
        };
        Ok(OtaConfig {
            id,
            profile: sms_proto::ota::OtaProfile {
                bearer: sms_proto::ota::BEARER_DATA,
                ip: self.ip.unwrap_or_default(),
                connection,
                phone: self.phone.unwrap_or_default(),
                auth,
                user: self.user.unwrap_or_default(),
                password: self.password.unwrap_or_default(),
                call_type: sms_proto::ota::CALL_ISDN,
                speed,
                url: self.url.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            },
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawCore {
    group_id: Option<String>,
    obey_workers: Option<usize>,
    max_octets: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBearerbox {
    host: Option<String>,
    port: Option<u16>,
    our_host: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSendsmsHttp {
    bind: Option<String>,
    global_sender: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDlrSqlite {
    path: Option<String>,
    max_conns: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDlrMongo {
    uri: Option<String>,
    database: Option<String>,
    collection: Option<String>,
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_from_str(&toml_str)
}

pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let raw_core = raw.core.unwrap_or_default();
    let core = CoreConfig {
        group_id: raw_core.group_id.unwrap_or_else(|| "smsbox".to_string()),
        obey_workers: raw_core.obey_workers.unwrap_or(1),
        max_octets: raw_core.max_octets.unwrap_or(sms_split::DEFAULT_MAX_OCTETS),
    };

    let raw_bb = raw
        .bearerbox
        .ok_or_else(|| ConfigError::MissingField("bearerbox".to_string()))?;
    let bearerbox = BearerboxConfig {
        host: raw_bb
            .host
            .ok_or_else(|| ConfigError::MissingField("bearerbox.host".to_string()))?,
        port: raw_bb
            .port
            .ok_or_else(|| ConfigError::MissingField("bearerbox.port".to_string()))?,
        our_host: raw_bb.our_host,
    };

    let raw_http = raw.sendsms_http.unwrap_or_default();
    let sendsms_http = SendsmsHttpConfig {
        bind: raw_http.bind.unwrap_or_else(|| "0.0.0.0:13013".to_string()),
        global_sender: raw_http.global_sender,
    };

    let dlr = match (raw.dlr_sqlite, raw.dlr_mongo) {
        (Some(sqlite), None) => DlrBackendConfig::Sqlite {
            path: sqlite.path.unwrap_or_else(|| "smsbox-dlr.sqlite3".to_string()),
            max_conns: sqlite.max_conns.unwrap_or(4),
        },
        (None, Some(mongo)) => DlrBackendConfig::Mongo {
            uri: mongo
                .uri
                .ok_or_else(|| ConfigError::MissingField("dlr_mongo.uri".to_string()))?,
            database: mongo.database.unwrap_or_else(|| "smsbox".to_string()),
            collection: mongo.collection.unwrap_or_else(|| "dlr".to_string()),
        },
        (None, None) => DlrBackendConfig::Sqlite {
            path: "smsbox-dlr.sqlite3".to_string(),
            max_conns: 4,
        },
        (Some(_), Some(_)) => {
            return Err(ConfigError::InvalidValue {
                field: "dlr_sqlite/dlr_mongo".to_string(),
                reason: "only one DLR back-end may be configured".to_string(),
            })
        }
    };

    let translations_path = raw
        .translations_path
        .ok_or_else(|| ConfigError::MissingField("translations_path".to_string()))?;

    let ota_configs = raw
        .otaconfig
        .into_iter()
        .map(RawOtaConfig::into_config)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        core,
        bearerbox,
        sendsms_http,
        dlr,
        translations_path,
        ota_configs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let toml_str = r#"
            translations_path = "translations.toml"

            [bearerbox]
            host = "127.0.0.1"
            port = 13001
        "#;
        let cfg = load_from_str(toml_str).unwrap();
        assert_eq!(cfg.core.obey_workers, 1);
        assert_eq!(cfg.bearerbox.port, 13001);
        assert_eq!(cfg.sendsms_http.bind, "0.0.0.0:13013");
        matches!(cfg.dlr, DlrBackendConfig::Sqlite { .. });
    }

    #[test]
    fn missing_bearerbox_is_an_error() {
        let toml_str = r#"translations_path = "t.toml""#;
        assert!(load_from_str(toml_str).is_err());
    }

    #[test]
    fn otaconfig_groups_are_parsed_and_keyed_by_id() {
        let toml_str = r#"
            translations_path = "t.toml"

            [bearerbox]
            host = "127.0.0.1"
            port = 13001

            [[otaconfig]]
            id = "default"
            ip = "10.0.0.1"
            phone = "5551234"
        "#;
        let cfg = load_from_str(toml_str).unwrap();
        assert_eq!(cfg.ota_configs.len(), 1);
        assert_eq!(cfg.ota_configs[0].id, "default");
        assert_eq!(cfg.ota_configs[0].profile.ip, "10.0.0.1");
    }

    #[test]
    fn both_dlr_backends_configured_is_rejected() {
        let toml_str = r#"
            translations_path = "t.toml"

            [bearerbox]
            host = "127.0.0.1"
            port = 1

            [dlr_sqlite]
            path = "x.sqlite3"

            [dlr_mongo]
            uri = "mongodb://localhost"
        "#;
        assert!(load_from_str(toml_str).is_err());
    }
}
