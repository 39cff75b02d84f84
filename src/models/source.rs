// file: src/models/source.rs
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

/// A configured remote calendar provider.
///
/// The source list endpoint only returns `id` and `name`; `settings` and
/// `auth` are filled in by the details endpoint or by the user when creating
/// a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSource", into = "RawSource")]
pub struct Source {
    pub id: String,
    pub name: String,
    pub settings: Option<SourceSettings>,
    pub auth: Option<AuthMethod>,
}

/// Protocol-specific connection settings.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSettings {
    Caldav { url: Url },
    Ical(IcalLocation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IcalLocation {
    Remote { url: Url },
    Local { path: String },
    Database { file: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl SourceSettings {
    pub fn type_tag(&self) -> &'static str {
        match self {
            SourceSettings::Caldav { .. } => "caldav",
            SourceSettings::Ical(_) => "ical",
        }
    }
}

impl IcalLocation {
    pub fn location_tag(&self) -> &'static str {
        match self {
            IcalLocation::Remote { .. } => "remote",
            IcalLocation::Local { .. } => "local",
            IcalLocation::Database { .. } => "database",
        }
    }
}

impl AuthMethod {
    pub fn type_tag(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Basic { .. } => "basic",
            AuthMethod::Bearer { .. } => "bearer",
        }
    }
}

impl Source {
    pub fn new<S: Into<String>>(name: S, settings: SourceSettings, auth: AuthMethod) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            settings: Some(settings),
            auth: Some(auth),
        }
    }

    pub fn caldav<S: Into<String>>(name: S, url: Url, auth: AuthMethod) -> Self {
        Self::new(name, SourceSettings::Caldav { url }, auth)
    }
}

/// Which source fields an edit touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceChanges {
    pub name: bool,
    pub settings: bool,
    pub auth: bool,
}

impl SourceChanges {
    pub fn all() -> Self {
        Self {
            name: true,
            settings: true,
            auth: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.name || self.settings || self.auth)
    }
}

// Wire representation: `{"id", "name", "type", "settings", "auth_type", "auth"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSource {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<Value>,
}

fn string_field(object: Option<&Value>, field: &str) -> Result<String, String> {
    object
        .and_then(|v| v.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing field '{}'", field))
}

fn url_field(object: Option<&Value>, field: &str) -> Result<Url, String> {
    let raw = string_field(object, field)?;
    Url::parse(&raw).map_err(|e| format!("invalid url '{}': {}", raw, e))
}

fn parse_settings(kind: &str, settings: Option<&Value>) -> Result<SourceSettings, String> {
    match kind {
        "caldav" => Ok(SourceSettings::Caldav {
            url: url_field(settings, "url")?,
        }),
        "ical" => {
            let location = match string_field(settings, "location")?.as_str() {
                "remote" => IcalLocation::Remote {
                    url: url_field(settings, "url")?,
                },
                "local" => IcalLocation::Local {
                    path: string_field(settings, "path")?,
                },
                "database" => IcalLocation::Database {
                    file: string_field(settings, "file")?,
                },
                other => return Err(format!("unsupported ical location '{}'", other)),
            };
            Ok(SourceSettings::Ical(location))
        }
        other => Err(format!("unsupported source type '{}'", other)),
    }
}

fn parse_auth(kind: &str, auth: Option<&Value>) -> Result<AuthMethod, String> {
    match kind {
        "none" => Ok(AuthMethod::None),
        "basic" => Ok(AuthMethod::Basic {
            username: string_field(auth, "username")?,
            password: string_field(auth, "password")?,
        }),
        "bearer" => Ok(AuthMethod::Bearer {
            token: string_field(auth, "token")?,
        }),
        other => Err(format!("unsupported auth type '{}'", other)),
    }
}

impl TryFrom<RawSource> for Source {
    type Error = String;

    fn try_from(raw: RawSource) -> Result<Self, Self::Error> {
        let settings = match raw.kind.as_deref() {
            None | Some("") => None,
            Some(kind) => Some(parse_settings(kind, raw.settings.as_ref())?),
        };
        let auth = match raw.auth_type.as_deref() {
            None | Some("") => None,
            Some(kind) => Some(parse_auth(kind, raw.auth.as_ref())?),
        };
        Ok(Source {
            id: raw.id,
            name: raw.name,
            settings,
            auth,
        })
    }
}

impl From<Source> for RawSource {
    fn from(source: Source) -> Self {
        let (kind, settings) = match &source.settings {
            None => (None, None),
            Some(settings) => {
                let value = match settings {
                    SourceSettings::Caldav { url } => json!({ "url": url.as_str() }),
                    SourceSettings::Ical(location) => {
                        let mut map = Map::new();
                        map.insert("location".into(), json!(location.location_tag()));
                        match location {
                            IcalLocation::Remote { url } => map.insert("url".into(), json!(url.as_str())),
                            IcalLocation::Local { path } => map.insert("path".into(), json!(path)),
                            IcalLocation::Database { file } => map.insert("file".into(), json!(file)),
                        };
                        Value::Object(map)
                    }
                };
                (Some(settings.type_tag().to_string()), Some(value))
            }
        };
        let (auth_type, auth) = match &source.auth {
            None => (None, None),
            Some(auth) => {
                let value = match auth {
                    AuthMethod::None => json!({}),
                    AuthMethod::Basic { username, password } => {
                        json!({ "username": username, "password": password })
                    }
                    AuthMethod::Bearer { token } => json!({ "token": token }),
                };
                (Some(auth.type_tag().to_string()), Some(value))
            }
        };
        RawSource {
            id: source.id,
            name: source.name,
            kind,
            settings,
            auth_type,
            auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_entry_without_settings() {
        let source: Source = serde_json::from_str(r#"{"id":"s1","name":"Home"}"#).unwrap();
        assert_eq!(source.id, "s1");
        assert!(source.settings.is_none());
        assert!(source.auth.is_none());
    }

    #[test]
    fn test_caldav_details_with_basic_auth() {
        let json = r#"{"id":"s1","name":"Work","type":"caldav",
            "settings":{"url":"https://dav.example.com/cal/"},
            "auth_type":"basic","auth":{"username":"ann","password":"pw"}}"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert!(matches!(source.settings, Some(SourceSettings::Caldav { .. })));
        assert_eq!(
            source.auth,
            Some(AuthMethod::Basic {
                username: "ann".into(),
                password: "pw".into()
            })
        );
    }

    #[test]
    fn test_ical_local_location() {
        let json = r#"{"id":"s2","name":"Holidays","type":"ical",
            "settings":{"location":"local","path":"/srv/holidays.ics"},"auth_type":"none","auth":{}}"#;
        let source: Source = serde_json::from_str(json).unwrap();
        assert_eq!(
            source.settings,
            Some(SourceSettings::Ical(IcalLocation::Local {
                path: "/srv/holidays.ics".into()
            }))
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"id":"s3","name":"X","type":"exchange","settings":{}}"#;
        let err = serde_json::from_str::<Source>(json).unwrap_err();
        assert!(err.to_string().contains("unsupported source type"));
    }

    #[test]
    fn test_serialized_source_parses_back() {
        let source = Source::caldav(
            "Work",
            Url::parse("https://dav.example.com/").unwrap(),
            AuthMethod::Bearer { token: "t".into() },
        );
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(value["type"], "caldav");
        assert_eq!(value["auth_type"], "bearer");
        let parsed: Source = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, source);
    }
}
