// file: src/api/form.rs
//! Form-encoded request bodies. Edits carry only the fields named in their
//! change mask so the server leaves everything else alone.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{
    AuthMethod, Calendar, CalendarChanges, Event, EventChanges, IcalLocation, Source,
    SourceChanges, SourceSettings,
};
use crate::recurrence::DisplayZone;

pub type Form = Vec<(&'static str, String)>;

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn push_settings(form: &mut Form, settings: &SourceSettings) {
    form.push(("type", settings.type_tag().to_string()));
    match settings {
        SourceSettings::Caldav { url } => form.push(("url", url.to_string())),
        SourceSettings::Ical(location) => {
            form.push(("location", location.location_tag().to_string()));
            match location {
                IcalLocation::Remote { url } => form.push(("url", url.to_string())),
                IcalLocation::Local { path } => form.push(("path", path.clone())),
                IcalLocation::Database { file } => form.push(("file", file.clone())),
            }
        }
    }
}

fn push_auth(form: &mut Form, auth: &AuthMethod) {
    form.push(("auth_type", auth.type_tag().to_string()));
    match auth {
        AuthMethod::None => {}
        AuthMethod::Basic { username, password } => {
            form.push(("auth_username", username.clone()));
            form.push(("auth_password", password.clone()));
        }
        AuthMethod::Bearer { token } => form.push(("auth_token", token.clone())),
    }
}

pub fn source_form(source: &Source, changes: SourceChanges) -> AppResult<Form> {
    let mut form = Form::new();
    if changes.name {
        form.push(("name", source.name.clone()));
    }
    if changes.settings {
        let settings = source
            .settings
            .as_ref()
            .ok_or_else(|| AppError::invalid_input("Source settings are required"))?;
        push_settings(&mut form, settings);
    }
    if changes.auth {
        push_auth(&mut form, source.auth.as_ref().unwrap_or(&AuthMethod::None));
    }
    Ok(form)
}

pub fn calendar_form(calendar: &Calendar, changes: CalendarChanges) -> Form {
    let mut form = Form::new();
    if changes.name {
        form.push(("name", calendar.name.clone()));
    }
    if changes.desc {
        form.push(("desc", calendar.desc.clone()));
    }
    if changes.color {
        form.push(("color", color_value(&calendar.color)));
    }
    form
}

fn color_value(color: &Option<String>) -> String {
    match color.as_deref() {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => "null".to_string(),
    }
}

/// All-day dates are sent as the display-zone calendar date at UTC
/// midnight; timed events as the instant itself.
pub fn event_form(event: &Event, changes: EventChanges, zone: DisplayZone) -> Form {
    let mut form = Form::new();
    if changes.name {
        form.push(("name", event.name.clone()));
    }
    if changes.desc {
        form.push(("desc", event.desc.clone()));
    }
    if changes.date {
        let (start, end) = if event.date.all_day {
            (
                zone.date_as_utc_midnight(event.date.start),
                zone.date_as_utc_midnight(event.date.end),
            )
        } else {
            (event.date.start, event.date.end)
        };
        form.push(("date_start", timestamp(start)));
        form.push(("date_end", timestamp(end)));
        form.push(("date_all_day", event.date.all_day.to_string()));
    }
    if changes.color {
        form.push(("color", color_value(&event.color)));
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use url::Url;

    fn field<'a>(form: &'a Form, key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_caldav_basic_source_form() {
        let source = Source::caldav(
            "Work",
            Url::parse("https://dav.example.com/").unwrap(),
            AuthMethod::Basic {
                username: "ann".into(),
                password: "pw".into(),
            },
        );
        let form = source_form(&source, SourceChanges::all()).unwrap();
        assert_eq!(field(&form, "type"), Some("caldav"));
        assert_eq!(field(&form, "url"), Some("https://dav.example.com/"));
        assert_eq!(field(&form, "auth_type"), Some("basic"));
        assert_eq!(field(&form, "auth_username"), Some("ann"));
        assert_eq!(field(&form, "auth_token"), None);
    }

    #[test]
    fn test_ical_local_source_form() {
        let source = Source::new(
            "Holidays",
            SourceSettings::Ical(IcalLocation::Local {
                path: "/srv/holidays.ics".into(),
            }),
            AuthMethod::None,
        );
        let form = source_form(&source, SourceChanges::all()).unwrap();
        assert_eq!(field(&form, "type"), Some("ical"));
        assert_eq!(field(&form, "location"), Some("local"));
        assert_eq!(field(&form, "path"), Some("/srv/holidays.ics"));
        assert_eq!(field(&form, "auth_type"), Some("none"));
    }

    #[test]
    fn test_source_without_settings_is_rejected() {
        let source = Source {
            id: "s1".into(),
            name: "Bare".into(),
            settings: None,
            auth: None,
        };
        assert!(source_form(&source, SourceChanges::all()).is_err());
        let name_only = SourceChanges {
            name: true,
            ..SourceChanges::default()
        };
        assert_eq!(source_form(&source, name_only).unwrap(), vec![("name", "Bare".to_string())]);
    }

    #[test]
    fn test_event_form_masks_fields() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let event = Event::new("c1", "Standup", start, start + Duration::minutes(15));
        let changes = EventChanges {
            name: true,
            ..EventChanges::default()
        };
        let form = event_form(&event, changes, DisplayZone::Local);
        assert_eq!(form, vec![("name", "Standup".to_string())]);
    }

    #[test]
    fn test_event_form_dates_and_null_color() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let event = Event::new("c1", "Standup", start, start + Duration::minutes(15));
        let form = event_form(&event, EventChanges::all(), DisplayZone::Local);
        assert_eq!(field(&form, "date_start"), Some("2024-03-04T09:00:00.000Z"));
        assert_eq!(field(&form, "date_end"), Some("2024-03-04T09:15:00.000Z"));
        assert_eq!(field(&form, "date_all_day"), Some("false"));
        assert_eq!(field(&form, "color"), Some("null"));
    }

    #[test]
    fn test_all_day_event_sent_as_utc_midnight() {
        let zone = DisplayZone::Named(chrono_tz::Europe::Berlin);
        // Berlin midnight, which is still the previous day in UTC.
        let start = Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap();
        let mut event = Event::new("c1", "Holiday", start, start + Duration::days(1));
        event.date.all_day = true;
        let form = event_form(&event, EventChanges::all(), zone);
        assert_eq!(field(&form, "date_start"), Some("2024-03-04T00:00:00.000Z"));
        assert_eq!(field(&form, "date_end"), Some("2024-03-05T00:00:00.000Z"));
        assert_eq!(field(&form, "date_all_day"), Some("true"));
    }
}
