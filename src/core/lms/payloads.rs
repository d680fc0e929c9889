// Request bodies for the LMS create endpoints.
//
// Callers send partial objects; the LMS rejects anything with a missing
// property, so optional fields are defaulted here before the request goes out.
// Only absent keys are filled, caller values always win.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::lms_models::LmsError;

/// Content object types.
const CONTENT_TYPE_MODULE: i64 = 0;
const CONTENT_TYPE_TOPIC: i64 = 1;

/// Topic backed by a file in the course's file area.
const TOPIC_TYPE_FILE: i64 = 1;

pub fn announcement_payload(data: Value, now: DateTime<Utc>) -> Result<Value, LmsError> {
    let mut map = into_object(data, "announcement")?;
    require_text(&map, "Title", "announcement")?;

    wrap_rich_text(&mut map, "Body");
    set_default(
        &mut map,
        "StartDate",
        json!(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    set_default(&mut map, "EndDate", Value::Null);
    set_default(&mut map, "IsGlobal", json!(false));
    set_default(&mut map, "IsPublished", json!(true));
    set_default(&mut map, "ShowOnlyInCourseOfferings", json!(false));
    set_default(&mut map, "IsAuthorInfoShown", json!(true));

    Ok(Value::Object(map))
}

pub fn discussion_forum_payload(data: Value) -> Result<Value, LmsError> {
    let mut map = into_object(data, "discussion forum")?;
    require_text(&map, "Name", "discussion forum")?;

    wrap_rich_text(&mut map, "Description");
    for key in ["StartDate", "EndDate", "PostStartDate", "PostEndDate"] {
        set_default(&mut map, key, Value::Null);
    }
    for key in [
        "ShowDescriptionInTopics",
        "AllowAnonymous",
        "IsLocked",
        "IsHidden",
        "RequiresApproval",
        "MustPostToParticipate",
        "DisplayInCalendar",
        "DisplayPostDatesInCalendar",
    ] {
        set_default(&mut map, key, json!(false));
    }

    Ok(Value::Object(map))
}

pub fn survey_payload(data: Value) -> Result<Value, LmsError> {
    let mut map = into_object(data, "survey")?;
    require_text(&map, "Name", "survey")?;

    wrap_rich_text(&mut map, "Description");
    set_default(&mut map, "StartDate", Value::Null);
    set_default(&mut map, "EndDate", Value::Null);
    set_default(&mut map, "IsActive", json!(true));
    set_default(&mut map, "ShowResults", json!(false));
    set_default(&mut map, "IsAnonymous", json!(false));
    set_default(&mut map, "DisplayInCalendar", json!(false));

    Ok(Value::Object(map))
}

pub fn content_module_payload(data: Value) -> Result<Value, LmsError> {
    let mut map = into_object(data, "content module")?;
    let title = require_text(&map, "Title", "content module")?.to_string();

    wrap_rich_text(&mut map, "Description");
    set_default(&mut map, "ShortTitle", json!(title));
    set_default(&mut map, "Type", json!(CONTENT_TYPE_MODULE));
    set_default(&mut map, "ModuleStartDate", Value::Null);
    set_default(&mut map, "ModuleEndDate", Value::Null);
    set_default(&mut map, "ModuleDueDate", Value::Null);
    set_default(&mut map, "IsHidden", json!(false));
    set_default(&mut map, "IsLocked", json!(false));
    set_default(&mut map, "Structure", json!([]));

    Ok(Value::Object(map))
}

/// A topic inside a module that points at an already-uploaded course file.
pub fn file_topic_payload(data: Value) -> Result<Value, LmsError> {
    let mut map = into_object(data, "file topic")?;
    let title = require_text(&map, "Title", "file topic")?.to_string();
    require_text(&map, "Url", "file topic")?;

    wrap_rich_text(&mut map, "Description");
    set_default(&mut map, "ShortTitle", json!(title));
    set_default(&mut map, "Type", json!(CONTENT_TYPE_TOPIC));
    set_default(&mut map, "TopicType", json!(TOPIC_TYPE_FILE));
    for key in ["StartDate", "EndDate", "DueDate"] {
        set_default(&mut map, key, Value::Null);
    }
    set_default(&mut map, "IsHidden", json!(false));
    set_default(&mut map, "IsLocked", json!(false));
    set_default(&mut map, "OpenAsExternalResource", json!(false));

    Ok(Value::Object(map))
}

fn into_object(data: Value, what: &str) -> Result<Map<String, Value>, LmsError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(LmsError::Validation(format!(
            "{} data must be a JSON object",
            what
        ))),
    }
}

fn require_text<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    what: &str,
) -> Result<&'a str, LmsError> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LmsError::Validation(format!("{} requires a non-empty {}", what, key)))
}

fn set_default(map: &mut Map<String, Value>, key: &str, value: Value) {
    map.entry(key.to_string()).or_insert(value);
}

/// The LMS expects rich text as `{Content, Type}`; accept a bare string too.
fn wrap_rich_text(map: &mut Map<String, Value>, key: &str) {
    let wrapped = match map.get(key) {
        None | Some(Value::Null) => json!({ "Content": "", "Type": "Text" }),
        Some(Value::String(text)) => json!({ "Content": text, "Type": "Text" }),
        Some(_) => return,
    };
    map.insert(key.to_string(), wrapped);
}
