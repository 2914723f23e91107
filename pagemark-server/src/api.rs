//! The flat query API.
//!
//! Every operation arrives as GET query parameters on a single route; the
//! first recognised operation parameter wins. Responses are JSON objects
//! with a `status` field, optionally wrapped as JSONP when the caller
//! passes a valid `callback` identifier. A `success` identifier plus a
//! connection `id` adds a delivery-confirmation call ahead of the payload.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::key::{decode_page_key, encode_page_key};
use crate::store::PageGeometryRow;
use crate::AppState;

/// JavaScript reserved words, rejected as callback identifiers.
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(handle)).with_state(state)
}

async fn handle(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let body = match dispatch(&state, &params) {
        Ok(mut payload) => {
            payload.insert("status".to_string(), Value::String("ok".to_string()));
            Value::Object(payload)
        }
        Err(err) => {
            warn!("request failed: {err}");
            json!({
                "status": "fail",
                "reason": err.public_reason(state.config.diagnostics),
            })
        }
    };
    render(&params, &body)
}

fn dispatch(state: &AppState, params: &HashMap<String, String>) -> ServerResult<Map<String, Value>> {
    if let Some(key) = params.get("edit") {
        return edit_page(state, key);
    }
    if let Some(key) = params.get("lookup") {
        return lookup_page(state, key);
    }
    if params.contains_key("new") {
        return new_page(state, params);
    }
    if let Some(key) = params.get("update") {
        return update_page(state, key, params);
    }
    if let Some(key) = params.get("updatedestination") {
        return update_destination(state, key, params);
    }
    if let Some(key) = params.get("updatetype") {
        return update_type(state, key, params);
    }
    if let Some(key) = params.get("newbox") {
        return new_box(state, key, params);
    }
    if let Some(key) = params.get("updatebox") {
        return update_box(state, key, params);
    }
    if let Some(key) = params.get("deletebox") {
        return delete_box(state, key, params);
    }
    if let Some(key) = params.get("newaudio") {
        return new_audio(state, key, params);
    }
    if let Some(key) = params.get("duplicate") {
        return duplicate_page(state, key);
    }
    Err(ServerError::InvalidRequest("no query specified".to_string()))
}

fn edit_page(state: &AppState, key: &str) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let config = state.store.lookup(page_id, false, false)?;
    config_payload(&config)
}

fn lookup_page(state: &AppState, key: &str) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let config = state.store.lookup(page_id, true, true)?;
    debug!(page = page_id, locked = config.locked, "scan lookup");
    config_payload(&config)
}

fn new_page(state: &AppState, params: &HashMap<String, String>) -> ServerResult<Map<String, Value>> {
    let geometry = geometry_params(params)?;
    let page_id = state.store.create_page(geometry)?;
    let mut payload = Map::new();
    payload.insert(
        "pageKey".to_string(),
        Value::String(encode_page_key(page_id)),
    );
    Ok(payload)
}

fn update_page(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let current = state.store.get_page(page_id)?;
    let geometry = PageGeometryRow {
        width: opt_param(params, "width")?.unwrap_or(i64::from(current.width)).try_into()
            .map_err(|_| attribute_error("width"))?,
        height: opt_param(params, "height")?.unwrap_or(i64::from(current.height)).try_into()
            .map_err(|_| attribute_error("height"))?,
        left_x: require_param(params, "leftX")?,
        left_y: require_param(params, "leftY")?,
        right_x: require_param(params, "rightX")?,
        right_y: require_param(params, "rightY")?,
    };
    state.store.update_geometry(page_id, geometry)?;
    let mut payload = Map::new();
    payload.insert("pageKey".to_string(), Value::String(key.to_string()));
    Ok(payload)
}

fn update_destination(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let destination = params
        .get("destination")
        .ok_or_else(|| attribute_error("destination"))?;
    state.store.update_destination(page_id, destination)?;
    let mut payload = Map::new();
    payload.insert("pageKey".to_string(), Value::String(key.to_string()));
    Ok(payload)
}

fn update_type(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let page_type = require_param(params, "type")?;
    let page_type = u8::try_from(page_type).map_err(|_| ServerError::InvalidPageType)?;
    state.store.update_type(page_id, page_type)?;
    let mut payload = Map::new();
    payload.insert("pageKey".to_string(), Value::String(key.to_string()));
    Ok(payload)
}

fn new_box(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let temp_id = require_param(params, "tempId")?;
    let x = require_param(params, "x")?;
    let y = require_param(params, "y")?;
    let box_id = state.store.insert_box(page_id, x, y)?;
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::from(box_id));
    payload.insert("tempId".to_string(), Value::from(temp_id));
    payload.insert("x".to_string(), Value::from(x));
    payload.insert("y".to_string(), Value::from(y));
    Ok(payload)
}

fn update_box(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let box_id = require_param(params, "id")?;
    let x = require_param(params, "x")?;
    let y = require_param(params, "y")?;
    let contents = match (params.get("description"), params.get("amount")) {
        (Some(description), Some(amount)) => {
            let amount: u32 = amount.parse().map_err(|_| attribute_error("amount"))?;
            Some((description.as_str(), amount))
        }
        _ => None,
    };
    state.store.update_box(page_id, box_id, x, y, contents)?;
    Ok(Map::new())
}

fn delete_box(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let box_id = require_param(params, "id")?;
    state.store.delete_box(page_id, box_id)?;
    Ok(Map::new())
}

fn new_audio(
    state: &AppState,
    key: &str,
    params: &HashMap<String, String>,
) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let x = require_param(params, "x")?;
    let y = require_param(params, "y")?;
    let width = require_param(params, "width")?;
    let height = require_param(params, "height")?;
    let sound_clip_id = require_param(params, "soundClipId")?;
    let audio_id = state
        .store
        .insert_audio(page_id, x, y, width, height, sound_clip_id)?;
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::from(audio_id));
    Ok(payload)
}

fn duplicate_page(state: &AppState, key: &str) -> ServerResult<Map<String, Value>> {
    let page_id = decode_page_key(key)?;
    let copy_id = state
        .store
        .duplicate(page_id, state.config.duplicate_audio)?;
    let config = state.store.lookup(copy_id, false, false)?;
    config_payload(&config)
}

fn config_payload(config: &pagemark_core::PageConfig) -> ServerResult<Map<String, Value>> {
    match serde_json::to_value(config)? {
        Value::Object(map) => Ok(map),
        _ => Err(ServerError::InvalidRequest(
            "page serialization error".to_string(),
        )),
    }
}

fn geometry_params(params: &HashMap<String, String>) -> ServerResult<PageGeometryRow> {
    Ok(PageGeometryRow {
        width: require_param(params, "width")?
            .try_into()
            .map_err(|_| attribute_error("width"))?,
        height: require_param(params, "height")?
            .try_into()
            .map_err(|_| attribute_error("height"))?,
        left_x: require_param(params, "leftX")?,
        left_y: require_param(params, "leftY")?,
        right_x: require_param(params, "rightX")?,
        right_y: require_param(params, "rightY")?,
    })
}

fn require_param(params: &HashMap<String, String>, name: &str) -> ServerResult<i64> {
    opt_param(params, name)?.ok_or_else(|| attribute_error(name))
}

fn opt_param(params: &HashMap<String, String>, name: &str) -> ServerResult<Option<i64>> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| attribute_error(name)),
    }
}

fn attribute_error(name: &str) -> ServerError {
    ServerError::InvalidRequest(format!("{name} attribute invalid or missing"))
}

/// Render the JSON body, wrapped as JSONP when a valid callback is given.
fn render(params: &HashMap<String, String>, body: &Value) -> Response {
    let callback = params.get("callback").filter(|c| is_identifier(c));
    if let Some(callback) = callback {
        let mut script = String::new();
        if let (Some(success), Some(id)) = (params.get("success"), params.get("id")) {
            if is_identifier(success) && id.chars().all(|c| c.is_ascii_digit()) && !id.is_empty() {
                script.push_str(&format!("{success}({id});"));
            }
        }
        script.push_str(&format!("{callback}({body});"));
        ([(CONTENT_TYPE, "application/javascript")], script).into_response()
    } else {
        ([(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
    }
}

/// Whether `name` is a safe dotted JavaScript identifier path.
fn is_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        (first.is_ascii_alphabetic() || first == '_' || first == '$')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            && !RESERVED_WORDS.contains(&segment)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("handleResponse"));
        assert!(is_identifier("app.sync.done"));
        assert!(is_identifier("_cb$1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1cb"));
        assert!(!is_identifier("alert(1)"));
        assert!(!is_identifier("window..cb"));
        assert!(!is_identifier("delete"));
        assert!(!is_identifier("app.new"));
    }

    #[test]
    fn jsonp_gets_a_success_prefix_only_with_numeric_id() {
        let mut params = HashMap::new();
        params.insert("callback".to_string(), "cb".to_string());
        params.insert("success".to_string(), "ack".to_string());
        params.insert("id".to_string(), "17".to_string());
        let response = render(&params, &json!({"status": "ok"}));
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/javascript"
        );

        params.insert("id".to_string(), "17;alert(1)".to_string());
        let response = render(&params, &json!({"status": "ok"}));
        // Still JSONP, but the tampered confirmation call is dropped.
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
    }

    #[test]
    fn invalid_callback_falls_back_to_plain_json() {
        let mut params = HashMap::new();
        params.insert("callback".to_string(), "alert(1)".to_string());
        let response = render(&params, &json!({"status": "ok"}));
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
