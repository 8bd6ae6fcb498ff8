use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::types::{
    SERVER_MESSAGE, SESSION_EXPIRED_MESSAGE, UNKNOWN_MESSAGE, VALIDATION_MESSAGE,
};
use crate::{ApiError, Envelope, EnvelopeStatus, ErrorKind};

/// Maps a non-success response to an `ApiError`, extracting the display message once.
pub fn classify_status(status: u16, body: &[u8]) -> ApiError {
    let parsed = parse_object(body);
    let server_message = parsed.as_ref().and_then(message_of);
    let field_errors = parsed.as_ref().map(field_errors_of).unwrap_or_default();

    let error = match status {
        401 => ApiError::new(
            ErrorKind::Unauthorized,
            server_message.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string()),
        ),
        422 => validation_error(server_message, field_errors),
        400 if !field_errors.is_empty() => validation_error(server_message, field_errors),
        400..=599 => ApiError::new(
            ErrorKind::Server,
            server_message.unwrap_or_else(|| SERVER_MESSAGE.to_string()),
        ),
        _ => ApiError::new(
            ErrorKind::Unknown,
            server_message.unwrap_or_else(|| UNKNOWN_MESSAGE.to_string()),
        ),
    };
    error.with_status(status)
}

/// Normalizes a 2xx body into an envelope. A body that reports `status: "error"` or
/// `success: false` becomes a server error.
pub fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    body: &[u8],
) -> Result<Envelope<T>, ApiError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(|_| unexpected_format(status))?
    };

    let (envelope_status, message, data) = match value {
        Value::Object(mut object) => {
            let envelope_status = envelope_status_of(&object);
            let message = message_of(&object);
            let data = if object.contains_key("data") {
                object.remove("data").unwrap_or(Value::Null)
            } else {
                Value::Object(object)
            };
            (envelope_status, message, data)
        }
        other => (EnvelopeStatus::Success, None, other),
    };

    if envelope_status == EnvelopeStatus::Error {
        return Err(ApiError::new(
            ErrorKind::Server,
            message.unwrap_or_else(|| SERVER_MESSAGE.to_string()),
        )
        .with_status(status));
    }

    let data = serde_json::from_value(data).map_err(|_| unexpected_format(status))?;
    Ok(Envelope {
        status: envelope_status,
        status_code: status,
        data,
        message,
    })
}

pub(crate) fn envelope_status_of(object: &Map<String, Value>) -> EnvelopeStatus {
    match (object.get("status"), object.get("success")) {
        (Some(Value::String(status)), _) if status.eq_ignore_ascii_case("error") => {
            EnvelopeStatus::Error
        }
        (_, Some(Value::Bool(false))) => EnvelopeStatus::Error,
        _ => EnvelopeStatus::Success,
    }
}

pub(crate) fn message_of(object: &Map<String, Value>) -> Option<String> {
    ["message", "error"].iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToOwned::to_owned)
    })
}

pub(crate) fn unexpected_format(status: u16) -> ApiError {
    ApiError::new(ErrorKind::Unknown, UNKNOWN_MESSAGE).with_status(status)
}

fn validation_error(
    server_message: Option<String>,
    field_errors: Vec<(String, Vec<String>)>,
) -> ApiError {
    let first_field_message = field_errors
        .iter()
        .flat_map(|(_, messages)| messages.iter())
        .next()
        .cloned();
    let message = first_field_message
        .or(server_message)
        .unwrap_or_else(|| VALIDATION_MESSAGE.to_string());
    ApiError {
        field_errors,
        ..ApiError::new(ErrorKind::Validation, message)
    }
}

fn parse_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Reads `errors: {field: [messages]}`; a bare string per field is accepted too.
fn field_errors_of(object: &Map<String, Value>) -> Vec<(String, Vec<String>)> {
    let Some(Value::Object(errors)) = object.get("errors") else {
        return Vec::new();
    };
    errors
        .iter()
        .filter_map(|(field, value)| {
            let messages: Vec<String> = match value {
                Value::String(text) => vec![text.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect(),
                _ => Vec::new(),
            };
            (!messages.is_empty()).then(|| (field.clone(), messages))
        })
        .collect()
}
