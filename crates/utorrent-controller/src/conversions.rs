//! Conversions from raw daemon exchanges into typed outcomes.

use serde_json::Value;

use utorrent_types::{Outcome, ProtocolError, WebUiError};

use crate::ops::{RawResponse, TransportFault};

/// Body the daemon sends instead of JSON to acknowledge a login check.
const LOGIN_OK_BODY: &str = "200";

/// Maps transport faults to WebUI errors.
pub(crate) fn map_transport_fault(fault: TransportFault) -> WebUiError {
    WebUiError::Transport(fault.to_string())
}

/// Classify the response to an action request.
pub(crate) fn classify(response: RawResponse) -> Outcome<Value> {
    match response.status {
        200 => {
            let value: Value = serde_json::from_str(&response.body)
                .map_err(|e| ProtocolError::Json(e.to_string()))?;
            if let Some(message) = value.get("error").and_then(Value::as_str) {
                return Err(ProtocolError::Daemon(message.to_owned()).into());
            }
            Ok(value)
        }
        // 400 is the daemon's answer to a stale token.
        400 | 401 | 403 => Err(WebUiError::AuthRequired),
        status => Err(ProtocolError::UnexpectedStatus(status).into()),
    }
}

/// Classify the response to a login check, where a bare `200` body means success
/// whatever the HTTP status.
pub(crate) fn classify_login_check(response: RawResponse) -> Outcome<()> {
    if response.body.trim() == LOGIN_OK_BODY {
        return Ok(());
    }
    classify(response).map(|_| ())
}
