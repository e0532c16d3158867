//! Shared test utilities and fixtures.

use serde_json::{Value, json};

use crate::ops::RawResponse;

pub(crate) fn token_page(token: &str) -> String {
    format!("<html><div id='token' style='display:none;'>{token}</div></html>")
}

pub(crate) fn token_response(token: &str, guid: &str) -> RawResponse {
    RawResponse {
        status: 200,
        body: token_page(token),
        guid: Some(guid.to_string()),
    }
}

pub(crate) fn status_response(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        body: body.to_string(),
        guid: None,
    }
}

pub(crate) fn ok_json(body: Value) -> RawResponse {
    status_response(200, &body.to_string())
}

pub(crate) fn make_torrent_row(hash: &str, name: &str) -> Value {
    json!([
        hash, 201, name, 1000, 500, 500, 100, 200, 10, 20, 60, "linux", 1, 10, 2, 20, 65535, 1,
        500
    ])
}

pub(crate) fn list_body(rows: Vec<Value>) -> Value {
    json!({
        "build": 46107,
        "label": [["linux", rows.len()]],
        "torrents": rows,
        "torrentc": "1947283719"
    })
}
