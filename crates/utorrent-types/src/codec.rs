//! Decoders for the WebUI's compact array encodings.
//!
//! The daemon sends torrents, labels and files as positional JSON arrays. The
//! position of each value is the protocol contract, so decoding is strict about
//! length and types but never validates ranges.

use serde_json::Value;
use tracing::debug;

use crate::{
    FileRecord, LabelRecord, ProtocolError, StatusFlags, TorrentListSnapshot, TorrentRecord,
};

/// Number of positions in a torrent array.
pub const TORRENT_FIELD_COUNT: usize = 19;

const LABEL_FIELD_COUNT: usize = 2;
const FILE_FIELD_COUNT: usize = 4;

/// Decode the status bitmask. Total: bits above bit 7 are ignored.
pub fn decode_status(raw: i64) -> StatusFlags {
    let mut bits = [false; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (raw >> i) & 1 == 1;
    }
    StatusFlags::from_bits(bits)
}

/// Decode a torrent array. Needs at least [`TORRENT_FIELD_COUNT`] elements, extra ones are ignored.
pub fn decode_torrent(row: &[Value]) -> Result<TorrentRecord, ProtocolError> {
    if row.len() < TORRENT_FIELD_COUNT {
        return Err(ProtocolError::FormatMismatch(format!(
            "torrent array has {} elements, expected {TORRENT_FIELD_COUNT}",
            row.len()
        )));
    }

    Ok(TorrentRecord {
        hash: text_at(row, 0, "hash")?,
        status: decode_status(int_at(row, 1, "status")?),
        name: display_text_at(row, 2, "name"),
        size: int_at(row, 3, "size")?,
        progress: int_at(row, 4, "progress")?,
        downloaded: int_at(row, 5, "downloaded")?,
        uploaded: int_at(row, 6, "uploaded")?,
        ratio: int_at(row, 7, "ratio")?,
        upload_speed: int_at(row, 8, "upload_speed")?,
        download_speed: int_at(row, 9, "download_speed")?,
        eta: int_at(row, 10, "eta")?,
        label: display_text_at(row, 11, "label"),
        peers_connected: int_at(row, 12, "peers_connected")?,
        peers_in_swarm: int_at(row, 13, "peers_in_swarm")?,
        seeds_connected: int_at(row, 14, "seeds_connected")?,
        seeds_in_swarm: int_at(row, 15, "seeds_in_swarm")?,
        availability: int_at(row, 16, "availability")?,
        queue_order: int_at(row, 17, "queue_order")?,
        remaining: int_at(row, 18, "remaining")?,
    })
}

/// Decode a `[name, count]` label array.
pub fn decode_label(row: &[Value]) -> Result<LabelRecord, ProtocolError> {
    if row.len() != LABEL_FIELD_COUNT {
        return Err(ProtocolError::FormatMismatch(format!(
            "label array has {} elements, expected {LABEL_FIELD_COUNT}",
            row.len()
        )));
    }

    Ok(LabelRecord {
        name: text_at(row, 0, "label name")?,
        count: int_at(row, 1, "label count")?,
    })
}

/// Decode a `[name, size, downloaded, priority, ...]` file array.
pub fn decode_file(row: &[Value]) -> Result<FileRecord, ProtocolError> {
    if row.len() < FILE_FIELD_COUNT {
        return Err(ProtocolError::FormatMismatch(format!(
            "file array has {} elements, expected {FILE_FIELD_COUNT}",
            row.len()
        )));
    }

    Ok(FileRecord {
        name: text_at(row, 0, "file name")?,
        size: int_at(row, 1, "file size")?,
        downloaded: int_at(row, 2, "file downloaded")?,
        priority: int_at(row, 3, "file priority")?,
    })
}

/// Decode the body of an `action=list` response.
pub fn decode_snapshot(body: &Value) -> Result<TorrentListSnapshot, ProtocolError> {
    let build = body
        .get("build")
        .and_then(Value::as_i64)
        .ok_or_else(|| mismatch("list response has no numeric build"))?;

    let labels = rows(body, "label")?
        .iter()
        .map(|row| decode_label(as_array(row, "label")?))
        .collect::<Result<Vec<_>, _>>()?;

    let torrents = rows(body, "torrents")?
        .iter()
        .map(|row| decode_torrent(as_array(row, "torrent")?))
        .collect::<Result<Vec<_>, _>>()?;

    let cache_id = match body.get("torrentc") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    Ok(TorrentListSnapshot {
        build,
        labels,
        torrents,
        cache_id,
    })
}

/// Decode the body of an `action=getfiles` response: `{"files": [hash, [[...], ...]]}`.
pub fn decode_files(body: &Value) -> Result<Vec<FileRecord>, ProtocolError> {
    let files = body
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| mismatch("getfiles response has no files array"))?;

    // A daemon with no such torrent answers with an empty array.
    let Some(entries) = files.get(1) else {
        return Ok(Vec::new());
    };

    as_array(entries, "file list")?
        .iter()
        .map(|row| decode_file(as_array(row, "file")?))
        .collect()
}

fn mismatch(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::FormatMismatch(msg.into())
}

fn rows<'a>(body: &'a Value, key: &str) -> Result<&'a [Value], ProtocolError> {
    match body.get(key) {
        None => Ok(&[]),
        Some(value) => as_array(value, key),
    }
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a [Value], ProtocolError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| mismatch(format!("{what} is not an array: {value}")))
}

fn int_at(row: &[Value], index: usize, field: &str) -> Result<i64, ProtocolError> {
    row[index].as_i64().ok_or_else(|| {
        mismatch(format!(
            "{field} at position {index} is not an integer: {}",
            row[index]
        ))
    })
}

fn text_at(row: &[Value], index: usize, field: &str) -> Result<String, ProtocolError> {
    row[index]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| {
            mismatch(format!(
                "{field} at position {index} is not a string: {}",
                row[index]
            ))
        })
}

/// Display-only text: a wrong type is logged and replaced by an empty string.
fn display_text_at(row: &[Value], index: usize, field: &str) -> String {
    match row[index].as_str() {
        Some(text) => text.to_owned(),
        None => {
            debug!("ignoring non-string {field} at position {index}: {}", row[index]);
            String::new()
        }
    }
}
