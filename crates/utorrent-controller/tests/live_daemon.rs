//! Integration test for WebUiClient with a chained sequence:
//! login -> add-url -> list -> files -> stop -> remove.
//! Requires a running uTorrent WebUI and environment configuration:
//! - UTORRENT_HOST (default: 127.0.0.1)
//! - UTORRENT_PORT (default: 8080)
//! - UTORRENT_USERNAME (default: admin)
//! - UTORRENT_PASSWORD (default: empty)
//!
//! Run with `cargo test -- --ignored`.

#![allow(unused_crate_dependencies)]

use std::{env, time::Duration};

use utorrent_controller::{ClientConfig, WebUiClient};
use utorrent_types::TorrentControl;

/// Any info hash works: the daemon lists a magnet before its metadata arrives.
const MAGNET_HASH: &str = "3B245504CF5F11BBDBE1201CEA6A6BF45AEE1BC0";

fn host() -> String {
    env::var("UTORRENT_HOST").unwrap_or_else(|_| "127.0.0.1".into())
}

fn port() -> u16 {
    env::var("UTORRENT_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080)
}

fn username() -> String {
    env::var("UTORRENT_USERNAME").unwrap_or_else(|_| "admin".into())
}

fn password() -> String {
    env::var("UTORRENT_PASSWORD").unwrap_or_default()
}

#[tokio::test]
#[ignore = "needs a running uTorrent WebUI"]
async fn webui_chained_flow() {
    // Arrange client
    let client = WebUiClient::try_new(ClientConfig::from_env()).expect("failed to build client");
    client
        .login_with_credentials(&host(), port(), &username(), &password())
        .await
        .expect("failed to log in");
    client.verify_login().await.expect("login check failed");

    // 1. Add torrent by magnet link
    let magnet = format!("magnet:?xt=urn:btih:{MAGNET_HASH}&dn=ubuntu");
    client.add_by_url(&magnet).await.expect("failed to add torrent");

    // 2. List torrents, find ours by hash
    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshot = client.list_torrents().await.expect("failed to list torrents");
    let torrent = snapshot
        .torrents
        .iter()
        .find(|t| t.hash.eq_ignore_ascii_case(MAGNET_HASH))
        .expect("added torrent not found in list");

    // 3. Files of our torrent (may be empty until metadata arrives)
    let _files = client
        .get_files(&torrent.hash)
        .await
        .expect("failed to fetch files");

    // 4. Stop our torrent
    client.stop(&torrent.hash).await.expect("failed to stop torrent");

    // 5. Remove our torrent, keeping no data
    client
        .remove_data(&torrent.hash)
        .await
        .expect("failed to remove torrent");

    // 6. Ensure our torrent is gone
    let final_list = client.list_torrents().await.expect("failed to list torrents");
    let still_present = final_list
        .torrents
        .iter()
        .any(|t| t.hash.eq_ignore_ascii_case(MAGNET_HASH));
    assert!(!still_present, "torrent was not removed");
}
