//! # uTorrent WebUI command-line caller
//!
//! ## Usage
//!
//! ```sh,ignore
//! cargo run --release -p utorrent-cli -- \
//!     --host 127.0.0.1 --port 8080 -u admin --password secret list
//! ```
//!
//! A session printed by `login` can be reused with `--cookie` and `--token`.

mod cli;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use utorrent_controller::{ClientConfig, Credentials, Endpoint, ListenerError, WebUiClient};
use utorrent_types::TorrentControl;

use crate::cli::{Cli, CliAuth, Command};

/// Initializes the tracing subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Installs a session, either by resuming the given cookie/token pair or by a fresh handshake.
async fn connect(
    client: &WebUiClient,
    host: String,
    port: u16,
    auth: CliAuth,
) -> Result<(), Box<dyn std::error::Error>> {
    match auth {
        CliAuth {
            cookie: Some(cookie),
            token: Some(token),
            username,
            password,
        } => {
            let mut endpoint = Endpoint::new(host, port);
            if let (Some(username), Some(password)) = (username, password) {
                endpoint = endpoint.with_basic_auth(username, password);
            }
            client.login_with_cookie(endpoint, &cookie, &token)?;
        }
        CliAuth {
            username: Some(username),
            password: Some(password),
            ..
        } => {
            client
                .login_with_credentials(&host, port, &username, &password)
                .await?;
        }
        _ => {
            return Err(
                "either --username and --password, or --cookie and --token, are required".into(),
            );
        }
    }
    Ok(())
}

/// Session listener. The pair itself is secret and stays out of the logs.
fn log_rotation(_credentials: &Credentials) -> Result<(), ListenerError> {
    info!("Session rotated");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let client = WebUiClient::try_new(ClientConfig::from_env())?;
    client.register_listener(log_rotation);

    connect(&client, cli.host, cli.port, cli.auth).await?;

    match cli.command {
        Command::Login => {
            let credentials = client.current_credentials()?;
            println!("token:  {}", credentials.token);
            println!("cookie: {}", credentials.cookie);
        }
        Command::List => print_json(&client.list_torrents().await?)?,
        Command::Files { hash } => print_json(&client.get_files(&hash).await?)?,
        Command::Action { action, hash } => {
            client.perform(action.into(), &hash).await?;
            info!("Sent {action:?} for {hash}");
        }
        Command::Priority {
            hash,
            file_index,
            priority,
        } => {
            client.set_priority(&hash, file_index, priority).await?;
            info!("Set priority {priority} on file {file_index} of {hash}");
        }
        Command::AddFile { path } => {
            client.add_by_file(&path).await?;
            info!("Uploaded {}", path.display());
        }
        Command::AddUrl { url } => {
            client.add_by_url(&url).await?;
            info!("Added {url}");
        }
    }

    if !client.is_authenticated() {
        warn!("The daemon no longer accepts this session's token");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rotation_log_omits_the_pair() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_rotation(&Credentials {
                token: "secret-token".into(),
                cookie: "secret-cookie".into(),
            })
            .unwrap();
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Session rotated"), "got {output:?}");
        assert!(!output.contains("secret-token"));
        assert!(!output.contains("secret-cookie"));
    }
}
