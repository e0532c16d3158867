//! uTorrent WebUI client implementation.

use std::{path::Path, sync::Arc};

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use utorrent_types::{
    FileRecord, Outcome, TorrentAction, TorrentControl, TorrentListSnapshot, WebUiError,
    decode_files, decode_snapshot,
};

use crate::config::ClientConfig;
use crate::conversions::{classify, classify_login_check, map_transport_fault};
use crate::notifier::{ListenerError, ListenerId, UpdateNotifier};
use crate::ops::{HttpTransport, RawResponse, TransportFault, WebUiOps};
use crate::session::{
    Credentials, Endpoint, Session, SessionManager, SessionState, Token, acquire_token,
};


/// WebUiClient is a uTorrent WebUI client holding a single session.
#[allow(missing_debug_implementations, private_bounds)]
pub struct WebUiClient<T: WebUiOps = HttpTransport> {
    ops: T,
    config: ClientConfig,
    session: SessionManager,
    notifier: Arc<UpdateNotifier>,
}

impl WebUiClient {
    /// Create a new, unauthenticated WebUiClient.
    pub fn try_new(config: ClientConfig) -> Outcome<Self> {
        let ops = HttpTransport::new(&config).map_err(map_transport_fault)?;
        Ok(Self::with_ops(ops, config))
    }
}

#[allow(private_bounds)]
impl<T: WebUiOps> WebUiClient<T> {
    /// Create a WebUiClient with a custom transport.
    /// This is primarily useful for testing with mocks.
    pub(crate) fn with_ops(ops: T, config: ClientConfig) -> Self {
        Self {
            ops,
            config,
            session: SessionManager::default(),
            notifier: Arc::new(UpdateNotifier::default()),
        }
    }

    /// Authenticate with username and password and acquire a fresh token.
    ///
    /// A non-200 token page (the daemon's Basic auth challenge included) yields
    /// [`WebUiError::InvalidCredentials`]; connectivity failures yield
    /// [`WebUiError::Transport`]. Either way the client ends up unauthenticated.
    pub async fn login_with_credentials(
        &self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Outcome<Credentials> {
        let endpoint = Endpoint::new(host, port).with_basic_auth(username, password);
        self.authenticate(endpoint).await
    }

    /// Resume a session from a previously persisted (cookie, token) pair, without a handshake.
    pub fn login_with_cookie(
        &self,
        endpoint: Endpoint,
        cookie: &str,
        token: &str,
    ) -> Outcome<Credentials> {
        let base_url = endpoint.base_url(&self.config.web_root)?;

        let token = Token::from(token.to_owned());
        if !token.is_valid() || cookie.is_empty() {
            debug!("Refusing to resume session with an empty token or cookie");
            return Err(WebUiError::InvalidCredentials);
        }

        debug!("Resuming session at {base_url}");
        let session = Session::new(base_url, endpoint, token, cookie.to_owned());
        let (session, _) = self.session.install(session);
        Ok(session.credentials())
    }

    /// Acquire a new token with the stored endpoint and credentials.
    ///
    /// A session resumed from a cookie without Basic auth credentials cannot refresh.
    pub async fn refresh(&self) -> Outcome<Credentials> {
        let session = self.session.session().ok_or(WebUiError::AuthRequired)?;
        if !session.endpoint().can_reauthenticate() {
            return Err(WebUiError::AuthRequired);
        }
        self.authenticate(session.endpoint().clone()).await
    }

    /// Check the session against the daemon.
    pub async fn verify_login(&self) -> Outcome<()> {
        let session = self.session.current()?;
        let url = action_url(&session, &[("action", "getsettings")])?;
        debug!("Verifying login");
        let result = self.ops.get(&url, &session.auth()).await;
        let outcome = result
            .map_err(map_transport_fault)
            .and_then(classify_login_check);
        self.observe(&session, &outcome);
        outcome
    }

    /// Whether a valid session is installed and the daemon has not rejected its token.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The current token, or the sentinel describing why there is none.
    pub fn token(&self) -> Token {
        self.session.token()
    }

    /// The current session, expired or not.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.session()
    }

    /// The (token, cookie) pair actions are sent with, or [`WebUiError::AuthRequired`].
    pub fn current_credentials(&self) -> Outcome<Credentials> {
        self.session.current().map(|session| session.credentials())
    }

    /// Register a listener called with the new pair after every successful handshake.
    ///
    /// Listeners run in registration order, off the caller's task.
    pub fn register_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Credentials) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.notifier.register_listener(listener)
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    async fn authenticate(&self, endpoint: Endpoint) -> Outcome<Credentials> {
        let generation = self.session.begin();
        let base_url = match endpoint.base_url(&self.config.web_root) {
            Ok(url) => url,
            Err(err) => {
                self.session.fail(generation);
                return Err(err);
            }
        };

        match acquire_token(&self.ops, &endpoint, &base_url).await {
            Ok((token, cookie)) => {
                let session = Session::new(base_url, endpoint, Token::Issued(token), cookie);
                let (session, generation) = self.session.install(session);
                let credentials = session.credentials();
                info!("Authenticated with {}", session.base_url());
                self.notifier.dispatch(generation, credentials.clone());
                Ok(credentials)
            }
            Err(err) => {
                debug!("Authentication failed: {err}");
                self.session.fail(generation);
                Err(err)
            }
        }
    }

    async fn request(&self, params: &[(&str, &str)]) -> Outcome<Value> {
        let session = self.session.current()?;
        let url = action_url(&session, params)?;
        debug!("Sending {params:?}");
        let result = self.ops.get(&url, &session.auth()).await;
        self.finish(&session, result)
    }

    fn finish(
        &self,
        session: &Arc<Session>,
        result: Result<RawResponse, TransportFault>,
    ) -> Outcome<Value> {
        let outcome = result.map_err(map_transport_fault).and_then(classify);
        self.observe(session, &outcome);
        outcome
    }

    fn observe<V>(&self, session: &Arc<Session>, outcome: &Outcome<V>) {
        match outcome {
            Ok(_) => debug!("Request succeeded"),
            Err(WebUiError::AuthRequired) => self.session.expire(session),
            Err(err) => debug!("Request failed: {err}"),
        }
    }
}

#[allow(private_bounds)]
impl<T: WebUiOps> TorrentControl for WebUiClient<T> {
    async fn list_torrents(&self) -> Outcome<TorrentListSnapshot> {
        let body = self.request(&[("action", "list")]).await?;
        let snapshot = decode_snapshot(&body)?;
        debug!(
            "Listed {} torrents in {} labels",
            snapshot.torrents.len(),
            snapshot.labels.len()
        );
        Ok(snapshot)
    }

    async fn get_files(&self, hash: &str) -> Outcome<Vec<FileRecord>> {
        let body = self
            .request(&[("action", "getfiles"), ("hash", hash)])
            .await?;
        Ok(decode_files(&body)?)
    }

    async fn perform(&self, action: TorrentAction, hash: &str) -> Outcome<()> {
        self.request(&[("action", action.as_str()), ("hash", hash)])
            .await?;
        Ok(())
    }

    async fn set_priority(&self, hash: &str, file_index: usize, priority: u8) -> Outcome<()> {
        let priority = priority.to_string();
        let file_index = file_index.to_string();
        self.request(&[
            ("action", "setprio"),
            ("hash", hash),
            ("p", &priority),
            ("f", &file_index),
        ])
        .await?;
        Ok(())
    }

    async fn add_by_file(&self, path: &Path) -> Outcome<()> {
        let session = self.session.current()?;
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| WebUiError::Transport(format!("cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("upload.torrent"));

        let url = action_url(&session, &[("action", "add-file")])?;
        debug!("Uploading {} ({} bytes)", path.display(), contents.len());
        let result = self
            .ops
            .post_torrent_file(&url, &session.auth(), file_name, contents)
            .await;
        self.finish(&session, result)?;
        Ok(())
    }

    async fn add_by_url(&self, url: &str) -> Outcome<()> {
        self.request(&[("action", "add-url"), ("s", url)]).await?;
        Ok(())
    }
}

/// `<base>?<params>&token=<token>`.
fn action_url(session: &Session, params: &[(&str, &str)]) -> Outcome<Url> {
    let token = session.token().as_str().ok_or(WebUiError::AuthRequired)?;
    let mut url = session.base_url().clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(params)
        .append_pair("token", token);
    Ok(url)
}
