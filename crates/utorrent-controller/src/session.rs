//! Session state and the token handshake.
//!
//! The daemon authenticates every request with HTTP Basic auth plus a rotating
//! anti-CSRF token bound to a `GUID` cookie. A [`Session`] is the immutable
//! value holding one such pair; the [`SessionManager`] swaps whole sessions so
//! readers never observe a token from one handshake next to the cookie of another.

use std::{
    fmt,
    sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use utorrent_types::{Outcome, WebUiError};

use crate::conversions::map_transport_fault;
use crate::ops::{RequestAuth, WebUiOps};

const TOKEN_PAGE: &str = "token.html";

static TOKEN_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bid\s*=\s*["']token["'][^>]*>\s*([^<\s]+)\s*</div>"#)
        .expect("token pattern is valid")
});

static CAPTCHA_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img[^>]*\bsrc\s*=\s*["']([^"']*captcha[^"']*)["']"#)
        .expect("captcha pattern is valid")
});

/// Address of a daemon and the Basic auth credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl Endpoint {
    /// `host` may carry a scheme (`https://nas.local`), plain `http` is assumed otherwise.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Attach Basic auth credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[allow(missing_docs)]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[allow(missing_docs)]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[allow(missing_docs)]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether a new token can be requested without asking the caller again.
    pub fn can_reauthenticate(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// `http://host:port/<web_root>/`.
    pub(crate) fn base_url(&self, web_root: &str) -> Outcome<Url> {
        let root = web_root.trim_matches('/');
        let path = if root.is_empty() {
            String::from("/")
        } else {
            format!("/{root}/")
        };
        let raw = if self.host.contains("://") {
            format!("{}:{}{path}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}{path}", self.host, self.port)
        };

        Url::parse(&raw)
            .map_err(|e| WebUiError::Transport(format!("invalid endpoint {raw}: {e}")))
    }

    fn auth(&self, cookie: Option<&str>) -> RequestAuth {
        RequestAuth {
            username: self.username.clone(),
            password: self.password.clone(),
            cookie: cookie.map(str::to_owned),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the password.
        write!(
            f,
            "Endpoint(host=\"{}\", port={}, username={:?}, password=<{}>)",
            self.host,
            self.port,
            self.username,
            if self.password.is_some() { "set" } else { "unset" },
        )
    }
}

/// The anti-CSRF token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Token {
    /// No handshake has completed yet.
    #[default]
    NotFetched,
    /// The last handshake failed.
    FetchFailed,
    /// A token issued by the daemon or supplied by the caller.
    Issued(String),
}

impl Token {
    /// Sentinels and empty strings are invalid. Anything else stays valid until the
    /// daemon rejects it.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Issued(token) if !token.is_empty())
    }

    /// The token string, if one was issued.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Issued(token) => Some(token),
            _ => None,
        }
    }
}

impl From<String> for Token {
    fn from(token: String) -> Self {
        if token.is_empty() {
            Self::NotFetched
        } else {
            Self::Issued(token)
        }
    }
}

/// The (token, cookie) pair authenticating action requests. Always handed out as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Anti-CSRF token.
    pub token: String,
    /// Value of the `GUID` cookie.
    pub cookie: String,
}

/// Lifecycle of the client's session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[allow(missing_docs)]
    #[default]
    Unauthenticated,
    /// A handshake is in flight. A previous session, if any, stays usable meanwhile.
    Authenticating,
    #[allow(missing_docs)]
    Authenticated,
    /// The daemon rejected the token. [`crate::WebUiClient::refresh`] acquires a new one.
    TokenExpired,
}

/// One authenticated session. Never mutated; a refresh replaces it.
#[derive(Clone)]
pub struct Session {
    base_url: Url,
    endpoint: Endpoint,
    token: Token,
    cookie: String,
}

impl Session {
    pub(crate) fn new(base_url: Url, endpoint: Endpoint, token: Token, cookie: String) -> Self {
        Self {
            base_url,
            endpoint,
            token,
            cookie,
        }
    }

    /// Root URL of the WebUI, ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[allow(missing_docs)]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[allow(missing_docs)]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The current (token, cookie) pair.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            token: self.token.as_str().unwrap_or_default().to_owned(),
            cookie: self.cookie.clone(),
        }
    }

    pub(crate) fn auth(&self) -> RequestAuth {
        self.endpoint.auth(Some(&self.cookie))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("endpoint", &self.endpoint)
            .field("token_valid", &self.token.is_valid())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: SessionState,
    session: Option<Arc<Session>>,
    last_token: Token,
    /// Bumped by every `begin` and `install`.
    generation: u64,
}

/// Owner of the client's single session.
#[derive(Debug, Default)]
pub(crate) struct SessionManager {
    slot: RwLock<Slot>,
}

impl SessionManager {
    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.read().state
    }

    pub(crate) fn token(&self) -> Token {
        let slot = self.read();
        match &slot.session {
            Some(session) => session.token.clone(),
            None => slot.last_token.clone(),
        }
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.read().session.clone()
    }

    /// The session actions should use, or `AuthRequired`.
    pub(crate) fn current(&self) -> Outcome<Arc<Session>> {
        let slot = self.read();
        match (&slot.state, &slot.session) {
            (SessionState::Authenticated | SessionState::Authenticating, Some(session))
                if session.token.is_valid() =>
            {
                Ok(Arc::clone(session))
            }
            _ => Err(WebUiError::AuthRequired),
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated && self.current().is_ok()
    }

    /// Start a handshake. The returned generation is what `fail` must be given.
    pub(crate) fn begin(&self) -> u64 {
        let mut slot = self.write();
        if slot.state == SessionState::TokenExpired {
            slot.session = None;
        }
        slot.state = SessionState::Authenticating;
        slot.generation += 1;
        slot.generation
    }

    /// Replace the session wholesale, returning it with its generation.
    pub(crate) fn install(&self, session: Session) -> (Arc<Session>, u64) {
        let session = Arc::new(session);
        let mut slot = self.write();
        slot.last_token = session.token.clone();
        slot.session = Some(Arc::clone(&session));
        slot.state = SessionState::Authenticated;
        slot.generation += 1;
        (session, slot.generation)
    }

    /// Drop the session after the handshake started at `generation` failed.
    ///
    /// Does nothing if another handshake began or installed a session since,
    /// and returns whether the slot was reset.
    pub(crate) fn fail(&self, generation: u64) -> bool {
        let mut slot = self.write();
        if slot.generation != generation {
            debug!("ignoring failure of a superseded handshake");
            return false;
        }
        slot.state = SessionState::Unauthenticated;
        slot.session = None;
        slot.last_token = Token::FetchFailed;
        true
    }

    /// Record that the daemon rejected `seen`. A newer session is left alone.
    pub(crate) fn expire(&self, seen: &Arc<Session>) {
        let mut slot = self.write();
        let is_current = slot
            .session
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, seen));
        if is_current && slot.state == SessionState::Authenticated {
            debug!("token rejected by daemon, session expired");
            slot.state = SessionState::TokenExpired;
        }
    }
}

/// Fetch the token page and return the scraped `(token, cookie)` pair.
pub(crate) async fn acquire_token<T: WebUiOps>(
    ops: &T,
    endpoint: &Endpoint,
    base_url: &Url,
) -> Outcome<(String, String)> {
    let token_url = base_url
        .join(TOKEN_PAGE)
        .map_err(|e| WebUiError::Transport(format!("invalid token url: {e}")))?;

    debug!("Requesting token from {token_url}");
    let response = ops
        .get(&token_url, &endpoint.auth(None))
        .await
        .map_err(map_transport_fault)?;

    if response.status != 200 {
        debug!("Token page answered with status {}", response.status);
        return Err(WebUiError::InvalidCredentials);
    }

    match (scrape_token(&response.body), response.guid) {
        (Some(token), Some(cookie)) => Ok((token, cookie)),
        (token, cookie) => {
            if token.is_none() {
                if let Some(image) = scrape_captcha(&response.body) {
                    let image = base_url.join(&image).map(String::from).unwrap_or(image);
                    return Err(WebUiError::CaptchaRequired(image));
                }
            }
            warn!(
                token_found = token.is_some(),
                cookie_found = cookie.is_some(),
                "token page did not grant a usable session"
            );
            Err(WebUiError::InvalidCredentials)
        }
    }
}

pub(crate) fn scrape_token(markup: &str) -> Option<String> {
    TOKEN_ELEMENT
        .captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

fn scrape_captcha(markup: &str) -> Option<String> {
    CAPTCHA_IMAGE
        .captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}
