//! Authorization client lifecycle and token validation.
//!
//! # Responsibility
//! - Build the authorization client at most once, after a reachability ping.
//! - Normalize incoming session tokens and route them to session or
//!   access-token validation.
//! - Map scopes to the role they require.
//!
//! # Invariants
//! - Racing initializers never build two clients or send two pings.
//! - A failed initialization leaves the authorizer uninitialized; a later
//!   call may retry.
//! - Tokens are never logged.

use crate::error::ErrorKind;
use crate::model::scope::{OwnerId, Scope};
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Role required for shared-scope access.
pub const ROLE_ADMIN: &str = "admin";
/// Role required for owner-scope access.
pub const ROLE_USER: &str = "user";
/// Reachability check budget used before building the client.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(1500);

/// Returns the role a caller must hold to operate on `scope`.
pub fn required_role(scope: &Scope) -> &'static str {
    match scope {
        Scope::Shared => ROLE_ADMIN,
        Scope::Owner(_) => ROLE_USER,
    }
}

/// Identity returned by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: OwnerId,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl UserIdentity {
    /// Owner partition belonging to this identity.
    pub fn owner_scope(&self) -> Scope {
        Scope::Owner(self.id)
    }
}

/// Where and how to reach the authorization service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerSettings {
    pub url: String,
    pub client_id: String,
    pub ping_timeout: Duration,
}

impl AuthorizerSettings {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// How a normalized token is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Opaque cookie session.
    Session,
    /// JWT access token (contains `.` separators).
    AccessToken,
}

/// Error for authorization setup and validation.
#[derive(Debug)]
pub enum AuthError {
    NotInitialized,
    MissingSession,
    InvalidUrl(String),
    PingFailed {
        address: String,
        source: std::io::Error,
    },
    /// Client construction failed.
    Client(String),
    /// The service rejected the token or the roles.
    Rejected(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSession | Self::Rejected(_) => ErrorKind::Authorization,
            Self::NotInitialized | Self::InvalidUrl(_) | Self::PingFailed { .. } | Self::Client(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "authorizer client not initialized"),
            Self::MissingSession => write!(f, "session token not found"),
            Self::InvalidUrl(url) => write!(f, "invalid authorizer url: `{url}`"),
            Self::PingFailed { address, source } => {
                write!(f, "authorizer ping failed: cannot connect to {address}: {source}")
            }
            Self::Client(message) => write!(f, "failed to create authorizer client: {message}"),
            Self::Rejected(message) => write!(f, "invalid session: {message}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PingFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Validation calls offered by an authorization service client.
pub trait AuthorizerClient: Send + Sync {
    fn validate_session(&self, cookie: &str, roles: &[&str]) -> Result<UserIdentity, AuthError>;
    fn validate_access_token(&self, token: &str, roles: &[&str])
        -> Result<UserIdentity, AuthError>;
}

/// Builds clients; the ping is overridable so tests need no network.
pub trait AuthorizerConnector {
    fn ping(&self, settings: &AuthorizerSettings) -> Result<(), AuthError> {
        ping_service(&settings.url, settings.ping_timeout)
    }

    fn connect(&self, settings: &AuthorizerSettings) -> Result<Arc<dyn AuthorizerClient>, AuthError>;
}

/// Holder of the process-wide authorization client.
///
/// Owned by the caller (typically next to the store) instead of living in a
/// hidden global; initialization is explicit and once-only.
#[derive(Default)]
pub struct Authorizer {
    client: OnceCell<Arc<dyn AuthorizerClient>>,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }

    /// Pings the service and builds the client unless already built.
    ///
    /// Concurrent callers block on the first one; when it fails the next
    /// caller runs the whole sequence again.
    pub fn initialize(
        &self,
        settings: &AuthorizerSettings,
        connector: &dyn AuthorizerConnector,
    ) -> Result<(), AuthError> {
        self.client
            .get_or_try_init(|| {
                let started = Instant::now();
                let result = connector
                    .ping(settings)
                    .and_then(|()| connector.connect(settings));
                match &result {
                    Ok(_) => info!(
                        "event=authz_init module=auth status=ok url={} client_id={} duration_ms={}",
                        settings.url,
                        settings.client_id,
                        started.elapsed().as_millis()
                    ),
                    Err(err) => warn!(
                        "event=authz_init module=auth status=error url={} duration_ms={} error={err}",
                        settings.url,
                        started.elapsed().as_millis()
                    ),
                }
                result
            })
            .map(|_| ())
    }

    /// Validates `token` for `roles` and returns the caller identity.
    pub fn authorize(&self, token: Option<&str>, roles: &[&str]) -> Result<UserIdentity, AuthError> {
        let client = self.client.get().ok_or(AuthError::NotInitialized)?;
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingSession)?;

        let token = normalize_session_token(token);
        let result = match classify_token(&token) {
            TokenKind::AccessToken => client.validate_access_token(&token, roles),
            TokenKind::Session => client.validate_session(&token, roles),
        };
        if let Err(err) = &result {
            info!(
                "event=authz_validate module=auth status=rejected roles={} error_kind={}",
                roles.join(","),
                err.kind()
            );
        }
        result
    }

    /// Authorizes `token` against the role `scope` requires.
    pub fn authorize_scope(&self, token: Option<&str>, scope: &Scope) -> Result<UserIdentity, AuthError> {
        self.authorize(token, &[required_role(scope)])
    }
}

/// Undoes transport encoding of a session token.
///
/// Percent escapes are decoded when the whole token decodes cleanly, and
/// spaces (a `+` mangled by form decoding) are turned back into `+`.
pub fn normalize_session_token(token: &str) -> String {
    let decoded = percent_decode(token).unwrap_or_else(|| token.to_string());
    if decoded.contains(' ') {
        decoded.replace(' ', "+")
    } else {
        decoded
    }
}

pub fn classify_token(token: &str) -> TokenKind {
    if token.contains('.') {
        TokenKind::AccessToken
    } else {
        TokenKind::Session
    }
}

/// Checks TCP reachability of the host behind `service_url`.
///
/// Without an explicit port, `https` maps to 443 and anything else to 80.
pub fn ping_service(service_url: &str, timeout: Duration) -> Result<(), AuthError> {
    let address = service_address(service_url)?;
    let socket_addrs = address
        .to_socket_addrs()
        .map_err(|source| AuthError::PingFailed {
            address: address.clone(),
            source,
        })?;

    let mut last_error = None;
    for socket_addr in socket_addrs {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(_) => return Ok(()),
            Err(err) => last_error = Some(err),
        }
    }

    Err(AuthError::PingFailed {
        source: last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
        }),
        address,
    })
}

/// Extracts `host:port` from an absolute URL.
fn service_address(service_url: &str) -> Result<String, AuthError> {
    let invalid = || AuthError::InvalidUrl(service_url.to_string());
    let (scheme, rest) = service_url.split_once("://").ok_or_else(invalid)?;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(invalid());
    }

    let default_port = if scheme.eq_ignore_ascii_case("https") { 443 } else { 80 };

    // Bracketed IPv6 literal, optionally followed by `:port`.
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped.split_once(']').ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid()),
        };
        return Ok(format!("[{host}]:{port}"));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = if port.is_empty() {
                default_port
            } else {
                port.parse::<u16>().map_err(|_| invalid())?
            };
            Ok(format!("{host}:{port}"))
        }
        Some(_) => Err(invalid()),
        None => Ok(format!("{authority}:{default_port}")),
    }
}

fn percent_decode(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_string());
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = input.get(index + 1..index + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).ok()
}
