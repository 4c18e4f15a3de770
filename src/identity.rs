//! Request identity: authenticated user and/or guest token
//!
//! The authenticated identity comes from an [`IdentityProvider`]; the default
//! one trusts a header set by the auth proxy in front of this service. The
//! guest identity is a long-lived `guest-id` cookie minted on first contact.
//!
//! Both end up as plain `owner_id` strings in storage. Guest owners are
//! namespaced (`guest:<uuid>`) so a forged cookie can never name a user.

use std::fmt;

use hyper::header::{HeaderName, COOKIE};
use hyper::HeaderMap;
use uuid::Uuid;

use crate::error::SheetError;

/// Default cookie carrying the guest token
pub const GUEST_ID_COOKIE: &str = "guest-id";

/// One year
pub const GUEST_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

const GUEST_OWNER_PREFIX: &str = "guest:";

/// Opaque guest token, held by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestToken(Uuid);

impl GuestToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a cookie value; anything that is not a UUID is ignored
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    /// Owner id under which this guest's records are stored
    pub fn owner_id(&self) -> String {
        format!("{}{}", GUEST_OWNER_PREFIX, self.0)
    }
}

impl fmt::Display for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identities carried by one request, passed explicitly into the core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user: Option<String>,
    pub guest: Option<GuestToken>,
}

impl RequestIdentity {
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            user: Some(id.into()),
            guest: None,
        }
    }

    pub fn anonymous(token: GuestToken) -> Self {
        Self {
            user: None,
            guest: Some(token),
        }
    }

    /// Effective owner: the user when signed in, otherwise the guest
    pub fn owner_id(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| self.guest.map(|g| g.owner_id()))
    }

    pub fn require_owner(&self) -> Result<String, SheetError> {
        self.owner_id()
            .ok_or_else(|| SheetError::Unauthorized("No user or guest identity".to_string()))
    }

    pub fn require_user(&self) -> Result<&str, SheetError> {
        self.user
            .as_deref()
            .ok_or_else(|| SheetError::Unauthorized("Sign-in required".to_string()))
    }

    pub fn guest_owner_id(&self) -> Option<String> {
        self.guest.map(|g| g.owner_id())
    }
}

/// Source of the authenticated identity
pub trait IdentityProvider: Send + Sync {
    fn authenticated_user(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header injected by the upstream auth proxy
pub struct TrustedHeaderProvider {
    header: HeaderName,
}

impl TrustedHeaderProvider {
    pub fn new(header: &str) -> Result<Self, SheetError> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| SheetError::Config(format!("Invalid auth header '{}': {}", header, e)))?;
        Ok(Self { header })
    }
}

impl IdentityProvider for TrustedHeaderProvider {
    fn authenticated_user(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() || value.starts_with(GUEST_OWNER_PREFIX) {
            return None;
        }
        Some(value.to_string())
    }
}

/// Guest cookie settings
#[derive(Debug, Clone)]
pub struct GuestCookie {
    pub name: String,
    pub max_age_secs: u64,
}

impl Default for GuestCookie {
    fn default() -> Self {
        Self {
            name: GUEST_ID_COOKIE.to_string(),
            max_age_secs: GUEST_COOKIE_MAX_AGE_SECS,
        }
    }
}

impl GuestCookie {
    fn raw_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| name.trim() == self.name)
            .map(|(_, value)| value)
    }

    pub fn read(&self, headers: &HeaderMap) -> Option<GuestToken> {
        self.raw_value(headers).and_then(GuestToken::parse)
    }

    /// True when the request sends this cookie at all, valid token or not
    pub fn is_present(&self, headers: &HeaderMap) -> bool {
        self.raw_value(headers).is_some()
    }

    /// `Set-Cookie` value issuing `token`
    pub fn issue(&self, token: &GuestToken) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name, token, self.max_age_secs
        )
    }

    /// `Set-Cookie` value removing the token
    pub fn clear(&self) -> String {
        format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", self.name)
    }
}

/// Builds a [`RequestIdentity`] from request headers
pub struct IdentityResolver {
    provider: Box<dyn IdentityProvider>,
    cookie: GuestCookie,
}

impl IdentityResolver {
    pub fn new(provider: Box<dyn IdentityProvider>, cookie: GuestCookie) -> Self {
        Self { provider, cookie }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> RequestIdentity {
        RequestIdentity {
            user: self.provider.authenticated_user(headers),
            guest: self.cookie.read(headers),
        }
    }

    pub fn cookie(&self) -> &GuestCookie {
        &self.cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_read_guest_cookie() {
        let token = GuestToken::generate();
        let cookie = GuestCookie::default();
        let raw = format!("theme=dark; guest-id={}; other=1", token);
        let h = headers(&[("cookie", raw.as_str())]);
        assert_eq!(cookie.read(&h), Some(token));

        let forged = headers(&[("cookie", "guest-id=user-123")]);
        assert_eq!(cookie.read(&forged), None);
        assert_eq!(cookie.read(&HeaderMap::new()), None);
    }

    #[test]
    fn test_malformed_guest_cookie_is_still_present() {
        let cookie = GuestCookie::default();
        assert!(cookie.is_present(&headers(&[("cookie", "guest-id=not-a-uuid")])));
        assert!(cookie.is_present(&headers(&[("cookie", "theme=dark; guest-id=")])));
        assert!(!cookie.is_present(&headers(&[("cookie", "theme=dark")])));
        assert!(!cookie.is_present(&HeaderMap::new()));

        let valid = format!("guest-id={}", GuestToken::generate());
        assert!(cookie.is_present(&headers(&[("cookie", valid.as_str())])));
    }

    #[test]
    fn test_issue_and_clear() {
        let cookie = GuestCookie::default();
        let token = GuestToken::generate();
        let issued = cookie.issue(&token);
        assert!(issued.starts_with(&format!("guest-id={};", token)));
        assert!(issued.contains("Max-Age=31536000"));
        assert!(cookie.clear().contains("Max-Age=0"));
    }

    #[test]
    fn test_trusted_header_provider() {
        let provider = TrustedHeaderProvider::new("x-authenticated-user").unwrap();
        assert_eq!(
            provider.authenticated_user(&headers(&[("x-authenticated-user", "user-1")])),
            Some("user-1".to_string())
        );
        assert_eq!(provider.authenticated_user(&headers(&[("x-authenticated-user", " ")])), None);
        assert_eq!(
            provider.authenticated_user(&headers(&[("x-authenticated-user", "guest:abc")])),
            None
        );
        assert!(TrustedHeaderProvider::new("bad header").is_err());
    }

    #[test]
    fn test_owner_prefers_user() {
        let token = GuestToken::generate();
        let both = RequestIdentity { user: Some("user-1".into()), guest: Some(token) };
        assert_eq!(both.owner_id().as_deref(), Some("user-1"));
        assert_eq!(both.guest_owner_id(), Some(token.owner_id()));

        let guest = RequestIdentity::anonymous(token);
        assert!(guest.owner_id().unwrap().starts_with("guest:"));
        assert!(guest.require_user().is_err());

        assert!(matches!(
            RequestIdentity::default().require_owner(),
            Err(SheetError::Unauthorized(_))
        ));
    }
}
