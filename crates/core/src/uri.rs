//! Origin locators: a URI is an origin-scoped context plus a path, paired
//! with the fingerprint of the asset it names.

use crate::fingerprint::Fingerprint;
use std::fmt;

/// An origin-scoped namespace: scheme plus authority (`http://example.com`).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UriContext {
    scheme: String,
    authority: String,
}

impl UriContext {
    /// Parse a context from `scheme://authority`, ignoring any trailing path.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| crate::Error::InvalidUri(format!("missing scheme: {s}")))?;
        if scheme.is_empty() {
            return Err(crate::Error::InvalidUri(format!("empty scheme: {s}")));
        }
        let authority = rest.split('/').next().unwrap_or("");
        if authority.is_empty() {
            return Err(crate::Error::InvalidUri(format!("empty authority: {s}")));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Resolve a lookup-response string against this context: absolute URLs
    /// stand alone, anything else is taken as a path under this authority.
    /// The result carries the zero fingerprint until one is assigned.
    pub fn resolve(&self, s: &str) -> crate::Result<Uri> {
        if s.contains("://") {
            return Uri::new(Fingerprint::zero(), s);
        }
        let path = if s.starts_with('/') {
            s.to_string()
        } else {
            format!("/{s}")
        };
        Ok(Uri {
            fingerprint: Fingerprint::zero(),
            context: self.clone(),
            path,
        })
    }
}

impl fmt::Display for UriContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

impl fmt::Debug for UriContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A named asset: the content fingerprint plus the origin to fetch it from.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    fingerprint: Fingerprint,
    context: UriContext,
    path: String,
}

impl Uri {
    /// Build a URI from a fingerprint and a full URL string.
    pub fn new(fingerprint: Fingerprint, url: &str) -> crate::Result<Self> {
        let context = UriContext::parse(url)?;
        let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
        let path = match after_scheme.find('/') {
            Some(idx) => after_scheme[idx..].to_string(),
            None => "/".to_string(),
        };
        Ok(Self {
            fingerprint,
            context,
            path,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn context(&self) -> &UriContext {
        &self.context
    }

    /// The path under the authority, always `/`-prefixed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment. Name lookup interprets this as a hex
    /// fingerprint.
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Replace the fingerprint, keeping the locator.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// The full URL string.
    pub fn to_url(&self) -> String {
        format!("{}{}", self.context, self.path)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl fmt::Debug for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uri({}, {})", self.to_url(), self.fingerprint)
    }
}
