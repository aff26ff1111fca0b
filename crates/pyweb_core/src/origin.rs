//! Script origin representation.
//!
//! The host engine owns real URL parsing; policy lookups only need a
//! normalized `scheme://host[:port]` tuple. Unparseable or missing
//! origins collapse to the opaque origin, which never matches any
//! origin-specific policy entry and is never same-origin with anything.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScriptOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
    opaque: bool,
}

impl ScriptOrigin {
    /// Parse an origin out of a URL-shaped string. Anything after the
    /// authority section (path, query, fragment) is ignored.
    pub fn parse(url: &str) -> Self {
        let Some((scheme, rest)) = url.split_once("://") else {
            return Self::opaque();
        };
        if scheme.is_empty() {
            return Self::opaque();
        }
        let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
        if authority.is_empty() {
            return Self::opaque();
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => match p.parse::<u16>() {
                Ok(port) => (h, Some(port)),
                Err(_) => (authority, None),
            },
            None => (authority, None),
        };
        if host.is_empty() {
            return Self::opaque();
        }
        ScriptOrigin {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            opaque: false,
        }
    }

    /// The origin of `about:blank` and of anything that failed to parse.
    pub fn opaque() -> Self {
        ScriptOrigin {
            scheme: String::new(),
            host: String::new(),
            port: None,
            opaque: true,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Key used for per-origin policy tables.
    pub fn policy_key(&self) -> String {
        self.to_string()
    }

    /// Same-origin check per the scheme/host/port tuple. Opaque origins
    /// are never same-origin, not even with themselves.
    pub fn same_origin(&self, other: &ScriptOrigin) -> bool {
        if self.opaque || other.opaque {
            return false;
        }
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }
}

impl fmt::Display for ScriptOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opaque {
            return write!(f, "null");
        }
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}
