//! REST routes and their rate-limit identity
//!
//! The platform assigns buckets per route template. Ids in major positions
//! (`channels`, `guilds`, `webhooks`) split a template into separate quota
//! scopes, so they stay in the key; every other id is replaced.

use std::fmt;

use reqwest::Method;

/// Resources whose id is a major parameter
const MAJOR_RESOURCES: [&str; 3] = ["channels", "guilds", "webhooks"];

/// An HTTP method plus a path relative to the versioned API root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: String,
}

impl Route {
    /// Create a route; `path` must start with `/` and be percent-encoded
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Method and path with minor ids replaced, major ids kept
    ///
    /// `GET /channels/1/messages/2` becomes `GET /channels/1/messages/:id`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.normalized(true))
    }

    /// Method and path with every id replaced
    ///
    /// Used to remember which bucket hash the platform assigned to a route.
    #[must_use]
    pub fn template(&self) -> String {
        format!("{} {}", self.method, self.normalized(false))
    }

    /// The major parameter, e.g. `channels/1`, if the route has one
    #[must_use]
    pub fn major(&self) -> Option<String> {
        let mut segments = self.segments();
        let resource = segments.next()?;
        let id = segments.next()?;
        (MAJOR_RESOURCES.contains(&resource) && is_id(id)).then(|| format!("{resource}/{id}"))
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
    }

    fn normalized(&self, keep_major: bool) -> String {
        let mut out = String::with_capacity(self.path.len());
        let mut previous: Option<&str> = None;

        for (index, segment) in self.segments().enumerate() {
            out.push('/');
            let is_major = index == 1 && previous.is_some_and(|p| MAJOR_RESOURCES.contains(&p));

            if previous == Some("reactions") {
                out.push_str(":emoji");
            } else if is_id(segment) {
                if is_major && keep_major {
                    out.push_str(segment);
                } else if is_major {
                    out.push_str(":major");
                } else {
                    out.push_str(":id");
                }
            } else {
                out.push_str(segment);
            }
            previous = Some(segment);
        }

        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Percent-encode a single path segment or header value
///
/// Everything outside the RFC 3986 unreserved set is escaped.
pub(crate) fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
