//! Client identity: the username hook and the session cookie

use http::header::COOKIE;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Request, Uri};
use std::fmt;
use std::sync::Arc;

/// Borrowed view of a request head
///
/// Handed to the [`UsernameProvider`]. Adapters that own the full request
/// also pass its extensions, which is where authentication middleware
/// usually leaves the resolved user.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    /// Request method
    pub method: &'a Method,
    /// Request URI
    pub uri: &'a Uri,
    /// Request headers
    pub headers: &'a HeaderMap,
    /// Request extensions, when the caller has them
    pub extensions: Option<&'a Extensions>,
}

impl<'a> RequestHead<'a> {
    /// A head without extensions
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
            extensions: None,
        }
    }

    /// The head of `request`, extensions included
    pub fn of<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            extensions: Some(request.extensions()),
        }
    }

    /// Typed extension lookup
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&'a T> {
        self.extensions.and_then(|extensions| extensions.get::<T>())
    }
}

impl<'a> From<&'a Parts> for RequestHead<'a> {
    fn from(parts: &'a Parts) -> Self {
        Self {
            method: &parts.method,
            uri: &parts.uri,
            headers: &parts.headers,
            extensions: Some(&parts.extensions),
        }
    }
}

/// Resolves the authenticated user of a request
///
/// Called once per logged exchange, when it starts. Blank names are dropped.
///
/// ```rust
/// use httplog_core::config::{LoggingConfig, UsernameProvider};
///
/// let config = LoggingConfig::builder()
///     .username_provider(UsernameProvider::new(|head| {
///         head.headers
///             .get("x-user")
///             .and_then(|value| value.to_str().ok())
///             .map(str::to_string)
///     }))
///     .build()
///     .unwrap();
/// assert!(config.username_provider().is_some());
/// ```
#[derive(Clone)]
pub struct UsernameProvider(Arc<dyn Fn(&RequestHead<'_>) -> Option<String> + Send + Sync>);

impl UsernameProvider {
    /// Wrap a resolver function
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&RequestHead<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    /// The username for `head`, if any
    pub fn username(&self, head: &RequestHead<'_>) -> Option<String> {
        (self.0)(head).filter(|name| !name.trim().is_empty())
    }
}

impl fmt::Debug for UsernameProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UsernameProvider(..)")
    }
}

impl PartialEq for UsernameProvider {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for UsernameProvider {}

/// Value of the cookie `name`, searched across every `Cookie` header
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_cookie_value_from_any_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("lang=en; SESSION=\"abc123\"; other=1"));

        assert_eq!(cookie_value(&headers, "SESSION").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "theme").as_deref(), Some("dark"));
        assert_eq!(cookie_value(&headers, "missing"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), "SESSION"), None);
    }

    #[test]
    fn test_empty_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("SESSION=; a=b"));
        assert_eq!(cookie_value(&headers, "SESSION"), None);
    }

    #[test]
    fn test_provider_reads_extensions_and_drops_blank_names() {
        #[derive(Clone)]
        struct User(&'static str);

        let provider = UsernameProvider::new(|head| head.extension::<User>().map(|user| user.0.to_string()));
        let mut request = Request::get("/").body(()).unwrap();
        assert_eq!(provider.username(&RequestHead::of(&request)), None);

        request.extensions_mut().insert(User("ann"));
        assert_eq!(provider.username(&RequestHead::of(&request)).as_deref(), Some("ann"));

        request.extensions_mut().insert(User("  "));
        assert_eq!(provider.username(&RequestHead::of(&request)), None);

        let (parts, _) = request.into_parts();
        let head = RequestHead::from(&parts);
        assert!(head.extension::<User>().is_some());
    }
}
