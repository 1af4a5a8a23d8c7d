//! Outgoing request description.

use std::time::Duration;

use http::{HeaderMap, Method};
use uuid::Uuid;

use crate::stream::StreamHandler;

/// Unique identifier for a request, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Method, target and header fields of a request.
///
/// The codec turns this into pseudo-headers plus regular fields. Header names
/// in [`HeaderMap`] are already lower-case.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub scheme: String,
    pub path: String,
    pub authority: Option<String>,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            scheme: "https".to_string(),
            path: path.into(),
            authority: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// A request waiting to be bound to a stream.
pub struct Request {
    id: RequestId,
    head: RequestHead,
    pub(crate) handler: Box<dyn StreamHandler>,
    idle_timeout: Option<Duration>,
}

impl Request {
    pub fn new(head: RequestHead, handler: impl StreamHandler) -> Self {
        Self {
            id: RequestId::new(),
            head,
            handler: Box::new(handler),
            idle_timeout: None,
        }
    }

    /// Fail the request if no data arrives for `timeout`.
    ///
    /// Armed as soon as the stream is created.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub(crate) fn set_default_timeout(&mut self, timeout: Option<Duration>) {
        if self.idle_timeout.is_none() {
            self.idle_timeout = timeout;
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (RequestId, RequestHead, Box<dyn StreamHandler>, Option<Duration>) {
        (self.id, self.head, self.handler, self.idle_timeout)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("head", &self.head)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}
