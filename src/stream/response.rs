//! Response metadata and push offers.

use http::{HeaderMap, StatusCode};

use crate::stream::{RequestHead, StreamHandle};

/// Response status line and headers, taken from the first header block.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The protocol carries no reason phrase; this is the canonical phrase
    /// for the status code, or empty when there is none.
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// A pushed response offered by the peer on a new stream.
#[derive(Debug)]
pub struct PushPromise {
    /// Request the peer claims the push answers.
    pub head: RequestHead,
    /// Handle for the promised stream. Only useful if the offer is accepted.
    pub stream: StreamHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrase_is_canonical_or_empty() {
        let ok = Response::new(StatusCode::OK, HeaderMap::new());
        assert_eq!(ok.reason(), "OK");

        let odd = Response::new(StatusCode::from_u16(599).unwrap(), HeaderMap::new());
        assert_eq!(odd.reason(), "");
    }
}
