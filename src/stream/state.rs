//! Stream protocol state.

/// Lifecycle of a logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, headers not yet sent.
    Open,
    /// Request headers sent, body may follow.
    HeadersSent,
    /// Request fully sent, awaiting the rest of the response.
    HalfClosedLocal,
    /// Response fully received, request still being sent.
    HalfClosedRemote,
    /// Both directions ended, or the stream was reset.
    Closed,
}

impl StreamState {
    pub fn on_headers_sent(self, end_of_stream: bool) -> Self {
        match self {
            StreamState::Open if end_of_stream => StreamState::HalfClosedLocal,
            StreamState::Open => StreamState::HeadersSent,
            other => other,
        }
    }

    pub fn on_local_end(self) -> Self {
        match self {
            StreamState::Open | StreamState::HeadersSent => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        }
    }

    pub fn on_remote_end(self) -> Self {
        match self {
            StreamState::Open | StreamState::HeadersSent => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        }
    }

    pub fn can_send_headers(self) -> bool {
        self == StreamState::Open
    }

    pub fn can_send_data(self) -> bool {
        matches!(self, StreamState::HeadersSent | StreamState::HalfClosedRemote)
    }

    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_then_response() {
        let s = StreamState::Open.on_headers_sent(false);
        assert_eq!(s, StreamState::HeadersSent);
        assert!(s.can_send_data());

        let s = s.on_local_end();
        assert_eq!(s, StreamState::HalfClosedLocal);
        assert!(!s.can_send_data());

        assert_eq!(s.on_remote_end(), StreamState::Closed);
    }

    #[test]
    fn response_finishes_first() {
        let s = StreamState::Open.on_headers_sent(false).on_remote_end();
        assert_eq!(s, StreamState::HalfClosedRemote);
        assert!(s.can_send_data());
        assert_eq!(s.on_local_end(), StreamState::Closed);
    }

    #[test]
    fn headers_with_end_of_stream() {
        let s = StreamState::Open.on_headers_sent(true);
        assert_eq!(s, StreamState::HalfClosedLocal);
        assert!(!s.can_send_headers());
    }
}
