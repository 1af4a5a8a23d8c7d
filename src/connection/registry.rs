//! Stream registry: stream id → logical stream, for one connection.

use std::collections::HashMap;

use crate::context::ContextId;
use crate::stream::logical::LogicalStream;
use crate::stream::StreamId;

/// Owning store of a connection's live streams.
///
/// A stream's lifetime is its registry membership. Only the owning
/// connection task may touch the registry; every access asserts that.
pub(crate) struct StreamRegistry {
    owner: ContextId,
    streams: HashMap<StreamId, LogicalStream>,
}

impl StreamRegistry {
    pub fn new(owner: ContextId) -> Self {
        Self {
            owner,
            streams: HashMap::new(),
        }
    }

    fn assert_confined(&self) {
        debug_assert!(
            self.owner.is_current(),
            "stream registry of {} touched from {:?}",
            self.owner,
            ContextId::current()
        );
    }

    pub fn insert(&mut self, stream: LogicalStream) {
        self.assert_confined();
        self.streams.insert(stream.id(), stream);
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut LogicalStream> {
        self.assert_confined();
        self.streams.get_mut(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Drop the stream if it is closed and its handler has been told.
    ///
    /// Returns `true` when an entry was removed.
    pub fn remove_if_finished(&mut self, id: StreamId) -> Option<LogicalStream> {
        self.assert_confined();
        match self.streams.get(&id) {
            Some(stream) if stream.is_finished() => self.streams.remove(&id),
            _ => None,
        }
    }

    pub fn remove(&mut self, id: StreamId) -> Option<LogicalStream> {
        self.assert_confined();
        self.streams.remove(&id)
    }

    /// Remove every locally opened stream whose id is above `last_stream_id`.
    ///
    /// Pushed streams are left alone; GOAWAY only speaks about ours.
    pub fn drain_local_above(&mut self, last_stream_id: StreamId) -> Vec<LogicalStream> {
        self.assert_confined();
        let mut ids: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(id, stream)| **id > last_stream_id && !stream.is_passive())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.streams.remove(&id))
            .collect()
    }

    /// Empty the registry, handing back every stream in id order.
    pub fn drain(&mut self) -> Vec<LogicalStream> {
        self.assert_confined();
        let mut streams: Vec<LogicalStream> = self.streams.drain().map(|(_, s)| s).collect();
        streams.sort_by_key(|s| s.id());
        streams
    }

    /// Streams we opened that are still counted against the peer's limit.
    pub fn active_local(&self) -> usize {
        self.streams.values().filter(|s| !s.is_passive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
