use fnv::FnvHashMap;
use slab::Slab;

use super::Stream;
use crate::h2::frame::StreamId;

/// Storage for a connection's streams, keyed by id.
///
/// Streams are owned here and only here; the connection reaps an entry
/// once its final frame has been observed.
#[derive(Debug, Default)]
pub(crate) struct Store {
    slab: Slab<Stream>,
    ids: FnvHashMap<StreamId, usize>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, stream: Stream) {
        let id = stream.id;
        let key = self.slab.insert(stream);
        let evicted = self.ids.insert(id, key);
        debug_assert!(evicted.is_none(), "duplicate stream id {id:?}");
    }

    pub(crate) fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        let key = *self.ids.get(&id)?;
        self.slab.get_mut(key)
    }

    pub(crate) fn get(&self, id: StreamId) -> Option<&Stream> {
        let key = *self.ids.get(&id)?;
        self.slab.get(key)
    }

    pub(crate) fn contains(&self, id: StreamId) -> bool {
        self.ids.contains_key(&id)
    }

    pub(crate) fn remove(&mut self, id: StreamId) -> Option<Stream> {
        let key = self.ids.remove(&id)?;
        Some(self.slab.remove(key))
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn for_each<F: FnMut(&mut Stream)>(&mut self, mut f: F) {
        for (_, stream) in self.slab.iter_mut() {
            f(stream);
        }
    }
}
