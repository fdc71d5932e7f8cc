use super::LookupProvider;
use crate::error::Result;
use ahash::AHashMap;
use grafter_model::{StoreId, VertexId};

/// Looks vertex ids up among the vertex records of the current group.
///
/// Used when ids are assigned by an external store: there is no dictionary
/// on disk, only the `(VertexId, StoreId)` pairs that travelled through the
/// shuffle alongside the edges. The token is the group key.
#[derive(Debug, Default)]
pub struct GroupScanLookup {
    table: AHashMap<VertexId, StoreId>,
}

impl GroupScanLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LookupProvider for GroupScanLookup {
    type Token = VertexId;
    type Key = VertexId;
    type Id = StoreId;
    type Source<'s> = &'s [(VertexId, StoreId)];

    fn load(&mut self, _group: &VertexId, vertices: &[(VertexId, StoreId)]) -> Result<()> {
        self.table.clear();
        for (id, store_id) in vertices {
            self.table.entry(id.clone()).or_insert(*store_id);
        }
        Ok(())
    }

    fn get(&self, key: &VertexId) -> Option<StoreId> {
        self.table.get(key).copied()
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}
