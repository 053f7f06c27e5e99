//! Update encoding for state-based merge.

use crate::error::{CrdtError, CrdtResult};
use crate::seq::Item;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire form of a document's full state.
///
/// Updates are state-based: the encoder ships every item identity it
/// knows about (tombstones included) and the receiver merges. Applying
/// the same update twice, or applying exchanged updates in either order,
/// converges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DocUpdate {
    /// Items per named sequence.
    pub sequences: BTreeMap<String, Vec<Item>>,
}

pub(crate) fn encode(update: &DocUpdate) -> CrdtResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(update, &mut buf)
        .map_err(|e| CrdtError::update_encode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> CrdtResult<DocUpdate> {
    ciborium::de::from_reader(bytes).map_err(|e| CrdtError::update_decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ItemId, ReplicaId};

    #[test]
    fn update_roundtrip() {
        let replica = ReplicaId::from_bytes([3u8; 16]);
        let mut sequences = BTreeMap::new();
        sequences.insert(
            "posts".to_string(),
            vec![
                Item {
                    id: ItemId::new(1, replica),
                    payload: Some(vec![1, 2, 3]),
                },
                Item {
                    id: ItemId::new(2, replica),
                    payload: None,
                },
            ],
        );

        let update = DocUpdate { sequences };
        let bytes = encode(&update).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, update);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode(&[0xff, 0x00, 0x13, 0x37]).is_err());
    }
}
