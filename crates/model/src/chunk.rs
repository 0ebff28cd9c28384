use {
    crate::{batch::BatchId, recipient::RecipientId, send_config::EmbeddedSendConfig, TenantId},
    serde::{Deserialize, Serialize},
};

/// Unit of work handed to the chunk processor. The wire format is
/// core-internal but must stay stable across rolling upgrades.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkJob {
    pub batch_id: BatchId,
    pub tenant_id: TenantId,
    /// Dense, 0-based index within the batch.
    pub chunk_index: u32,
    pub recipient_ids: Vec<RecipientId>,
    pub send_config: EmbeddedSendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl ChunkJob {
    /// Broker-visible dedup id: `"chunk-{batchId}-{chunkIndex}"`.
    pub fn dedup_id(&self) -> String {
        dedup_id(self.batch_id, self.chunk_index)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }
}

pub fn dedup_id(batch_id: BatchId, chunk_index: u32) -> String {
    format!("chunk-{batch_id}-{chunk_index}")
}

/// Splits `recipient_ids` into dense, `chunk_index`-ordered chunks no larger
/// than `chunk_size`; only the final chunk may be smaller.
pub fn chunk_recipients(recipient_ids: &[RecipientId], chunk_size: usize) -> Vec<Vec<RecipientId>> {
    if chunk_size == 0 {
        return Vec::new();
    }
    recipient_ids
        .chunks(chunk_size)
        .map(|slice| slice.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<RecipientId> {
        (0..n).map(|_| RecipientId(uuid::Uuid::new_v4())).collect()
    }

    #[test]
    fn chunking_round_trips_and_bounds_size() {
        let recipients = ids(125);
        let chunks = chunk_recipients(&recipients, 50);

        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), [50, 50, 25]);
        let concatenated: Vec<_> = chunks.into_iter().flatten().collect();
        assert_eq!(concatenated, recipients);
    }

    #[test]
    fn telnyx_style_one_per_chunk() {
        let recipients = ids(3);
        let chunks = chunk_recipients(&recipients, 1);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn dedup_ids_are_stable_and_unique_per_index() {
        let batch_id = BatchId(uuid::Uuid::new_v4());
        assert_eq!(dedup_id(batch_id, 0), dedup_id(batch_id, 0));
        assert_ne!(dedup_id(batch_id, 0), dedup_id(batch_id, 1));
    }
}
