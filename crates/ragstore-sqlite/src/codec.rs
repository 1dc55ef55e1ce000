use ragstore_core::{Result, RetrievalError};

/// Little-endian f32 bytes, `4 * len` long.
pub fn embed_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a blob written by [`embed_to_blob`], checking it against the row's dimension.
pub fn blob_to_embed(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RetrievalError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    if blob.len() != dimension * 4 {
        return Err(RetrievalError::Corrupt(format!(
            "embedding blob holds {} values, row says {dimension}",
            blob.len() / 4
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
