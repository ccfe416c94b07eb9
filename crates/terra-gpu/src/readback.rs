//! Asynchronous GPU -> host readback through a staging buffer.
//!
//! Readback is split in two so callers can encode the copy while holding
//! whatever lock guards their buffers, then drop the lock before awaiting:
//! [`PendingReadback::encode`] records and submits the copy, and
//! [`PendingReadback::resolve`] maps the staging buffer and waits for it.

use tokio::sync::oneshot;

use crate::buffer::{StorageAllocator, WORD_SIZE};

/// Errors raised while mapping a staging buffer back to the host.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    /// The device rejected the map request.
    #[error("staging buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// Waiting for the submission failed (typically device loss).
    #[error("device poll failed: {0}")]
    Poll(String),

    /// The map callback was dropped without firing.
    #[error("map callback dropped before completion")]
    Cancelled,
}

/// A submitted copy into a staging buffer that has not been mapped yet.
pub struct PendingReadback {
    staging: wgpu::Buffer,
    submission: wgpu::SubmissionIndex,
    words: usize,
}

impl PendingReadback {
    /// Copy `words` words of `source` into a fresh staging buffer and submit.
    pub fn encode(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::Buffer,
        words: usize,
    ) -> Self {
        let size = words as u64 * WORD_SIZE;
        let staging = StorageAllocator::new(device).create_staging("readback-staging", size.max(WORD_SIZE));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
        if size > 0 {
            encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        }
        let submission = queue.submit(std::iter::once(encoder.finish()));

        Self {
            staging,
            submission,
            words,
        }
    }

    /// Number of words this readback will return.
    pub fn len(&self) -> usize {
        self.words
    }

    /// Whether the readback carries no data.
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Map the staging buffer and return its contents as words.
    pub async fn resolve(self, device: &wgpu::Device) -> Result<Vec<u32>, ReadbackError> {
        let (tx, rx) = oneshot::channel();
        let slice = self.staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(self.submission),
                timeout: None,
            })
            .map_err(|e| ReadbackError::Poll(e.to_string()))?;

        rx.await.map_err(|_| ReadbackError::Cancelled)??;

        let words = {
            let mapped = slice.get_mapped_range();
            decode_words(&mapped, self.words)
        };
        self.staging.unmap();

        log::trace!("Read back {} words", words.len());
        Ok(words)
    }
}

/// Decode little-endian words from a mapped byte range.
fn decode_words(bytes: &[u8], words: usize) -> Vec<u32> {
    bytes
        .chunks_exact(WORD_SIZE as usize)
        .take(words)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::create_test_device;

    #[test]
    fn test_decode_words_little_endian() {
        let bytes = [1u8, 0, 0, 0, 0, 0, 0x80, 0x3f];
        assert_eq!(decode_words(&bytes, 2), vec![1, 1.0f32.to_bits()]);
    }

    #[test]
    fn test_decode_words_truncates_padding() {
        let bytes = [7u8, 0, 0, 0, 9, 0, 0, 0];
        assert_eq!(decode_words(&bytes, 1), vec![7]);
    }

    #[test]
    fn test_roundtrip_through_staging() {
        let Some((device, queue)) = create_test_device() else {
            return;
        };
        let source = StorageAllocator::new(&device).create_storage("source", 5);
        queue.write_buffer(&source, 0, bytemuck::cast_slice(&[3u32, 1, 4, 1, 5]));
        let pending = PendingReadback::encode(&device, &queue, &source, 5);
        assert_eq!(pending.len(), 5);

        let words = pollster::block_on(pending.resolve(&device)).unwrap();
        assert_eq!(words, vec![3, 1, 4, 1, 5]);
    }
}
