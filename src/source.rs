//! Shared beatmap source buffer.
//!
//! A [`BeatmapSource`] owns the raw file bytes plus the only two pieces of
//! state the pipeline shares across threads: a compute-once content hash and
//! a last-writer-wins loudness value. Everything else produced from a source
//! is owned by the single invocation that created it.

use std::hash::Hasher;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use twox_hash::XxHash64;

const HASH_SEED: u64 = 0;

/// Raw bytes of one `.osu` file plus its lazily-computed identity.
#[derive(Debug)]
pub struct BeatmapSource {
    data: Vec<u8>,
    hash: OnceLock<u64>,
    /// f32 bits; `f32::NAN` bits mean "not measured yet".
    loudness: AtomicU32,
}

impl BeatmapSource {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            hash: OnceLock::new(),
            loudness: AtomicU32::new(f32::NAN.to_bits()),
        }
    }

    /// Reads a beatmap file into memory. The parser itself never touches the
    /// filesystem; this is the synchronous convenience reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Reads a beatmap file into memory without blocking the executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be read.
    #[cfg(feature = "async_tokio")]
    pub async fn from_path_async<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(tokio::fs::read(path).await?))
    }

    /// Reads a beatmap file into memory without blocking the executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be read.
    #[cfg(feature = "async_std")]
    pub async fn from_path_async<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(async_std::fs::read(path.as_ref()).await?))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content hash of the raw bytes. Computed at most once; concurrent
    /// readers either see the published value or compute it themselves and
    /// race on a single atomic publish.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = XxHash64::with_seed(HASH_SEED);
            hasher.write(&self.data);
            hasher.finish()
        })
    }

    /// Measured loudness, if any analysis published one yet.
    #[must_use]
    pub fn loudness(&self) -> Option<f32> {
        let bits = self.loudness.load(Ordering::Relaxed);
        let value = f32::from_bits(bits);
        (!value.is_nan()).then_some(value)
    }

    /// Publishes a loudness measurement. Last writer wins.
    pub fn set_loudness(&self, value: f32) {
        self.loudness.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        let a = BeatmapSource::new(b"osu file format v14".to_vec());
        let b = BeatmapSource::new(b"osu file format v14".to_vec());
        assert_eq!(a.content_hash(), a.content_hash());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn loudness_starts_unset() {
        let source = BeatmapSource::new(Vec::new());
        assert_eq!(source.loudness(), None);
        source.set_loudness(-7.25);
        assert_eq!(source.loudness(), Some(-7.25));
    }
}
