//! # Sample Converter
//!
//! In-memory transformations of interleaved PCM produced by the decoders.

use crate::error::{PlaybackError, Result};
use tracing::warn;

/// Utilities operating on whole interleaved PCM buffers.
pub struct SampleConverter;

impl SampleConverter {
    /// Reverse the order of samples in `data`, keeping the bytes within each
    /// sample in place.
    ///
    /// Every sample of every channel is treated as an independent unit, so a
    /// stereo buffer `L0 R0 L1 R1` becomes `R1 L1 R0 L0`.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` if `bits_per_sample` is not a whole number of bytes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_playback::SampleConverter;
    ///
    /// let reversed = SampleConverter::reverse_pcm(&[1, 2, 3, 4], 16).unwrap();
    /// assert_eq!(reversed, vec![3, 4, 1, 2]);
    /// ```
    pub fn reverse_pcm(data: &[u8], bits_per_sample: u16) -> Result<Vec<u8>> {
        let bytes_per_sample = Self::bytes_per_sample(bits_per_sample)?;
        if data.len() % bytes_per_sample != 0 {
            warn!(
                len = data.len(),
                bytes_per_sample, "PCM buffer ends with a partial sample, dropping it"
            );
        }

        let mut reversed = Vec::with_capacity(data.len());
        for sample in data.chunks_exact(bytes_per_sample).rev() {
            reversed.extend_from_slice(sample);
        }
        Ok(reversed)
    }

    /// Reverse sample order in place.
    pub fn reverse_pcm_in_place(data: &mut [u8], bits_per_sample: u16) -> Result<()> {
        let bytes_per_sample = Self::bytes_per_sample(bits_per_sample)?;
        let whole = data.len() - data.len() % bytes_per_sample;
        let samples = &mut data[..whole];
        // reversing all bytes and then each sample restores the byte order within samples
        samples.reverse();
        for sample in samples.chunks_exact_mut(bytes_per_sample) {
            sample.reverse();
        }
        Ok(())
    }

    fn bytes_per_sample(bits_per_sample: u16) -> Result<usize> {
        if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "cannot reverse {}-bit samples, bit depth must be a multiple of 8",
                bits_per_sample
            )));
        }
        Ok(usize::from(bits_per_sample / 8))
    }
}
