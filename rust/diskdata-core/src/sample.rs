// rust/diskdata-core/src/sample.rs

//! Datapoints, batches and the decoding seam.
//!
//! Sample files are opaque, already-preprocessed blobs. A [`SampleDecoder`]
//! turns the bytes of one file into a flat input of `prod(xsize)` values;
//! an optional [`Transform`] then rewrites the datapoint before it reaches a
//! buffer or a batch.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ProviderError, Result};

/// One observation: a flat input and its label, if the dataset is labelled.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint<L> {
    pub input: Vec<f32>,
    pub label: Option<L>,
}

impl<L> Datapoint<L> {
    pub fn new(input: Vec<f32>, label: Option<L>) -> Self {
        Self { input, label }
    }

    /// Splits the datapoint into `(x, y)`.
    pub fn into_parts(self) -> (Vec<f32>, Option<L>) {
        (self.input, self.label)
    }
}

/// A stack of datapoints.
///
/// `shape` is `[n, xsize...]` in row-major order, so sample `i` occupies
/// `inputs[i * sample_len..(i + 1) * sample_len]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<L> {
    pub inputs: Vec<f32>,
    pub shape: Vec<usize>,
    pub labels: Option<Vec<L>>,
}

impl<L> Batch<L> {
    /// Stacks datapoints into one batch.
    ///
    /// Labels are kept only when every datapoint carries one.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if any input does not hold `prod(xsize)`
    /// values.
    pub fn stack(datapoints: Vec<Datapoint<L>>, xsize: &[usize]) -> Result<Self> {
        let sample_len = element_count(xsize);
        let n = datapoints.len();

        let mut inputs = Vec::with_capacity(n * sample_len);
        let mut labels = Vec::with_capacity(n);
        let mut all_labelled = true;

        for datapoint in datapoints {
            if datapoint.input.len() != sample_len {
                return Err(ProviderError::shape_mismatch(sample_len, datapoint.input.len()));
            }
            inputs.extend_from_slice(&datapoint.input);
            match datapoint.label {
                Some(label) => labels.push(label),
                None => all_labelled = false,
            }
        }

        let mut shape = Vec::with_capacity(xsize.len() + 1);
        shape.push(n);
        shape.extend_from_slice(xsize);

        Ok(Self {
            inputs,
            shape,
            labels: (all_labelled && n > 0).then_some(labels),
        })
    }

    /// Number of datapoints in the batch.
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per datapoint.
    pub fn sample_len(&self) -> usize {
        element_count(&self.shape[1..])
    }

    /// The flat input of datapoint `i`.
    pub fn sample(&self, i: usize) -> Option<&[f32]> {
        if i >= self.len() {
            return None;
        }
        let len = self.sample_len();
        Some(&self.inputs[i * len..(i + 1) * len])
    }

    /// The label of datapoint `i`.
    pub fn label(&self, i: usize) -> Option<&L> {
        self.labels.as_ref().and_then(|labels| labels.get(i))
    }
}

/// Product of the dimensions of one input.
pub fn element_count(xsize: &[usize]) -> usize {
    xsize.iter().product()
}

/// Turns the raw bytes of one sample file into a flat input.
pub trait SampleDecoder: Send + Sync {
    /// Decodes `bytes`, read from `path`, into `prod(xsize)` values.
    fn decode(&self, path: &Path, bytes: &[u8], xsize: &[usize]) -> Result<Vec<f32>>;

    /// Name of this decoder, for logs.
    fn name(&self) -> &'static str;
}

/// Little-endian `f32` arrays with no header.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawF32Decoder;

impl RawF32Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Encodes an input the way `decode` expects it. Handy for writing
    /// fixtures and preprocessing output.
    pub fn encode(input: &[f32]) -> Vec<u8> {
        input.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

impl SampleDecoder for RawF32Decoder {
    fn decode(&self, path: &Path, bytes: &[u8], xsize: &[usize]) -> Result<Vec<f32>> {
        let expected = element_count(xsize) * 4;
        if bytes.len() != expected {
            return Err(ProviderError::decode(
                path,
                format!("expected {expected} bytes of f32 data, found {}", bytes.len()),
            ));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn name(&self) -> &'static str {
        "raw-f32-le"
    }
}

type DecodeFn = dyn Fn(&[u8], &[usize]) -> std::result::Result<Vec<f32>, String> + Send + Sync;

/// Adapts a closure into a [`SampleDecoder`].
#[derive(Clone)]
pub struct FnDecoder {
    decode: Arc<DecodeFn>,
}

impl FnDecoder {
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&[u8], &[usize]) -> std::result::Result<Vec<f32>, String> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }
}

impl fmt::Debug for FnDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDecoder").finish_non_exhaustive()
    }
}

impl SampleDecoder for FnDecoder {
    fn decode(&self, path: &Path, bytes: &[u8], xsize: &[usize]) -> Result<Vec<f32>> {
        (self.decode)(bytes, xsize).map_err(|message| ProviderError::decode(path, message))
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// Rewrites a datapoint after decoding, e.g. to normalise inputs or remap
/// labels. The input must keep `prod(xsize)` values.
pub type Transform<L> = Arc<dyn Fn(Datapoint<L>) -> Datapoint<L> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_f32_decode() {
        let input = [1.0f32, -2.5, 3.25, 0.0];
        let bytes = RawF32Decoder::encode(&input);
        let decoded = RawF32Decoder::new()
            .decode(Path::new("0.bin"), &bytes, &[2, 2])
            .unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_raw_f32_decode_wrong_length() {
        let bytes = RawF32Decoder::encode(&[1.0, 2.0, 3.0]);
        let err = RawF32Decoder::new()
            .decode(Path::new("bad.bin"), &bytes, &[4])
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
        assert!(err.to_string().contains("bad.bin"));
    }

    #[test]
    fn test_fn_decoder_maps_errors() {
        let decoder = FnDecoder::new(|bytes, xsize| {
            if bytes.len() == element_count(xsize) {
                Ok(bytes.iter().map(|&b| b as f32 / 255.0).collect())
            } else {
                Err("length mismatch".to_string())
            }
        });

        let decoded = decoder.decode(Path::new("img.bin"), &[0, 255], &[2]).unwrap();
        assert_eq!(decoded, vec![0.0, 1.0]);

        let err = decoder.decode(Path::new("img.bin"), &[0], &[2]).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn test_stack_labelled() {
        let batch = Batch::stack(
            vec![
                Datapoint::new(vec![1.0, 2.0, 3.0], Some(1u8)),
                Datapoint::new(vec![4.0, 5.0, 6.0], Some(2u8)),
            ],
            &[3],
        )
        .unwrap();

        assert_eq!(batch.shape, vec![2, 3]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.sample(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(batch.sample(2), None);
        assert_eq!(batch.label(0), Some(&1));
        assert_eq!(batch.labels, Some(vec![1, 2]));
    }

    #[test]
    fn test_stack_unlabelled() {
        let batch: Batch<u8> = Batch::stack(
            vec![Datapoint::new(vec![0.0; 4], None), Datapoint::new(vec![1.0; 4], None)],
            &[2, 2],
        )
        .unwrap();

        assert_eq!(batch.shape, vec![2, 2, 2]);
        assert_eq!(batch.sample_len(), 4);
        assert!(batch.labels.is_none());
        assert!(batch.label(0).is_none());
    }

    #[test]
    fn test_stack_shape_mismatch() {
        let err = Batch::stack(
            vec![Datapoint::new(vec![1.0, 2.0], Some(0u8))],
            &[3],
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::ShapeMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_stack_empty() {
        let batch: Batch<u8> = Batch::stack(Vec::new(), &[5]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.shape, vec![0, 5]);
        assert!(batch.labels.is_none());
    }
}
