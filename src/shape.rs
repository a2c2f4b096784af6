use crate::error::{ConvError, ConvResult};
use serde::{Deserialize, Serialize};

/// Dimension sizes of a row-major tensor, innermost dimension last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self { Self { dims: dims.into() } }

    /// 4-D activation shape (batch, height, width, channels).
    pub fn nhwc(n: usize, h: usize, w: usize, c: usize) -> Self { Self { dims: vec![n, h, w, c] } }

    pub fn dims_count(&self) -> usize { self.dims.len() }

    pub fn dims(&self) -> &[usize] { &self.dims }

    /// Size of dimension `i`. Panics if `i` is out of range; kernels only call this
    /// after `expect_rank`.
    pub fn dim(&self, i: usize) -> usize { self.dims[i] }

    /// Element count of a trusted shape; untrusted shapes go through `checked_flat_size`.
    pub fn flat_size(&self) -> usize { self.dims.iter().product() }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_flat_size(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub(crate) fn expect_flat_size(&self, tensor: &'static str) -> ConvResult<usize> {
        self.checked_flat_size().ok_or(ConvError::ShapeOverflow { tensor })
    }

    /// Flat offset of `(i0, i1, i2, i3)` in a 4-D shape.
    #[inline]
    pub fn offset(&self, i0: usize, i1: usize, i2: usize, i3: usize) -> usize {
        let d = &self.dims;
        ((i0 * d[1] + i1) * d[2] + i2) * d[3] + i3
    }

    pub(crate) fn expect_rank(&self, tensor: &'static str, rank: usize) -> ConvResult<()> {
        if self.dims.len() != rank {
            return Err(ConvError::RankMismatch { tensor, expected: rank, actual: self.dims.len() });
        }
        Ok(())
    }
}

impl From<[usize; 4]> for Shape {
    fn from(d: [usize; 4]) -> Self { Self { dims: d.to_vec() } }
}

/// Read-only tensor: a shape plus the caller's buffer.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    pub shape: &'a Shape,
    pub data: &'a [T],
}

impl<'a, T> TensorView<'a, T> {
    pub fn new(shape: &'a Shape, data: &'a [T]) -> Self { Self { shape, data } }

    pub(crate) fn expect_len(&self, tensor: &'static str) -> ConvResult<()> {
        check_len(tensor, self.shape.expect_flat_size(tensor)?, self.data.len())
    }
}

/// Writable tensor; the kernels write into it and never resize it.
#[derive(Debug)]
pub struct TensorViewMut<'a, T> {
    pub shape: &'a Shape,
    pub data: &'a mut [T],
}

impl<'a, T> TensorViewMut<'a, T> {
    pub fn new(shape: &'a Shape, data: &'a mut [T]) -> Self { Self { shape, data } }

    pub(crate) fn expect_len(&self, tensor: &'static str) -> ConvResult<()> {
        check_len(tensor, self.shape.expect_flat_size(tensor)?, self.data.len())
    }
}

fn check_len(tensor: &'static str, needed: usize, actual: usize) -> ConvResult<()> {
    if actual < needed {
        return Err(ConvError::BufferTooSmall { tensor, needed, actual });
    }
    Ok(())
}

pub(crate) fn expect_eq(what: &'static str, left: usize, right: usize) -> ConvResult<()> {
    if left != right {
        return Err(ConvError::DimMismatch { what, left, right });
    }
    Ok(())
}

/// Rejects a sliding window whose furthest tap offset, `(out - 1) * stride +
/// (filter - 1) * dilation`, or whose padding does not fit in `isize`.
pub(crate) fn expect_window(out: usize, stride: usize, filter: usize, dilation: usize, pad: usize) -> ConvResult<()> {
    let reach = out
        .saturating_sub(1)
        .checked_mul(stride)
        .zip(filter.saturating_sub(1).checked_mul(dilation))
        .and_then(|(a, b)| a.checked_add(b));
    match reach {
        Some(r) if r <= isize::MAX as usize && pad <= isize::MAX as usize => Ok(()),
        _ => Err(ConvError::ShapeOverflow { tensor: "convolution window" }),
    }
}
