//! Dense convolution lowered through a per-call patch matrix.
//!
//! Each output pixel becomes one row of `filter_h * filter_w * in_channels` offset input
//! samples (zero for padding taps), so every output channel is a plain dot product with
//! its contiguous filter row. Results match [`crate::kernels::conv::convolve`] exactly.

use crate::error::{ConvError, ConvResult};
use crate::kernels::conv::{validate, ConvDims};
use crate::kernels::quant::{requantize, PerChannelQuant, QuantElement};
use crate::params::ConvParams;
use crate::shape::{Shape, TensorView, TensorViewMut};
use log::{debug, trace};

/// Scratch ceiling in bytes; requests at or above it fail with `ScratchTooLarge`.
pub const SCRATCH_LIMIT_BYTES: u64 = 0x7fff_ffff;

/// Bytes of `i32` scratch the lowering needs, or `None` if the size overflows.
pub(crate) fn scratch_bytes(d: &ConvDims) -> Option<u64> {
    let rows = (d.batches as u64).checked_mul(d.out_h as u64)?.checked_mul(d.out_w as u64)?;
    let cols = (d.filter_h as u64).checked_mul(d.filter_w as u64)?.checked_mul(d.in_c as u64)?;
    rows.checked_mul(cols)?.checked_mul(std::mem::size_of::<i32>() as u64)
}

/// Zeroed output buffer for `shape`, refused under the same ceiling as scratch so a
/// huge shape fails with `ScratchTooLarge` instead of aborting on allocation.
pub(crate) fn alloc_output<T: Copy + Default>(shape: &Shape) -> ConvResult<Vec<T>> {
    let n = shape.expect_flat_size("output")?;
    let bytes = (n as u64)
        .checked_mul(std::mem::size_of::<T>() as u64)
        .ok_or(ConvError::ScratchTooLarge { bytes: u64::MAX })?;
    if bytes >= SCRATCH_LIMIT_BYTES {
        return Err(ConvError::ScratchTooLarge { bytes });
    }
    let mut out = Vec::new();
    out.try_reserve_exact(n).map_err(|_| ConvError::ScratchTooLarge { bytes })?;
    out.resize(n, T::default());
    Ok(out)
}

pub fn convolve_im2col<T: QuantElement>(
    params: &ConvParams,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output: TensorViewMut<'_, T>,
    quant: PerChannelQuant<'_>,
) -> ConvResult<()> {
    convolve_im2col_with_limit(params, input, filter, bias, output, quant, SCRATCH_LIMIT_BYTES)
}

/// [`convolve_im2col`] with an explicit scratch ceiling.
pub fn convolve_im2col_with_limit<T: QuantElement>(
    params: &ConvParams,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output: TensorViewMut<'_, T>,
    quant: PerChannelQuant<'_>,
    limit_bytes: u64,
) -> ConvResult<()> {
    let d = validate(params, &input, &filter, bias.as_ref(), &output, &quant)?;
    let bytes = scratch_bytes(&d).ok_or(ConvError::ScratchTooLarge { bytes: u64::MAX })?;
    trace!("im2col scratch: {} bytes (limit {})", bytes, limit_bytes);
    if bytes >= limit_bytes {
        return Err(ConvError::ScratchTooLarge { bytes });
    }
    let cols = d.filter_h * d.filter_w * d.in_c;
    let rows = d.batches * d.out_h * d.out_w;
    let mut patches: Vec<i32> = Vec::new();
    patches.try_reserve_exact(rows * cols).map_err(|_| ConvError::ScratchTooLarge { bytes })?;
    debug!(
        "conv (im2col): input {:?} filter {:?} output {:?} patches {}x{}",
        input.shape.dims(), filter.shape.dims(), output.shape.dims(), rows, cols
    );

    fill_patches(params, &input, &d, &mut patches);

    let bias = bias.map(|b| b.data);
    let out = output.data;
    let o_shape = output.shape;
    let mut row = 0usize;
    for b in 0..d.batches {
        for out_y in 0..d.out_h {
            for out_x in 0..d.out_w {
                let patch = &patches[row * cols..(row + 1) * cols];
                for oc in 0..d.out_c {
                    let w = &filter.data[oc * cols..(oc + 1) * cols];
                    let mut acc = patch.iter().zip(w).fold(0i32, |acc, (&p, &wi)| acc.wrapping_add(p.wrapping_mul(i32::from(wi))));
                    if let Some(bias) = bias {
                        acc = acc.wrapping_add(bias[oc]);
                    }
                    let v = requantize(
                        acc, quant.multiplier[oc], quant.shift[oc],
                        params.output_offset, params.activation_min, params.activation_max,
                    );
                    out[o_shape.offset(b, out_y, out_x, oc)] = T::from_i32(v);
                }
                row += 1;
            }
        }
    }
    Ok(())
}

fn fill_patches<T: QuantElement>(params: &ConvParams, input: &TensorView<'_, T>, d: &ConvDims, patches: &mut Vec<i32>) {
    let pad_h = params.padding.height as isize;
    let pad_w = params.padding.width as isize;
    for b in 0..d.batches {
        for out_y in 0..d.out_h {
            let in_y_origin = (out_y * params.stride_height) as isize - pad_h;
            for out_x in 0..d.out_w {
                let in_x_origin = (out_x * params.stride_width) as isize - pad_w;
                for fy in 0..d.filter_h {
                    let in_y = in_y_origin + (params.dilation_height * fy) as isize;
                    for fx in 0..d.filter_w {
                        let in_x = in_x_origin + (params.dilation_width * fx) as isize;
                        let inside = in_y >= 0 && in_y < d.in_h as isize && in_x >= 0 && in_x < d.in_w as isize;
                        if inside {
                            let base = input.shape.offset(b, in_y as usize, in_x as usize, 0);
                            patches.extend(input.data[base..base + d.in_c].iter().map(|x| x.to_i32().wrapping_add(params.input_offset)));
                        } else {
                            patches.extend(std::iter::repeat(0).take(d.in_c));
                        }
                    }
                }
            }
        }
    }
}
