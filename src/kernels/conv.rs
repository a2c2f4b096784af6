use crate::error::ConvResult;
use crate::kernels::im2col::alloc_output;
use crate::kernels::quant::{requantize, PerChannelQuant, QuantElement};
use crate::params::ConvParams;
use crate::shape::{expect_eq, expect_window, Shape, TensorView, TensorViewMut};
use log::debug;

/// Resolved extents of a dense convolution, checked against every tensor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvDims {
    pub batches: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub in_c: usize,
    pub filter_h: usize,
    pub filter_w: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub out_c: usize,
}

/// Checks every shape relation and the input, filter and bias buffers. The output
/// buffer is left to the caller so the shape can be validated before allocating it.
pub(crate) fn validate_shapes<T>(
    params: &ConvParams,
    input: &TensorView<'_, T>,
    filter: &TensorView<'_, i8>,
    bias: Option<&TensorView<'_, i32>>,
    output_shape: &Shape,
    quant: &PerChannelQuant<'_>,
) -> ConvResult<ConvDims> {
    input.shape.expect_rank("input", 4)?;
    filter.shape.expect_rank("filter", 4)?;
    output_shape.expect_rank("output", 4)?;
    expect_eq("input batch vs output batch", input.shape.dim(0), output_shape.dim(0))?;
    expect_eq("input channels vs filter depth", input.shape.dim(3), filter.shape.dim(3))?;
    expect_eq("filter count vs output channels", filter.shape.dim(0), output_shape.dim(3))?;
    let out_c = output_shape.dim(3);
    if let Some(b) = bias {
        expect_eq("bias size vs output channels", b.shape.expect_flat_size("bias")?, out_c)?;
        b.expect_len("bias")?;
    }
    quant.expect_channels(out_c)?;
    input.expect_len("input")?;
    filter.expect_len("filter")?;
    output_shape.expect_flat_size("output")?;
    let d = ConvDims {
        batches: input.shape.dim(0),
        in_h: input.shape.dim(1),
        in_w: input.shape.dim(2),
        in_c: input.shape.dim(3),
        filter_h: filter.shape.dim(1),
        filter_w: filter.shape.dim(2),
        out_h: output_shape.dim(1),
        out_w: output_shape.dim(2),
        out_c,
    };
    expect_window(d.out_h, params.stride_height, d.filter_h, params.dilation_height, params.padding.height)?;
    expect_window(d.out_w, params.stride_width, d.filter_w, params.dilation_width, params.padding.width)?;
    Ok(d)
}

pub(crate) fn validate<T>(
    params: &ConvParams,
    input: &TensorView<'_, T>,
    filter: &TensorView<'_, i8>,
    bias: Option<&TensorView<'_, i32>>,
    output: &TensorViewMut<'_, T>,
    quant: &PerChannelQuant<'_>,
) -> ConvResult<ConvDims> {
    let d = validate_shapes(params, input, filter, bias, output.shape, quant)?;
    output.expect_len("output")?;
    Ok(d)
}

/// Per-channel quantized 2-D convolution.
///
/// Filter layout is (out_channels, filter_h, filter_w, in_channels). Taps falling
/// outside the input are omitted, so padding never contributes `filter * input_offset`.
/// The accumulator wraps on overflow; keeping the filter footprint small enough is the
/// caller's contract.
pub fn convolve<T: QuantElement>(
    params: &ConvParams,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output: TensorViewMut<'_, T>,
    quant: PerChannelQuant<'_>,
) -> ConvResult<()> {
    let d = validate(params, &input, &filter, bias.as_ref(), &output, &quant)?;
    debug!(
        "conv: input {:?} filter {:?} output {:?} stride {}x{} dilation {}x{} pad {:?}",
        input.shape.dims(), filter.shape.dims(), output.shape.dims(),
        params.stride_height, params.stride_width, params.dilation_height, params.dilation_width, params.padding
    );
    let bias = bias.map(|b| b.data);
    let out = output.data;
    let (in_shape, f_shape, o_shape) = (input.shape, filter.shape, output.shape);
    let pad_h = params.padding.height as isize;
    let pad_w = params.padding.width as isize;

    for b in 0..d.batches {
        for out_y in 0..d.out_h {
            let in_y_origin = (out_y * params.stride_height) as isize - pad_h;
            for out_x in 0..d.out_w {
                let in_x_origin = (out_x * params.stride_width) as isize - pad_w;
                for oc in 0..d.out_c {
                    let mut acc: i32 = 0;
                    for fy in 0..d.filter_h {
                        let in_y = in_y_origin + (params.dilation_height * fy) as isize;
                        if in_y < 0 || in_y >= d.in_h as isize { continue; }
                        for fx in 0..d.filter_w {
                            let in_x = in_x_origin + (params.dilation_width * fx) as isize;
                            if in_x < 0 || in_x >= d.in_w as isize { continue; }
                            let in_base = in_shape.offset(b, in_y as usize, in_x as usize, 0);
                            let f_base = f_shape.offset(oc, fy, fx, 0);
                            let x = &input.data[in_base..in_base + d.in_c];
                            let w = &filter.data[f_base..f_base + d.in_c];
                            acc = acc.wrapping_add(dot_offset(w, x, params.input_offset));
                        }
                    }
                    if let Some(bias) = bias {
                        acc = acc.wrapping_add(bias[oc]);
                    }
                    let v = requantize(
                        acc, quant.multiplier[oc], quant.shift[oc],
                        params.output_offset, params.activation_min, params.activation_max,
                    );
                    out[o_shape.offset(b, out_y, out_x, oc)] = T::from_i32(v);
                }
            }
        }
    }
    Ok(())
}

/// `sum(w[i] * (x[i] + input_offset))` over one filter tap's channels.
#[inline]
pub(crate) fn dot_offset<T: QuantElement>(w: &[i8], x: &[T], input_offset: i32) -> i32 {
    let mut acc: i32 = 0;
    for (&wi, &xi) in w.iter().zip(x) {
        acc = acc.wrapping_add(i32::from(wi).wrapping_mul(xi.to_i32().wrapping_add(input_offset)));
    }
    acc
}

/// Allocating wrapper around [`convolve`].
pub fn convolve_to_vec<T: QuantElement>(
    params: &ConvParams,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output_shape: &Shape,
    quant: PerChannelQuant<'_>,
) -> ConvResult<Vec<T>> {
    validate_shapes(params, &input, &filter, bias.as_ref(), output_shape, &quant)?;
    let mut out = alloc_output(output_shape)?;
    convolve(params, input, filter, bias, TensorViewMut::new(output_shape, &mut out), quant)?;
    Ok(out)
}
