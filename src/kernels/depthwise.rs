use crate::error::{ConvError, ConvResult};
use crate::kernels::im2col::alloc_output;
use crate::kernels::quant::{requantize, PerChannelQuant, QuantElement};
use crate::params::DepthwiseParams;
use crate::shape::{expect_eq, expect_window, Shape, TensorView, TensorViewMut};
use log::debug;

/// Checks every shape relation and the input, filter and bias buffers; the output
/// buffer length is checked by the caller.
pub(crate) fn validate_shapes<T>(
    params: &DepthwiseParams,
    input: &TensorView<'_, T>,
    filter: &TensorView<'_, i8>,
    bias: Option<&TensorView<'_, i32>>,
    output_shape: &Shape,
    quant: &PerChannelQuant<'_>,
) -> ConvResult<()> {
    input.shape.expect_rank("input", 4)?;
    filter.shape.expect_rank("filter", 4)?;
    output_shape.expect_rank("output", 4)?;
    let in_c = input.shape.dim(3);
    let out_c = output_shape.dim(3);
    expect_eq("input batch vs output batch", input.shape.dim(0), output_shape.dim(0))?;
    let what = "output channels vs input channels * depth multiplier";
    let want_c = in_c
        .checked_mul(params.depth_multiplier)
        .ok_or(ConvError::DimMismatch { what, left: out_c, right: usize::MAX })?;
    expect_eq(what, out_c, want_c)?;
    expect_eq("filter depth vs output channels", filter.shape.dim(3), out_c)?;
    if let Some(b) = bias {
        expect_eq("bias size vs output channels", b.shape.expect_flat_size("bias")?, out_c)?;
        b.expect_len("bias")?;
    }
    quant.expect_channels(out_c)?;
    input.expect_len("input")?;
    filter.expect_len("filter")?;
    output_shape.expect_flat_size("output")?;
    let c = &params.conv;
    expect_window(output_shape.dim(1), c.stride_height, filter.shape.dim(1), c.dilation_height, c.padding.height)?;
    expect_window(output_shape.dim(2), c.stride_width, filter.shape.dim(2), c.dilation_width, c.padding.width)
}

/// Per-channel quantized depthwise convolution.
///
/// Output channel `m + ic * depth_multiplier` reads only input channel `ic`. Filter
/// layout is (1, filter_h, filter_w, out_channels). Padding, dilation, offsets and the
/// requantization epilogue match [`crate::kernels::conv::convolve`].
pub fn depthwise_convolve<T: QuantElement>(
    params: &DepthwiseParams,
    quant: PerChannelQuant<'_>,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output: TensorViewMut<'_, T>,
) -> ConvResult<()> {
    validate_shapes(params, &input, &filter, bias.as_ref(), output.shape, &quant)?;
    output.expect_len("output")?;
    let depth_multiplier = params.depth_multiplier;
    let in_c = input.shape.dim(3);

    let c = &params.conv;
    debug!(
        "depthwise conv: input {:?} filter {:?} output {:?} multiplier {} stride {}x{} dilation {}x{} pad {:?}",
        input.shape.dims(), filter.shape.dims(), output.shape.dims(), depth_multiplier,
        c.stride_height, c.stride_width, c.dilation_height, c.dilation_width, c.padding
    );

    let (batches, in_h, in_w) = (input.shape.dim(0), input.shape.dim(1), input.shape.dim(2));
    let (filter_h, filter_w) = (filter.shape.dim(1), filter.shape.dim(2));
    let (out_h, out_w) = (output.shape.dim(1), output.shape.dim(2));
    let bias = bias.map(|b| b.data);
    let out = output.data;
    let (in_shape, f_shape, o_shape) = (input.shape, filter.shape, output.shape);
    let pad_h = c.padding.height as isize;
    let pad_w = c.padding.width as isize;

    for b in 0..batches {
        for out_y in 0..out_h {
            let in_y_origin = (out_y * c.stride_height) as isize - pad_h;
            for out_x in 0..out_w {
                let in_x_origin = (out_x * c.stride_width) as isize - pad_w;
                for ic in 0..in_c {
                    for m in 0..depth_multiplier {
                        let oc = m + ic * depth_multiplier;
                        let mut acc: i32 = 0;
                        for fy in 0..filter_h {
                            let in_y = in_y_origin + (c.dilation_height * fy) as isize;
                            if in_y < 0 || in_y >= in_h as isize { continue; }
                            for fx in 0..filter_w {
                                let in_x = in_x_origin + (c.dilation_width * fx) as isize;
                                if in_x < 0 || in_x >= in_w as isize { continue; }
                                let x = input.data[in_shape.offset(b, in_y as usize, in_x as usize, ic)].to_i32();
                                let w = i32::from(filter.data[f_shape.offset(0, fy, fx, oc)]);
                                acc = acc.wrapping_add(w.wrapping_mul(x.wrapping_add(c.input_offset)));
                            }
                        }
                        if let Some(bias) = bias {
                            acc = acc.wrapping_add(bias[oc]);
                        }
                        let v = requantize(
                            acc, quant.multiplier[oc], quant.shift[oc],
                            c.output_offset, c.activation_min, c.activation_max,
                        );
                        out[o_shape.offset(b, out_y, out_x, oc)] = T::from_i32(v);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Allocating wrapper around [`depthwise_convolve`].
pub fn depthwise_convolve_to_vec<T: QuantElement>(
    params: &DepthwiseParams,
    quant: PerChannelQuant<'_>,
    input: TensorView<'_, T>,
    filter: TensorView<'_, i8>,
    bias: Option<TensorView<'_, i32>>,
    output_shape: &Shape,
) -> ConvResult<Vec<T>> {
    validate_shapes(params, &input, &filter, bias.as_ref(), output_shape, &quant)?;
    let mut out = alloc_output(output_shape)?;
    depthwise_convolve(params, quant, input, filter, bias, TensorViewMut::new(output_shape, &mut out))?;
    Ok(out)
}
