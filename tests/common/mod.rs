#![allow(dead_code)]

use qconv::{ConvParams, PerChannelQuant, QuantizedMultiplier, Shape, TensorView};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A dense per-channel problem with owned buffers.
pub struct DenseProblem {
    pub params: ConvParams,
    pub input_shape: Shape,
    pub input: Vec<i8>,
    pub filter_shape: Shape,
    pub filter: Vec<i8>,
    pub bias_shape: Shape,
    pub bias: Vec<i32>,
    pub output_shape: Shape,
    pub multiplier: Vec<i32>,
    pub shift: Vec<i32>,
}

impl DenseProblem {
    pub fn input(&self) -> TensorView<'_, i8> { TensorView::new(&self.input_shape, &self.input) }
    pub fn filter(&self) -> TensorView<'_, i8> { TensorView::new(&self.filter_shape, &self.filter) }
    pub fn bias(&self) -> Option<TensorView<'_, i32>> { Some(TensorView::new(&self.bias_shape, &self.bias)) }
    pub fn quant(&self) -> PerChannelQuant<'_> { PerChannelQuant::new(&self.multiplier, &self.shift) }
}

pub fn per_channel(rng: &mut SmallRng, channels: usize) -> (Vec<i32>, Vec<i32>) {
    (0..channels)
        .map(|_| {
            let q = QuantizedMultiplier::from_scale(rng.gen_range(1e-4..2e-1));
            (q.multiplier, q.shift)
        })
        .unzip()
}

/// Small random dense convolution; footprints stay far from accumulator overflow.
pub fn random_dense(seed: u64) -> DenseProblem {
    let mut rng = SmallRng::seed_from_u64(seed);
    let batches = rng.gen_range(1..=2);
    let in_h = rng.gen_range(1..=7);
    let in_w = rng.gen_range(1..=7);
    let in_c = rng.gen_range(1..=4);
    let out_c = rng.gen_range(1..=5);
    let filter_h = rng.gen_range(1..=3);
    let filter_w = rng.gen_range(1..=3);
    let stride = rng.gen_range(1..=2);
    let dilation = rng.gen_range(1..=2);
    let pad_h = rng.gen_range(0..=2);
    let pad_w = rng.gen_range(0..=2);
    let lo = rng.gen_range(-128..=0);
    let hi = rng.gen_range(lo..=127);
    let params = ConvParams {
        stride_height: stride,
        stride_width: stride,
        dilation_height: dilation,
        dilation_width: dilation,
        padding: qconv::Padding2d { height: pad_h, width: pad_w },
        input_offset: rng.gen_range(-127..=128),
        output_offset: rng.gen_range(-20..=20),
        activation_min: lo,
        activation_max: hi,
    };
    let eff_h = (filter_h - 1) * dilation + 1;
    let eff_w = (filter_w - 1) * dilation + 1;
    let out_h = (in_h + 2 * pad_h).saturating_sub(eff_h) / stride + 1;
    let out_w = (in_w + 2 * pad_w).saturating_sub(eff_w) / stride + 1;
    let input_shape = Shape::nhwc(batches, in_h, in_w, in_c);
    let filter_shape = Shape::nhwc(out_c, filter_h, filter_w, in_c);
    let input = (0..input_shape.flat_size()).map(|_| rng.gen::<i8>()).collect();
    let filter = (0..filter_shape.flat_size()).map(|_| rng.gen_range(-127..=127)).collect();
    let bias = (0..out_c).map(|_| rng.gen_range(-5000..=5000)).collect();
    let (multiplier, shift) = per_channel(&mut rng, out_c);
    DenseProblem {
        params,
        input_shape,
        input,
        filter_shape,
        filter,
        bias_shape: Shape::new(vec![out_c]),
        bias,
        output_shape: Shape::nhwc(batches, out_h, out_w, out_c),
        multiplier,
        shift,
    }
}
