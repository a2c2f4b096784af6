//! Per-channel quantized convolution kernels and their shared requantization.

pub mod quant;
pub mod conv;
pub mod depthwise;
pub mod im2col;

pub use conv::{convolve, convolve_to_vec};
pub use depthwise::{depthwise_convolve, depthwise_convolve_to_vec};
pub use im2col::{convolve_im2col, convolve_im2col_with_limit, SCRATCH_LIMIT_BYTES};
pub use quant::{multiply_by_quantized_multiplier, requantize, PerChannelQuant, QuantElement, QuantizedMultiplier};
