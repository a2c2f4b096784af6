// Per-channel quantized convolution engine
pub mod error;
pub mod shape;
pub mod params;
pub mod kernels;
pub mod case;

pub use error::{ConvError, ConvResult};
pub use kernels::{
    convolve, convolve_im2col, convolve_to_vec, depthwise_convolve, depthwise_convolve_to_vec,
    multiply_by_quantized_multiplier, PerChannelQuant, QuantElement, QuantizedMultiplier,
};
pub use params::{ConvParams, DepthwiseParams, Padding2d, PaddingScheme};
pub use shape::{Shape, TensorView, TensorViewMut};
