use serde::{Deserialize, Serialize};

/// Symmetric spatial padding; both edges of an axis get the same count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding2d {
    pub height: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingScheme {
    Same,
    Valid,
}

#[inline]
fn effective_filter(filter_size: usize, dilation: usize) -> usize {
    if filter_size == 0 { 0 } else { (filter_size - 1) * dilation + 1 }
}

/// Output extent along one spatial axis.
pub fn compute_out_size(scheme: PaddingScheme, in_size: usize, filter_size: usize, stride: usize, dilation: usize) -> usize {
    if stride == 0 { return 0; }
    match scheme {
        PaddingScheme::Same => (in_size + stride - 1) / stride,
        PaddingScheme::Valid => {
            let eff = effective_filter(filter_size, dilation);
            (in_size + stride).checked_sub(eff).map_or(0, |n| n / stride)
        }
    }
}

/// Leading padding along one axis. An odd total leaves the extra tap on the
/// trailing edge, where the bounds check omits it anyway.
pub fn compute_padding(stride: usize, dilation: usize, in_size: usize, filter_size: usize, out_size: usize) -> usize {
    if out_size == 0 { return 0; }
    let eff = effective_filter(filter_size, dilation);
    ((out_size - 1) * stride + eff).saturating_sub(in_size) / 2
}

/// Parameter block of a dense per-channel convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvParams {
    pub stride_height: usize,
    pub stride_width: usize,
    pub dilation_height: usize,
    pub dilation_width: usize,
    pub padding: Padding2d,
    /// Negated input zero point, added to every in-bounds input sample.
    pub input_offset: i32,
    /// Output zero point, added after rescaling.
    pub output_offset: i32,
    pub activation_min: i32,
    pub activation_max: i32,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride_height: 1,
            stride_width: 1,
            dilation_height: 1,
            dilation_width: 1,
            padding: Padding2d::default(),
            input_offset: 0,
            output_offset: 0,
            activation_min: i32::MIN,
            activation_max: i32::MAX,
        }
    }
}

impl ConvParams {
    /// Sets `padding` for `scheme` and returns the resulting (out_height, out_width).
    pub fn resolve_padding(&mut self, scheme: PaddingScheme, in_h: usize, in_w: usize, filter_h: usize, filter_w: usize) -> (usize, usize) {
        let out_h = compute_out_size(scheme, in_h, filter_h, self.stride_height, self.dilation_height);
        let out_w = compute_out_size(scheme, in_w, filter_w, self.stride_width, self.dilation_width);
        self.padding = Padding2d {
            height: compute_padding(self.stride_height, self.dilation_height, in_h, filter_h, out_h),
            width: compute_padding(self.stride_width, self.dilation_width, in_w, filter_w, out_w),
        };
        (out_h, out_w)
    }

    pub fn with_activation_range(mut self, min: i32, max: i32) -> Self {
        self.activation_min = min;
        self.activation_max = max;
        self
    }
}

/// Parameter block of a depthwise convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthwiseParams {
    #[serde(flatten)]
    pub conv: ConvParams,
    pub depth_multiplier: usize,
}

impl Default for DepthwiseParams {
    fn default() -> Self { Self { conv: ConvParams::default(), depth_multiplier: 1 } }
}

impl DepthwiseParams {
    pub fn resolve_padding(&mut self, scheme: PaddingScheme, in_h: usize, in_w: usize, filter_h: usize, filter_w: usize) -> (usize, usize) {
        self.conv.resolve_padding(scheme, in_h, in_w, filter_h, filter_w)
    }
}
