//! Fixed-point requantization shared by every convolution path.
//!
//! A real rescaling factor is carried as an integer `multiplier` and a power-of-two
//! `shift`: `scale = multiplier * 2^shift`. Scale 1.0 is `(1 << 30, -30)`.

use crate::error::{ConvError, ConvResult};

/// Returns `round(acc * multiplier * 2^shift)`, rounding halves away from zero and
/// saturating to the `i32` range. Exact: the product is formed in 128 bits and rounded once.
#[inline]
pub fn multiply_by_quantized_multiplier(acc: i32, multiplier: i32, shift: i32) -> i32 {
    // |prod| < 2^62
    let prod = i128::from(acc) * i128::from(multiplier);
    let scaled = if shift >= 0 {
        prod << shift.min(64)
    } else {
        rounding_shift_right(prod, shift.unsigned_abs().min(100))
    };
    scaled.clamp(i128::from(i32::MIN), i128::from(i32::MAX)) as i32
}

#[inline]
fn rounding_shift_right(x: i128, n: u32) -> i128 {
    if n == 0 { return x; }
    let half = 1i128 << (n - 1);
    let mag = (x.abs() + half) >> n;
    if x < 0 { -mag } else { mag }
}

/// Rescale, add the output zero point, then clamp. The clamp is applied literally
/// (`min(max)` then `max(min)`), so an inverted range pins every value to `min`.
#[inline]
pub fn requantize(acc: i32, multiplier: i32, shift: i32, output_offset: i32, min: i32, max: i32) -> i32 {
    multiply_by_quantized_multiplier(acc, multiplier, shift)
        .saturating_add(output_offset)
        .min(max)
        .max(min)
}

/// A single (multiplier, shift) pair in the `scale = multiplier * 2^shift` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i32,
}

impl QuantizedMultiplier {
    pub const ONE: QuantizedMultiplier = QuantizedMultiplier { multiplier: 1 << 30, shift: -30 };

    /// Decomposes a positive real scale into a mantissa in `[2^30, 2^31)` and an exponent.
    /// Zero, negative and non-finite scales map to `(0, 0)`.
    pub fn from_scale(scale: f64) -> Self {
        if !scale.is_finite() || scale <= 0.0 {
            return Self { multiplier: 0, shift: 0 };
        }
        let (q, mut exp) = frexp(scale);
        let mut m = (q * (1i64 << 31) as f64).round() as i64;
        if m == 1i64 << 31 {
            m /= 2;
            exp += 1;
        }
        Self { multiplier: m as i32, shift: exp - 31 }
    }

    /// Converts a Q31 multiplier with a left-shift exponent
    /// (`scale = multiplier / 2^31 * 2^left_shift`).
    pub fn from_q31(multiplier: i32, left_shift: i32) -> Self {
        Self { multiplier, shift: left_shift - 31 }
    }

    pub fn to_scale(self) -> f64 { f64::from(self.multiplier) * 2f64.powi(self.shift) }

    #[inline]
    pub fn apply(self, acc: i32) -> i32 { multiply_by_quantized_multiplier(acc, self.multiplier, self.shift) }
}

/// `x = q * 2^exp` with `q` in `[0.5, 1)`; `x` must be positive and finite.
fn frexp(x: f64) -> (f64, i32) {
    const EXP_MASK: u64 = 0x7ff << 52;
    let (x, bias_adj) = if x.to_bits() & EXP_MASK == 0 {
        // subnormal: normalize first
        (x * 2f64.powi(54), -54)
    } else {
        (x, 0)
    };
    let bits = x.to_bits();
    let biased = ((bits & EXP_MASK) >> 52) as i32;
    let q = f64::from_bits((bits & !EXP_MASK) | (1022u64 << 52));
    (q, biased - 1022 + bias_adj)
}

/// Per-output-channel multiplier and shift arrays, indexed by output channel.
#[derive(Debug, Clone, Copy)]
pub struct PerChannelQuant<'a> {
    pub multiplier: &'a [i32],
    pub shift: &'a [i32],
}

impl<'a> PerChannelQuant<'a> {
    pub fn new(multiplier: &'a [i32], shift: &'a [i32]) -> Self { Self { multiplier, shift } }

    pub(crate) fn expect_channels(&self, channels: usize) -> ConvResult<()> {
        if self.multiplier.len() != channels {
            return Err(ConvError::PerChannelLength { what: "output multiplier", expected: channels, actual: self.multiplier.len() });
        }
        if self.shift.len() != channels {
            return Err(ConvError::PerChannelLength { what: "output shift", expected: channels, actual: self.shift.len() });
        }
        Ok(())
    }
}

/// 8-bit activation element. Input and output of a kernel call share the type.
pub trait QuantElement: Copy + Default + Send + Sync + 'static {
    const MIN: i32;
    const MAX: i32;

    fn to_i32(self) -> i32;

    /// Narrows a clamped accumulator, saturating to the element range.
    fn from_i32(v: i32) -> Self;

    fn try_from_i32(v: i32) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&v) { Some(Self::from_i32(v)) } else { None }
    }
}

impl QuantElement for i8 {
    const MIN: i32 = i8::MIN as i32;
    const MAX: i32 = i8::MAX as i32;
    #[inline]
    fn to_i32(self) -> i32 { i32::from(self) }
    #[inline]
    fn from_i32(v: i32) -> Self { v.clamp(-128, 127) as i8 }
}

impl QuantElement for u8 {
    const MIN: i32 = u8::MIN as i32;
    const MAX: i32 = u8::MAX as i32;
    #[inline]
    fn to_i32(self) -> i32 { i32::from(self) }
    #[inline]
    fn from_i32(v: i32) -> Self { v.clamp(0, 255) as u8 }
}
