//! JSON description of a single kernel invocation.
//!
//! Data arrays are stored as plain integers so the same file format covers `i8` and `u8`
//! activations. Values are range-checked against the element type before any kernel runs.

use crate::error::{ConvError, ConvResult};
use crate::kernels::quant::{PerChannelQuant, QuantElement};
use crate::kernels::im2col::alloc_output;
use crate::kernels::{conv, convolve, convolve_im2col, depthwise, depthwise_convolve};
use crate::params::{ConvParams, DepthwiseParams};
use crate::shape::{Shape, TensorView, TensorViewMut};
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseKind {
    Conv,
    Depthwise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    #[default]
    I8,
    U8,
}

/// How a dense convolution is lowered. Depthwise cases always run direct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lowering {
    #[default]
    Direct,
    Im2col,
}

fn default_depth_multiplier() -> usize { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub kind: CaseKind,
    #[serde(default)]
    pub element: ElementType,
    #[serde(default)]
    pub params: ConvParams,
    #[serde(default = "default_depth_multiplier")]
    pub depth_multiplier: usize,
    pub input_shape: Shape,
    pub input: Vec<i32>,
    pub filter_shape: Shape,
    pub filter: Vec<i32>,
    /// Defaults to `[bias.len()]` when only `bias` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<i32>>,
    pub output_shape: Shape,
    pub output_multiplier: Vec<i32>,
    pub output_shift: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<i32>>,
}

/// Output record written by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutput {
    pub output_shape: Shape,
    pub output: Vec<i32>,
}

impl Case {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open case file: {}", path.as_ref().display()))?;
        let case: Case = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse case file: {}", path.as_ref().display()))?;
        debug!("loaded {:?} case, input {:?}, output {:?}", case.kind, case.input_shape.dims(), case.output_shape.dims());
        Ok(case)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse case json")
    }

    /// Runs the case and returns the output widened to `i32`.
    pub fn run(&self, lowering: Lowering) -> ConvResult<Vec<i32>> {
        match self.element {
            ElementType::I8 => self.run_typed::<i8>(lowering),
            ElementType::U8 => self.run_typed::<u8>(lowering),
        }
    }

    fn run_typed<T: QuantElement>(&self, lowering: Lowering) -> ConvResult<Vec<i32>> {
        let input: Vec<T> = narrow("input", &self.input)?;
        let filter: Vec<i8> = narrow("filter", &self.filter)?;
        let bias_shape = self.bias_shape.clone().unwrap_or_else(|| Shape::new(vec![self.bias.as_ref().map_or(0, Vec::len)]));
        let bias = self.bias.as_deref().map(|b| TensorView::new(&bias_shape, b));
        let quant = PerChannelQuant::new(&self.output_multiplier, &self.output_shift);
        let input = TensorView::new(&self.input_shape, &input);
        let filter = TensorView::new(&self.filter_shape, &filter);
        let dw_params = DepthwiseParams { conv: self.params, depth_multiplier: self.depth_multiplier };
        match self.kind {
            CaseKind::Conv => {
                conv::validate_shapes(&self.params, &input, &filter, bias.as_ref(), &self.output_shape, &quant)?;
            }
            CaseKind::Depthwise => {
                depthwise::validate_shapes(&dw_params, &input, &filter, bias.as_ref(), &self.output_shape, &quant)?;
            }
        }
        let mut out: Vec<T> = alloc_output(&self.output_shape)?;
        let output = TensorViewMut::new(&self.output_shape, &mut out);
        match (self.kind, lowering) {
            (CaseKind::Conv, Lowering::Direct) => convolve(&self.params, input, filter, bias, output, quant)?,
            (CaseKind::Conv, Lowering::Im2col) => convolve_im2col(&self.params, input, filter, bias, output, quant)?,
            (CaseKind::Depthwise, lowering) => {
                if lowering == Lowering::Im2col {
                    warn!("im2col lowering does not apply to depthwise cases, running direct");
                }
                depthwise_convolve(&dw_params, quant, input, filter, bias, output)?
            }
        }
        Ok(out.into_iter().map(QuantElement::to_i32).collect())
    }

    /// Compares `got` with `expected`; a case without expectations always passes.
    pub fn check(&self, got: &[i32]) -> Result<()> {
        let Some(expected) = self.expected.as_deref() else { return Ok(()) };
        if expected.len() != got.len() {
            bail!("expected {} output elements, got {}", expected.len(), got.len());
        }
        let mismatches: Vec<usize> = (0..got.len()).filter(|&i| got[i] != expected[i]).collect();
        if let Some(&first) = mismatches.first() {
            warn!("{} of {} outputs differ", mismatches.len(), got.len());
            bail!("output mismatch at index {}: expected {}, got {} ({} total)", first, expected[first], got[first], mismatches.len());
        }
        Ok(())
    }
}

fn narrow<T: QuantElement>(tensor: &'static str, values: &[i32]) -> ConvResult<Vec<T>> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| T::try_from_i32(value).ok_or(ConvError::ElementRange { tensor, index, value }))
        .collect()
}
