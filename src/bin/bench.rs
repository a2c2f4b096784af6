use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use qconv::kernels::{convolve, convolve_im2col, depthwise_convolve};
use qconv::{ConvParams, DepthwiseParams, PaddingScheme, PerChannelQuant, QuantizedMultiplier, Shape, TensorView, TensorViewMut};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use rayon::prelude::*;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qconv-bench", version, about = "Benchmark per-channel quantized convolution kernels")]
struct Args {
    /// Input height and width
    #[arg(long, default_value_t = 56)]
    size: usize,

    /// Input channels
    #[arg(long, default_value_t = 32)]
    channels: usize,

    /// Output channels (dense) or depth multiplier (depthwise)
    #[arg(long, default_value_t = 32)]
    out_channels: usize,

    /// Square filter extent
    #[arg(long, default_value_t = 3)]
    filter: usize,

    #[arg(long, default_value_t = 1)]
    stride: usize,

    /// Benchmark depthwise convolution instead of dense
    #[arg(long, default_value_t = false)]
    depthwise: bool,

    /// Lower dense convolution through im2col
    #[arg(long, default_value_t = false)]
    im2col: bool,

    #[arg(long, default_value_t = 20)]
    iters: usize,

    /// Concurrent independent invocations per iteration
    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
}

struct Problem {
    params: ConvParams,
    depth_multiplier: usize,
    input_shape: Shape,
    input: Vec<i8>,
    filter_shape: Shape,
    filter: Vec<i8>,
    bias_shape: Shape,
    bias: Vec<i32>,
    output_shape: Shape,
    multiplier: Vec<i32>,
    shift: Vec<i32>,
}

fn make_problem(args: &Args) -> Result<Problem> {
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut params = ConvParams { stride_height: args.stride, stride_width: args.stride, input_offset: 3, output_offset: -5, ..ConvParams::default() }
        .with_activation_range(-128, 127);
    let (out_h, out_w) = params.resolve_padding(PaddingScheme::Same, args.size, args.size, args.filter, args.filter);
    let (filter_shape, out_c, depth_multiplier) = if args.depthwise {
        let oc = args.channels * args.out_channels;
        (Shape::nhwc(1, args.filter, args.filter, oc), oc, args.out_channels)
    } else {
        (Shape::nhwc(args.out_channels, args.filter, args.filter, args.channels), args.out_channels, 1)
    };
    let input_shape = Shape::nhwc(1, args.size, args.size, args.channels);
    let weights = Normal::new(0.0f64, 40.0)?;
    let scales = LogNormal::new(-9.0f64, 0.5)?;
    let input = (0..input_shape.flat_size()).map(|_| rng.gen_range(-128i32..=127) as i8).collect();
    let filter = (0..filter_shape.flat_size()).map(|_| weights.sample(&mut rng).round().clamp(-127.0, 127.0) as i8).collect();
    let bias = (0..out_c).map(|_| rng.gen_range(-2000..=2000)).collect();
    let (multiplier, shift): (Vec<i32>, Vec<i32>) = (0..out_c).map(|_| {
        let q = QuantizedMultiplier::from_scale(scales.sample(&mut rng));
        (q.multiplier, q.shift)
    }).unzip();
    Ok(Problem {
        params,
        depth_multiplier,
        input_shape,
        input,
        filter_shape,
        filter,
        bias_shape: Shape::new(vec![out_c]),
        bias,
        output_shape: Shape::nhwc(1, out_h, out_w, out_c),
        multiplier,
        shift,
    })
}

fn run_once(p: &Problem, args: &Args, out: &mut [i8]) -> qconv::ConvResult<()> {
    let input = TensorView::new(&p.input_shape, &p.input);
    let filter = TensorView::new(&p.filter_shape, &p.filter);
    let bias = Some(TensorView::new(&p.bias_shape, &p.bias));
    let quant = PerChannelQuant::new(&p.multiplier, &p.shift);
    let output = TensorViewMut::new(&p.output_shape, out);
    if args.depthwise {
        let params = DepthwiseParams { conv: p.params, depth_multiplier: p.depth_multiplier };
        depthwise_convolve(&params, quant, input, filter, bias, output)
    } else if args.im2col {
        convolve_im2col(&p.params, input, filter, bias, output, quant)
    } else {
        convolve(&p.params, input, filter, bias, output, quant)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let problem = make_problem(&args)?;
    let threads = args.threads.max(1);
    let mut outputs = vec![vec![0i8; problem.output_shape.flat_size()]; threads];

    let pb = ProgressBar::new(args.iters as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} iters {elapsed_precise}")?);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

    let t0 = Instant::now();
    for _ in 0..args.iters {
        pool.install(|| outputs.par_iter_mut().try_for_each(|out| run_once(&problem, &args, out)))?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    let elapsed = t0.elapsed();

    let kernel = if args.depthwise { "depthwise" } else if args.im2col { "conv-im2col" } else { "conv" };
    let calls = (args.iters * threads) as f64;
    let macs = problem.output_shape.flat_size() as f64
        * (args.filter * args.filter) as f64
        * if args.depthwise { 1.0 } else { args.channels as f64 };
    println!(
        "{} input {:?} output {:?}: {} calls in {:.3}s, {:.2} ms/call, {:.1} GMAC/s",
        kernel, problem.input_shape.dims(), problem.output_shape.dims(), calls, elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / calls.max(1.0),
        macs * calls / elapsed.as_secs_f64().max(1e-9) / 1e9
    );
    for out in &outputs[1..] {
        anyhow::ensure!(out == &outputs[0], "parallel invocations disagree");
    }
    Ok(())
}
