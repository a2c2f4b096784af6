use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use qconv::case::{Case, CaseOutput, Lowering};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a quantized convolution case file", long_about = None)]
struct Args {
    /// Path to case (.json) file
    #[arg(long)]
    case: PathBuf,

    /// Write the output here instead of printing it
    #[arg(long)]
    out: Option<PathBuf>,

    /// Lower dense convolutions through im2col scratch
    #[arg(long)]
    im2col: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let case = Case::load(&args.case)?;
    let lowering = if args.im2col { Lowering::Im2col } else { Lowering::Direct };

    let t0 = Instant::now();
    let output = case.run(lowering).with_context(|| format!("run case {}", args.case.display()))?;
    info!("{:?} case ran in {:?} ({} outputs)", case.kind, t0.elapsed(), output.len());

    let record = CaseOutput { output_shape: case.output_shape.clone(), output };
    let json = serde_json::to_string_pretty(&record)?;
    match args.out.as_ref() {
        Some(path) => std::fs::write(path, json).with_context(|| format!("write output: {}", path.display()))?,
        None => println!("{}", json),
    }

    case.check(&record.output)
}
