mod common;

use pretty_assertions::assert_eq;
use qconv::{convolve, convolve_to_vec, TensorViewMut};
use rayon::prelude::*;

#[test]
fn concurrent_invocations_on_disjoint_outputs_agree() {
    let problems: Vec<_> = (0..32).map(common::random_dense).collect();
    let serial: Vec<Vec<i8>> = problems
        .iter()
        .map(|p| convolve_to_vec(&p.params, p.input(), p.filter(), p.bias(), &p.output_shape, p.quant()).unwrap())
        .collect();

    let mut parallel: Vec<Vec<i8>> = problems.iter().map(|p| vec![0i8; p.output_shape.flat_size()]).collect();
    parallel.par_iter_mut().zip(problems.par_iter()).for_each(|(out, p)| {
        convolve(&p.params, p.input(), p.filter(), p.bias(), TensorViewMut::new(&p.output_shape, out), p.quant()).unwrap();
    });
    assert_eq!(parallel, serial);
}

#[test]
fn shared_inputs_many_outputs() {
    let p = common::random_dense(1234);
    let want = convolve_to_vec(&p.params, p.input(), p.filter(), p.bias(), &p.output_shape, p.quant()).unwrap();
    let mut outs = vec![vec![0i8; p.output_shape.flat_size()]; 16];
    outs.par_iter_mut().for_each(|out| {
        convolve(&p.params, p.input(), p.filter(), p.bias(), TensorViewMut::new(&p.output_shape, out), p.quant()).unwrap();
    });
    assert!(outs.iter().all(|o| o == &want));
}
