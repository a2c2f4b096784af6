use pretty_assertions::assert_eq;
use qconv::case::{Case, CaseKind, ElementType, Lowering};
use qconv::ConvError;
use std::fs::File;
use std::io::Write;

const POINTWISE: &str = r#"{
    "kind": "conv",
    "params": { "activation_min": -128, "activation_max": 127 },
    "input_shape": [1, 3, 3, 1],
    "input": [10, 10, 10, 10, 10, 10, 10, 10, 10],
    "filter_shape": [1, 1, 1, 1],
    "filter": [2],
    "bias": [0],
    "output_shape": [1, 3, 3, 1],
    "output_multiplier": [1073741824],
    "output_shift": [-30],
    "expected": [20, 20, 20, 20, 20, 20, 20, 20, 20]
}"#;

#[test]
fn case_json_defaults_and_runs() {
    let case = Case::from_json(POINTWISE).unwrap();
    assert_eq!(case.kind, CaseKind::Conv);
    assert_eq!(case.element, ElementType::I8);
    assert_eq!(case.depth_multiplier, 1);
    assert_eq!(case.params.stride_width, 1);
    let direct = case.run(Lowering::Direct).unwrap();
    assert_eq!(direct, vec![20; 9]);
    assert_eq!(case.run(Lowering::Im2col).unwrap(), direct);
    case.check(&direct).unwrap();
}

#[test]
fn check_reports_first_mismatch() {
    let case = Case::from_json(POINTWISE).unwrap();
    let mut got = vec![20; 9];
    got[4] = 21;
    let err = case.check(&got).unwrap_err();
    assert!(err.to_string().contains("index 4"), "{}", err);
    assert!(case.check(&got[..3]).is_err());
}

#[test]
fn depthwise_u8_fixture_matches_expected() {
    let case = Case::load("tests/data/depthwise_u8.json").unwrap();
    assert_eq!(case.kind, CaseKind::Depthwise);
    assert_eq!(case.element, ElementType::U8);
    let out = case.run(Lowering::Direct).unwrap();
    case.check(&out).unwrap();
    assert_eq!(out, vec![127, 131, 139, 137]);
}

#[test]
fn out_of_range_data_is_rejected() {
    let mut case = Case::from_json(POINTWISE).unwrap();
    case.input[2] = 200;
    assert_eq!(case.run(Lowering::Direct).unwrap_err(), ConvError::ElementRange { tensor: "input", index: 2, value: 200 });
    case.element = ElementType::U8;
    assert!(case.run(Lowering::Direct).is_ok());
    case.filter[0] = -129;
    assert_eq!(case.run(Lowering::Direct).unwrap_err(), ConvError::ElementRange { tensor: "filter", index: 0, value: -129 });
}

#[test]
fn case_round_trips_through_a_file() {
    let path = "target/qconv_case_roundtrip.json";
    let case = Case::from_json(POINTWISE).unwrap();
    let mut f = File::create(path).unwrap();
    f.write_all(serde_json::to_string(&case).unwrap().as_bytes()).unwrap();
    drop(f);
    let back = Case::load(path).unwrap();
    assert_eq!(back, case);
}

#[test]
fn missing_file_error_names_the_path() {
    let err = Case::load("target/does_not_exist.json").unwrap_err();
    assert!(format!("{:#}", err).contains("does_not_exist.json"));
}

#[test]
fn depthwise_ignores_im2col_lowering() {
    let case = Case::load("tests/data/depthwise_u8.json").unwrap();
    assert_eq!(case.run(Lowering::Im2col).unwrap(), case.run(Lowering::Direct).unwrap());
}

#[test]
fn overflowing_depth_multiplier_is_an_error() {
    let case = Case::from_json(
        r#"{
            "kind": "depthwise",
            "depth_multiplier": 18446744073709551615,
            "input_shape": [1, 1, 1, 2],
            "input": [1, 2],
            "filter_shape": [1, 1, 1, 2],
            "filter": [1, 1],
            "output_shape": [1, 1, 1, 2],
            "output_multiplier": [1073741824, 1073741824],
            "output_shift": [-30, -30]
        }"#,
    )
    .unwrap();
    let err = case.run(Lowering::Direct).unwrap_err();
    assert!(matches!(err, ConvError::DimMismatch { .. }), "{:?}", err);
    assert!(err.is_validation());
}

#[test]
fn overflowing_input_shape_is_an_error() {
    let case = Case::from_json(
        r#"{
            "kind": "conv",
            "input_shape": [8589934592, 8589934592, 1, 1],
            "input": [],
            "filter_shape": [1, 1, 1, 1],
            "filter": [1],
            "output_shape": [8589934592, 0, 1, 1],
            "output_multiplier": [1073741824],
            "output_shift": [-30]
        }"#,
    )
    .unwrap();
    assert_eq!(case.run(Lowering::Direct).unwrap_err(), ConvError::ShapeOverflow { tensor: "input" });
    assert_eq!(case.run(Lowering::Im2col).unwrap_err(), ConvError::ShapeOverflow { tensor: "input" });
}

#[test]
fn huge_output_shape_fails_without_allocating() {
    let mut case = Case::from_json(POINTWISE).unwrap();
    case.input_shape = [1, 1, 1, 1].into();
    case.input = vec![1];
    case.output_shape = [1, 100_000, 100_000, 1].into();
    let err = case.run(Lowering::Direct).unwrap_err();
    assert_eq!(err, ConvError::ScratchTooLarge { bytes: 10_000_000_000 });
    assert!(err.is_resource_exhaustion());
}
