use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgscan::{
    exclusive_scan_in_place, exclusive_scan_with, inclusive_scan_in_place, inclusive_scan_with,
    Control, CustomOp, Executor, FallbackPolicy, Operator, ScanConfig, ScanError, WgContext,
};

fn device_control(config: ScanConfig) -> Option<Control> {
    match WgContext::new_blocking() {
        Ok(context) => Some(Control::new(Executor::Device(Arc::new(context)), config)),
        Err(err) => {
            log::warn!("skipping device test: {}", err);
            None
        }
    }
}

fn small_blocks(block: usize) -> ScanConfig {
    ScanConfig::default()
        .with_device_block_size(block)
        .with_sequential_threshold(0)
}

fn reference_inclusive(input: &[u32]) -> Vec<u32> {
    let mut out = input.to_vec();
    inclusive_scan_in_place(&Control::sequential(), &mut out, &Operator::Add).unwrap();
    out
}

#[test_log::test]
fn device_matches_sequential_across_block_boundaries() {
    let block = 64;
    let Some(ctl) = device_control(small_blocks(block)) else { return };

    // The last two sizes recurse through several device levels.
    for len in [
        2,
        block - 1,
        block,
        block + 1,
        2 * block,
        2 * block + 1,
        block * block,
        block * block * 3 + 7,
    ] {
        let input: Vec<u32> = (0..len as u32).map(|x| x.wrapping_mul(2_654_435_761)).collect();
        let mut output = vec![0; len];

        inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap();
        assert_eq!(output, reference_inclusive(&input), "inclusive len {len}");

        exclusive_scan_with(&ctl, &input, &mut output, 17, &Operator::Add).unwrap();
        let mut expected = input.clone();
        exclusive_scan_in_place(&Control::sequential(), &mut expected, 17, &Operator::Add)
            .unwrap();
        assert_eq!(output, expected, "exclusive len {len}");
    }
}

#[test_log::test]
fn device_ten_thousand_random_integers() {
    let Some(ctl) = device_control(ScanConfig::default().with_sequential_threshold(0)) else {
        return;
    };
    let mut rng = StdRng::seed_from_u64(10_000);
    let input: Vec<u32> = (0..10_000).map(|_| rng.gen_range(0..1_000_000)).collect();
    let mut output = vec![0; input.len()];
    inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap();
    assert_eq!(output, reference_inclusive(&input));
}

#[test_log::test]
fn device_level_wider_than_one_dispatch_row() {
    // 300,000 / 4 = 75,000 blocks on the first level, more than one
    // dimension of a dispatch can hold.
    let Some(ctl) = device_control(small_blocks(4)) else { return };
    let input = vec![1u32; 300_000];
    let mut output = vec![0; input.len()];

    inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap();
    assert!(output.iter().zip(1u32..).all(|(&got, want)| got == want));

    exclusive_scan_with(&ctl, &input, &mut output, 5, &Operator::Add).unwrap();
    assert!(output.iter().zip(5u32..).all(|(&got, want)| got == want));
}

#[test_log::test]
fn device_in_place_and_max() {
    let Some(ctl) = device_control(small_blocks(4)) else { return };
    let mut data = vec![3i32, 1, 4, 1, 5, 9, 2, 6];
    inclusive_scan_in_place(&ctl, &mut data, &Operator::Max).unwrap();
    assert_eq!(data, vec![3, 3, 4, 4, 5, 9, 9, 9]);

    let mut data = vec![-2i32, 7, -1, 8, -3, 0, 4];
    exclusive_scan_in_place(&ctl, &mut data, 5, &Operator::Min).unwrap();
    assert_eq!(data, vec![5, -2, -2, -2, -2, -3, -3]);
}

#[test_log::test]
fn device_floats_within_tolerance() {
    let Some(ctl) = device_control(small_blocks(32)) else { return };
    let mut rng = StdRng::seed_from_u64(3);
    let input: Vec<f32> = (0..4_000).map(|_| rng.gen_range(0.0..1.0)).collect();
    let mut output = vec![0.0; input.len()];
    inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap();

    let mut acc = 0.0f64;
    for (i, (&x, &got)) in input.iter().zip(&output).enumerate() {
        acc += x as f64;
        assert!(
            ((got as f64) - acc).abs() <= 1e-3 * acc.max(1.0),
            "index {i}: {got} vs {acc}"
        );
    }
}

#[test_log::test]
fn device_custom_operator_with_user_code() {
    let Some(ctl) = device_control(small_blocks(8)) else { return };
    let compose = |a: u32, b: u32| {
        let s = (a >> 16).wrapping_mul(b >> 16) & 0xffff;
        let o = (a & 0xffff).wrapping_mul(b >> 16).wrapping_add(b & 0xffff) & 0xffff;
        (s << 16) | o
    };
    let op = Operator::Custom(
        CustomOp::new("affine", 1u32 << 16, compose)
            .with_user_code(
                "fn scale(x: {{ T }}) -> {{ T }} { return x >> 16u; }\n\
                 fn shift(x: {{ T }}) -> {{ T }} { return x & 0xffffu; }",
            )
            .with_wgsl(
                "let s = (scale(a) * scale(b)) & 0xffffu;\n\
                 let o = (shift(a) * scale(b) + shift(b)) & 0xffffu;\n\
                 return (s << 16u) | o;",
            ),
    );

    let mut rng = StdRng::seed_from_u64(42);
    let input: Vec<u32> = (0..300).map(|_| rng.gen()).collect();
    let mut output = vec![0; input.len()];
    inclusive_scan_with(&ctl, &input, &mut output, &op).unwrap();

    let mut expected = input.clone();
    inclusive_scan_in_place(&Control::sequential(), &mut expected, &op).unwrap();
    assert_eq!(output, expected);
}

#[test_log::test]
fn custom_operator_without_device_source_fails() {
    let Some(ctl) = device_control(small_blocks(8)) else { return };
    let op = Operator::custom("xor", 0u32, |a, b| a ^ b);
    let input = vec![1u32; 64];
    let mut output = vec![0u32; 64];
    let err = inclusive_scan_with(&ctl, &input, &mut output, &op).unwrap_err();
    assert!(matches!(err, ScanError::OperatorGeneration(_)), "{err}");
    assert!(output.iter().all(|&x| x == 0));
}

#[test_log::test]
fn host_only_type_follows_fallback_policy() {
    let Some(ctl) = device_control(small_blocks(8)) else { return };
    let input: Vec<u64> = (1..=100).collect();
    let mut output = vec![0u64; 100];

    let err = inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap_err();
    assert!(matches!(err, ScanError::ExecutorUnavailable(_)), "{err}");

    let ctl = ctl.clone().with_config(small_blocks(8).with_fallback(FallbackPolicy::Sequential));
    inclusive_scan_with(&ctl, &input, &mut output, &Operator::Add).unwrap();
    assert_eq!(output[99], 5050);
}
