use convparity::eval::conv::{conv_transpose, ConvTransposeParams};
use convparity::eval::elementwise::{abs, affine, clamp, normalize, relu, softmax};
use convparity::eval::pool::{avg_pool, max_pool, PoolWindow};
use convparity::eval::resize::resize;
use convparity::eval::rnn::{rnn, RnnCell, RnnConfig};
use convparity::eval::TensorValue;
use convparity::ir::{ResizeMode, RnnNonlinearity};

fn t(shape: &[usize], data: &[f32]) -> TensorValue {
    TensorValue::new(shape.to_vec(), data.to_vec()).unwrap()
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-6, "element {i}: {a} vs {e}");
    }
}

#[test]
fn elementwise_basics() {
    let x = t(&[4], &[-2.0, -0.5, 0.0, 3.0]);
    assert_eq!(relu(&x).data(), &[0.0, 0.0, 0.0, 3.0]);
    assert_eq!(abs(&x).data(), &[2.0, 0.5, 0.0, 3.0]);
    assert_eq!(affine(&x, 2.0, 1.0).data(), &[-3.0, 0.0, 1.0, 7.0]);
    assert_eq!(clamp(&x, Some(-1.0), None).data(), &[-1.0, -0.5, 0.0, 3.0]);
    assert_eq!(clamp(&x, None, Some(0.0)).data(), &[-2.0, -0.5, 0.0, 0.0]);
}

#[test]
fn softmax_rows_sum_to_one() {
    let x = t(&[2, 3], &[1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]);
    let y = softmax(&x, 1).unwrap();
    let rows: Vec<f32> = y.data().chunks(3).map(|r| r.iter().sum()).collect();
    assert_close(&rows, &[1.0, 1.0]);
    assert_close(&y.data()[3..], &[1.0 / 3.0; 3]);
}

#[test]
fn normalize_divides_by_norm_with_floor() {
    let x = t(&[2, 2], &[3.0, 4.0, 0.0, 0.0]);
    let y = normalize(&x, 2.0, 1, 1e-12).unwrap();
    assert_close(y.data(), &[0.6, 0.8, 0.0, 0.0]);

    let l1 = normalize(&t(&[2], &[1.0, -3.0]), 1.0, 0, 1e-12).unwrap();
    assert_close(l1.data(), &[0.25, -0.75]);
}

#[test]
fn conv_transpose_scatters_with_stride() {
    let x = t(&[1, 1, 2], &[1.0, 2.0]);
    let w = t(&[1, 1, 2], &[1.0, 1.0]);
    let params = |stride: &'static [usize]| ConvTransposeParams {
        stride,
        padding: &[0],
        dilation: &[1],
        groups: 1,
    };
    let y = conv_transpose(&x, &w, None, params(&[2]), &[1, 1, 4]).unwrap();
    assert_eq!(y.data(), &[1.0, 1.0, 2.0, 2.0]);

    let b = t(&[1], &[0.5]);
    let y = conv_transpose(&x, &w, Some(&b), params(&[1]), &[1, 1, 3]).unwrap();
    assert_eq!(y.data(), &[1.5, 3.5, 2.5]);
}

#[test]
fn grouped_conv_transpose_keeps_groups_apart() {
    // two groups of one channel each, weight [C_in=2, C_out/groups=1, k=1]
    let x = t(&[1, 2, 2], &[1.0, 2.0, 10.0, 20.0]);
    let w = t(&[2, 1, 1], &[3.0, -1.0]);
    let params = ConvTransposeParams {
        stride: &[1],
        padding: &[0],
        dilation: &[1],
        groups: 2,
    };
    let y = conv_transpose(&x, &w, None, params, &[1, 2, 2]).unwrap();
    assert_eq!(y.data(), &[3.0, 6.0, -10.0, -20.0]);
}

#[test]
fn max_pool_picks_window_maximum() {
    let x = t(&[1, 1, 5], &[1.0, 3.0, 2.0, 5.0, 4.0]);
    let window = PoolWindow {
        kernel: &[2],
        stride: &[2],
        padding: &[0],
        dilation: &[1],
    };
    let y = max_pool(&x, window, &[1, 1, 2]).unwrap();
    assert_eq!(y.data(), &[3.0, 5.0]);
}

#[test]
fn avg_pool_divisor_depends_on_padding_mode() {
    let x = t(&[1, 1, 4], &[1.0, 2.0, 3.0, 4.0]);
    let window = || PoolWindow {
        kernel: &[2],
        stride: &[2],
        padding: &[1],
        dilation: &[1],
    };
    let with_pad = avg_pool(&x, window(), true, &[1, 1, 3]).unwrap();
    assert_eq!(with_pad.data(), &[0.5, 2.5, 2.0]);
    let without = avg_pool(&x, window(), false, &[1, 1, 3]).unwrap();
    assert_eq!(without.data(), &[1.0, 2.5, 4.0]);
}

fn scalar_cell_weights() -> (TensorValue, TensorValue) {
    (t(&[1, 1], &[1.0]), t(&[1, 1], &[0.5]))
}

#[test]
fn rnn_accumulates_hidden_state() {
    let (w_ih, w_hh) = scalar_cell_weights();
    let cell = RnnCell {
        w_ih: &w_ih,
        w_hh: &w_hh,
        b_ih: None,
        b_hh: None,
    };
    let config = RnnConfig {
        hidden_size: 1,
        num_layers: 1,
        bidirectional: false,
        batch_first: false,
        nonlinearity: RnnNonlinearity::Relu,
    };
    let x = t(&[3, 1, 1], &[1.0, 2.0, 3.0]);
    let (out, h_n) = rnn(&x, None, &[cell], config).unwrap();
    assert_eq!(out.shape(), &[3, 1, 1]);
    assert_eq!(out.data(), &[1.0, 2.5, 4.25]);
    assert_eq!(h_n.data(), &[4.25]);

    let h0 = t(&[1, 1, 1], &[2.0]);
    let (out, _) = rnn(&x, Some(&h0), &[cell], config).unwrap();
    assert_eq!(out.data()[0], 2.0);
}

#[test]
fn bidirectional_rnn_concatenates_forward_then_reverse() {
    let (w_ih, w_hh) = scalar_cell_weights();
    let cell = RnnCell {
        w_ih: &w_ih,
        w_hh: &w_hh,
        b_ih: None,
        b_hh: None,
    };
    let config = RnnConfig {
        hidden_size: 1,
        num_layers: 1,
        bidirectional: true,
        batch_first: true,
        nonlinearity: RnnNonlinearity::Relu,
    };
    let x = t(&[1, 3, 1], &[1.0, 2.0, 3.0]);
    let (out, h_n) = rnn(&x, None, &[cell, cell], config).unwrap();
    assert_eq!(out.shape(), &[1, 3, 2]);
    assert_eq!(out.data(), &[1.0, 2.75, 2.5, 3.5, 4.25, 3.0]);
    assert_eq!(h_n.shape(), &[2, 1, 1]);
    assert_eq!(h_n.data(), &[4.25, 2.75]);
}

#[test]
fn tanh_rnn_stays_bounded() {
    let (w_ih, w_hh) = scalar_cell_weights();
    let b = t(&[1], &[5.0]);
    let cell = RnnCell {
        w_ih: &w_ih,
        w_hh: &w_hh,
        b_ih: Some(&b),
        b_hh: Some(&b),
    };
    let config = RnnConfig {
        hidden_size: 1,
        num_layers: 1,
        bidirectional: false,
        batch_first: false,
        nonlinearity: RnnNonlinearity::Tanh,
    };
    let x = t(&[4, 1, 1], &[10.0, 20.0, 30.0, 40.0]);
    let (out, _) = rnn(&x, None, &[cell], config).unwrap();
    assert!(out.data().iter().all(|v| *v <= 1.0 && *v > 0.99));
}

#[test]
fn unit_scale_resize_is_bit_exact() {
    let data: Vec<f32> = (0..24).map(|v| (v as f32 * 0.37).sin()).collect();
    let x = t(&[1, 2, 3, 4], &data);
    for mode in [ResizeMode::Nearest, ResizeMode::Bilinear, ResizeMode::Bicubic] {
        for align_corners in [false, true] {
            let y = resize(&x, mode, Some(&[1.0, 1.0]), align_corners, &[1, 2, 3, 4]).unwrap();
            assert!(y.bit_identical(&x), "{mode:?} align_corners={align_corners}");
            let y = resize(&x, mode, None, align_corners, &[1, 2, 3, 4]).unwrap();
            assert!(y.bit_identical(&x), "{mode:?} by size, align_corners={align_corners}");
        }
    }
}

#[test]
fn nearest_upsampling_repeats_pixels() {
    let x = t(&[1, 1, 1, 2], &[1.0, 2.0]);
    let y = resize(&x, ResizeMode::Nearest, Some(&[2.0, 2.0]), false, &[1, 1, 2, 4]).unwrap();
    assert_eq!(y.data(), &[1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
}
