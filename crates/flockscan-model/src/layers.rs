//! CHW tensor kernels.
//!
//! All kernels work on standard-layout `ndarray` views shaped
//! `(channels, height, width)` and write into caller-owned output views, so
//! the orchestrator can run the whole network out of preallocated buffers.
//! Shape mismatches are programmer errors and panic.

use crate::{Conv2d, LinearHead, KERNEL};
use ndarray::{ArrayView3, ArrayViewMut3, Axis};

/// Zero-padding width implied by skipping out-of-range taps.
const PAD: usize = 1;

/// 3×3, stride 1, same-padding convolution.
///
/// Each output starts from its channel bias and accumulates in the order
/// input channel → kernel row → kernel column.  Taps that fall outside the
/// input are skipped rather than read from a padded copy; keep it that way,
/// reordering the sum changes the low bits of the result.
pub fn conv3x3_forward(x: ArrayView3<f32>, layer: &Conv2d, mut y: ArrayViewMut3<f32>) {
    let (c, h, w) = x.dim();
    assert_eq!(c, layer.in_channels(), "conv input has {} channels, layer expects {}", c, layer.in_channels());
    assert_eq!(
        y.dim(),
        (layer.out_channels(), h, w),
        "conv output buffer has the wrong shape"
    );

    for oc in 0..layer.out_channels() {
        let bias = layer.bias()[oc];
        for oh in 0..h {
            for ow in 0..w {
                let mut sum = bias;
                for ic in 0..c {
                    let kern = layer.kernel(oc, ic);
                    for kh in 0..KERNEL {
                        let ih = match (oh + kh).checked_sub(PAD) {
                            Some(ih) if ih < h => ih,
                            _ => continue,
                        };
                        for kw in 0..KERNEL {
                            let iw = match (ow + kw).checked_sub(PAD) {
                                Some(iw) if iw < w => iw,
                                _ => continue,
                            };
                            sum += x[[ic, ih, iw]] * kern[kh * KERNEL + kw];
                        }
                    }
                }
                y[[oc, oh, ow]] = sum;
            }
        }
    }
}

/// `max(0, x)` in place.  NaN and -0.0 pass through untouched.
pub fn relu_inplace(mut x: ArrayViewMut3<f32>) {
    x.map_inplace(|v| {
        if *v < 0.0 {
            *v = 0.0;
        }
    });
}

/// Non-overlapping 2×2 max-pool, stride 2.
pub fn maxpool2x2_forward(x: ArrayView3<f32>, mut y: ArrayViewMut3<f32>) {
    let (c, h, w) = x.dim();
    assert!(h % 2 == 0 && w % 2 == 0, "max-pool needs even spatial dims, got {}x{}", h, w);
    let (ho, wo) = (h / 2, w / 2);
    assert_eq!(y.dim(), (c, ho, wo), "max-pool output buffer has the wrong shape");

    for ch in 0..c {
        for oh in 0..ho {
            for ow in 0..wo {
                let (ih, iw) = (oh * 2, ow * 2);
                let mut m = x[[ch, ih, iw]];
                for v in [x[[ch, ih, iw + 1]], x[[ch, ih + 1, iw]], x[[ch, ih + 1, iw + 1]]] {
                    if v > m {
                        m = v;
                    }
                }
                y[[ch, oh, ow]] = m;
            }
        }
    }
}

/// Per-channel spatial mean into `out` (one value per channel).
pub fn global_avg_pool(x: ArrayView3<f32>, out: &mut [f32]) {
    let (c, h, w) = x.dim();
    assert_eq!(out.len(), c, "pooled vector length must equal channel count");
    let inv = 1.0f32 / (h * w) as f32;

    for (ch, plane) in x.axis_iter(Axis(0)).enumerate() {
        // plain row-major fold; ndarray's `sum` reorders the additions
        let s = plane.iter().fold(0.0f32, |acc, &v| acc + v);
        out[ch] = s * inv;
    }
}

/// `bias + Σ x[i]·w[i]`, accumulated from the bias upward.
pub fn linear_forward(x: &[f32], head: &LinearHead) -> f32 {
    assert_eq!(x.len(), head.weight().len(), "head input width mismatch");
    x.iter()
        .zip(head.weight())
        .fold(head.bias(), |acc, (&xi, &wi)| acc + xi * wi)
}

#[inline]
pub fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EMBED_DIM;
    use ndarray::{Array3, array};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_conv(rng: &mut StdRng, ic: usize, oc: usize) -> Conv2d {
        let weight: Vec<f32> = (0..Conv2d::weight_len(ic, oc)).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let bias: Vec<f32> = (0..oc).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Conv2d::new(ic, oc, weight, bias).unwrap()
    }

    #[test]
    fn conv_preserves_spatial_dims() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(ic, oc, h, w) in &[(1, 8, 16, 16), (8, 16, 5, 9), (3, 2, 1, 1)] {
            let conv = random_conv(&mut rng, ic, oc);
            let x = Array3::from_shape_fn((ic, h, w), |_| rng.gen_range(-1.0..1.0));
            let mut y = Array3::<f32>::zeros((oc, h, w));
            conv3x3_forward(x.view(), &conv, y.view_mut());
            assert_eq!(y.dim(), (oc, h, w));
        }
    }

    /// Flat-buffer convolution written straight from the OIHW layout.
    fn plain_conv(x: &[f32], (c, h, w): (usize, usize, usize), wt: &[f32], b: &[f32]) -> Vec<f32> {
        let oc_n = b.len();
        let mut y = vec![0.0f32; oc_n * h * w];
        for oc in 0..oc_n {
            for oh in 0..h {
                for ow in 0..w {
                    let mut s = b[oc];
                    for ic in 0..c {
                        for kh in 0..3 {
                            for kw in 0..3 {
                                let ih = oh as isize + kh as isize - 1;
                                let iw = ow as isize + kw as isize - 1;
                                if ih < 0 || iw < 0 || ih >= h as isize || iw >= w as isize {
                                    continue;
                                }
                                let xi = (ic * h + ih as usize) * w + iw as usize;
                                s += x[xi] * wt[((oc * c + ic) * 3 + kh) * 3 + kw];
                            }
                        }
                    }
                    y[(oc * h + oh) * w + ow] = s;
                }
            }
        }
        y
    }

    #[test]
    fn conv_matches_plain_loop_bit_for_bit() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for &(ic, oc, h, w) in &[(3, 4, 6, 7), (8, 16, 5, 5), (1, 8, 9, 4)] {
            let conv = random_conv(&mut rng, ic, oc);
            let x = Array3::from_shape_fn((ic, h, w), |_| rng.gen_range(-1.0f32..1.0));
            let mut y = Array3::<f32>::zeros((oc, h, w));
            conv3x3_forward(x.view(), &conv, y.view_mut());

            let flat: Vec<f32> = x.iter().copied().collect();
            let expected = plain_conv(&flat, (ic, h, w), conv.weight(), conv.bias());
            let got: Vec<u32> = y.iter().map(|v| v.to_bits()).collect();
            let want: Vec<u32> = expected.iter().map(|v| v.to_bits()).collect();
            assert_eq!(got, want, "conv {}->{} on {}x{}", ic, oc, h, w);
        }
    }

    #[test]
    fn conv_zero_weights_yield_bias() {
        let conv = Conv2d::new(1, 2, vec![0.0; 18], vec![0.25, -3.0]).unwrap();
        let x = Array3::from_elem((1, 4, 4), 9.0f32);
        let mut y = Array3::<f32>::zeros((2, 4, 4));
        conv3x3_forward(x.view(), &conv, y.view_mut());
        assert!(y.index_axis(Axis(0), 0).iter().all(|&v| v == 0.25));
        assert!(y.index_axis(Axis(0), 1).iter().all(|&v| v == -3.0));
    }

    #[test]
    fn conv_skips_taps_outside_the_border() {
        // all-ones kernel over all-ones input counts in-bounds taps
        let conv = Conv2d::new(1, 1, vec![1.0; 9], vec![0.0]).unwrap();
        let x = Array3::from_elem((1, 3, 3), 1.0f32);
        let mut y = Array3::<f32>::zeros((1, 3, 3));
        conv3x3_forward(x.view(), &conv, y.view_mut());
        let expected = array![[[4.0f32, 6.0, 4.0], [6.0, 9.0, 6.0], [4.0, 6.0, 4.0]]];
        assert_eq!(y, expected);
    }

    #[test]
    fn conv_centre_tap_is_identity() {
        let mut weight = vec![0.0; 9];
        weight[4] = 1.0;
        let conv = Conv2d::new(1, 1, weight, vec![0.0]).unwrap();
        let x = Array3::from_shape_fn((1, 4, 5), |(_, h, w)| (h * 5 + w) as f32);
        let mut y = Array3::<f32>::zeros((1, 4, 5));
        conv3x3_forward(x.view(), &conv, y.view_mut());
        assert_eq!(x, y);
    }

    #[test]
    fn conv_sums_over_input_channels() {
        let mut weight = vec![0.0; 18];
        weight[4] = 1.0; // ic 0 centre
        weight[9 + 4] = 2.0; // ic 1 centre
        let conv = Conv2d::new(2, 1, weight, vec![0.5]).unwrap();
        let mut x = Array3::<f32>::zeros((2, 2, 2));
        x.index_axis_mut(Axis(0), 0).fill(1.0);
        x.index_axis_mut(Axis(0), 1).fill(3.0);
        let mut y = Array3::<f32>::zeros((1, 2, 2));
        conv3x3_forward(x.view(), &conv, y.view_mut());
        assert!(y.iter().all(|&v| v == 0.5 + 1.0 + 6.0));
    }

    #[test]
    #[should_panic(expected = "channels")]
    fn conv_rejects_channel_mismatch() {
        let conv = Conv2d::zeros(8, 16);
        let x = Array3::<f32>::zeros((1, 4, 4));
        let mut y = Array3::<f32>::zeros((16, 4, 4));
        conv3x3_forward(x.view(), &conv, y.view_mut());
    }

    #[test]
    fn relu_clamps_negatives_only() {
        let mut x = array![[[-1.5f32, 0.0], [2.0, -0.1]]];
        relu_inplace(x.view_mut());
        assert_eq!(x, array![[[0.0f32, 0.0], [2.0, 0.0]]]);
    }

    #[test]
    fn maxpool_picks_window_maxima() {
        let x = array![[
            [1.0f32, 2.0, -3.0, -1.0],
            [3.0, 9.0, -5.0, -2.0],
            [0.0, 0.0, 7.0, 1.0],
            [8.0, 0.5, 1.0, 6.5]
        ]];
        let mut y = Array3::<f32>::zeros((1, 2, 2));
        maxpool2x2_forward(x.view(), y.view_mut());
        assert_eq!(y, array![[[9.0f32, -1.0], [8.0, 7.0]]]);
    }

    #[test]
    fn maxpool_halves_each_channel() {
        let x = Array3::from_shape_fn((3, 8, 6), |(c, h, w)| (c * 100 + h * 6 + w) as f32);
        let mut y = Array3::<f32>::zeros((3, 4, 3));
        maxpool2x2_forward(x.view(), y.view_mut());
        // bottom-right of every window is the largest index
        assert_eq!(y[[2, 3, 2]], (200 + 7 * 6 + 5) as f32);
        assert_eq!(y[[0, 0, 0]], 7.0);
    }

    #[test]
    #[should_panic(expected = "even")]
    fn maxpool_rejects_odd_dims() {
        let x = Array3::<f32>::zeros((1, 3, 4));
        let mut y = Array3::<f32>::zeros((1, 1, 2));
        maxpool2x2_forward(x.view(), y.view_mut());
    }

    #[test]
    fn gap_of_constant_is_constant() {
        let x = Array3::from_elem((EMBED_DIM, 32, 32), 0.75f32);
        let mut out = [0.0f32; EMBED_DIM];
        global_avg_pool(x.view(), &mut out);
        assert!(out.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn gap_averages_per_channel() {
        let mut x = Array3::<f32>::zeros((2, 2, 2));
        x[[0, 0, 0]] = 4.0;
        x.index_axis_mut(Axis(0), 1).fill(-2.0);
        let mut out = [0.0f32; 2];
        global_avg_pool(x.view(), &mut out);
        assert_eq!(out, [1.0, -2.0]);
    }

    #[test]
    fn linear_starts_from_bias() {
        let mut weight = [0.0f32; EMBED_DIM];
        weight[0] = 2.0;
        weight[31] = -1.0;
        let head = LinearHead::new(weight, 0.5);
        let mut x = [0.0f32; EMBED_DIM];
        x[0] = 1.5;
        x[31] = 4.0;
        assert_eq!(linear_forward(&x, &head), 0.5 + 3.0 - 4.0);
    }

    #[test]
    fn sigmoid_stays_inside_unit_interval() {
        assert_eq!(sigmoid(0.0), 0.5);
        let mut z = -10.0f32;
        while z <= 10.0 {
            let p = sigmoid(z);
            assert!(p > 0.0 && p < 1.0, "sigmoid({}) = {}", z, p);
            z += 0.25;
        }
        assert!(sigmoid(2.0) > sigmoid(1.0));
    }
}
