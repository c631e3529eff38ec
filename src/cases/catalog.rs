//! The conformance catalog: one table of operator families, each expanded
//! from its parameter grid into concrete cases.

use crate::cases::builder::{ConvTransposeAttrs, PoolAttrs, RnnSpec};
use crate::cases::{CaseDefinition, Chain, LayerOp, ModelSpec};
use crate::compare::CompareMode;
use crate::ir::{ResizeMode, RnnNonlinearity};
use crate::reconcile::OutputLayout;
use crate::types::Precision;

type FamilyGrid = fn() -> Vec<CaseDefinition>;

/// Family name and grid generator, in listing order.
const FAMILIES: &[(&str, FamilyGrid)] = &[
    ("conv_transpose", conv_transpose_cases),
    ("max_pool", max_pool_cases),
    ("avg_pool", avg_pool_cases),
    ("rnn", rnn_cases),
    ("transpose", transpose_cases),
    ("rrelu", rrelu_cases),
    ("softmax", softmax_cases),
    ("resize", resize_cases),
    ("clamp", clamp_cases),
    ("abs", abs_cases),
    ("normalize", normalize_cases),
];

pub fn families() -> Vec<&'static str> {
    FAMILIES.iter().map(|(name, _)| *name).collect()
}

pub fn all_cases() -> Vec<CaseDefinition> {
    FAMILIES.iter().flat_map(|(_, grid)| grid()).collect()
}

pub fn cases_for_family(family: &str) -> Vec<CaseDefinition> {
    FAMILIES
        .iter()
        .filter(|(name, _)| *name == family)
        .flat_map(|(_, grid)| grid())
        .collect()
}

pub fn find_case(name: &str) -> Option<CaseDefinition> {
    all_cases().into_iter().find(|case| case.name == name)
}

fn squeezed(outputs: usize) -> Vec<OutputLayout> {
    vec![OutputLayout::BatchSqueezed; outputs]
}

fn signed() -> LayerOp {
    LayerOp::Affine {
        scale: 2.0,
        shift: -1.0,
    }
}

fn conv_t(weight: Vec<usize>, bias: bool, stride: &[usize], padding: &[usize], output_padding: &[usize], dilation: &[usize], groups: usize) -> LayerOp {
    LayerOp::ConvTranspose {
        weight,
        bias,
        attrs: ConvTransposeAttrs {
            stride: stride.to_vec(),
            padding: padding.to_vec(),
            output_padding: output_padding.to_vec(),
            dilation: dilation.to_vec(),
            groups,
        },
    }
}

fn window(kernel: &[usize], stride: &[usize], padding: &[usize], dilation: &[usize], ceil_mode: bool) -> PoolAttrs {
    PoolAttrs {
        kernel: kernel.to_vec(),
        stride: stride.to_vec(),
        padding: padding.to_vec(),
        dilation: dilation.to_vec(),
        ceil_mode,
    }
}

fn conv_transpose_cases() -> Vec<CaseDefinition> {
    vec![
        CaseDefinition::new(
            "conv_transpose1d",
            "conv_transpose",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    conv_t(vec![12, 6, 3], true, &[2], &[1], &[1], &[1], 1),
                    conv_t(vec![6, 2, 4], false, &[1], &[2], &[0], &[2], 3),
                ],
            )]),
            vec![vec![1, 12, 22]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
        CaseDefinition::new(
            "conv_transpose2d",
            "conv_transpose",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    conv_t(vec![8, 4, 3, 3], true, &[2, 1], &[1, 0], &[1, 0], &[1, 1], 1),
                    conv_t(vec![4, 3, 2, 4], true, &[1, 2], &[0, 1], &[0, 1], &[2, 1], 2),
                ],
            )]),
            vec![vec![1, 8, 9, 7]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
        CaseDefinition::new(
            "conv_transpose3d",
            "conv_transpose",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    conv_t(vec![6, 12, 4, 4, 4], true, &[2, 2, 2], &[1, 0, 1], &[1, 1, 0], &[1, 1, 1], 1),
                    conv_t(vec![12, 2, 3, 3, 3], false, &[1, 1, 2], &[2, 2, 1], &[0, 0, 0], &[2, 2, 1], 3),
                ],
            )]),
            vec![vec![1, 6, 4, 5, 6]],
            CompareMode::TIGHT,
        )
        .with_precision(Precision::HalfRoundTrip)
        .with_layouts(squeezed(1)),
    ]
}

fn max_pool1d_chain() -> Vec<LayerOp> {
    vec![
        LayerOp::MaxPool(PoolAttrs::kernel(vec![3])),
        LayerOp::MaxPool(window(&[4], &[2], &[2], &[1], false)),
        LayerOp::MaxPool(window(&[3], &[1], &[1], &[1], false)),
        LayerOp::MaxPool(window(&[5], &[2], &[2], &[1], true)),
        LayerOp::MaxPool(window(&[3], &[1], &[1], &[1], false)),
        LayerOp::MaxPool(window(&[2], &[1], &[0], &[1], true)),
    ]
}

fn max_pool_cases() -> Vec<CaseDefinition> {
    let mut unbatched = vec![LayerOp::Reshape {
        shape: vec![12, 128],
    }];
    unbatched.extend(max_pool1d_chain());
    vec![
        CaseDefinition::new(
            "max_pool1d",
            "max_pool",
            ModelSpec::chains(vec![Chain::new(0, max_pool1d_chain()), Chain::new(0, unbatched)]),
            vec![vec![1, 12, 128]],
            CompareMode::TIGHT,
        )
        .with_layouts(vec![OutputLayout::BatchSqueezed, OutputLayout::Native]),
        CaseDefinition::new(
            "max_pool2d",
            "max_pool",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    LayerOp::MaxPool(PoolAttrs::kernel(vec![3, 3])),
                    LayerOp::MaxPool(window(&[4, 3], &[2, 1], &[2, 1], &[1, 2], false)),
                    LayerOp::MaxPool(window(&[5, 4], &[1, 2], &[2, 1], &[1, 1], true)),
                ],
            )]),
            vec![vec![1, 12, 32, 30]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
        CaseDefinition::new(
            "max_pool3d",
            "max_pool",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    LayerOp::MaxPool(PoolAttrs::kernel(vec![2, 2, 2])),
                    LayerOp::MaxPool(window(&[3, 3, 3], &[1, 2, 1], &[1, 1, 1], &[1, 1, 1], true)),
                ],
            )]),
            vec![vec![1, 6, 12, 10, 9]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
    ]
}

fn avg_pool_cases() -> Vec<CaseDefinition> {
    let avg = |attrs: PoolAttrs, count_include_pad: bool| LayerOp::AvgPool {
        attrs,
        count_include_pad,
    };
    vec![
        CaseDefinition::new(
            "avg_pool1d",
            "avg_pool",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    avg(window(&[3], &[2], &[1], &[1], false), true),
                    avg(window(&[4], &[3], &[2], &[1], true), false),
                ],
            )]),
            vec![vec![1, 12, 50]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
        CaseDefinition::new(
            "avg_pool2d",
            "avg_pool",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![
                    avg(window(&[3, 3], &[2, 2], &[1, 1], &[1, 1], true), false),
                    avg(window(&[2, 4], &[1, 2], &[0, 2], &[1, 1], false), true),
                ],
            )]),
            vec![vec![1, 12, 24, 64]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
        CaseDefinition::new(
            "avg_pool3d",
            "avg_pool",
            ModelSpec::chains(vec![Chain::new(
                0,
                vec![avg(window(&[2, 3, 3], &[2, 2, 2], &[1, 1, 0], &[1, 1, 1], false), true)],
            )]),
            vec![vec![1, 6, 8, 10, 12]],
            CompareMode::TIGHT,
        )
        .with_layouts(squeezed(1)),
    ]
}

fn rnn_cases() -> Vec<CaseDefinition> {
    vec![
        CaseDefinition::new(
            "rnn_stacks",
            "rnn",
            ModelSpec::RnnStacks { hidden_size: 16 },
            vec![vec![1, 10, 32], vec![1, 12, 25]],
            CompareMode::LOOSE,
        )
        .with_precision(Precision::HalfRoundTrip)
        .with_layouts(squeezed(6)),
        CaseDefinition::new(
            "rnn_tanh_single",
            "rnn",
            ModelSpec::Rnn {
                spec: RnnSpec::new(16, 8),
                with_h0: false,
                return_hidden: true,
            },
            vec![vec![10, 1, 16]],
            CompareMode::TIGHT,
        ),
        CaseDefinition::new(
            "rnn_relu_deep_no_bias",
            "rnn",
            ModelSpec::Rnn {
                spec: RnnSpec {
                    num_layers: 2,
                    bias: false,
                    nonlinearity: RnnNonlinearity::Relu,
                    ..RnnSpec::new(12, 10)
                },
                with_h0: false,
                return_hidden: false,
            },
            vec![vec![6, 2, 12]],
            CompareMode::TIGHT,
        ),
        CaseDefinition::new(
            "rnn_bidir_batch_first_h0",
            "rnn",
            ModelSpec::Rnn {
                spec: RnnSpec {
                    num_layers: 2,
                    bidirectional: true,
                    batch_first: true,
                    ..RnnSpec::new(10, 12)
                },
                with_h0: true,
                return_hidden: true,
            },
            vec![vec![3, 7, 10], vec![4, 3, 12]],
            CompareMode::TIGHT,
        ),
        CaseDefinition::new(
            "rnn_batch_first_hidden",
            "rnn",
            ModelSpec::Rnn {
                spec: RnnSpec {
                    batch_first: true,
                    ..RnnSpec::new(9, 16)
                },
                with_h0: false,
                return_hidden: true,
            },
            vec![vec![2, 5, 9]],
            CompareMode::TIGHT,
        ),
    ]
}

fn transpose_cases() -> Vec<CaseDefinition> {
    let transpose = |dim0, dim1| vec![LayerOp::Transpose { dim0, dim1 }, LayerOp::Relu];
    vec![
        CaseDefinition::new(
            "torch_transpose",
            "transpose",
            ModelSpec::chains(vec![
                Chain::new(0, transpose(0, 1)),
                Chain::new(1, transpose(1, 2)),
                Chain::new(2, transpose(0, 2)),
            ]),
            vec![vec![3, 16], vec![5, 9, 11], vec![8, 5, 9, 10]],
            CompareMode::TIGHT,
        ),
        CaseDefinition::new(
            "permute_chain",
            "transpose",
            ModelSpec::chains(vec![
                Chain::new(
                    0,
                    vec![
                        LayerOp::Permute {
                            perm: vec![0, 2, 3, 1],
                        },
                        LayerOp::Permute {
                            perm: vec![0, 3, 1, 2],
                        },
                        LayerOp::Relu,
                    ],
                ),
                Chain::new(
                    0,
                    vec![
                        signed(),
                        LayerOp::Permute {
                            perm: vec![2, 0, 3, 1],
                        },
                        LayerOp::Transpose { dim0: 1, dim1: 3 },
                        LayerOp::Abs,
                    ],
                ),
            ]),
            vec![vec![1, 3, 8, 6]],
            CompareMode::TIGHT,
        ),
    ]
}

fn rrelu_cases() -> Vec<CaseDefinition> {
    let act = |lower: f32, upper: f32| {
        vec![
            signed(),
            LayerOp::RRelu {
                lower,
                upper,
                training: false,
            },
        ]
    };
    vec![CaseDefinition::new(
        "rrelu",
        "rrelu",
        ModelSpec::chains(vec![
            Chain::new(0, act(1.0 / 8.0, 1.0 / 3.0)),
            Chain::new(1, act(1.0 / 8.0, 1.0 / 3.0)),
            Chain::new(2, act(0.1, 0.42)),
            Chain::new(3, act(0.1, 0.42)),
        ]),
        vec![
            vec![1, 12],
            vec![1, 12, 64],
            vec![1, 12, 24, 64],
            vec![1, 12, 24, 32, 64],
        ],
        CompareMode::TIGHT,
    )]
}

fn softmax_cases() -> Vec<CaseDefinition> {
    vec![CaseDefinition::new(
        "softmax2d",
        "softmax",
        ModelSpec::chains(vec![Chain::new(0, vec![signed(), LayerOp::Softmax { axis: 1 }])]),
        vec![vec![1, 12, 24, 64]],
        CompareMode::Exact,
    )]
}

fn resize_cases() -> Vec<CaseDefinition> {
    let by_scale = |mode, align_corners| LayerOp::Resize {
        mode,
        size: None,
        scale: Some(vec![1.0, 1.0]),
        align_corners,
    };
    let by_size = |mode, align_corners| LayerOp::Resize {
        mode,
        size: Some(vec![12, 52]),
        scale: None,
        align_corners,
    };
    vec![CaseDefinition::new(
        "noop_resize",
        "resize",
        ModelSpec::chains(vec![Chain::new(
            0,
            vec![
                by_scale(ResizeMode::Nearest, false),
                by_size(ResizeMode::Bicubic, true),
                by_scale(ResizeMode::Bilinear, true),
                by_scale(ResizeMode::Nearest, false),
                by_scale(ResizeMode::Bilinear, false),
                by_size(ResizeMode::Bicubic, true),
                by_scale(ResizeMode::Bilinear, true),
                by_size(ResizeMode::Nearest, false),
                by_scale(ResizeMode::Nearest, false),
                by_scale(ResizeMode::Bicubic, true),
                by_size(ResizeMode::Bicubic, false),
                LayerOp::Relu,
            ],
        )]),
        vec![vec![1, 15, 12, 52]],
        CompareMode::Exact,
    )]
}

fn clamp_cases() -> Vec<CaseDefinition> {
    let clamp = |min, max| vec![signed(), LayerOp::Clamp { min, max }];
    vec![CaseDefinition::new(
        "clamp",
        "clamp",
        ModelSpec::chains(vec![
            Chain::new(0, clamp(Some(-0.5), Some(0.5))),
            Chain::new(1, clamp(Some(0.2), None)),
            Chain::new(2, clamp(None, Some(0.7))),
        ]),
        vec![vec![1, 12, 24, 64], vec![1, 3, 17], vec![1, 12]],
        CompareMode::TIGHT,
    )]
}

fn abs_cases() -> Vec<CaseDefinition> {
    vec![CaseDefinition::new(
        "abs",
        "abs",
        ModelSpec::chains(vec![
            Chain::new(0, vec![signed(), LayerOp::Abs]),
            Chain::new(1, vec![signed(), LayerOp::Abs]),
        ]),
        vec![vec![1, 12], vec![1, 12, 64]],
        CompareMode::TIGHT,
    )]
}

fn normalize_cases() -> Vec<CaseDefinition> {
    vec![CaseDefinition::new(
        "normalize",
        "normalize",
        ModelSpec::chains(vec![
            Chain::new(
                0,
                vec![LayerOp::Normalize {
                    p: 2.0,
                    axis: 1,
                    eps: 1e-12,
                }],
            ),
            Chain::new(
                1,
                vec![
                    signed(),
                    LayerOp::Normalize {
                        p: 1.0,
                        axis: 2,
                        eps: 1e-5,
                    },
                ],
            ),
        ]),
        vec![vec![1, 12, 24, 64], vec![1, 12, 64]],
        CompareMode::TIGHT,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn case_names_are_unique() {
        let cases = all_cases();
        let names: BTreeSet<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), cases.len());
    }

    #[test]
    fn every_case_builds() {
        for case in all_cases() {
            case.build_graph()
                .unwrap_or_else(|e| panic!("{} failed to build: {e}", case.name));
        }
    }

    #[test]
    fn family_lookup_matches_case_family() {
        for family in families() {
            let cases = cases_for_family(family);
            assert!(!cases.is_empty(), "{family} has no cases");
            assert!(cases.iter().all(|c| c.family == family));
        }
    }
}
