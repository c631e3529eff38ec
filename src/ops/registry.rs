// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

/// Fixed-function metadata for a traceable operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSignature {
    /// Canonical operator name as it appears in the IR and the trace file.
    pub name: &'static str,
    /// Number of tensor operands expected by the op.
    pub arity: Arity,
    /// Whether the op draws from the execution random stream.
    pub stochastic: bool,
    /// Short description of the op contract.
    pub summary: &'static str,
}

/// Arity description for ops that accept a fixed or variadic operand count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n,
            Arity::Variadic { min } => count >= min,
        }
    }
}

/// The list of operators the exporter can freeze into a trace.
///
/// Keep the ordering stable so `convparity list --ops` output stays
/// deterministic.
pub const fn traceable_ops() -> &'static [OpSignature] {
    use Arity::*;
    &[
        OpSignature {
            name: "graph.input",
            arity: Fixed(0),
            stochastic: false,
            summary: "Declared graph input with a concrete shape.",
        },
        OpSignature {
            name: "graph.constant",
            arity: Fixed(0),
            stochastic: false,
            summary: "Parameter tensor baked into the trace.",
        },
        OpSignature {
            name: "graph.output",
            arity: Fixed(1),
            stochastic: false,
            summary: "Marks a returned value; order defines output slots.",
        },
        OpSignature {
            name: "tensor.affine",
            arity: Fixed(1),
            stochastic: false,
            summary: "Elementwise x * scale + shift.",
        },
        OpSignature {
            name: "tensor.abs",
            arity: Fixed(1),
            stochastic: false,
            summary: "Elementwise absolute value.",
        },
        OpSignature {
            name: "tensor.clamp",
            arity: Fixed(1),
            stochastic: false,
            summary: "Elementwise clamp with optional lower and upper bounds.",
        },
        OpSignature {
            name: "tensor.transpose",
            arity: Fixed(1),
            stochastic: false,
            summary: "Swap two axes.",
        },
        OpSignature {
            name: "tensor.permute",
            arity: Fixed(1),
            stochastic: false,
            summary: "Reorder all axes.",
        },
        OpSignature {
            name: "tensor.reshape",
            arity: Fixed(1),
            stochastic: false,
            summary: "Reshape to a compatible shape.",
        },
        OpSignature {
            name: "nn.relu",
            arity: Fixed(1),
            stochastic: false,
            summary: "Elementwise ReLU activation.",
        },
        OpSignature {
            name: "nn.rrelu",
            arity: Fixed(1),
            stochastic: true,
            summary: "Randomized leaky ReLU; midpoint slope in evaluation mode.",
        },
        OpSignature {
            name: "nn.softmax",
            arity: Fixed(1),
            stochastic: false,
            summary: "Softmax along one axis.",
        },
        OpSignature {
            name: "nn.normalize",
            arity: Fixed(1),
            stochastic: false,
            summary: "Lp normalization along one axis with epsilon.",
        },
        OpSignature {
            name: "nn.conv_transpose",
            arity: Variadic { min: 2 },
            stochastic: false,
            summary: "1d/2d/3d transposed convolution with optional bias.",
        },
        OpSignature {
            name: "nn.max_pool",
            arity: Fixed(1),
            stochastic: false,
            summary: "1d/2d/3d max pooling with dilation and ceil mode.",
        },
        OpSignature {
            name: "nn.avg_pool",
            arity: Fixed(1),
            stochastic: false,
            summary: "1d/2d/3d average pooling with ceil mode and count_include_pad.",
        },
        OpSignature {
            name: "nn.rnn",
            arity: Variadic { min: 3 },
            stochastic: false,
            summary: "Multi-layer Elman RNN returning sequence output and final hidden state.",
        },
        OpSignature {
            name: "nn.resize",
            arity: Fixed(1),
            stochastic: false,
            summary: "Nearest, bilinear or bicubic spatial resize.",
        },
    ]
}

/// Returns true if the provided name is a traceable op.
pub fn is_traceable_op(name: &str) -> bool {
    traceable_ops().iter().any(|op| op.name == name)
}

/// Looks up the registry metadata for an op.
pub fn op_signature(name: &str) -> Option<&'static OpSignature> {
    traceable_ops().iter().find(|op| op.name == name)
}
