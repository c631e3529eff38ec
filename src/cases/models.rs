//! Model tracing: turns a [`ModelSpec`] into builder calls.

use crate::cases::builder::{GraphBuilder, Init, RnnSpec};
use crate::cases::{CaseError, Chain, LayerOp, ModelSpec};
use crate::ir::ValueId;
use crate::types::Shape;

pub fn trace(model: &ModelSpec, inputs: &[Shape], builder: &mut GraphBuilder) -> Result<(), CaseError> {
    match model {
        ModelSpec::Chains { chains } => trace_chains(chains, inputs, builder),
        ModelSpec::Rnn {
            spec,
            with_h0,
            return_hidden,
        } => trace_rnn(spec, *with_h0, *return_hidden, inputs, builder),
        ModelSpec::RnnStacks { hidden_size } => trace_rnn_stacks(*hidden_size, inputs, builder),
    }
}

fn declare_inputs(inputs: &[Shape], expected: usize, builder: &mut GraphBuilder) -> Result<Vec<ValueId>, CaseError> {
    if inputs.len() != expected {
        return Err(CaseError::InputArity {
            expected,
            actual: inputs.len(),
        });
    }
    Ok(inputs.iter().map(|shape| builder.input(shape.clone())).collect())
}

fn trace_chains(chains: &[Chain], inputs: &[Shape], builder: &mut GraphBuilder) -> Result<(), CaseError> {
    let values: Vec<ValueId> = inputs.iter().map(|shape| builder.input(shape.clone())).collect();

    let mut outputs = Vec::with_capacity(chains.len());
    for (index, chain) in chains.iter().enumerate() {
        let mut value = *values.get(chain.input).ok_or(CaseError::UnknownInput {
            input: chain.input,
            declared: values.len(),
        })?;
        for (position, op) in chain.ops.iter().enumerate() {
            value = apply(builder, value, op, &format!("chain{index}.op{position}"));
        }
        outputs.push(value);
    }
    for value in outputs {
        builder.output(value);
    }
    Ok(())
}

fn apply(builder: &mut GraphBuilder, value: ValueId, op: &LayerOp, scope: &str) -> ValueId {
    match op {
        LayerOp::Affine { scale, shift } => builder.affine(value, *scale, *shift),
        LayerOp::Relu => builder.relu(value),
        LayerOp::Abs => builder.abs(value),
        LayerOp::Clamp { min, max } => builder.clamp(value, *min, *max),
        LayerOp::RRelu {
            lower,
            upper,
            training,
        } => builder.rrelu(value, *lower, *upper, *training),
        LayerOp::Softmax { axis } => builder.softmax(value, *axis),
        LayerOp::Normalize { p, axis, eps } => builder.normalize(value, *p, *axis, *eps),
        LayerOp::Transpose { dim0, dim1 } => builder.transpose(value, *dim0, *dim1),
        LayerOp::Permute { perm } => builder.permute(value, perm.clone()),
        LayerOp::Reshape { shape } => builder.reshape(value, shape.clone()),
        LayerOp::ConvTranspose {
            weight,
            bias,
            attrs,
        } => {
            let w = builder.parameter(&format!("{scope}.weight"), weight.clone(), Init::Unit);
            let b = bias.then(|| {
                let out_channels = weight[1] * attrs.groups;
                builder.parameter(&format!("{scope}.bias"), vec![out_channels], Init::Unit)
            });
            builder.conv_transpose(value, w, b, attrs)
        }
        LayerOp::MaxPool(attrs) => builder.max_pool(value, attrs),
        LayerOp::AvgPool {
            attrs,
            count_include_pad,
        } => builder.avg_pool(value, attrs, *count_include_pad),
        LayerOp::Resize {
            mode,
            size,
            scale,
            align_corners,
        } => builder.resize(value, *mode, size.clone(), scale.clone(), *align_corners),
    }
}

fn trace_rnn(
    spec: &RnnSpec,
    with_h0: bool,
    return_hidden: bool,
    inputs: &[Shape],
    builder: &mut GraphBuilder,
) -> Result<(), CaseError> {
    let expected = if with_h0 { 2 } else { 1 };
    let values = declare_inputs(inputs, expected, builder)?;
    let module = builder.rnn_module("rnn", spec);
    let h0 = values.get(1).copied();
    let (output, hidden) = builder.rnn(values[0], h0, &module);
    builder.output(output);
    if return_hidden {
        builder.output(hidden);
    }
    Ok(())
}

fn trace_rnn_stacks(hidden_size: usize, inputs: &[Shape], builder: &mut GraphBuilder) -> Result<(), CaseError> {
    let values = declare_inputs(inputs, 2, builder)?;
    let x_features = inputs[0].last().copied().unwrap_or(0);
    let y_features = inputs[1].last().copied().unwrap_or(0);

    let first = |input_size: usize, batch_first: bool| RnnSpec {
        batch_first,
        ..RnnSpec::new(input_size, hidden_size)
    };
    let deep = |batch_first: bool| RnnSpec {
        num_layers: 3,
        bias: false,
        batch_first,
        ..RnnSpec::new(hidden_size, hidden_size)
    };
    let bidir = |batch_first: bool| RnnSpec {
        num_layers: 4,
        bidirectional: true,
        batch_first,
        ..RnnSpec::new(hidden_size, hidden_size)
    };

    // all modules are created before the forward pass, in declaration order
    let rnn_0_0 = builder.rnn_module("rnn_0_0", &first(x_features, false));
    let rnn_0_1 = builder.rnn_module("rnn_0_1", &deep(false));
    let rnn_0_2 = builder.rnn_module("rnn_0_2", &bidir(false));
    let rnn_0_3 = builder.rnn_module("rnn_0_3", &bidir(false));
    let rnn_0_4 = builder.rnn_module("rnn_0_4", &bidir(false));
    let rnn_1_0 = builder.rnn_module("rnn_1_0", &first(y_features, true));
    let rnn_1_1 = builder.rnn_module("rnn_1_1", &deep(true));
    let rnn_1_2 = builder.rnn_module("rnn_1_2", &bidir(true));
    let rnn_1_3 = builder.rnn_module("rnn_1_3", &bidir(true));
    // declared but never called
    let _rnn_1_4 = builder.rnn_module("rnn_1_4", &bidir(true));

    let x = builder.permute(values[0], vec![1, 0, 2]);
    let (x0, _) = builder.rnn(x, None, &rnn_0_0);
    let (x1, _) = builder.rnn(x0, None, &rnn_0_1);
    let (x2, h0) = builder.rnn(x1, None, &rnn_0_2);
    let (x3, h1) = builder.rnn(x1, Some(h0), &rnn_0_3);
    let (x4, _) = builder.rnn(x1, Some(h1), &rnn_0_4);

    let (y0, _) = builder.rnn(values[1], None, &rnn_1_0);
    let (y1, _) = builder.rnn(y0, None, &rnn_1_1);
    let (y2, h2) = builder.rnn(y1, None, &rnn_1_2);
    let (y3, h3) = builder.rnn(y1, Some(h2), &rnn_1_3);
    let (y4, _) = builder.rnn(y1, Some(h3), &rnn_1_3);

    let x2 = builder.permute(x2, vec![1, 0, 2]);
    let x3 = builder.permute(x3, vec![1, 0, 2]);
    let x4 = builder.permute(x4, vec![1, 0, 2]);
    for value in [x2, x3, x4, y2, y3, y4] {
        builder.output(value);
    }
    Ok(())
}
