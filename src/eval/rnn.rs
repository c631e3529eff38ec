// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

use crate::eval::value::{TensorError, TensorValue};
use crate::ir::RnnNonlinearity;

#[derive(Debug, Clone, Copy)]
pub struct RnnConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub batch_first: bool,
    pub nonlinearity: RnnNonlinearity,
}

impl RnnConfig {
    pub fn directions(&self) -> usize {
        if self.bidirectional {
            2
        } else {
            1
        }
    }
}

/// Borrowed weights of one (layer, direction) cell.
#[derive(Debug, Clone, Copy)]
pub struct RnnCell<'a> {
    pub w_ih: &'a TensorValue,
    pub w_hh: &'a TensorValue,
    pub b_ih: Option<&'a TensorValue>,
    pub b_hh: Option<&'a TensorValue>,
}

/// Multi-layer Elman RNN:
/// `h_t = act(W_ih x_t + b_ih + W_hh h_{t-1} + b_hh)`.
///
/// Returns the last layer's sequence output (directions concatenated on the
/// feature axis, forward first) and the final hidden state of every cell,
/// shaped `[num_layers * directions, batch, hidden]`. An absent `h0` starts
/// from zeros.
pub fn rnn(
    input: &TensorValue,
    h0: Option<&TensorValue>,
    cells: &[RnnCell<'_>],
    config: RnnConfig,
) -> Result<(TensorValue, TensorValue), TensorError> {
    let shape = input.shape();
    let (steps, batch, features) = if config.batch_first {
        (shape[1], shape[0], shape[2])
    } else {
        (shape[0], shape[1], shape[2])
    };
    let hidden = config.hidden_size;
    let directions = config.directions();

    // time-major working layout [T, B, F]
    let mut layer_input = if config.batch_first {
        input.permute(&[1, 0, 2])?.into_data()
    } else {
        input.data().to_vec()
    };
    let mut layer_features = features;
    let mut h_n = vec![0.0f32; config.num_layers * directions * batch * hidden];

    for layer in 0..config.num_layers {
        let out_features = hidden * directions;
        let mut layer_output = vec![0.0f32; steps * batch * out_features];
        for direction in 0..directions {
            let cell_index = layer * directions + direction;
            let cell = &cells[cell_index];
            let mut h = match h0 {
                Some(h0) => {
                    let start = cell_index * batch * hidden;
                    h0.data()[start..start + batch * hidden].to_vec()
                }
                None => vec![0.0f32; batch * hidden],
            };

            let order: Box<dyn Iterator<Item = usize>> = if direction == 0 {
                Box::new(0..steps)
            } else {
                Box::new((0..steps).rev())
            };
            for t in order {
                let mut next = vec![0.0f32; batch * hidden];
                for b in 0..batch {
                    let x = &layer_input[(t * batch + b) * layer_features..][..layer_features];
                    let h_prev = &h[b * hidden..(b + 1) * hidden];
                    for j in 0..hidden {
                        let input_gate = affine_row(cell.w_ih, cell.b_ih, j, x);
                        let hidden_gate = affine_row(cell.w_hh, cell.b_hh, j, h_prev);
                        let pre = input_gate + hidden_gate;
                        next[b * hidden + j] = match config.nonlinearity {
                            RnnNonlinearity::Tanh => pre.tanh(),
                            RnnNonlinearity::Relu => pre.max(0.0),
                        };
                    }
                }
                for b in 0..batch {
                    let dst = (t * batch + b) * out_features + direction * hidden;
                    layer_output[dst..dst + hidden]
                        .copy_from_slice(&next[b * hidden..(b + 1) * hidden]);
                }
                h = next;
            }

            let start = cell_index * batch * hidden;
            h_n[start..start + batch * hidden].copy_from_slice(&h);
        }
        layer_input = layer_output;
        layer_features = out_features;
    }

    let time_major = TensorValue::new(vec![steps, batch, layer_features], layer_input)?;
    let output = if config.batch_first {
        time_major.permute(&[1, 0, 2])?
    } else {
        time_major
    };
    let hidden_state = TensorValue::new(vec![config.num_layers * directions, batch, hidden], h_n)?;
    Ok((output, hidden_state))
}

/// `W[row] . x + b[row]` for a `[rows, cols]` weight.
fn affine_row(weight: &TensorValue, bias: Option<&TensorValue>, row: usize, x: &[f32]) -> f32 {
    let cols = x.len();
    let w = &weight.data()[row * cols..(row + 1) * cols];
    let dot: f32 = w.iter().zip(x).map(|(w, x)| w * x).sum();
    dot + bias.map_or(0.0, |b| b.data()[row])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(shape: &[usize], data: &[f32]) -> TensorValue {
        TensorValue::new(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn single_unit_relu_accumulates_over_time() {
        let input = t(&[3, 1, 1], &[1.0, 1.0, 1.0]);
        let w_ih = t(&[1, 1], &[1.0]);
        let w_hh = t(&[1, 1], &[1.0]);
        let cells = [RnnCell {
            w_ih: &w_ih,
            w_hh: &w_hh,
            b_ih: None,
            b_hh: None,
        }];
        let config = RnnConfig {
            hidden_size: 1,
            num_layers: 1,
            bidirectional: false,
            batch_first: false,
            nonlinearity: RnnNonlinearity::Relu,
        };
        let (out, h) = rnn(&input, None, &cells, config).unwrap();
        assert_eq!(out.data(), &[1.0, 2.0, 3.0]);
        assert_eq!(h.data(), &[3.0]);
    }

    #[test]
    fn reverse_direction_walks_backwards() {
        let input = t(&[1, 2, 1], &[1.0, 2.0]);
        let w_ih = t(&[1, 1], &[1.0]);
        let w_hh = t(&[1, 1], &[1.0]);
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
        let (out, h) = rnn(&input, None, &[cell, cell], config).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2]);
        // forward: 1, 3; backward: 3, 2
        assert_eq!(out.data(), &[1.0, 3.0, 3.0, 2.0]);
        assert_eq!(h.data(), &[3.0, 3.0]);
    }
}
