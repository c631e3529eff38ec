use std::fmt;
use std::str::FromStr;

use crate::types::{format_shape, Shape};

/// Declared input shapes as handed to the converter, e.g.
/// `[1,6,4,5,6],[1,12,25]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeManifest {
    shapes: Vec<Shape>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed shape manifest `{text}`: {reason}")]
pub struct ManifestParseError {
    pub text: String,
    pub reason: String,
}

impl ShapeManifest {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self { shapes }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn to_cli_arg(&self) -> String {
        format!("inputshape={self}")
    }
}

impl fmt::Display for ShapeManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.shapes.iter().map(|s| format_shape(s)).collect();
        f.write_str(&rendered.join(","))
    }
}

impl FromStr for ShapeManifest {
    type Err = ManifestParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ManifestParseError {
            text: text.to_string(),
            reason: reason.to_string(),
        };
        let body = text.strip_prefix("inputshape=").unwrap_or(text).trim();

        let mut shapes = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let open = rest.strip_prefix('[').ok_or_else(|| fail("expected `[`"))?;
            let close = open.find(']').ok_or_else(|| fail("unterminated shape"))?;
            let dims = &open[..close];
            let shape = if dims.trim().is_empty() {
                Vec::new()
            } else {
                dims.split(',')
                    .map(|d| d.trim().parse::<usize>())
                    .collect::<Result<Shape, _>>()
                    .map_err(|_| fail("extents must be non-negative integers"))?
            };
            shapes.push(shape);
            rest = &open[close + 1..];
            if let Some(next) = rest.strip_prefix(',') {
                if next.is_empty() {
                    return Err(fail("trailing comma"));
                }
                rest = next;
            } else if !rest.is_empty() {
                return Err(fail("expected `,` between shapes"));
            }
        }
        Ok(Self { shapes })
    }
}
