//! Loading and introspection of shape-inferred ONNX workload graphs.

pub mod proto;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use prost::Message;

use crate::common::Shape;
use crate::utils::join_into_string;
use proto::{AttributeProto, GraphProto, ModelProto, NodeProto, ValueInfoProto};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("cannot read model {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("model {} is not a valid ONNX graph: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: prost::DecodeError,
    },
}

/// Which side of a node a tensor sits on. Carried in lookup errors so a
/// wrong-name diagnosis names the collection that was searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TensorRole {
    Input,
    Output,
}

#[derive(thiserror::Error, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ShapeError {
    #[error(
        "value_info of the graph is empty; run shape inference over the model before mapping it"
    )]
    ShapeInferenceMissing,
    #[error("node {node:?} has no {role} tensor")]
    MissingOperand { node: String, role: TensorRole },
    #[error(
        "tensor {name:?} is neither a declared graph {role} nor an inferred value; known names: {}",
        join_into_string(.known, ", ")
    )]
    UnknownTensor {
        name: String,
        role: TensorRole,
        known: Vec<String>,
    },
}

#[derive(thiserror::Error, Debug)]
#[cfg_attr(test, derive(PartialEq))]
#[error(
    "node has no attribute {name:?}; attribute names present: [{}]",
    join_into_string(.present, ", ")
)]
pub struct AttributeError {
    pub name: String,
    pub present: Vec<String>,
}

/// Decodes the model structure stored at `path`.
///
/// Tensor payloads kept outside the model file are left as unresolved
/// external-data references; nothing beyond the serialized structure is
/// read.
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelProto, LoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoadError::Unreadable {
        path: path.to_owned(),
        source,
    })?;
    ModelProto::decode(bytes.as_slice()).map_err(|source| LoadError::Malformed {
        path: path.to_owned(),
        source,
    })
}

/// Returns the `ints` payload of the attribute called `name`.
///
/// A missing attribute resolves to `default` when one is supplied and is
/// an error naming the attributes actually present otherwise.
pub fn attribute_ints(
    name: &str,
    attrs: &[AttributeProto],
    default: Option<Vec<i64>>,
) -> Result<Vec<i64>, AttributeError> {
    match attrs.iter().find(|a| a.name == name) {
        Some(attr) => Ok(attr.ints.clone()),
        None => default.ok_or_else(|| AttributeError {
            name: name.to_owned(),
            present: attrs.iter().map(|a| a.name.clone()).collect(),
        }),
    }
}

/// Resolves the activation shapes of `node`: (input shape, output shape).
///
/// The node's first input and first output are taken to be its activation
/// tensors. That convention holds for the single-activation compute
/// operators this crate maps; a multi-input operator (Add, Concat) may
/// bind a different operand first, which is not detected here. Each name
/// is resolved against the graph's declared inputs/outputs first and the
/// inferred `value_info` table second.
pub fn node_dimension_shapes(
    node: &NodeProto,
    graph: &GraphProto,
) -> Result<(Shape, Shape), ShapeError> {
    if graph.value_info.is_empty() {
        return Err(ShapeError::ShapeInferenceMissing);
    }
    let ia = resolve_shape(node, TensorRole::Input, &graph.input, &graph.value_info)?;
    let oa = resolve_shape(node, TensorRole::Output, &graph.output, &graph.value_info)?;
    Ok((ia, oa))
}

fn resolve_shape(
    node: &NodeProto,
    role: TensorRole,
    declared: &[ValueInfoProto],
    value_info: &[ValueInfoProto],
) -> Result<Shape, ShapeError> {
    let names = match role {
        TensorRole::Input => &node.input,
        TensorRole::Output => &node.output,
    };
    let name = names.first().ok_or_else(|| ShapeError::MissingOperand {
        node: node.name.clone(),
        role,
    })?;
    declared
        .iter()
        .chain(value_info)
        .find(|vi| &vi.name == name)
        .map(ValueInfoProto::tensor_shape)
        .ok_or_else(|| ShapeError::UnknownTensor {
            name: name.clone(),
            role,
            known: declared
                .iter()
                .chain(value_info)
                .map(|vi| vi.name.clone())
                .collect(),
        })
}

#[cfg(test)]
pub(crate) fn value_info(name: &str, dims: &[i64]) -> ValueInfoProto {
    use proto::{tensor_shape_proto, type_proto, TensorShapeProto, TypeProto};

    ValueInfoProto {
        name: name.to_owned(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: 1,
                shape: Some(TensorShapeProto {
                    dim: dims
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                        })
                        .collect(),
                }),
            })),
        }),
    }
}
