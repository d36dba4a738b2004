//! Mappable layers extracted from a shape-inferred workload graph.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{DimSize, Shape, DEFAULT_PRECISION};
use crate::hardware::CoreId;
use crate::mapping::MappingTable;
use crate::onnx::{self, proto::ModelProto, proto::NodeProto, AttributeError, ShapeError};
use crate::utils::join_into_string;

/// Operators lowered to layers. Everything else is reshaping or
/// elementwise glue the cost proxies do not score.
const COMPUTE_OPS: &[&str] = &["Conv", "Gemm", "MatMul"];

#[derive(thiserror::Error, Debug)]
pub enum WorkloadError {
    #[error("model has no graph")]
    MissingGraph,
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error(
        "no mapping rule for operator {op:?} of layer {layer:?} and the table has no default; \
         rules cover: {}",
        join_into_string(.available, ", ")
    )]
    UnmappedOperator {
        op: String,
        layer: String,
        available: Vec<String>,
    },
}

/// One layer of the workload: its nested-loop form and where it runs.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LayerNode {
    pub id: usize,
    pub name: String,
    pub op_type: String,
    /// Trip count of every dimension of the layer's nested-loop form.
    pub loop_dim_sizes: IndexMap<String, DimSize>,
    pub input_shape: Shape,
    pub output_shape: Shape,
    /// Activation word width in bits.
    pub act_precision: u32,
    /// Weight word width in bits.
    pub weight_precision: u32,
    /// Id of the compute core this layer is allocated to.
    pub core_allocation: CoreId,
}

impl LayerNode {
    /// Multiply-accumulates needed to compute the layer once: the product
    /// over all loop dimensions.
    pub fn mac_count(&self) -> u64 {
        self.loop_dim_sizes.values().product()
    }

    pub fn loop_size(&self, dim: &str) -> Option<DimSize> {
        self.loop_dim_sizes.get(dim).copied()
    }

    pub fn has_dimension(&self, dim: &str) -> bool {
        self.loop_dim_sizes.contains_key(dim)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.loop_dim_sizes.keys().map(String::as_str)
    }
}

/// The ordered, mappable layers of one model.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Workload {
    layers: Vec<LayerNode>,
}

impl Workload {
    /// Builds one layer per compute operator of a shape-inferred model,
    /// allocating each to a core through the mapping table.
    ///
    /// Operators outside [COMPUTE_OPS] are skipped. An operator with no
    /// rule and no default rule is a configuration error.
    pub fn from_model(model: &ModelProto, table: &MappingTable) -> Result<Workload, WorkloadError> {
        let graph = model.graph.as_ref().ok_or(WorkloadError::MissingGraph)?;
        let mut layers = Vec::new();
        for node in &graph.node {
            if !COMPUTE_OPS.contains(&node.op_type.as_str()) {
                debug!("skipping non-compute node {:?} ({})", node.name, node.op_type);
                continue;
            }
            let rule =
                table
                    .rule_for(&node.op_type)
                    .ok_or_else(|| WorkloadError::UnmappedOperator {
                        op: node.op_type.clone(),
                        layer: node.name.clone(),
                        available: table.iter().map(|(k, _)| k.to_owned()).collect(),
                    })?;
            let (input_shape, output_shape) = onnx::node_dimension_shapes(node, graph)?;
            let loop_dim_sizes = loop_dims(node, &input_shape, &output_shape)?;
            let id = layers.len();
            let name = if node.name.is_empty() {
                format!("{}_{id}", node.op_type.to_lowercase())
            } else {
                node.name.clone()
            };
            layers.push(LayerNode {
                id,
                name,
                op_type: node.op_type.clone(),
                loop_dim_sizes,
                input_shape,
                output_shape,
                act_precision: DEFAULT_PRECISION,
                weight_precision: DEFAULT_PRECISION,
                core_allocation: rule.core_allocation,
            });
        }
        Ok(Workload { layers })
    }

    pub fn layers(&self) -> &[LayerNode] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// A dimension extent, treating absent or symbolic entries as singleton.
fn extent(shape: &Shape, i: usize) -> DimSize {
    shape.get(i).copied().filter(|&d| d > 0).unwrap_or(1)
}

fn loop_dims(
    node: &NodeProto,
    input_shape: &Shape,
    output_shape: &Shape,
) -> Result<IndexMap<String, DimSize>, AttributeError> {
    let mut dims = IndexMap::new();
    match node.op_type.as_str() {
        // NCHW convolution: output (B, K, OY, OX), input (B, C, IY, IX),
        // filter extents from the kernel_shape attribute.
        "Conv" => {
            let kernel =
                onnx::attribute_ints("kernel_shape", &node.attribute, Some(vec![1, 1]))?;
            dims.insert("B".to_owned(), extent(output_shape, 0));
            dims.insert("K".to_owned(), extent(output_shape, 1));
            dims.insert("OY".to_owned(), extent(output_shape, 2));
            dims.insert("OX".to_owned(), extent(output_shape, 3));
            dims.insert("C".to_owned(), extent(input_shape, 1));
            dims.insert("FY".to_owned(), kernel.first().map_or(1, |&d| d.max(1) as u64));
            dims.insert("FX".to_owned(), kernel.get(1).map_or(1, |&d| d.max(1) as u64));
        }
        // (B, C) x (C, K): reduction over the contracted dimension.
        _ => {
            dims.insert("B".to_owned(), extent(input_shape, 0));
            dims.insert(
                "C".to_owned(),
                extent(input_shape, input_shape.len().saturating_sub(1)),
            );
            dims.insert(
                "K".to_owned(),
                extent(output_shape, output_shape.len().saturating_sub(1)),
            );
        }
    }
    Ok(dims)
}
