// 该文件是 Yanmo （掩模） 项目的一部分。
// src/trust/vet.rs - 模型图审查
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{collections::BTreeSet, fmt};

use tract_onnx::pb::{GraphProto, ModelProto, TensorProto};

use super::{QualifiedType, TrustRegistry};

/// 引用外部数据文件的张量，按不可信类型处理
pub const EXTERNAL_DATA_TYPE: (&str, &str) = ("onnx", "ExternalData");

/// 审查发现的第一个不可信类型及其在对象图中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedType {
  pub type_name: QualifiedType,
  pub location: String,
}

impl fmt::Display for UntrustedType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} at {}", self.type_name, self.location)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VetReport {
  pub graphs: usize,
  pub nodes: usize,
  pub types: BTreeSet<QualifiedType>,
}

/// 在实例化任何算子之前审查整个模型
///
/// 深度优先遍历主图、所有节点以及属性中的子图（`g` 与 `graphs`），
/// 遇到第一个不在白名单中的类型即返回错误。
pub fn vet_model(model: &ModelProto, registry: &TrustRegistry) -> Result<VetReport, UntrustedType> {
  let mut report = VetReport::default();
  if let Some(graph) = &model.graph {
    let path = format!("graph({})", graph.name);
    vet_graph(graph, &path, registry, &mut report)?;
  }
  Ok(report)
}

fn vet_graph(
  graph: &GraphProto,
  path: &str,
  registry: &TrustRegistry,
  report: &mut VetReport,
) -> Result<(), UntrustedType> {
  report.graphs += 1;

  for tensor in &graph.initializer {
    vet_tensor(tensor, &format!("{}/initializer({})", path, tensor.name))?;
  }

  for (index, node) in graph.node.iter().enumerate() {
    let location = format!("{}/node[{}]({})", path, index, node.name);
    let ty = QualifiedType::new(&node.domain, &node.op_type);
    if !registry.is_trusted(&ty) {
      return Err(UntrustedType {
        type_name: ty,
        location,
      });
    }
    report.nodes += 1;
    report.types.insert(ty);

    for attr in &node.attribute {
      let attr_path = format!("{}/attr({})", location, attr.name);
      if let Some(tensor) = &attr.t {
        vet_tensor(tensor, &attr_path)?;
      }
      for tensor in &attr.tensors {
        vet_tensor(tensor, &attr_path)?;
      }
      if let Some(subgraph) = &attr.g {
        let sub_path = format!("{}/graph({})", attr_path, subgraph.name);
        vet_graph(subgraph, &sub_path, registry, report)?;
      }
      for (i, subgraph) in attr.graphs.iter().enumerate() {
        let sub_path = format!("{}/graphs[{}]({})", attr_path, i, subgraph.name);
        vet_graph(subgraph, &sub_path, registry, report)?;
      }
    }
  }

  Ok(())
}

fn vet_tensor(tensor: &TensorProto, location: &str) -> Result<(), UntrustedType> {
  if tensor.external_data.is_empty() {
    return Ok(());
  }
  Err(UntrustedType {
    type_name: QualifiedType::new(EXTERNAL_DATA_TYPE.0, EXTERNAL_DATA_TYPE.1),
    location: location.to_string(),
  })
}
