// 该文件是 Yanmo （掩模） 项目的一部分。
// src/model/fixtures.rs - 测试用 ONNX 模型构造
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

use std::path::{Path, PathBuf};

use prost::Message;
use tract_onnx::pb::{
  GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto, TypeProto,
  ValueInfoProto, tensor_proto::DataType, type_proto,
};

/// `tiny_segmenter` 的内部尺寸：3x4x4 输入正好重排为 [1, 8, 6]
pub(crate) const TINY_SIZE: u32 = 4;

pub(crate) fn typed_value(name: &str) -> ValueInfoProto {
  ValueInfoProto {
    name: name.to_string(),
    r#type: Some(TypeProto {
      value: Some(type_proto::Value::TensorType(type_proto::Tensor {
        elem_type: DataType::Float as i32,
        shape: None,
      })),
      ..Default::default()
    }),
    ..Default::default()
  }
}

pub(crate) fn untyped_value(name: &str) -> ValueInfoProto {
  ValueInfoProto {
    name: name.to_string(),
    ..Default::default()
  }
}

pub(crate) fn node(op_type: &str, domain: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
  NodeProto {
    op_type: op_type.to_string(),
    domain: domain.to_string(),
    name: op_type.to_lowercase(),
    input: inputs.iter().map(|s| s.to_string()).collect(),
    output: outputs.iter().map(|s| s.to_string()).collect(),
    ..Default::default()
  }
}

pub(crate) fn graph(
  name: &str,
  inputs: Vec<ValueInfoProto>,
  nodes: Vec<NodeProto>,
  outputs: Vec<ValueInfoProto>,
) -> GraphProto {
  GraphProto {
    name: name.to_string(),
    input: inputs,
    node: nodes,
    output: outputs,
    ..Default::default()
  }
}

pub(crate) fn model(graph: GraphProto) -> ModelProto {
  ModelProto {
    ir_version: 7,
    opset_import: vec![OperatorSetIdProto {
      domain: String::new(),
      version: 13,
    }],
    graph: Some(graph),
    ..Default::default()
  }
}

/// 最小的“分割头”：`preds = Reshape(images, [1, 8, 6])`，`protos = Identity(images)`
///
/// 即 nc = 1、nm = 3、6 个锚点，掩模原型为 3x4x4。
pub(crate) fn tiny_segmenter() -> ModelProto {
  let mut g = graph(
    "main",
    vec![typed_value("images")],
    vec![
      node("Reshape", "", &["images", "shape"], &["preds"]),
      node("Identity", "", &["images"], &["protos"]),
    ],
    vec![typed_value("preds"), typed_value("protos")],
  );
  g.initializer.push(TensorProto {
    name: "shape".to_string(),
    dims: vec![3],
    data_type: DataType::Int64 as i32,
    int64_data: vec![1, 8, 6],
    ..Default::default()
  });
  model(g)
}

pub(crate) fn write_model(dir: &Path, name: &str, proto: &ModelProto) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, proto.encode_to_vec()).unwrap();
  path
}
