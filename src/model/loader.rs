// 该文件是 Yanmo （掩模） 项目的一部分。
// src/model/loader.rs - 模型工件加载
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

use std::{
  collections::HashSet,
  panic::{AssertUnwindSafe, catch_unwind},
  path::{Path, PathBuf},
  time::Instant,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use tract_onnx::{
  pb::{GraphProto, ModelProto},
  prelude::{Datum, Framework, InferenceFact, InferenceModelExt, TypedModel, tvec},
};

use super::yolo_seg::{RunnableModel, YoloSeg};
use crate::{
  config::DecodeConfig,
  trust::{TrustRegistry, UntrustedType, vet_model},
};

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型包含不可信类型 {0}")]
  UntrustedType(UntrustedType),
  #[error("模型工件损坏 {path}: {reason}")]
  CorruptArtifact { path: PathBuf, reason: String },
  #[error("不支持的模型 {path}: {reason}")]
  UnsupportedModel { path: PathBuf, reason: String },
}

/// 读取、审查并准备分割模型
///
/// 审查在任何算子实例化之前完成；审查失败时不会构造模型的任何部分。
pub fn load_model(
  path: &Path,
  registry: &TrustRegistry,
  decode: &DecodeConfig,
) -> Result<YoloSeg, LoadError> {
  let now = Instant::now();
  let bytes = std::fs::read(path).map_err(|e| LoadError::CorruptArtifact {
    path: path.to_path_buf(),
    reason: format!("无法读取模型文件: {e}"),
  })?;

  let proto = tract_onnx::onnx()
    .proto_model_for_read(&mut bytes.as_slice())
    .map_err(|e| LoadError::CorruptArtifact {
      path: path.to_path_buf(),
      reason: format!("无法解析 ONNX 协议: {e}"),
    })?;
  debug!("已解析模型协议 {}，耗时: {:.2?}", path.display(), now.elapsed());

  load_model_proto(path, &proto, registry, decode)
}

/// 从已解析的协议构造模型，`path` 仅用于报告
pub fn load_model_proto(
  path: &Path,
  proto: &ModelProto,
  registry: &TrustRegistry,
  decode: &DecodeConfig,
) -> Result<YoloSeg, LoadError> {
  let Some(graph) = &proto.graph else {
    return Err(LoadError::CorruptArtifact {
      path: path.to_path_buf(),
      reason: "缺少主图".to_string(),
    });
  };

  let report = vet_model(proto, registry).map_err(|untrusted| {
    error!("拒绝加载模型 {}: 不可信类型 {}", path.display(), untrusted);
    LoadError::UntrustedType(untrusted)
  })?;
  info!(
    "模型审查通过 {}: {} 个图, {} 个节点, {} 种类型",
    path.display(),
    report.graphs,
    report.nodes,
    report.types.len()
  );

  check_graph_structure(graph, &format!("graph({})", graph.name)).map_err(|reason| {
    error!("模型结构不完整 {}: {}", path.display(), reason);
    LoadError::CorruptArtifact {
      path: path.to_path_buf(),
      reason,
    }
  })?;

  if graph.output.len() < 2 {
    return Err(unsupported(
      path,
      format!("分割模型需要预测与掩模原型两个输出，实际为 {}", graph.output.len()),
    ));
  }

  let now = Instant::now();
  let size = decode.internal_size as usize;
  let model = catch_unwind(AssertUnwindSafe(|| {
    tract_onnx::onnx().model_for_proto_model(proto)
  }))
  .map_err(|_| LoadError::CorruptArtifact {
    path: path.to_path_buf(),
    reason: "构造模型时发生异常".to_string(),
  })?
  .map_err(|e| LoadError::CorruptArtifact {
    path: path.to_path_buf(),
    reason: format!("{e:#}"),
  })?
  .with_input_fact(
    0,
    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
  )
  .map_err(|e| unsupported(path, format!("无法设置输入形状: {e:#}")))?;

  let typed = match model.clone().into_optimized() {
    Ok(typed) => typed,
    Err(opt_err) => {
      warn!(
        "模型 {} 优化失败 ({})，回退到去冗余图",
        path.display(),
        opt_err
      );
      model
        .into_typed()
        .and_then(|typed| typed.into_decluttered())
        .map_err(|e| unsupported(path, format!("无法推导模型类型: {e:#}")))?
    }
  };

  check_output_ranks(path, &typed)?;
  let runnable: RunnableModel = typed
    .into_runnable()
    .map_err(|e| unsupported(path, format!("无法生成执行计划: {e:#}")))?;

  info!(
    "模型加载完成 {} ({}x{})，耗时: {:.2?}",
    path.display(),
    size,
    size,
    now.elapsed()
  );
  Ok(YoloSeg::new(runnable, *decode))
}

/// 构造前检查图（含所有子图）的结构完整性
///
/// 非初始化器输入必须声明张量类型；每个图输出必须由本图的输入、
/// 初始化器或节点产生。
fn check_graph_structure(graph: &GraphProto, location: &str) -> Result<(), String> {
  let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();

  for input in &graph.input {
    if initializers.contains(input.name.as_str()) {
      continue;
    }
    let typed = input.r#type.as_ref().is_some_and(|t| t.value.is_some());
    if !typed {
      return Err(format!("{}/input({}) 缺少张量类型", location, input.name));
    }
  }

  let produced: HashSet<&str> = graph
    .input
    .iter()
    .map(|v| v.name.as_str())
    .chain(initializers.iter().copied())
    .chain(graph.node.iter().flat_map(|n| n.output.iter().map(String::as_str)))
    .collect();
  for output in &graph.output {
    if !produced.contains(output.name.as_str()) {
      return Err(format!("{}/output({}) 没有来源", location, output.name));
    }
  }

  for (index, node) in graph.node.iter().enumerate() {
    for attr in &node.attribute {
      let attr_path = format!("{}/node[{}]({})/attr({})", location, index, node.name, attr.name);
      if let Some(subgraph) = &attr.g {
        check_graph_structure(subgraph, &format!("{}/graph({})", attr_path, subgraph.name))?;
      }
      for (i, subgraph) in attr.graphs.iter().enumerate() {
        check_graph_structure(subgraph, &format!("{}/graphs[{}]({})", attr_path, i, subgraph.name))?;
      }
    }
  }

  Ok(())
}

fn check_output_ranks(path: &Path, model: &TypedModel) -> Result<(), LoadError> {
  let outlets = model
    .output_outlets()
    .map_err(|e| unsupported(path, format!("{e:#}")))?;

  let mut ranks = Vec::with_capacity(outlets.len());
  for outlet in outlets {
    let fact = model
      .outlet_fact(*outlet)
      .map_err(|e| unsupported(path, format!("{e:#}")))?;
    ranks.push(fact.rank());
  }
  debug!("模型输出秩: {:?}", ranks);

  if ranks.len() >= 2 && ranks[..2].contains(&3) && ranks[..2].contains(&4) {
    Ok(())
  } else {
    Err(unsupported(
      path,
      format!("输出秩 {ranks:?} 不是 YOLOv8-seg 的预测/原型组合"),
    ))
  }
}

fn unsupported(path: &Path, reason: String) -> LoadError {
  LoadError::UnsupportedModel {
    path: path.to_path_buf(),
    reason,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::TrustConfig,
    input::JobImage,
    model::{
      fixtures::{
        TINY_SIZE, graph, model, node, tiny_segmenter, typed_value, untyped_value, write_model,
      },
      SegmentModel, infer_image,
    },
    trust::build_registry,
  };
  use image::{Rgb, RgbImage};
  use std::io::Cursor;
  use tract_onnx::pb::AttributeProto;

  fn registry() -> TrustRegistry {
    build_registry(&TrustConfig::default())
  }

  fn tiny_decode() -> DecodeConfig {
    DecodeConfig {
      internal_size: TINY_SIZE,
      ..DecodeConfig::default()
    }
  }

  fn load(proto: &ModelProto) -> Result<YoloSeg, LoadError> {
    load_model_proto(Path::new("test.onnx"), proto, &registry(), &tiny_decode())
  }

  /// 两个 Identity 输出的图，输入由调用方决定
  fn passthrough(input: tract_onnx::pb::ValueInfoProto) -> ModelProto {
    model(graph(
      "main",
      vec![input],
      vec![
        node("Identity", "", &["x"], &["a"]),
        node("Identity", "", &["x"], &["b"]),
      ],
      vec![typed_value("a"), typed_value("b")],
    ))
  }

  fn white_png(width: u32, height: u32) -> JobImage {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
      .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
      .unwrap();
    JobImage::Bytes(bytes)
  }

  #[test]
  fn missing_file_is_corrupt_artifact() {
    let err = load_model(
      Path::new("/nonexistent/yanmo/model.onnx"),
      &registry(),
      &DecodeConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::CorruptArtifact { .. }));
  }

  #[test]
  fn garbage_bytes_are_corrupt_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.onnx");
    std::fs::write(&path, [0xff, 0xff, 0xff, 0xff, 0x0f, 0x00, 0x13]).unwrap();

    let err = load_model(&path, &registry(), &DecodeConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::CorruptArtifact { .. }));
  }

  #[test]
  fn untrusted_type_is_rejected_before_construction() {
    let proto = model(graph(
      "main",
      vec![typed_value("x")],
      vec![
        node("Conv", "", &["x"], &["preds"]),
        node("Exec", "org.pwn", &["x"], &["protos"]),
      ],
      vec![typed_value("preds"), typed_value("protos")],
    ));

    match load(&proto).unwrap_err() {
      LoadError::UntrustedType(untrusted) => {
        assert_eq!(untrusted.type_name.to_string(), "org.pwn.Exec");
        assert_eq!(untrusted.location, "graph(main)/node[1](exec)");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn single_output_graph_is_unsupported() {
    let proto = model(graph(
      "main",
      vec![typed_value("x")],
      vec![node("Relu", "", &["x"], &["out"])],
      vec![typed_value("out")],
    ));
    assert!(matches!(
      load(&proto).unwrap_err(),
      LoadError::UnsupportedModel { .. }
    ));
  }

  #[test]
  fn proto_without_graph_is_corrupt() {
    let err = load_model_proto(
      Path::new("empty.onnx"),
      &ModelProto::default(),
      &registry(),
      &DecodeConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::CorruptArtifact { .. }));
  }

  #[test]
  fn untyped_input_is_corrupt_not_a_crash() {
    match load(&passthrough(untyped_value("x"))).unwrap_err() {
      LoadError::CorruptArtifact { reason, .. } => {
        assert!(reason.contains("graph(main)/input(x)"), "{reason}");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn untyped_subgraph_input_is_corrupt() {
    let body = graph(
      "body",
      vec![untyped_value("i")],
      vec![node("Identity", "", &["i"], &["o"])],
      vec![typed_value("o")],
    );
    let mut branch = node("If", "", &["x"], &["a"]);
    branch.attribute.push(AttributeProto {
      name: "then_branch".to_string(),
      g: Some(body),
      ..Default::default()
    });
    let proto = model(graph(
      "main",
      vec![typed_value("x")],
      vec![branch, node("Identity", "", &["x"], &["b"])],
      vec![typed_value("a"), typed_value("b")],
    ));

    match load(&proto).unwrap_err() {
      LoadError::CorruptArtifact { reason, .. } => {
        assert!(reason.contains("graph(body)/input(i)"), "{reason}");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn dangling_output_is_corrupt() {
    let proto = model(graph(
      "main",
      vec![typed_value("x")],
      vec![node("Identity", "", &["x"], &["a"])],
      vec![typed_value("a"), typed_value("nowhere")],
    ));
    match load(&proto).unwrap_err() {
      LoadError::CorruptArtifact { reason, .. } => {
        assert!(reason.contains("output(nowhere)"), "{reason}");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn typed_segmenter_loads_from_file_and_infers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(dir.path(), "tiny.onnx", &tiny_segmenter());

    let model = load_model(&path, &registry(), &tiny_decode()).unwrap();
    assert_eq!(model.internal_size(), TINY_SIZE);

    // 8x4 白图 -> 4x2 内容 + 上下各 1 行填充；重排后的 6 个锚点经 NMS 保留 3 个
    let inference = infer_image(&model, &white_png(8, 4)).unwrap();
    assert_eq!(inference.geometry, crate::frame::ImageGeometry::new(8, 4, TINY_SIZE));
    assert_eq!(inference.masks.len(), 3);
    for mask in &inference.masks {
      assert_eq!((mask.width(), mask.height()), (4, 4));
      assert!(mask.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }
  }
}
