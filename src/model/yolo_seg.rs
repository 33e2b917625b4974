// 该文件是 Yanmo （掩模） 项目的一部分。
// src/model/yolo_seg.rs - YOLOv8-seg 实例分割模型
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

use tracing::{debug, error};
use tract_onnx::prelude::{Graph, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec};

use crate::{
  config::DecodeConfig,
  frame::LetterboxFrame,
  model::{InferenceError, Model, RawMask, SegmentModel},
  utils::{resize_bilinear, sigmoid},
};

pub(crate) type RunnableModel =
  SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const BOX_CHANNELS: usize = 4;
const PREDICTION_RANK: usize = 3;
const PROTOTYPE_RANK: usize = 4;

pub struct YoloSeg {
  runnable: RunnableModel,
  decode: DecodeConfig,
}

impl YoloSeg {
  pub(crate) fn new(runnable: RunnableModel, decode: DecodeConfig) -> Self {
    Self { runnable, decode }
  }
}

impl std::fmt::Debug for YoloSeg {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("YoloSeg")
      .field("decode", &self.decode)
      .finish_non_exhaustive()
  }
}

/// 根据张量秩匹配预测输出与掩模原型输出
/// 返回 (predictions, prototypes)，如果秩不匹配则返回 None
fn match_pred_proto_tensors<'a>(
  tensor1: &'a Tensor,
  tensor2: &'a Tensor,
) -> Option<(&'a Tensor, &'a Tensor)> {
  match (tensor1.rank(), tensor2.rank()) {
    (PREDICTION_RANK, PROTOTYPE_RANK) => Some((tensor1, tensor2)),
    (PROTOTYPE_RANK, PREDICTION_RANK) => {
      debug!("输出顺序交换 - 索引 0 是掩模原型，索引 1 是预测");
      Some((tensor2, tensor1))
    }
    (r1, r2) => {
      error!(
        "输出秩不匹配 - 张量1: {:?}, 张量2: {:?}, 期望秩 {} 与 {}",
        tensor1.shape(),
        tensor2.shape(),
        PREDICTION_RANK,
        PROTOTYPE_RANK
      );
      debug!("实际秩: {} / {}", r1, r2);
      None
    }
  }
}

fn f32_slice(tensor: &Tensor) -> Result<&[f32], InferenceError> {
  tensor
    .as_slice::<f32>()
    .map_err(|e| InferenceError::UnexpectedOutput(format!("输出不是 f32 张量: {e}")))
}

impl Model for YoloSeg {
  type Input = LetterboxFrame;
  type Output = Vec<RawMask>;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let size = self.decode.internal_size as usize;
    if input.size() != size {
      return Err(InferenceError::InputSize {
        expected: size,
        actual: input.size(),
      });
    }

    debug!("设置模型输入");
    let tensor = Tensor::from_shape(&[1, input.channels(), size, size], input.as_nchw())
      .map_err(|e| InferenceError::Execution(format!("无法构造输入张量: {e}")))?;

    debug!("执行模型推理");
    let outputs = self
      .runnable
      .run(tvec![tensor.into()])
      .map_err(|e| InferenceError::Execution(format!("{e:#}")))?;

    let tensors: Vec<Tensor> = outputs.into_iter().map(|value| value.into_tensor()).collect();
    if tensors.len() < 2 {
      return Err(InferenceError::UnexpectedOutput(format!(
        "期望至少 2 个输出，实际为 {}",
        tensors.len()
      )));
    }

    let (preds, protos) = match_pred_proto_tensors(&tensors[0], &tensors[1])
      .ok_or_else(|| InferenceError::UnexpectedOutput("无法区分预测与掩模原型输出".to_string()))?;

    let head = SegHead::new(f32_slice(preds)?, preds.shape(), f32_slice(protos)?, protos.shape())?;
    Ok(decode_segments(&head, &self.decode))
  }
}

impl SegmentModel for YoloSeg {
  fn internal_size(&self) -> u32 {
    self.decode.internal_size
  }
}

/// 分割头的两路输出（批大小为 1）
///
/// - `preds`: `[1, 4 + nc + nm, anchors]`，前 4 个通道为 `cx, cy, w, h`
/// - `protos`: `[1, nm, mh, mw]`
#[derive(Debug, Clone, Copy)]
pub struct SegHead<'a> {
  preds: &'a [f32],
  protos: &'a [f32],
  classes: usize,
  anchors: usize,
  mask_dim: usize,
  proto_h: usize,
  proto_w: usize,
}

impl<'a> SegHead<'a> {
  pub fn new(
    preds: &'a [f32],
    pred_shape: &[usize],
    protos: &'a [f32],
    proto_shape: &[usize],
  ) -> Result<Self, InferenceError> {
    let (channels, anchors) = match pred_shape {
      [1, channels, anchors] => (*channels, *anchors),
      other => {
        return Err(InferenceError::UnexpectedOutput(format!(
          "预测输出形状应为 [1, C, N]，实际为 {other:?}"
        )));
      }
    };
    let (mask_dim, proto_h, proto_w) = match proto_shape {
      [1, nm, mh, mw] => (*nm, *mh, *mw),
      other => {
        return Err(InferenceError::UnexpectedOutput(format!(
          "掩模原型形状应为 [1, nm, mh, mw]，实际为 {other:?}"
        )));
      }
    };
    if channels <= BOX_CHANNELS + mask_dim {
      return Err(InferenceError::UnexpectedOutput(format!(
        "预测通道数 {channels} 不足以容纳 4 个框坐标与 {mask_dim} 个掩模系数"
      )));
    }
    if preds.len() != channels * anchors || protos.len() != mask_dim * proto_h * proto_w {
      return Err(InferenceError::UnexpectedOutput(
        "输出数据长度与形状不符".to_string(),
      ));
    }

    Ok(Self {
      preds,
      protos,
      classes: channels - BOX_CHANNELS - mask_dim,
      anchors,
      mask_dim,
      proto_h,
      proto_w,
    })
  }

  fn at(&self, channel: usize, anchor: usize) -> f32 {
    self.preds[channel * self.anchors + anchor]
  }
}

#[derive(Debug, Clone)]
struct Candidate {
  class_id: usize,
  score: f32,
  bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  coeffs: Vec<f32>,
}

/// 置信度过滤、按类别 NMS，并为保留的实例生成内部分辨率掩模
pub fn decode_segments(head: &SegHead<'_>, decode: &DecodeConfig) -> Vec<RawMask> {
  let mut candidates = Vec::new();

  for anchor in 0..head.anchors {
    let (class_id, score) = (0..head.classes)
      .map(|c| (c, head.at(BOX_CHANNELS + c, anchor)))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score <= decode.confidence {
      continue;
    }

    let cx = head.at(0, anchor);
    let cy = head.at(1, anchor);
    let w = head.at(2, anchor);
    let h = head.at(3, anchor);
    let coeff_base = BOX_CHANNELS + head.classes;

    candidates.push(Candidate {
      class_id,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      coeffs: (0..head.mask_dim)
        .map(|k| head.at(coeff_base + k, anchor))
        .collect(),
    });
  }

  debug!("置信度过滤后候选数: {}", candidates.len());
  let mut kept = nms(candidates, decode.iou);
  kept.truncate(decode.max_detections);
  debug!("NMS 后保留实例数: {}", kept.len());

  let size = decode.internal_size as usize;
  kept
    .iter()
    .map(|candidate| {
      debug!(
        "实例: 类别 {} 置信度 {:.3} 框 {:?}",
        candidate.class_id, candidate.score, candidate.bbox
      );
      instance_mask(head, candidate, size)
    })
    .collect()
}

fn instance_mask(head: &SegHead<'_>, candidate: &Candidate, size: usize) -> RawMask {
  let plane = head.proto_h * head.proto_w;
  let mut logits = vec![0.0f32; plane];
  for (k, coeff) in candidate.coeffs.iter().enumerate() {
    let proto = &head.protos[k * plane..(k + 1) * plane];
    for (logit, p) in logits.iter_mut().zip(proto) {
      *logit += coeff * p;
    }
  }

  let upsampled = resize_bilinear(&logits, head.proto_w, head.proto_h, size, size);
  let [x1, y1, x2, y2] = candidate.bbox;
  let data = upsampled
    .iter()
    .enumerate()
    .map(|(i, logit)| {
      let (x, y) = ((i % size) as f32, (i / size) as f32);
      if x >= x1 && x < x2 && y >= y1 && y < y2 {
        sigmoid(*logit)
      } else {
        0.0
      }
    })
    .collect();

  RawMask::new(size, size, data).unwrap_or_else(|| RawMask::filled(size, size, 0.0))
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result = Vec::new();
  while !candidates.is_empty() {
    let best = candidates.remove(0);
    candidates.retain(|c| c.class_id != best.class_id || iou(&best.bbox, &c.bbox) <= iou_threshold);
    result.push(best);
  }

  result
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
