// 该文件是 Yanmo （掩模） 项目的一部分。
// src/model.rs - 模型
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

use std::time::Instant;

use thiserror::Error;
use tracing::info;

use crate::{
  frame::{ImageGeometry, LetterboxFrame},
  input::{ImageInputError, JobImage},
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 实例分割能力：输入信箱帧，按发现顺序输出每个实例的原始掩模
pub trait SegmentModel:
  Model<Input = LetterboxFrame, Output = Vec<RawMask>, Error = InferenceError>
{
  /// 模型固定的正方形输入边长
  fn internal_size(&self) -> u32;
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("图像读取失败: {0}")]
  Image(#[from] ImageInputError),
  #[error("输入尺寸 {actual} 与模型内部尺寸 {expected} 不一致")]
  InputSize { expected: usize, actual: usize },
  #[error("模型执行失败: {0}")]
  Execution(String),
  #[error("模型输出不符合预期: {0}")]
  UnexpectedOutput(String),
}

/// 模型内部分辨率下的单实例置信度网格（行优先）
#[derive(Debug, Clone, PartialEq)]
pub struct RawMask {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl RawMask {
  /// 数据长度与尺寸不符时返回 `None`
  pub fn new(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
    if data.len() != width * height {
      return None;
    }
    Some(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn filled(width: usize, height: usize, value: f32) -> Self {
    Self {
      width,
      height,
      data: vec![value; width * height].into_boxed_slice(),
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn row(&self, y: usize) -> &[f32] {
    &self.data[y * self.width..(y + 1) * self.width]
  }

  pub fn get(&self, x: usize, y: usize) -> f32 {
    self.data[y * self.width + x]
  }
}

/// 单张图像的推理结果
#[derive(Debug, Clone)]
pub struct Inference {
  pub masks: Vec<RawMask>,
  pub geometry: ImageGeometry,
}

/// 读取图像、做信箱变换并运行模型
///
/// 未检测到任何实例时返回空列表，这不是错误。
pub fn infer_image<M>(model: &M, image: &JobImage) -> Result<Inference, InferenceError>
where
  M: SegmentModel + ?Sized,
{
  let rgb = image.decode()?;
  let frame = LetterboxFrame::letterbox(&rgb, model.internal_size());
  let geometry = frame.geometry();

  let now = Instant::now();
  let masks = model.infer(&frame)?;
  info!(
    "推理完成，耗时: {:.2?}, 实例数: {}, 原图 {}x{}",
    now.elapsed(),
    masks.len(),
    geometry.width,
    geometry.height
  );

  Ok(Inference { masks, geometry })
}

mod loader;
mod yolo_seg;

#[cfg(test)]
pub(crate) mod fixtures;

pub use self::loader::{LoadError, load_model, load_model_proto};
pub use self::yolo_seg::{SegHead, YoloSeg, decode_segments};
