// 该文件是 Yanmo （掩模） 项目的一部分。
// src/rectify.rs - 掩模逆信箱矫正
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

//! 将模型内部分辨率下的掩模映射回原图像素空间。
//!
//! 步骤：按信箱几何求出内容窗口，裁剪到掩模实际范围，去除填充，
//! 线性插值缩放到原图尺寸，最后以 0.5 为阈值二值化为 0/255。

use image::{GrayImage, Luma};
use tracing::{debug, warn};

use crate::{frame::ImageGeometry, model::RawMask, utils::resize_bilinear};

/// 严格大于该值视为前景
pub const BINARIZE_THRESHOLD: f32 = 0.5;
pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// 原图分辨率下的二值掩模，像素取值仅为 0 或 255
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RectifiedMask(GrayImage);

impl RectifiedMask {
  pub fn blank(width: u32, height: u32) -> Self {
    RectifiedMask(GrayImage::from_pixel(width, height, Luma([BACKGROUND])))
  }

  pub fn width(&self) -> u32 {
    self.0.width()
  }

  pub fn height(&self) -> u32 {
    self.0.height()
  }

  pub fn as_image(&self) -> &GrayImage {
    &self.0
  }

  pub fn into_image(self) -> GrayImage {
    self.0
  }

  pub fn is_foreground(&self, x: u32, y: u32) -> bool {
    self.0.get_pixel(x, y).0[0] == FOREGROUND
  }

  pub fn foreground_pixels(&self) -> usize {
    self.0.pixels().filter(|p| p.0[0] == FOREGROUND).count()
  }
}

fn binarize(value: f32) -> u8 {
  if value > BINARIZE_THRESHOLD {
    FOREGROUND
  } else {
    BACKGROUND
  }
}

/// 矫正单个实例掩模
///
/// 输出尺寸恒为 `geometry.width × geometry.height`。裁剪窗口为空（极端长宽比
/// 或内部尺寸为零）时返回全背景掩模。
pub fn rectify(raw: &RawMask, geometry: &ImageGeometry) -> RectifiedMask {
  let (width, height) = (geometry.width as usize, geometry.height as usize);
  let window = geometry.content_window();

  let Some((xs, ys)) = window.clip(raw.width(), raw.height()) else {
    warn!(
      "掩模内容窗口为空: {:?}, 掩模尺寸 {}x{}, 原图 {}x{}",
      window,
      raw.width(),
      raw.height(),
      width,
      height
    );
    return RectifiedMask::blank(geometry.width, geometry.height);
  };

  let (crop_w, crop_h) = (xs.len(), ys.len());
  let mut cropped = Vec::with_capacity(crop_w * crop_h);
  for y in ys {
    cropped.extend_from_slice(&raw.row(y)[xs.clone()]);
  }

  let resized = resize_bilinear(&cropped, crop_w, crop_h, width, height);
  RectifiedMask(GrayImage::from_fn(geometry.width, geometry.height, |x, y| {
    Luma([binarize(resized[y as usize * width + x as usize])])
  }))
}

/// 按发现顺序矫正一组掩模；每个掩模相互独立
pub fn rectify_all(raws: &[RawMask], geometry: &ImageGeometry, parallel: bool) -> Vec<RectifiedMask> {
  debug!("矫正 {} 个掩模, 并行: {}", raws.len(), parallel);

  #[cfg(feature = "parallel")]
  {
    use rayon::prelude::*;

    if parallel {
      return raws.par_iter().map(|raw| rectify(raw, geometry)).collect();
    }
  }

  #[cfg(not(feature = "parallel"))]
  let _ = parallel;

  raws.iter().map(|raw| rectify(raw, geometry)).collect()
}
