// 该文件是 Yanmo （掩模） 项目的一部分。
// src/frame.rs - 信箱变换几何与 NCHW 输入帧
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

use std::ops::Range;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::utils::resize_bilinear;

const RGB_CHANNELS: usize = 3;
const LETTERBOX_FILL: u8 = 114;

/// 逆信箱变换所需的尺寸信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
  /// 原图宽度
  pub width: u32,
  /// 原图高度
  pub height: u32,
  /// 模型内部正方形输入边长
  pub internal_size: u32,
}

/// 原图内容在内部分辨率网格中的位置（未裁剪，可能越界）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentWindow {
  pub x0: i64,
  pub x1: i64,
  pub y0: i64,
  pub y1: i64,
}

impl ImageGeometry {
  pub fn new(width: u32, height: u32, internal_size: u32) -> Self {
    Self {
      width,
      height,
      internal_size,
    }
  }

  /// 信箱变换使用的统一缩放比例 `min(S / H, S / W)`
  pub fn scale(&self) -> f64 {
    if self.width == 0 || self.height == 0 {
      return 0.0;
    }
    let size = self.internal_size as f64;
    (size / self.height as f64).min(size / self.width as f64)
  }

  /// 缩放后（填充前）的内容尺寸，四舍六入五取偶
  pub fn scaled_size(&self) -> (i64, i64) {
    let scale = self.scale();
    (
      (self.width as f64 * scale).round_ties_even() as i64,
      (self.height as f64 * scale).round_ties_even() as i64,
    )
  }

  /// 左右、上下各自的对称填充量，可为小数
  pub fn padding(&self) -> (f64, f64) {
    let (new_w, new_h) = self.scaled_size();
    let size = self.internal_size as f64;
    ((size - new_w as f64) / 2.0, (size - new_h as f64) / 2.0)
  }

  pub fn content_window(&self) -> ContentWindow {
    let (new_w, new_h) = self.scaled_size();
    let (pad_w, pad_h) = self.padding();
    ContentWindow {
      x0: pad_w.floor() as i64,
      x1: (pad_w + new_w as f64).floor() as i64,
      y0: pad_h.floor() as i64,
      y1: (pad_h + new_h as f64).floor() as i64,
    }
  }
}

impl ContentWindow {
  /// 将窗口裁剪到 `width × height` 网格内
  ///
  /// 裁剪后为空时返回 `None`，调用方据此避免越界读取。
  pub fn clip(&self, width: usize, height: usize) -> Option<(Range<usize>, Range<usize>)> {
    let clamp = |v: i64, hi: usize| v.clamp(0, hi as i64) as usize;
    let (x0, x1) = (clamp(self.x0, width), clamp(self.x1, width));
    let (y0, y1) = (clamp(self.y0, height), clamp(self.y1, height));
    if x0 >= x1 || y0 >= y1 {
      return None;
    }
    Some((x0..x1, y0..y1))
  }
}

/// 已完成信箱填充的模型输入帧（RGB，NCHW，取值 [0, 1]）
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  data: Box<[f32]>,
  geometry: ImageGeometry,
}

impl LetterboxFrame {
  pub fn size(&self) -> usize {
    self.geometry.internal_size as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn geometry(&self) -> ImageGeometry {
    self.geometry
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  /// 将原图按比例缩放并对称填充到 `internal_size × internal_size`
  pub fn letterbox(image: &RgbImage, internal_size: u32) -> Self {
    let (width, height) = image.dimensions();
    let geometry = ImageGeometry::new(width, height, internal_size);
    let size = internal_size as i64;

    let (new_w, new_h) = geometry.scaled_size();
    let (new_w, new_h) = (new_w.clamp(1, size.max(1)), new_h.clamp(1, size.max(1)));
    let resized = if (new_w, new_h) == (width as i64, height as i64) {
      image.clone()
    } else {
      resize_rgb(image, new_w as u32, new_h as u32)
    };

    let (pad_w, pad_h) = geometry.padding();
    let left = (pad_w - 0.1).round_ties_even().max(0.0) as i64;
    let top = (pad_h - 0.1).round_ties_even().max(0.0) as i64;

    let mut canvas = RgbImage::from_pixel(
      internal_size,
      internal_size,
      Rgb([LETTERBOX_FILL; RGB_CHANNELS]),
    );
    image::imageops::replace(&mut canvas, &resized, left, top);

    Self {
      data: to_nchw(&canvas),
      geometry,
    }
  }
}

/// 逐通道半像素对齐双线性缩放，结果四舍五入回 u8
fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  let (src_w, src_h) = image.dimensions();
  let planes: Vec<Vec<f32>> = (0..RGB_CHANNELS)
    .map(|c| {
      let plane: Vec<f32> = image.pixels().map(|p| p[c] as f32).collect();
      resize_bilinear(
        &plane,
        src_w as usize,
        src_h as usize,
        width as usize,
        height as usize,
      )
    })
    .collect();

  ImageBuffer::from_fn(width, height, |x, y| {
    let index = (y * width + x) as usize;
    Rgb(std::array::from_fn(|c| {
      planes[c][index].round().clamp(0.0, 255.0) as u8
    }))
  })
}

fn to_nchw(image: &RgbImage) -> Box<[f32]> {
  let (width, height) = image.dimensions();
  let (width, height) = (width as usize, height as usize);
  let plane = width * height;
  let mut data = vec![0.0f32; RGB_CHANNELS * plane];

  for (x, y, pixel) in image.enumerate_pixels() {
    let index = (y as usize) * width + (x as usize);
    for c in 0..RGB_CHANNELS {
      data[c * plane + index] = pixel[c] as f32 / 255.0;
    }
  }

  data.into_boxed_slice()
}
