// 该文件是 Yanmo （掩模） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::PathBuf;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ImageInputError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Image has zero area: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 任务提交的图像：磁盘路径或上传的原始字节
#[derive(Debug, Clone)]
pub enum JobImage {
  Path(PathBuf),
  Bytes(Vec<u8>),
}

impl JobImage {
  pub fn describe(&self) -> String {
    match self {
      JobImage::Path(path) => path.display().to_string(),
      JobImage::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
    }
  }

  /// 解码为 RGB 图像
  pub fn decode(&self) -> Result<RgbImage, ImageInputError> {
    let image = match self {
      JobImage::Path(path) => ImageReader::open(path)?.with_guessed_format()?.decode()?,
      JobImage::Bytes(bytes) => image::load_from_memory(bytes)?,
    };
    let image = image.to_rgb8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(ImageInputError::EmptyImage(width, height));
    }
    debug!("读取图像 {}: {}x{}", self.describe(), width, height);
    Ok(image)
  }
}

impl From<PathBuf> for JobImage {
  fn from(path: PathBuf) -> Self {
    JobImage::Path(path)
  }
}

impl From<Vec<u8>> for JobImage {
  fn from(bytes: Vec<u8>) -> Self {
    JobImage::Bytes(bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
      .unwrap();
    bytes
  }

  #[test]
  fn decodes_uploaded_bytes() {
    let image = JobImage::from(png_bytes(5, 3)).decode().unwrap();
    assert_eq!(image.dimensions(), (5, 3));
    assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30]);
  }

  #[test]
  fn decodes_from_path_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload");
    std::fs::write(&path, png_bytes(4, 4)).unwrap();
    let image = JobImage::from(path).decode().unwrap();
    assert_eq!(image.dimensions(), (4, 4));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let err = JobImage::from(b"definitely not an image".to_vec())
      .decode()
      .unwrap_err();
    assert!(matches!(err, ImageInputError::ImageLoadError(_)));
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = JobImage::from(PathBuf::from("/nonexistent/yanmo/input.png"))
      .decode()
      .unwrap_err();
    assert!(matches!(err, ImageInputError::IoError(_)));
  }
}
