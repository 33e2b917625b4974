// 该文件是 Yanmo （掩模） 项目的一部分。
// tests/pipeline.rs - 端到端流程测试
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

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use yanmo::{
  config::{SegmentConfig, TrustConfig},
  frame::LetterboxFrame,
  input::JobImage,
  model::{InferenceError, Model, RawMask, SegmentModel},
  output::MaskDirectory,
  task::{JobErrorKind, JobRequest, OneShotJob, Task, run_job},
  trust::build_registry,
};

/// 仅在给定行区间内输出前景的假模型
struct Band {
  size: u32,
  rows: std::ops::Range<usize>,
}

impl Model for Band {
  type Input = LetterboxFrame;
  type Output = Vec<RawMask>;
  type Error = InferenceError;

  fn infer(&self, input: &LetterboxFrame) -> Result<Vec<RawMask>, InferenceError> {
    let size = input.size();
    let data = (0..size * size)
      .map(|i| if self.rows.contains(&(i / size)) { 1.0 } else { 0.0 })
      .collect();
    Ok(RawMask::new(size, size, data).into_iter().collect())
  }
}

impl SegmentModel for Band {
  fn internal_size(&self) -> u32 {
    self.size
  }
}

fn png_bytes(width: u32, height: u32) -> JobImage {
  let mut bytes = Vec::new();
  RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  JobImage::Bytes(bytes)
}

#[test]
fn letterboxed_content_rectifies_to_full_image() {
  let scratch = tempfile::tempdir().unwrap();
  let image = png_bytes(800, 600);
  let output = MaskDirectory::new(scratch.path(), "/masks", "landscape");
  let model = Band {
    size: 640,
    rows: 80..560,
  };

  let result = OneShotJob::new("landscape", &image, true)
    .run_task(&model, &output)
    .unwrap();
  assert_eq!(result.count, 1);
  assert_eq!(result.masks[0].url, "/masks/landscape/mask_0.png");

  let mask = image::open(scratch.path().join("landscape/mask_0.png"))
    .unwrap()
    .to_luma8();
  assert_eq!(mask.dimensions(), (800, 600));
  assert!(mask.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn padding_only_detection_yields_blank_mask() {
  let scratch = tempfile::tempdir().unwrap();
  let image = png_bytes(800, 600);
  let output = MaskDirectory::new(scratch.path(), "/masks", "padding");
  let model = Band {
    size: 640,
    rows: 0..80,
  };

  let result = OneShotJob::new("padding", &image, false)
    .run_task(&model, &output)
    .unwrap();
  assert_eq!(result.count, 1);

  let mask = image::open(scratch.path().join("padding/mask_0.png"))
    .unwrap()
    .to_luma8();
  assert!(mask.pixels().all(|p| p.0[0] == 0));
}

#[test]
fn result_serializes_for_callers() {
  let scratch = tempfile::tempdir().unwrap();
  let image = png_bytes(32, 32);
  let output = MaskDirectory::new(scratch.path(), "/masks", "json");

  let result = OneShotJob::new("json", &image, false)
    .run_task(&Band { size: 32, rows: 0..32 }, &output)
    .unwrap();
  let value = serde_json::to_value(&result).unwrap();

  assert_eq!(value["job_id"], "json");
  assert_eq!(value["count"], 1);
  assert_eq!(value["masks"][0]["name"], "mask_0.png");
  assert!(value["started_at"].is_string());
  assert!(value["diagnostics"].as_array().is_some_and(|d| !d.is_empty()));
}

#[test]
fn invalid_output_id_is_rejected_before_loading() {
  let scratch = tempfile::tempdir().unwrap();
  let config = SegmentConfig {
    output_root: scratch.path().to_path_buf(),
    ..SegmentConfig::default()
  };
  let request = JobRequest {
    image: png_bytes(4, 4),
    model: "/nonexistent/model.onnx".to_string(),
    output_id: "../outside".to_string(),
  };

  let registry = build_registry(&TrustConfig::default());
  let err = run_job(&request, &registry, &config).unwrap_err();
  assert_eq!(err.kind(), JobErrorKind::InvalidRequest);
}

#[test]
fn missing_model_is_corrupt_artifact() {
  let scratch = tempfile::tempdir().unwrap();
  let config = SegmentConfig {
    output_root: scratch.path().to_path_buf(),
    ..SegmentConfig::default()
  };
  let request = JobRequest {
    image: png_bytes(4, 4),
    model: scratch.path().join("absent.onnx").to_string_lossy().into_owned(),
    output_id: "job".to_string(),
  };

  let registry = build_registry(&TrustConfig::default());
  let err = run_job(&request, &registry, &config).unwrap_err();
  assert_eq!(err.kind(), JobErrorKind::CorruptArtifact);
  assert_eq!(
    serde_json::to_value(err.kind()).unwrap(),
    serde_json::json!("corrupt_artifact")
  );
}
