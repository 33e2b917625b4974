// 该文件是 Yanmo （掩模） 项目的一部分。
// src/config.rs - 运行配置
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

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_MODEL: &str = "yolov8s-seg.onnx";
pub const DEFAULT_INTERNAL_SIZE: u32 = 640;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {0}: {1}")]
  Io(PathBuf, #[source] std::io::Error),
  #[error("配置文件格式错误 {0}: {1}")]
  Parse(PathBuf, #[source] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 信任白名单的来源配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
  /// 是否加入固定枚举的标准算子族；关闭后仅保留精选列表与清单
  pub primitive_modules: bool,
  /// 额外的 `*.trust` 清单目录
  pub manifest_dir: Option<PathBuf>,
}

impl Default for TrustConfig {
  fn default() -> Self {
    Self {
      primitive_modules: true,
      manifest_dir: None,
    }
  }
}

/// 检测头解码参数
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
  /// 模型内部正方形输入边长
  pub internal_size: u32,
  /// 置信度阈值
  pub confidence: f32,
  /// NMS IoU 阈值
  pub iou: f32,
  /// 每张图最多保留的实例数
  pub max_detections: usize,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      internal_size: DEFAULT_INTERNAL_SIZE,
      confidence: 0.25,
      iou: 0.7,
      max_detections: 300,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentConfig {
  /// 模型引用为空时使用的模型
  pub default_model: String,
  /// 相对模型路径的解析目录
  pub model_dir: Option<PathBuf>,
  /// 非空时，模型路径必须位于其中某个目录之下
  pub allowed_model_roots: Vec<PathBuf>,
  /// 各任务输出目录的父目录
  pub output_root: PathBuf,
  /// 掩模定位符前缀，如 `/masks`
  pub locator_prefix: String,
  pub decode: DecodeConfig,
  pub parallel_rectify: bool,
  pub trust: TrustConfig,
}

impl Default for SegmentConfig {
  fn default() -> Self {
    Self {
      default_model: DEFAULT_MODEL.to_string(),
      model_dir: None,
      allowed_model_roots: Vec::new(),
      output_root: PathBuf::from("masks"),
      locator_prefix: "/masks".to_string(),
      decode: DecodeConfig::default(),
      parallel_rectify: true,
      trust: TrustConfig::default(),
    }
  }
}

impl SegmentConfig {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config: Self =
      serde_json::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    config.validate()?;
    info!("已加载配置文件: {}", path.display());
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let decode = &self.decode;
    if decode.internal_size == 0 {
      return Err(ConfigError::Invalid("internal_size 必须大于 0".to_string()));
    }
    if !(0.0..=1.0).contains(&decode.confidence) {
      return Err(ConfigError::Invalid(format!(
        "confidence 超出 [0, 1]: {}",
        decode.confidence
      )));
    }
    if !(0.0..=1.0).contains(&decode.iou) {
      return Err(ConfigError::Invalid(format!("iou 超出 [0, 1]: {}", decode.iou)));
    }
    if self.default_model.trim().is_empty() {
      return Err(ConfigError::Invalid("default_model 不能为空".to_string()));
    }
    Ok(())
  }
}
