// 该文件是 Yanmo （掩模） 项目的一部分。
// src/bin/segment.rs - 单张图像分割
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

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::{error, info};

use yanmo::{
  config::SegmentConfig,
  input::JobImage,
  task::{JobRequest, run_job},
  trust::build_registry,
};

/// Yanmo 分割任务参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像文件
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,
  /// 模型引用，缺省时使用配置中的默认模型
  #[arg(long, value_name = "REF", default_value = "")]
  pub model: String,
  /// 输出目录名（输出根目录下的单个路径分量），缺省时生成 UUID
  #[arg(long, value_name = "ID")]
  pub output_dir: Option<String>,
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 覆盖输出根目录
  #[arg(long, value_name = "DIR")]
  pub output_root: Option<PathBuf>,
  /// 覆盖置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 覆盖 NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => SegmentConfig::from_file(path)?,
    None => SegmentConfig::default(),
  };
  if let Some(root) = args.output_root {
    config.output_root = root;
  }
  if let Some(confidence) = args.confidence {
    config.decode.confidence = confidence;
  }
  if let Some(iou) = args.iou {
    config.decode.iou = iou;
  }
  config.validate()?;

  let output_id = args
    .output_dir
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

  info!("输入图像: {}", args.image.display());
  info!("输出目录: {}", config.output_root.join(&output_id).display());

  let registry = build_registry(&config.trust);
  info!("信任白名单共 {} 种类型", registry.len());

  let request = JobRequest {
    image: JobImage::Path(args.image),
    model: args.model,
    output_id,
  };

  match run_job(&request, &registry, &config) {
    Ok(result) => {
      println!("{}", serde_json::to_string_pretty(&result)?);
      Ok(ExitCode::SUCCESS)
    }
    Err(e) => {
      error!("任务失败: {}", e);
      let body = json!({ "error": e.to_string(), "kind": e.kind() });
      println!("{}", serde_json::to_string_pretty(&body)?);
      Ok(ExitCode::FAILURE)
    }
  }
}
