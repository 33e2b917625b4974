// 该文件是 Yanmo （掩模） 项目的一部分。
// src/task.rs - 分割任务
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
  path::{Component, Path, PathBuf},
  time::Instant,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  config::SegmentConfig,
  input::JobImage,
  model::{InferenceError, LoadError, SegmentModel, infer_image, load_model},
  output::{Emit, EmitError, MaskArtifact, MaskDirectory},
  rectify::rectify_all,
  trust::TrustRegistry,
};

pub trait Task<M: ?Sized, O: ?Sized>: Sized {
  type Output;
  type Error;
  fn run_task(self, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

/// 一次分割任务的提交
#[derive(Debug, Clone)]
pub struct JobRequest {
  pub image: JobImage,
  /// 模型引用，空串表示默认模型
  pub model: String,
  /// 调用方提供的输出目录名，同时作为任务 ID
  pub output_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
  pub job_id: String,
  pub masks: Vec<MaskArtifact>,
  pub count: usize,
  pub diagnostics: Vec<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
  UntrustedType,
  CorruptArtifact,
  UnsupportedModel,
  Inference,
  InvalidRequest,
  Output,
}

#[derive(Error, Debug)]
pub enum JobError {
  #[error("模型加载失败: {0}")]
  Load(#[from] LoadError),
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
  #[error("输出失败: {0}")]
  Emit(#[from] EmitError),
  #[error("无效请求: {0}")]
  InvalidRequest(String),
}

impl JobError {
  pub fn kind(&self) -> JobErrorKind {
    match self {
      JobError::Load(LoadError::UntrustedType(_)) => JobErrorKind::UntrustedType,
      JobError::Load(LoadError::CorruptArtifact { .. }) => JobErrorKind::CorruptArtifact,
      JobError::Load(LoadError::UnsupportedModel { .. }) => JobErrorKind::UnsupportedModel,
      JobError::Inference(_) => JobErrorKind::Inference,
      JobError::InvalidRequest(_) => JobErrorKind::InvalidRequest,
      JobError::Emit(_) => JobErrorKind::Output,
    }
  }
}

/// 单张图像、单个输出目录的一次性任务
pub struct OneShotJob<'a> {
  id: String,
  image: &'a JobImage,
  parallel_rectify: bool,
  started_at: DateTime<Utc>,
  diagnostics: Vec<String>,
}

impl<'a> OneShotJob<'a> {
  pub fn new(id: impl Into<String>, image: &'a JobImage, parallel_rectify: bool) -> Self {
    Self {
      id: id.into(),
      image,
      parallel_rectify,
      started_at: Utc::now(),
      diagnostics: Vec::new(),
    }
  }

  /// 记录一行面向调用方的诊断信息
  pub fn note(&mut self, line: impl Into<String>) {
    let line = line.into();
    info!("[{}] {}", self.id, line);
    self.diagnostics.push(line);
  }
}

impl<M, O> Task<M, O> for OneShotJob<'_>
where
  M: SegmentModel + ?Sized,
  O: Emit + ?Sized,
{
  type Output = JobResult;
  type Error = JobError;

  fn run_task(mut self, model: &M, output: &O) -> Result<JobResult, JobError> {
    info!("开始任务 {}，输入: {}", self.id, self.image.describe());

    let inference = infer_image(model, self.image)?;
    let geometry = inference.geometry;
    self.note(format!(
      "Ran inference on {}x{} image at {}x{}",
      geometry.width, geometry.height, geometry.internal_size, geometry.internal_size
    ));

    if inference.masks.is_empty() {
      self.note("No masks detected in this image.");
    }

    let now = Instant::now();
    let masks = rectify_all(&inference.masks, &geometry, self.parallel_rectify);
    info!("矫正完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    let artifacts = output.emit(&masks)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());
    self.note(format!(
      "Saved {} mask(s) to {}",
      artifacts.len(),
      output.location().display()
    ));

    Ok(JobResult {
      job_id: self.id,
      count: artifacts.len(),
      masks: artifacts,
      diagnostics: self.diagnostics,
      started_at: self.started_at,
      finished_at: Utc::now(),
    })
  }
}

/// 输出目录名必须是单个普通路径分量
pub fn validate_output_id(id: &str) -> Result<(), JobError> {
  let mut components = Path::new(id).components();
  let plain = matches!(
    (components.next(), components.next()),
    (Some(Component::Normal(_)), None)
  );
  if !plain || id.contains(['/', '\\']) {
    return Err(JobError::InvalidRequest(format!(
      "输出目录名必须是单个路径分量: {id:?}"
    )));
  }
  Ok(())
}

/// 将模型引用解析为路径
///
/// 空引用使用默认模型；相对路径相对 `model_dir` 解析；配置了
/// `allowed_model_roots` 时，规范化后的路径必须位于其中之一。
pub fn resolve_model_path(reference: &str, config: &SegmentConfig) -> Result<PathBuf, JobError> {
  let reference = reference.trim();
  let reference = if reference.is_empty() {
    config.default_model.as_str()
  } else {
    reference
  };

  let path = PathBuf::from(reference);
  let path = match &config.model_dir {
    Some(dir) if path.is_relative() => dir.join(path),
    _ => path,
  };

  if config.allowed_model_roots.is_empty() {
    return Ok(path);
  }

  let canonical = path.canonicalize().map_err(|e| {
    JobError::InvalidRequest(format!("无法解析模型路径 {}: {}", path.display(), e))
  })?;

  let allowed = config.allowed_model_roots.iter().any(|root| match root.canonicalize() {
    Ok(root) => canonical.starts_with(root),
    Err(e) => {
      warn!("忽略无法解析的模型根目录 {}: {}", root.display(), e);
      false
    }
  });

  if allowed {
    Ok(canonical)
  } else {
    Err(JobError::InvalidRequest(format!(
      "模型路径不在允许的目录中: {}",
      canonical.display()
    )))
  }
}

/// 运行完整任务：校验请求、审查并加载模型、推理、矫正、输出
///
/// 模型每个任务加载一次，不跨任务缓存。
pub fn run_job(
  request: &JobRequest,
  registry: &TrustRegistry,
  config: &SegmentConfig,
) -> Result<JobResult, JobError> {
  validate_output_id(&request.output_id)?;
  let model_path = resolve_model_path(&request.model, config)?;

  let mut job = OneShotJob::new(&request.output_id, &request.image, config.parallel_rectify);
  let model = load_model(&model_path, registry, &config.decode)?;
  job.note(format!("Loaded model {}", model_path.display()));

  let output = MaskDirectory::new(
    &config.output_root,
    config.locator_prefix.as_str(),
    request.output_id.as_str(),
  );
  job.run_task(&model, &output)
}
