// 该文件是 Yanmo （掩模） 项目的一部分。
// src/output.rs - 输出定义
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

use serde::Serialize;
use thiserror::Error;

use crate::rectify::RectifiedMask;

/// 一个已持久化的掩模及其定位符
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskArtifact {
  pub name: String,
  pub url: String,
}

#[derive(Error, Debug)]
pub enum EmitError {
  #[error("无法创建输出目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法写入掩模 {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 将校正后的掩模写出，返回与输入顺序一致的工件列表
pub trait Emit {
  /// 掩模写入的位置
  fn location(&self) -> &Path;
  fn emit(&self, masks: &[RectifiedMask]) -> Result<Vec<MaskArtifact>, EmitError>;
}

mod mask_directory;
pub use self::mask_directory::MaskDirectory;
