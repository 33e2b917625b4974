// 该文件是 Yanmo （掩模） 项目的一部分。
// src/output/mask_directory.rs - 掩模目录输出
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

use tracing::{debug, info};

use crate::{
  output::{Emit, EmitError, MaskArtifact},
  rectify::RectifiedMask,
};

/// 每个任务一个目录，掩模按序号命名为 `mask_{N}.png`（从 0 开始）
#[derive(Debug, Clone)]
pub struct MaskDirectory {
  dir: PathBuf,
  locator_prefix: String,
  job_id: String,
}

impl MaskDirectory {
  pub fn new(
    output_root: &Path,
    locator_prefix: impl Into<String>,
    job_id: impl Into<String>,
  ) -> Self {
    let job_id = job_id.into();
    Self {
      dir: output_root.join(&job_id),
      locator_prefix: locator_prefix.into(),
      job_id,
    }
  }

  pub fn file_name(index: usize) -> String {
    format!("mask_{index}.png")
  }

  fn locator(&self, name: &str) -> String {
    format!(
      "{}/{}/{}",
      self.locator_prefix.trim_end_matches('/'),
      urlencoding::encode(&self.job_id),
      urlencoding::encode(name)
    )
  }
}

impl Emit for MaskDirectory {
  fn location(&self) -> &Path {
    &self.dir
  }

  fn emit(&self, masks: &[RectifiedMask]) -> Result<Vec<MaskArtifact>, EmitError> {
    std::fs::create_dir_all(&self.dir).map_err(|source| EmitError::CreateDir {
      path: self.dir.clone(),
      source,
    })?;

    let mut artifacts = Vec::with_capacity(masks.len());
    for (index, mask) in masks.iter().enumerate() {
      let name = Self::file_name(index);
      let path = self.dir.join(&name);
      mask
        .as_image()
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|source| EmitError::Write {
          path: path.clone(),
          source,
        })?;
      debug!("保存掩模到文件: {}", path.display());

      artifacts.push(MaskArtifact {
        url: self.locator(&name),
        name,
      });
    }

    info!("已保存 {} 个掩模到 {}", artifacts.len(), self.dir.display());
    Ok(artifacts)
  }
}
