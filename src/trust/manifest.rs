// 该文件是 Yanmo （掩模） 项目的一部分。
// src/trust/manifest.rs - 信任清单目录扫描
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

use thiserror::Error;
use tracing::warn;

use super::{PrimitiveModule, QualifiedType};

pub const MANIFEST_EXTENSION: &str = "trust";

#[derive(Error, Debug)]
pub enum ManifestError {
  #[error("无法读取信任清单 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("信任清单 {path} 第 {line} 行不是完整限定的类型名: {text:?}")]
  Malformed {
    path: PathBuf,
    line: usize,
    text: String,
  },
}

/// 一个 `*.trust` 清单文件：每行一个完整限定类型名，`#` 开头为注释
#[derive(Debug, Clone)]
pub struct ManifestModule {
  path: PathBuf,
}

impl ManifestModule {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl PrimitiveModule for ManifestModule {
  fn name(&self) -> String {
    self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.display().to_string())
  }

  fn types(&self) -> Result<Vec<QualifiedType>, ManifestError> {
    let text = std::fs::read_to_string(&self.path).map_err(|source| ManifestError::Io {
      path: self.path.clone(),
      source,
    })?;

    // 任何一行不合法都使整个文件作废
    let mut types = Vec::new();
    for (index, line) in text.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let ty = QualifiedType::parse(line).ok_or_else(|| ManifestError::Malformed {
        path: self.path.clone(),
        line: index + 1,
        text: line.to_string(),
      })?;
      types.push(ty);
    }
    Ok(types)
  }
}

/// 列出目录下的清单文件，按路径排序。目录不可读时返回空列表。
pub fn discover_manifests(dir: &Path) -> Vec<ManifestModule> {
  let entries = match std::fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!("无法扫描信任清单目录 {}: {}", dir.display(), e);
      return Vec::new();
    }
  };

  let mut paths: Vec<PathBuf> = entries
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| path.extension().is_some_and(|ext| ext == MANIFEST_EXTENSION))
    .collect();
  paths.sort();
  paths.into_iter().map(ManifestModule::new).collect()
}
