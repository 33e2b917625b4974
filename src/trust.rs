// 该文件是 Yanmo （掩模） 项目的一部分。
// src/trust.rs - 模型反序列化信任白名单
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

//! 信任闸门。
//!
//! 外部提供的模型文件在实例化任何算子之前，必须先通过 [`TrustRegistry`] 的审查：
//! 图中（包括所有嵌套子图）出现的每一个算子类型都必须在白名单内，否则加载失败。
//!
//! 白名单由三部分组成：
//! - 手工维护的精选列表（YOLOv8-seg 导出所用算子与基础图原语）；
//! - 固定枚举的标准算子族，每个算子族视为一个可扫描的模块；
//! - 可选的清单目录，每个 `*.trust` 文件是一个模块，读取失败时跳过该模块。
//!
//! 白名单在进程启动时构建一次，之后只读共享。

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TrustConfig;

mod families;
mod manifest;
mod vet;

pub use self::families::{CURATED, STANDARD_FAMILIES, StandardFamily};
pub use self::manifest::{MANIFEST_EXTENSION, ManifestError, ManifestModule, discover_manifests};
pub use self::vet::{EXTERNAL_DATA_TYPE, UntrustedType, VetReport, vet_model};

/// ONNX 默认算子域；空域名等价于该域
pub const DEFAULT_DOMAIN: &str = "ai.onnx";

/// 完整限定的类型标识：`<domain>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QualifiedType {
  domain: String,
  name: String,
}

impl QualifiedType {
  pub fn new(domain: &str, name: &str) -> Self {
    let domain = if domain.is_empty() {
      DEFAULT_DOMAIN
    } else {
      domain
    };
    Self {
      domain: domain.to_string(),
      name: name.to_string(),
    }
  }

  /// 解析 `ai.onnx.Conv` 形式的标识；最后一个 `.` 之后为类型名
  pub fn parse(text: &str) -> Option<Self> {
    let (domain, name) = text.trim().rsplit_once('.')?;
    let valid_name = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if domain.is_empty() || !valid_name || domain.contains(char::is_whitespace) {
      return None;
    }
    Some(Self::new(domain, name))
  }

  pub fn domain(&self) -> &str {
    &self.domain
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for QualifiedType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.domain, self.name)
  }
}

/// 白名单条目的来源，用于审计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "module", rename_all = "snake_case")]
pub enum Provenance {
  Curated,
  Module(String),
}

impl fmt::Display for Provenance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Provenance::Curated => write!(f, "curated"),
      Provenance::Module(name) => write!(f, "module:{}", name),
    }
  }
}

/// 可被扫描的一组算子定义
pub trait PrimitiveModule {
  fn name(&self) -> String;
  fn types(&self) -> Result<Vec<QualifiedType>, ManifestError>;
}

/// 构建完成后不可变的信任白名单
#[derive(Debug, Clone, Default)]
pub struct TrustRegistry {
  types: BTreeMap<QualifiedType, Provenance>,
  skipped_modules: Vec<String>,
}

impl TrustRegistry {
  pub fn builder() -> TrustRegistryBuilder {
    TrustRegistryBuilder::default()
  }

  pub fn is_trusted(&self, ty: &QualifiedType) -> bool {
    self.types.contains_key(ty)
  }

  pub fn provenance(&self, ty: &QualifiedType) -> Option<&Provenance> {
    self.types.get(ty)
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&QualifiedType, &Provenance)> {
    self.types.iter()
  }

  /// 构建时因错误被跳过的模块
  pub fn skipped_modules(&self) -> &[String] {
    &self.skipped_modules
  }
}

#[derive(Debug, Default)]
pub struct TrustRegistryBuilder {
  types: BTreeMap<QualifiedType, Provenance>,
  skipped_modules: Vec<String>,
}

impl TrustRegistryBuilder {
  pub fn allow(mut self, ty: QualifiedType, provenance: Provenance) -> Self {
    self.types.entry(ty).or_insert(provenance);
    self
  }

  /// 加入默认域下的精选算子
  pub fn curated(self, names: &[&str]) -> Self {
    names.iter().fold(self, |builder, name| {
      builder.allow(QualifiedType::new(DEFAULT_DOMAIN, name), Provenance::Curated)
    })
  }

  /// 扫描一个模块；模块出错时仅记录并跳过
  pub fn scan(mut self, module: &dyn PrimitiveModule) -> Self {
    let name = module.name();
    match module.types() {
      Ok(types) => {
        debug!("信任模块 {} 提供 {} 个类型", name, types.len());
        for ty in types {
          self.types.entry(ty).or_insert_with(|| Provenance::Module(name.clone()));
        }
      }
      Err(e) => {
        warn!("跳过信任模块 {}: {}", name, e);
        self.skipped_modules.push(name);
      }
    }
    self
  }

  pub fn build(self) -> TrustRegistry {
    TrustRegistry {
      types: self.types,
      skipped_modules: self.skipped_modules,
    }
  }
}

/// 按配置构建白名单。纯函数：同样的配置与清单内容得到同样的结果。
pub fn build_registry(config: &TrustConfig) -> TrustRegistry {
  let mut builder = TrustRegistry::builder().curated(CURATED);

  if config.primitive_modules {
    for family in STANDARD_FAMILIES {
      builder = builder.scan(family);
    }
  }

  if let Some(dir) = &config.manifest_dir {
    for module in discover_manifests(dir) {
      builder = builder.scan(&module);
    }
  }

  let registry = builder.build();
  info!(
    "信任白名单构建完成: {} 个类型, 跳过 {} 个模块",
    registry.len(),
    registry.skipped_modules().len()
  );
  registry
}
