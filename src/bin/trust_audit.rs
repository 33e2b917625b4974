// 该文件是 Yanmo （掩模） 项目的一部分。
// src/bin/trust_audit.rs - 信任白名单审计
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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tract_onnx::prelude::Framework;
use tracing::{error, info, warn};

use yanmo::{
  config::SegmentConfig,
  trust::{build_registry, vet_model},
};

/// Yanmo 信任白名单审计工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 配置文件
  #[arg(long, value_name = "FILE", global = true)]
  pub config: Option<PathBuf>,
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 列出白名单中的全部类型及其来源
  List,
  /// 审查模型文件，不构造也不运行模型
  Check {
    #[arg(value_name = "MODEL")]
    model: PathBuf,
  },
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = match &args.config {
    Some(path) => SegmentConfig::from_file(path)?,
    None => SegmentConfig::default(),
  };

  let registry = build_registry(&config.trust);
  for module in registry.skipped_modules() {
    warn!("已跳过信任清单: {}", module);
  }

  match args.command {
    Command::List => {
      let entries: Vec<_> = registry
        .iter()
        .map(|(ty, provenance)| json!({ "type": ty.to_string(), "provenance": provenance }))
        .collect();
      let body = json!({
        "count": registry.len(),
        "types": entries,
        "skipped_modules": registry.skipped_modules(),
      });
      println!("{}", serde_json::to_string_pretty(&body)?);
      Ok(ExitCode::SUCCESS)
    }
    Command::Check { model } => {
      let bytes =
        std::fs::read(&model).with_context(|| format!("无法读取模型文件 {}", model.display()))?;
      let proto = tract_onnx::onnx()
        .proto_model_for_read(&mut bytes.as_slice())
        .map_err(|e| anyhow::anyhow!("无法解析 ONNX 协议 {}: {e}", model.display()))?;

      match vet_model(&proto, &registry) {
        Ok(report) => {
          info!("模型审查通过: {}", model.display());
          let body = json!({
            "model": model.display().to_string(),
            "trusted": true,
            "graphs": report.graphs,
            "nodes": report.nodes,
            "types": report.types.iter().map(|ty| ty.to_string()).collect::<Vec<_>>(),
          });
          println!("{}", serde_json::to_string_pretty(&body)?);
          Ok(ExitCode::SUCCESS)
        }
        Err(untrusted) => {
          error!("模型包含不可信类型: {}", untrusted);
          let body = json!({
            "model": model.display().to_string(),
            "trusted": false,
            "type": untrusted.type_name.to_string(),
            "location": untrusted.location,
          });
          println!("{}", serde_json::to_string_pretty(&body)?);
          Ok(ExitCode::FAILURE)
        }
      }
    }
  }
}
