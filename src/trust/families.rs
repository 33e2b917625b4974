// 该文件是 Yanmo （掩模） 项目的一部分。
// src/trust/families.rs - 固定的可信算子列表
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

use super::{DEFAULT_DOMAIN, ManifestError, PrimitiveModule, QualifiedType};

/// YOLOv8-seg 导出图中出现的算子，以及图构造所需的基础原语
pub const CURATED: &[&str] = &[
  // 骨干、颈部与分割头
  "Conv",
  "Sigmoid",
  "Mul",
  "Add",
  "Split",
  "Concat",
  "MaxPool",
  "Resize",
  "Reshape",
  "Transpose",
  "Softmax",
  "Sub",
  "Div",
  "Slice",
  "ConvTranspose",
  // 基础原语
  "Constant",
  "ConstantOfShape",
  "Identity",
  "Shape",
  "Gather",
  "Unsqueeze",
  "Squeeze",
  "Cast",
  "Range",
  "Expand",
  "Equal",
  "Where",
];

/// 标准 `ai.onnx` 域中的一个算子族
#[derive(Debug, Clone, Copy)]
pub struct StandardFamily {
  pub name: &'static str,
  pub ops: &'static [&'static str],
}

impl PrimitiveModule for StandardFamily {
  fn name(&self) -> String {
    format!("{}.{}", DEFAULT_DOMAIN, self.name)
  }

  fn types(&self) -> Result<Vec<QualifiedType>, ManifestError> {
    Ok(
      self
        .ops
        .iter()
        .map(|op| QualifiedType::new(DEFAULT_DOMAIN, op))
        .collect(),
    )
  }
}

// TODO: 升级 tract-onnx 时对照其支持的算子集复核本表
pub const STANDARD_FAMILIES: &[StandardFamily] = &[
  StandardFamily {
    name: "activation",
    ops: &[
      "Relu",
      "LeakyRelu",
      "PRelu",
      "Elu",
      "Selu",
      "Celu",
      "Gelu",
      "HardSigmoid",
      "HardSwish",
      "Sigmoid",
      "Softplus",
      "Softsign",
      "Tanh",
      "Mish",
      "ThresholdedRelu",
      "Softmax",
      "LogSoftmax",
      "Hardmax",
    ],
  },
  StandardFamily {
    name: "conv",
    ops: &["Conv", "ConvTranspose", "ConvInteger", "QLinearConv"],
  },
  StandardFamily {
    name: "normalization",
    ops: &[
      "BatchNormalization",
      "InstanceNormalization",
      "LayerNormalization",
      "GroupNormalization",
      "LpNormalization",
      "LRN",
      "MeanVarianceNormalization",
      "Dropout",
    ],
  },
  StandardFamily {
    name: "pooling",
    ops: &[
      "AveragePool",
      "MaxPool",
      "GlobalAveragePool",
      "GlobalMaxPool",
      "LpPool",
      "GlobalLpPool",
      "MaxUnpool",
    ],
  },
  StandardFamily {
    name: "math",
    ops: &[
      "Add",
      "Sub",
      "Mul",
      "Div",
      "Pow",
      "Sqrt",
      "Exp",
      "Log",
      "Abs",
      "Neg",
      "Reciprocal",
      "Floor",
      "Ceil",
      "Round",
      "Sign",
      "Min",
      "Max",
      "Mean",
      "Sum",
      "Mod",
      "MatMul",
      "Gemm",
      "Einsum",
      "Clip",
      "Erf",
      "Sin",
      "Cos",
      "Tan",
      "Asin",
      "Acos",
      "Atan",
      "Sinh",
      "Cosh",
      "Asinh",
      "Acosh",
      "Atanh",
      "CumSum",
      "TopK",
      "ArgMax",
      "ArgMin",
      "QuantizeLinear",
      "DequantizeLinear",
      "DynamicQuantizeLinear",
      "MatMulInteger",
      "QLinearMatMul",
    ],
  },
  StandardFamily {
    name: "reduce",
    ops: &[
      "ReduceMax",
      "ReduceMin",
      "ReduceMean",
      "ReduceSum",
      "ReduceProd",
      "ReduceL1",
      "ReduceL2",
      "ReduceLogSum",
      "ReduceLogSumExp",
      "ReduceSumSquare",
    ],
  },
  StandardFamily {
    name: "tensor",
    ops: &[
      "Reshape",
      "Transpose",
      "Concat",
      "Split",
      "Slice",
      "Squeeze",
      "Unsqueeze",
      "Flatten",
      "Gather",
      "GatherElements",
      "GatherND",
      "ScatterElements",
      "ScatterND",
      "Expand",
      "Tile",
      "Pad",
      "Resize",
      "Upsample",
      "DepthToSpace",
      "SpaceToDepth",
      "Shape",
      "Size",
      "Cast",
      "CastLike",
      "Constant",
      "ConstantOfShape",
      "Identity",
      "Range",
      "OneHot",
      "NonZero",
      "Where",
      "Compress",
      "Trilu",
      "EyeLike",
      "ReverseSequence",
    ],
  },
  StandardFamily {
    name: "logic",
    ops: &[
      "Equal",
      "Greater",
      "GreaterOrEqual",
      "Less",
      "LessOrEqual",
      "Not",
      "And",
      "Or",
      "Xor",
      "IsNaN",
      "IsInf",
      "BitShift",
    ],
  },
  StandardFamily {
    name: "vision",
    ops: &["NonMaxSuppression", "RoiAlign", "MaxRoiPool"],
  },
  StandardFamily {
    name: "control",
    ops: &["If", "Loop", "Scan"],
  },
];
