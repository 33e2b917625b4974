// 该文件是 Yanmo （掩模） 项目的一部分。
// src/utils.rs - 通用数值工具
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

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 半像素中心对齐的线性采样坐标（与 OpenCV `INTER_LINEAR` 一致）
/// 返回 (左侧索引, 右侧索引, 右侧权重)
fn linear_taps(dst_len: usize, src_len: usize) -> Vec<(usize, usize, f32)> {
  let scale = src_len as f64 / dst_len as f64;
  let last = src_len - 1;
  (0..dst_len)
    .map(|d| {
      let f = (d as f64 + 0.5) * scale - 0.5;
      let mut i = f.floor();
      let mut frac = f - i;
      if i < 0.0 {
        i = 0.0;
        frac = 0.0;
      }
      let mut i = i as usize;
      if i >= last {
        i = last;
        frac = 0.0;
      }
      (i, (i + 1).min(last), frac as f32)
    })
    .collect()
}

/// 单通道浮点网格的双线性缩放
///
/// `src` 以行优先存储，尺寸为 `src_w × src_h`。任一尺寸为零时返回全零输出。
pub fn resize_bilinear(
  src: &[f32],
  src_w: usize,
  src_h: usize,
  dst_w: usize,
  dst_h: usize,
) -> Vec<f32> {
  let mut dst = vec![0.0f32; dst_w * dst_h];
  if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
    return dst;
  }
  debug_assert_eq!(src.len(), src_w * src_h);

  let xs = linear_taps(dst_w, src_w);
  let ys = linear_taps(dst_h, src_h);

  for (dy, &(y0, y1, wy)) in ys.iter().enumerate() {
    let top = &src[y0 * src_w..(y0 + 1) * src_w];
    let bottom = &src[y1 * src_w..(y1 + 1) * src_w];
    let row = &mut dst[dy * dst_w..(dy + 1) * dst_w];
    for (value, &(x0, x1, wx)) in row.iter_mut().zip(xs.iter()) {
      let t = top[x0] * (1.0 - wx) + top[x1] * wx;
      let b = bottom[x0] * (1.0 - wx) + bottom[x1] * wx;
      *value = t * (1.0 - wy) + b * wy;
    }
  }

  dst
}
