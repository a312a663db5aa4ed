// 该文件是 Biaozhu （标注） 项目的一部分。
// src/geometry.rs - 坐标换算
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

/// 百分比坐标下的矩形，取值范围 [0, 100]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentRect {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

/// 舍入到指定小数位，恰好居中时取偶数
pub fn round_to(value: f64, places: i32) -> f64 {
  let factor = 10f64.powi(places);
  (value * factor).round_ties_even() / factor
}

/// [x_min, y_min, x_max, y_max] 转为 [x, y, w, h]
pub fn xyxy_to_xywh(bbox: [f64; 4]) -> [f64; 4] {
  [bbox[0], bbox[1], bbox[2] - bbox[0], bbox[3] - bbox[1]]
}

pub fn to_percent(value: f64, extent: f64) -> f64 {
  value / extent * 100.0
}

pub fn from_percent(percent: f64, extent: f64) -> f64 {
  percent / 100.0 * extent
}

/// 像素 [x, y, w, h] 转为百分比矩形
pub fn rect_to_percent(bbox: [f64; 4], width: f64, height: f64) -> PercentRect {
  PercentRect {
    x: to_percent(bbox[0], width),
    y: to_percent(bbox[1], height),
    width: to_percent(bbox[2], width),
    height: to_percent(bbox[3], height),
  }
}

pub fn rect_from_percent(rect: PercentRect, width: f64, height: f64) -> [f64; 4] {
  [
    from_percent(rect.x, width),
    from_percent(rect.y, height),
    from_percent(rect.width, width),
    from_percent(rect.height, height),
  ]
}

/// 扁平坐标 [x0, y0, x1, y1, ...] 转为百分比点对，末尾多余的单值被忽略
pub fn flat_points_to_percent(flat: &[f64], width: f64, height: f64) -> Vec<[f64; 2]> {
  flat
    .chunks_exact(2)
    .map(|p| [to_percent(p[0], width), to_percent(p[1], height)])
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
  }

  #[test]
  fn full_image_maps_to_hundred_percent() {
    let rect = rect_to_percent([0.0, 0.0, 640.0, 480.0], 640.0, 480.0);
    assert_eq!(
      rect,
      PercentRect {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0
      }
    );
  }

  #[test]
  fn offset_box_on_640x480() {
    let bbox = xyxy_to_xywh([10.0, 20.0, 110.0, 120.0]);
    let rect = rect_to_percent(bbox, 640.0, 480.0);
    assert!(close(rect.x, 1.5625));
    assert!(close(rect.y, 4.1667));
    assert!(close(rect.width, 15.625));
    assert!(close(rect.height, 20.8333));
  }

  #[test]
  fn percent_round_trip() {
    let bbox = [12.5, 40.0, 200.0, 100.0];
    let back = rect_from_percent(rect_to_percent(bbox, 800.0, 600.0), 800.0, 600.0);
    for (a, b) in bbox.iter().zip(back.iter()) {
      assert!(close(*a, *b));
    }
  }

  #[test]
  fn odd_flat_list_drops_trailing_value() {
    let points = flat_points_to_percent(&[64.0, 48.0, 320.0, 240.0, 1.0], 640.0, 480.0);
    assert_eq!(points, vec![[10.0, 10.0], [50.0, 50.0]]);
  }

  #[test]
  fn rounding() {
    assert_eq!(round_to(1.23456, 2), 1.23);
    assert_eq!(round_to(0.87654321, 4), 0.8765);
    assert_eq!(round_to(100.0, 2), 100.0);
  }

  #[test]
  fn rounding_ties_go_to_even() {
    assert_eq!(round_to(0.125, 2), 0.12);
    assert_eq!(round_to(0.375, 2), 0.38);
    assert_eq!(round_to(2.5, 0), 2.0);
    assert_eq!(round_to(2.675, 2), 2.67);
  }
}
