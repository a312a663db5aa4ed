// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/draw.rs - 导出结果调试可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::output::{
  coco::{CocoAnnotation, CocoDocument},
  validate::{Validate, ValidateError},
};

// 黄金角，相邻类别的色相相距较远
const HUE_STEP: f32 = 137.508;

/// 把第一张图像及其标注画到 `<json>.debug.png`
///
/// 只负责绘制，文档结构由 [`StructuralValidator`](super::validate::StructuralValidator) 检查。
pub struct DebugRenderer {
  image_dir: PathBuf,
}

impl DebugRenderer {
  pub fn new(image_dir: impl Into<PathBuf>) -> Self {
    Self {
      image_dir: image_dir.into(),
    }
  }

  pub fn output_path(json_path: &Path) -> PathBuf {
    json_path.with_extension("debug.png")
  }

  pub fn draw_annotations(&self, image: &mut RgbImage, annotations: &[&CocoAnnotation]) {
    for ann in annotations {
      let color = category_color(ann.category_id);
      draw_bbox(image, ann.bbox, color);
      if let Some(ring) = ann.segmentation.first() {
        draw_ring(image, ring, color);
      }
    }
  }
}

impl Validate for DebugRenderer {
  fn name(&self) -> &str {
    "debug-render"
  }

  fn validate(&self, path: &Path) -> Result<(), ValidateError> {
    let document = CocoDocument::from_path(path)?;

    let Some(first) = document.images.first() else {
      warn!("文档中没有图像，跳过调试可视化");
      return Ok(());
    };

    let image_path = self.image_dir.join(&first.file_name);
    if !image_path.exists() {
      info!("找不到图像 '{}'，跳过调试可视化", image_path.display());
      return Ok(());
    }

    let mut image = image::open(&image_path)
      .map_err(|e| ValidateError::RenderError(e.to_string()))?
      .to_rgb8();
    let annotations: Vec<&CocoAnnotation> = document
      .annotations
      .iter()
      .filter(|a| a.image_id == first.id)
      .collect();
    self.draw_annotations(&mut image, &annotations);

    let output = Self::output_path(path);
    image
      .save(&output)
      .map_err(|e| ValidateError::RenderError(e.to_string()))?;
    info!("调试图像已保存: {}", output.display());
    Ok(())
  }
}

// 边框加粗为 2 像素，bbox 为 [x, y, w, h] 像素坐标
fn draw_bbox(image: &mut RgbImage, bbox: [f64; 4], color: Rgb<u8>) {
  let (w, h) = (image.width() as f64, image.height() as f64);
  let x = bbox[0].clamp(0.0, w - 1.0) as i32;
  let y = bbox[1].clamp(0.0, h - 1.0) as i32;
  let width = bbox[2].min(w - bbox[0].max(0.0)).max(0.0) as u32;
  let height = bbox[3].min(h - bbox[1].max(0.0)).max(0.0) as u32;

  if width == 0 || height == 0 {
    return;
  }

  draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
  if width > 2 && height > 2 {
    let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
    draw_hollow_rect_mut(image, inner, color);
  }
}

fn draw_ring(image: &mut RgbImage, flat: &[f64], color: Rgb<u8>) {
  let points: Vec<(f32, f32)> = flat
    .chunks_exact(2)
    .map(|p| (p[0] as f32, p[1] as f32))
    .collect();
  if points.len() < 3 {
    return;
  }
  for (i, start) in points.iter().enumerate() {
    let end = points[(i + 1) % points.len()];
    draw_line_segment_mut(image, *start, end, color);
  }
}

fn category_color(category_id: u32) -> Rgb<u8> {
  let hue = (category_id as f32 * HUE_STEP) % 360.0;
  hsv(hue, 0.8, 0.9)
}

fn hsv(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
  let channel = |n: f32| {
    let k = (n + hue / 60.0) % 6.0;
    let v = value - value * saturation * k.min(4.0 - k).clamp(0.0, 1.0);
    (v * 255.0).round() as u8
  };
  Rgb([channel(5.0), channel(3.0), channel(1.0)])
}
