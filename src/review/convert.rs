// 该文件是 Biaozhu （标注） 项目的一部分。
// src/review/convert.rs - COCO 文档转审核任务
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

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::{
  geometry::{flat_points_to_percent, rect_to_percent, round_to},
  output::coco::{CocoAnnotation, CocoDocument, CocoImage},
  review::{
    NumberValue, PolygonValue, Prediction, RectangleValue, RegionResult, ReviewTask, TaskData,
  },
};

pub const IMAGE_TAG: &str = "image";
pub const RECTANGLE_TAG: &str = "label";
pub const POLYGON_TAG: &str = "mask";
pub const SCORE_TAG: &str = "score";

const DEFAULT_SCORE: f64 = 1.0;
const REGION_ID_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("标注 {annotation} 引用了未知类别 {category_id}")]
  UnknownCategory { annotation: u64, category_id: u32 },
  #[error("图像 {image_id} 尺寸为零")]
  EmptyImage { image_id: u64 },
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
  /// 是否同时输出矩形框区域
  pub include_boxes: bool,
  pub model_version: String,
}

impl Default for ConvertOptions {
  fn default() -> Self {
    Self {
      include_boxes: false,
      model_version: "biaozhu".to_string(),
    }
  }
}

/// 每张图像生成一个任务，顺序与文档中的图像一致
pub fn coco_to_tasks(
  document: &CocoDocument,
  image_base_url: &str,
  options: &ConvertOptions,
) -> Result<Vec<ReviewTask>, ConvertError> {
  let names: HashMap<u32, &str> = document
    .categories
    .iter()
    .map(|c| (c.id, c.name.as_str()))
    .collect();

  let mut by_image: HashMap<u64, Vec<&CocoAnnotation>> = HashMap::new();
  for ann in &document.annotations {
    by_image.entry(ann.image_id).or_default().push(ann);
  }

  let base_url = image_base_url.trim_end_matches('/');
  let mut tasks = Vec::with_capacity(document.images.len());

  for image in &document.images {
    let annotations = by_image.get(&image.id).map(Vec::as_slice).unwrap_or(&[]);
    let mut results = Vec::new();
    for ann in annotations {
      let name = names
        .get(&ann.category_id)
        .ok_or(ConvertError::UnknownCategory {
          annotation: ann.id,
          category_id: ann.category_id,
        })?;
      convert_annotation(image, ann, name, options.include_boxes, &mut results)?;
    }

    let predictions = if results.is_empty() {
      Vec::new()
    } else {
      vec![Prediction {
        model_version: options.model_version.clone(),
        score: max_score(&results),
        result: results,
      }]
    };

    tasks.push(ReviewTask {
      data: TaskData {
        image: format!("{}/{}", base_url, urlencoding::encode(&image.file_name)),
      },
      predictions,
    });
  }

  debug!("生成 {} 个审核任务", tasks.len());
  Ok(tasks)
}

/// 区域得分最大值，没有得分时为 0
pub fn max_score(results: &[RegionResult]) -> f64 {
  results
    .iter()
    .filter_map(RegionResult::score)
    .fold(0.0, f64::max)
}

fn convert_annotation(
  image: &CocoImage,
  ann: &CocoAnnotation,
  name: &str,
  include_boxes: bool,
  results: &mut Vec<RegionResult>,
) -> Result<(), ConvertError> {
  if image.width == 0 || image.height == 0 {
    return Err(ConvertError::EmptyImage { image_id: image.id });
  }
  let (w, h) = (image.width as f64, image.height as f64);
  let score = ann.score.unwrap_or(DEFAULT_SCORE);

  if include_boxes {
    let rect = rect_to_percent(ann.bbox, w, h);
    results.push(RegionResult::Rectangle {
      from_name: RECTANGLE_TAG.to_string(),
      to_name: IMAGE_TAG.to_string(),
      original_width: image.width,
      original_height: image.height,
      value: RectangleValue {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
        rotation: 0.0,
        rectanglelabels: vec![name.to_string()],
      },
      score,
    });
  }

  if let Some(ring) = ann.segmentation.first()
    && !ring.is_empty()
  {
    // 多边形与其得分共用同一个区域 id
    let region_id = new_region_id();
    results.push(RegionResult::Polygon {
      id: region_id.clone(),
      from_name: POLYGON_TAG.to_string(),
      to_name: IMAGE_TAG.to_string(),
      original_width: image.width,
      original_height: image.height,
      value: PolygonValue {
        points: flat_points_to_percent(ring, w, h),
        polygonlabels: vec![name.to_string()],
      },
      score,
    });
    results.push(RegionResult::Number {
      id: region_id,
      from_name: SCORE_TAG.to_string(),
      to_name: IMAGE_TAG.to_string(),
      value: NumberValue {
        number: round_to(score, 3),
      },
    });
  }

  Ok(())
}

fn new_region_id() -> String {
  let mut id = uuid::Uuid::new_v4().simple().to_string();
  id.truncate(REGION_ID_LEN);
  id
}
