// 该文件是 Biaozhu （标注） 项目的一部分。
// src/review.rs - 审核服务任务与接口
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

use serde::{Deserialize, Serialize};

pub mod convert;
pub mod gateway;
pub mod template;

pub use self::convert::{ConvertError, ConvertOptions, coco_to_tasks};
pub use self::gateway::{
  GatewayError, HttpReviewClient, ImportSummary, ProjectHandle, ReviewClient, project_url,
};
pub use self::template::{LABEL_COLORS, build_label_config};

/// 一个审核任务：一张图像及其候选区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTask {
  pub data: TaskData,
  pub predictions: Vec<Prediction>,
}

impl ReviewTask {
  /// 全部区域得分的最大值，没有区域时为 0
  pub fn score(&self) -> f64 {
    self
      .predictions
      .iter()
      .map(|p| p.score)
      .fold(0.0, f64::max)
  }

  pub fn regions(&self) -> impl Iterator<Item = &RegionResult> {
    self.predictions.iter().flat_map(|p| p.result.iter())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
  pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
  pub model_version: String,
  pub score: f64,
  pub result: Vec<RegionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegionResult {
  #[serde(rename = "rectanglelabels")]
  Rectangle {
    from_name: String,
    to_name: String,
    original_width: u32,
    original_height: u32,
    value: RectangleValue,
    score: f64,
  },
  #[serde(rename = "polygonlabels")]
  Polygon {
    id: String,
    from_name: String,
    to_name: String,
    original_width: u32,
    original_height: u32,
    value: PolygonValue,
    score: f64,
  },
  #[serde(rename = "number")]
  Number {
    id: String,
    from_name: String,
    to_name: String,
    value: NumberValue,
  },
}

impl RegionResult {
  pub fn score(&self) -> Option<f64> {
    match self {
      RegionResult::Rectangle { score, .. } | RegionResult::Polygon { score, .. } => Some(*score),
      RegionResult::Number { .. } => None,
    }
  }

  pub fn region_id(&self) -> Option<&str> {
    match self {
      RegionResult::Rectangle { .. } => None,
      RegionResult::Polygon { id, .. } | RegionResult::Number { id, .. } => Some(id),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleValue {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
  pub rotation: f64,
  pub rectanglelabels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonValue {
  pub points: Vec<[f64; 2]>,
  pub polygonlabels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberValue {
  pub number: f64,
}
