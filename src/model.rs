// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model.rs - 检测结果定义
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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 类别表：模型原生类别 id 到名称
pub type Vocabulary = BTreeMap<u32, String>;

/// 单个检测目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f64,
  pub bbox: [f64; 4], // [x_min, y_min, x_max, y_max]，绝对像素坐标
  /// 多边形轮廓，每个环为一组 (x, y) 像素点；只使用第一个环
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub polygons: Vec<Vec<[f64; 2]>>,
}

impl DetectItem {
  pub fn new(class_id: u32, score: f64, bbox: [f64; 4]) -> Self {
    Self {
      class_id,
      score,
      bbox,
      polygons: Vec::new(),
    }
  }

  pub fn with_polygon(mut self, polygon: Vec<[f64; 2]>) -> Self {
    self.polygons.push(polygon);
    self
  }

  pub fn first_polygon(&self) -> Option<&[[f64; 2]]> {
    self.polygons.first().map(Vec::as_slice)
  }
}

/// 图像元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
  pub path: PathBuf,
  pub width: u32,
  pub height: u32,
}

impl ImageMeta {
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
  }
}

/// 单张图像的全部检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub image: ImageMeta,
  /// 推理方提供的完整类别表
  #[serde(default)]
  pub names: Vocabulary,
  #[serde(default)]
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(path: impl AsRef<Path>, width: u32, height: u32, names: Vocabulary) -> Self {
    Self {
      image: ImageMeta {
        path: path.as_ref().to_path_buf(),
        width,
        height,
      },
      names,
      items: Box::new([]),
    }
  }

  pub fn with_items(mut self, items: Vec<DetectItem>) -> Self {
    self.items = items.into_boxed_slice();
    self
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}
