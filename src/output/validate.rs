// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/validate.rs - 导出文件校验
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

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::output::coco::{CocoDocument, CocoExportError};

#[derive(Error, Debug)]
pub enum ValidateError {
  #[error("读取失败: {0}")]
  ReadError(#[from] CocoExportError),
  #[error("{kind} id 重复: {id}")]
  DuplicateId { kind: &'static str, id: u64 },
  #[error("标注 {annotation} 引用了不存在的图像 {image_id}")]
  DanglingImage { annotation: u64, image_id: u64 },
  #[error("标注 {annotation} 引用了不存在的类别 {category_id}")]
  DanglingCategory { annotation: u64, category_id: u32 },
  #[error("标注 {annotation} 的分割多边形无效，坐标数 {len}")]
  BadSegmentation { annotation: u64, len: usize },
  #[error("图像 {image_id} 尺寸为零")]
  EmptyImage { image_id: u64 },
  #[error("渲染失败: {0}")]
  RenderError(String),
}

/// 写出文件之后的可选校验能力
pub trait Validate {
  fn name(&self) -> &str;
  fn validate(&self, path: &Path) -> Result<(), ValidateError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
  Skipped,
  Passed,
  Failed(String),
}

/// 结构校验：id 唯一、引用完整、分割多边形形状
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl StructuralValidator {
  pub fn check(document: &CocoDocument) -> Result<(), ValidateError> {
    let mut image_ids = HashSet::new();
    for image in &document.images {
      if !image_ids.insert(image.id) {
        return Err(ValidateError::DuplicateId {
          kind: "image",
          id: image.id,
        });
      }
      if image.width == 0 || image.height == 0 {
        return Err(ValidateError::EmptyImage { image_id: image.id });
      }
    }

    let mut category_ids = HashSet::new();
    for category in &document.categories {
      if !category_ids.insert(category.id) {
        return Err(ValidateError::DuplicateId {
          kind: "category",
          id: category.id as u64,
        });
      }
    }

    let mut annotation_ids = HashSet::new();
    for ann in &document.annotations {
      if !annotation_ids.insert(ann.id) {
        return Err(ValidateError::DuplicateId {
          kind: "annotation",
          id: ann.id,
        });
      }
      if !image_ids.contains(&ann.image_id) {
        return Err(ValidateError::DanglingImage {
          annotation: ann.id,
          image_id: ann.image_id,
        });
      }
      if !category_ids.contains(&ann.category_id) {
        return Err(ValidateError::DanglingCategory {
          annotation: ann.id,
          category_id: ann.category_id,
        });
      }
      if let Some(ring) = ann
        .segmentation
        .iter()
        .find(|ring| ring.len() < 6 || ring.len() % 2 != 0)
      {
        return Err(ValidateError::BadSegmentation {
          annotation: ann.id,
          len: ring.len(),
        });
      }
    }

    Ok(())
  }
}

impl Validate for StructuralValidator {
  fn name(&self) -> &str {
    "structure"
  }

  fn validate(&self, path: &Path) -> Result<(), ValidateError> {
    let document = CocoDocument::from_path(path)?;
    Self::check(&document)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, DetectResult, Vocabulary};
  use crate::output::coco::encode;

  fn document() -> CocoDocument {
    let names = Vocabulary::from([(0, "cat".to_string())]);
    let result = DetectResult::new("a.jpg", 64, 48, names).with_items(vec![
      DetectItem::new(0, 0.9, [1.0, 1.0, 10.0, 10.0]),
      DetectItem::new(0, 0.8, [2.0, 2.0, 20.0, 20.0]),
    ]);
    encode(&[result], true)
  }

  #[test]
  fn encoded_document_is_valid() {
    assert!(StructuralValidator::check(&document()).is_ok());
  }

  #[test]
  fn detects_dangling_category() {
    let mut doc = document();
    doc.categories.clear();
    assert!(matches!(
      StructuralValidator::check(&doc),
      Err(ValidateError::DanglingCategory { annotation: 1, .. })
    ));
  }

  #[test]
  fn detects_duplicate_annotation() {
    let mut doc = document();
    doc.annotations[1].id = 1;
    assert!(matches!(
      StructuralValidator::check(&doc),
      Err(ValidateError::DuplicateId {
        kind: "annotation",
        id: 1
      })
    ));
  }

  #[test]
  fn detects_short_segmentation() {
    let mut doc = document();
    doc.annotations[0].segmentation = vec![vec![1.0, 2.0, 3.0, 4.0]];
    assert!(matches!(
      StructuralValidator::check(&doc),
      Err(ValidateError::BadSegmentation { len: 4, .. })
    ));
  }
}
