// 该文件是 Biaozhu （标注） 项目的一部分。
// src/output/coco.rs - COCO 格式导出
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
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  geometry::{round_to, xyxy_to_xywh},
  model::{DetectItem, DetectResult},
  output::validate::{StructuralValidator, Validate, ValidationOutcome},
};

const DEFAULT_INDENT: usize = 4;
const MIN_POLYGON_COORDS: usize = 6;

#[derive(Error, Debug)]
pub enum CocoExportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的缩进参数: {0}")]
  InvalidIndent(String),
  #[error("无效的输出路径: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoInfo {
  pub description: String,
  pub version: String,
  pub year: i32,
}

impl Default for CocoInfo {
  fn default() -> Self {
    Self {
      description: "Detection to COCO export".to_string(),
      version: "1.0".to_string(),
      year: Utc::now().year(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
  pub id: u64,
  pub file_name: String,
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
  pub id: u32,
  pub name: String,
  #[serde(default = "default_supercategory")]
  pub supercategory: String,
}

fn default_supercategory() -> String {
  "none".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
  pub id: u64,
  pub image_id: u64,
  pub category_id: u32,
  pub bbox: [f64; 4], // [x, y, w, h]
  pub area: f64,
  #[serde(default)]
  pub iscrowd: u8,
  #[serde(default)]
  pub segmentation: Vec<Vec<f64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoDocument {
  #[serde(default)]
  pub info: CocoInfo,
  #[serde(default)]
  pub licenses: Vec<serde_json::Value>,
  #[serde(default)]
  pub images: Vec<CocoImage>,
  #[serde(default)]
  pub annotations: Vec<CocoAnnotation>,
  #[serde(default)]
  pub categories: Vec<CocoCategory>,
}

impl CocoDocument {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CocoExportError> {
    let file = File::open(path.as_ref())?;
    let document = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(document)
  }

  /// 至少被一条标注引用的类别，保持原有顺序
  pub fn active_categories(&self) -> Vec<CocoCategory> {
    let used: HashSet<u32> = self.annotations.iter().map(|a| a.category_id).collect();
    self
      .categories
      .iter()
      .filter(|c| used.contains(&c.id))
      .cloned()
      .collect()
  }

  /// 写出 JSON，`None` 表示单行紧凑输出
  pub fn write_to<W: Write>(&self, writer: W, indent: Option<usize>) -> Result<(), CocoExportError> {
    match indent {
      None => serde_json::to_writer(writer, self)?,
      Some(width) => {
        let spaces = vec![b' '; width];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&spaces);
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)?;
      }
    }
    Ok(())
  }
}

/// 检测结果转为 COCO 文档，不做文件读写
pub fn encode(results: &[DetectResult], include_masks: bool) -> CocoDocument {
  let mut document = CocoDocument {
    info: CocoInfo::default(),
    licenses: Vec::new(),
    images: Vec::with_capacity(results.len()),
    annotations: Vec::new(),
    categories: Vec::new(),
  };

  // 类别表只取自第一张图像
  if let Some(first) = results.first() {
    document.categories = first
      .names
      .iter()
      .map(|(id, name)| CocoCategory {
        id: *id,
        name: name.clone(),
        supercategory: default_supercategory(),
      })
      .collect();
  }
  let mut known: HashSet<u32> = document.categories.iter().map(|c| c.id).collect();

  let mut annotation_id = 1u64;
  for (index, result) in results.iter().enumerate() {
    let image_id = index as u64 + 1;
    document.images.push(CocoImage {
      id: image_id,
      file_name: result.image.file_name(),
      width: result.image.width,
      height: result.image.height,
    });

    for item in result.items.iter() {
      if known.insert(item.class_id) {
        let name = result
          .names
          .get(&item.class_id)
          .cloned()
          .unwrap_or_else(|| format!("class_{}", item.class_id));
        warn!(
          "图像 {} 引用了首张图像类别表之外的类别 {} ({})",
          result.image.file_name(),
          item.class_id,
          name
        );
        document.categories.push(CocoCategory {
          id: item.class_id,
          name,
          supercategory: default_supercategory(),
        });
      }

      document
        .annotations
        .push(encode_item(item, annotation_id, image_id, include_masks));
      annotation_id += 1;
    }
  }

  let used: HashSet<u32> = document.annotations.iter().map(|a| a.category_id).collect();
  document.categories.retain(|c| used.contains(&c.id));

  document
}

fn encode_item(item: &DetectItem, id: u64, image_id: u64, include_masks: bool) -> CocoAnnotation {
  let [x, y, w, h] = xyxy_to_xywh(item.bbox).map(|v| round_to(v, 2));

  let segmentation = match item.first_polygon() {
    Some(polygon) if include_masks => {
      let flat: Vec<f64> = polygon
        .iter()
        .flat_map(|p| [round_to(p[0], 2), round_to(p[1], 2)])
        .collect();
      if flat.len() >= MIN_POLYGON_COORDS {
        vec![flat]
      } else {
        Vec::new()
      }
    }
    _ => Vec::new(),
  };

  CocoAnnotation {
    id,
    image_id,
    category_id: item.class_id,
    bbox: [x, y, w, h],
    area: round_to(w * h, 2),
    iscrowd: 0,
    segmentation,
    score: Some(round_to(item.score, 4)),
  }
}

/// 导出结果摘要
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
  pub path: PathBuf,
  pub images: usize,
  pub annotations: usize,
  pub categories: usize,
  pub validation: ValidationOutcome,
}

/// COCO JSON 导出器
///
/// `coco:///path/out.json?indent=2&masks=false&validate&debug`
pub struct CocoExporter {
  path: PathBuf,
  indent: Option<usize>,
  include_masks: bool,
  validators: Vec<Box<dyn Validate>>,
}

impl FromUrlWithScheme for CocoExporter {
  const SCHEME: &'static str = "coco";
}

impl FromUrl for CocoExporter {
  type Error = CocoExportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CocoExportError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|_| CocoExportError::InvalidPath(url.path().to_string()))?;
    let mut exporter = CocoExporter::new(path.as_ref());
    let mut validate = false;
    let mut debug = false;
    let mut image_dir = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "indent" => exporter.indent = parse_indent(&v)?,
        "masks" => exporter.include_masks = !matches!(v.as_ref(), "false" | "0" | "no"),
        "validate" => validate = true,
        "debug" => debug = true,
        "images" => image_dir = Some(PathBuf::from(v.as_ref())),
        _ => warn!("忽略未知参数: {}={}", k, v),
      }
    }

    if validate || debug {
      exporter = exporter.with_validator(StructuralValidator);
    }
    if debug {
      // 默认在 JSON 所在目录查找图像
      let image_dir = image_dir
        .or_else(|| exporter.path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
      exporter = exporter.with_debug_render(image_dir);
    }

    Ok(exporter)
  }
}

/// `none` 表示紧凑输出
pub fn parse_indent(value: &str) -> Result<Option<usize>, CocoExportError> {
  match value {
    "none" | "null" | "" => Ok(None),
    n => n
      .parse::<usize>()
      .map(Some)
      .map_err(|_| CocoExportError::InvalidIndent(n.to_string())),
  }
}

impl CocoExporter {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      indent: Some(DEFAULT_INDENT),
      include_masks: true,
      validators: Vec::new(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn indent(mut self, indent: Option<usize>) -> Self {
    self.indent = indent;
    self
  }

  pub fn include_masks(mut self, include_masks: bool) -> Self {
    self.include_masks = include_masks;
    self
  }

  pub fn with_validator(mut self, validator: impl Validate + 'static) -> Self {
    self.validators.push(Box::new(validator));
    self
  }

  #[cfg(feature = "visualize")]
  pub fn with_debug_render(self, image_dir: PathBuf) -> Self {
    let renderer = crate::output::draw::DebugRenderer::new(image_dir);
    self.with_validator(renderer)
  }

  #[cfg(not(feature = "visualize"))]
  pub fn with_debug_render(self, _image_dir: PathBuf) -> Self {
    info!("未启用 visualize 特性，跳过调试可视化");
    self
  }

  /// 导出到文件；输入为空时不写文件，返回 `None`
  pub fn export(&self, results: &[DetectResult]) -> Result<Option<ExportSummary>, CocoExportError> {
    if results.is_empty() {
      warn!("检测结果为空，未导出 JSON");
      return Ok(None);
    }

    let document = encode(results, self.include_masks);

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(&self.path)?);
    document.write_to(&mut writer, self.indent)?;
    writer.flush()?;

    info!(
      "成功导出 {} 条标注到 '{}'",
      document.annotations.len(),
      self.path.display()
    );

    let validation = self.run_validators();

    Ok(Some(ExportSummary {
      path: self.path.clone(),
      images: document.images.len(),
      annotations: document.annotations.len(),
      categories: document.categories.len(),
      validation,
    }))
  }

  // 校验失败只报告，不回滚已写出的文件
  fn run_validators(&self) -> ValidationOutcome {
    if self.validators.is_empty() {
      return ValidationOutcome::Skipped;
    }
    for validator in &self.validators {
      info!("运行校验: {}", validator.name());
      if let Err(e) = validator.validate(&self.path) {
        error!("校验失败 ({}): {}", validator.name(), e);
        return ValidationOutcome::Failed(e.to_string());
      }
    }
    info!("校验通过");
    ValidationOutcome::Passed
  }
}
