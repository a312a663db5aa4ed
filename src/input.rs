// 该文件是 Biaozhu （标注） 项目的一部分。
// src/input.rs - 检测结果输入
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
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch {
    expected: &'static str,
    found: String,
  },
  #[error("无效的输入路径: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
}

/// 检测结果文件的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
  /// 每行一个 DetectResult
  JsonLines,
  /// 整个文件是一个 DetectResult 数组
  JsonArray,
}

/// 从文件读取推理方导出的检测结果
///
/// `detections:///path/to/pred.jsonl` 或 `detections:///path/to/pred.json`，
/// 可用 `?layout=jsonl|json` 覆盖按扩展名推断的格式。
#[derive(Debug, Clone)]
pub struct DetectionFileInput {
  path: PathBuf,
  layout: RecordLayout,
}

impl FromUrlWithScheme for DetectionFileInput {
  const SCHEME: &'static str = "detections";
}

impl FromUrl for DetectionFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = urlencoding::decode(url.path())
      .map(|p| PathBuf::from(p.as_ref()))
      .map_err(|_| InputError::InvalidPath(url.path().to_string()))?;
    let mut layout = layout_from_extension(&path);
    for (k, v) in url.query_pairs() {
      if k == "layout" {
        layout = if v == "json" {
          RecordLayout::JsonArray
        } else {
          RecordLayout::JsonLines
        };
      }
    }

    Ok(DetectionFileInput { path, layout })
  }
}

fn layout_from_extension(path: &Path) -> RecordLayout {
  match path.extension().and_then(|ext| ext.to_str()) {
    Some("json") => RecordLayout::JsonArray,
    _ => RecordLayout::JsonLines,
  }
}

impl DetectionFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let layout = layout_from_extension(&path);
    Self { path, layout }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 读取全部记录，并按图像分组
  pub fn read_all(&self) -> Result<Vec<DetectResult>, InputError> {
    let content = std::fs::read_to_string(&self.path)?;
    let records = match self.layout {
      RecordLayout::JsonArray => serde_json::from_str::<Vec<DetectResult>>(&content)
        .map_err(|source| InputError::ParseError { line: 1, source })?,
      RecordLayout::JsonLines => {
        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
          if line.trim().is_empty() {
            continue;
          }
          let record = serde_json::from_str::<DetectResult>(line).map_err(|source| {
            InputError::ParseError {
              line: index + 1,
              source,
            }
          })?;
          records.push(record);
        }
        records
      }
    };
    debug!("从 {} 读取 {} 条记录", self.path.display(), records.len());
    Ok(group_by_image(records))
  }
}

/// 同一图像的多条记录合并为一组，组的顺序为图像首次出现的顺序
pub fn group_by_image(records: Vec<DetectResult>) -> Vec<DetectResult> {
  let mut groups: Vec<DetectResult> = Vec::with_capacity(records.len());
  let mut index: HashMap<PathBuf, usize> = HashMap::new();

  for record in records {
    match index.get(&record.image.path) {
      Some(&i) => {
        let group = &mut groups[i];
        let mut items = std::mem::take(&mut group.items).into_vec();
        items.extend(record.items.into_vec());
        group.items = items.into_boxed_slice();
      }
      None => {
        index.insert(record.image.path.clone(), groups.len());
        groups.push(record);
      }
    }
  }

  groups
}
