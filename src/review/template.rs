// 该文件是 Biaozhu （标注） 项目的一部分。
// src/review/template.rs - 标注界面配置
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

use crate::{
  output::coco::CocoCategory,
  review::convert::{IMAGE_TAG, POLYGON_TAG, RECTANGLE_TAG, SCORE_TAG},
};

pub const LABEL_COLORS: [&str; 10] = [
  "green", "blue", "red", "orange", "purple", "cyan", "magenta", "yellow", "brown", "pink",
];

/// 类别按位置循环取色，同样的类别顺序每次得到同样的颜色
pub fn label_color(position: usize) -> &'static str {
  LABEL_COLORS[position % LABEL_COLORS.len()]
}

/// 由当前类别生成标注界面 XML
pub fn build_label_config(categories: &[CocoCategory], include_boxes: bool) -> String {
  let mut tags = String::new();
  for (i, category) in categories.iter().enumerate() {
    tags.push_str(&format!(
      "    <Label value=\"{}\" background=\"{}\"/>\n",
      escape_xml(&category.name),
      label_color(i)
    ));
  }

  let mut view = String::from("<View>\n");
  view.push_str(&format!(
    "  <Image name=\"{IMAGE_TAG}\" value=\"${IMAGE_TAG}\"/>\n"
  ));
  view.push_str(&format!(
    "  <PolygonLabels name=\"{POLYGON_TAG}\" toName=\"{IMAGE_TAG}\">\n{tags}  </PolygonLabels>\n"
  ));
  if include_boxes {
    view.push_str(&format!(
      "  <RectangleLabels name=\"{RECTANGLE_TAG}\" toName=\"{IMAGE_TAG}\">\n{tags}  </RectangleLabels>\n"
    ));
  }
  view.push_str(&format!(
    "  <Number name=\"{SCORE_TAG}\" toName=\"{IMAGE_TAG}\" perRegion=\"true\" editable=\"false\"/>\n"
  ));
  view.push_str("</View>");
  view
}

fn escape_xml(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&apos;"),
      c => escaped.push(c),
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  fn category(id: u32, name: &str) -> CocoCategory {
    CocoCategory {
      id,
      name: name.to_string(),
      supercategory: "none".to_string(),
    }
  }

  #[test]
  fn colors_cycle_by_position() {
    let categories: Vec<_> = (0..12).map(|i| category(i, &format!("c{i}"))).collect();
    let config = build_label_config(&categories, false);
    assert!(config.contains("<Label value=\"c0\" background=\"green\"/>"));
    assert!(config.contains("<Label value=\"c9\" background=\"pink\"/>"));
    assert!(config.contains("<Label value=\"c10\" background=\"green\"/>"));
    assert!(config.contains("<Label value=\"c11\" background=\"blue\"/>"));
    assert_eq!(config, build_label_config(&categories, false));
  }

  #[test]
  fn layout() {
    let config = build_label_config(&[category(0, "cat")], false);
    assert!(config.starts_with("<View>"));
    assert!(config.contains("<Image name=\"image\" value=\"$image\"/>"));
    assert!(config.contains("<PolygonLabels name=\"mask\" toName=\"image\">"));
    assert!(config.contains("perRegion=\"true\""));
    assert!(!config.contains("RectangleLabels"));

    let config = build_label_config(&[category(0, "cat")], true);
    assert!(config.contains("<RectangleLabels name=\"label\" toName=\"image\">"));
  }

  #[test]
  fn names_are_escaped() {
    let config = build_label_config(&[category(0, "a \"b\" & <c>")], false);
    assert!(config.contains("value=\"a &quot;b&quot; &amp; &lt;c&gt;\""));
  }
}
