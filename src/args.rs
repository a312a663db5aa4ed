// 该文件是 Biaozhu （标注） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

use biaozhu::config::DEFAULT_IMAGE_PORT;

/// Biaozhu 标注导出与审核工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 将检测结果导出为 COCO JSON
  Export {
    /// 输入来源，例如 detections:///data/run.jsonl
    #[arg(long, value_name = "SOURCE")]
    input: Url,
    /// 输出路径，例如 coco:///data/run.json?indent=2&validate
    #[arg(long, value_name = "OUTPUT")]
    output: Url,
  },
  /// 启动图像服务与审核服务，并上传 COCO 标注以供审核
  Publish {
    /// 项目名称
    #[arg(long)]
    name: String,
    /// COCO JSON 文件路径
    #[arg(long, value_name = "FILE")]
    json: PathBuf,
    /// 图像目录
    #[arg(long, value_name = "DIR")]
    image_dir: PathBuf,
    /// 图像服务端口
    #[arg(long, default_value_t = DEFAULT_IMAGE_PORT)]
    port: u16,
    /// 审核服务地址
    #[arg(long, value_name = "URL", default_value = "http://localhost:8081")]
    review_url: Url,
    /// 审核服务凭据，缺省时读取环境变量 LABELSTUDIO_TOKEN
    #[arg(long)]
    token: Option<String>,
    /// 同时上传矩形框
    #[arg(long)]
    include_boxes: bool,
    /// 审核服务就绪等待时间（秒）
    #[arg(long, default_value_t = 60, value_name = "SECONDS")]
    timeout: u64,
  },
  /// 仅启动图像服务
  Serve {
    /// 图像目录
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,
    /// 监听端口
    #[arg(long, default_value_t = DEFAULT_IMAGE_PORT)]
    port: u16,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use biaozhu::config::DEFAULT_REVIEW_PORT;

  #[test]
  fn publish_defaults() {
    let args = Args::parse_from([
      "biaozhu",
      "publish",
      "--name",
      "run",
      "--json",
      "a.json",
      "--image-dir",
      "imgs",
    ]);
    let Command::Publish {
      port,
      review_url,
      token,
      include_boxes,
      timeout,
      ..
    } = args.command
    else {
      panic!("应解析为 publish");
    };
    assert_eq!(port, 8888);
    assert_eq!(review_url.port(), Some(DEFAULT_REVIEW_PORT));
    assert!(token.is_none());
    assert!(!include_boxes);
    assert_eq!(timeout, 60);
  }

  #[test]
  fn export_requires_urls() {
    assert!(Args::try_parse_from(["biaozhu", "export", "--input", "detections:///a.jsonl"]).is_err());
  }
}
