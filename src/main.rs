// 该文件是 Biaozhu （标注） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use biaozhu::{
  FromUrl,
  config::{Credential, PublishConfig, ReadinessPolicy},
  input::DetectionFileInput,
  output::{CocoExporter, ValidationOutcome},
  review::HttpReviewClient,
  server,
  task::{PublishTask, interrupt_signal},
};

use args::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  match args.command {
    Command::Export { input, output } => export(&input, &output),
    Command::Publish {
      name,
      json,
      image_dir,
      port,
      review_url,
      token,
      include_boxes,
      timeout,
    } => {
      let credential = Credential::resolve(token)?;
      let readiness = ReadinessPolicy {
        timeout: Duration::from_secs(timeout),
        ..ReadinessPolicy::default()
      };
      let config = PublishConfig::new(name, json, image_dir, review_url, credential)
        .image_port(port)
        .include_boxes(include_boxes)
        .readiness(readiness);
      publish(config).await
    }
    Command::Serve { dir, port } => serve(dir, port).await,
  }
}

fn export(input: &Url, output: &Url) -> Result<()> {
  info!("输入来源: {}", input);
  info!("输出路径: {}", output);

  let input = DetectionFileInput::from_url(input)?;
  let exporter = CocoExporter::from_url(output)?;

  let now = std::time::Instant::now();
  let results = input.read_all()?;
  info!("读取 {} 张图像的检测结果，耗时: {:.2?}", results.len(), now.elapsed());

  match exporter.export(&results)? {
    None => warn!("没有可导出的内容"),
    Some(summary) => {
      info!(
        "图像 {} 张, 标注 {} 条, 类别 {} 个",
        summary.images, summary.annotations, summary.categories
      );
      if let ValidationOutcome::Failed(reason) = summary.validation {
        bail!("导出文件校验失败: {}", reason);
      }
    }
  }

  Ok(())
}

async fn publish(config: PublishConfig) -> Result<()> {
  let client = HttpReviewClient::new(config.review_url.clone(), config.credential.clone())?;
  let shutdown = interrupt_signal()?;

  match PublishTask::new(config, client).run(shutdown).await? {
    Some(published) => info!("项目 {} 已关闭", published.project.id),
    None => warn!("发布被中断，未完成上传"),
  }
  Ok(())
}

async fn serve(dir: PathBuf, port: u16) -> Result<()> {
  let shutdown = interrupt_signal()?;
  let addr = server::spawn(dir, port).await??;
  info!("图像服务运行于 {}，按 Ctrl+C 停止", addr);
  shutdown.await;
  Ok(())
}
