// 该文件是 Biaozhu （标注） 项目的一部分。
// src/server.rs - 图像文件服务
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

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info};

/// 健康检查路径，避免与图像文件名冲突
pub const HEALTH_PATH: &str = "/__health";
pub const SERVICE_NAME: &str = "biaozhu-image-server";

#[derive(Error, Debug)]
pub enum ImageServerError {
  #[error("图像目录不存在: {0}")]
  MissingDirectory(PathBuf),
  #[error("绑定端口 {port} 失败: {source}")]
  BindError {
    port: u16,
    #[source]
    source: std::io::Error,
  },
  #[error("服务错误: {0}")]
  ServeError(#[source] std::io::Error),
}

/// 健康检查响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
  pub service: String,
  pub version: String,
}

impl Health {
  pub fn current() -> Self {
    Self {
      service: SERVICE_NAME.to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
    }
  }

  /// 服务名一致即视为同一种服务
  pub fn is_compatible(&self) -> bool {
    self.service == SERVICE_NAME
  }
}

/// 只读静态文件服务，允许任意跨域访问，不记录访问日志
pub fn router(directory: impl Into<PathBuf>) -> Router {
  Router::new()
    .route(HEALTH_PATH, get(|| async { Json(Health::current()) }))
    .fallback_service(ServeDir::new(directory.into()))
    .layer(CorsLayer::permissive())
}

/// 在后台任务中启动图像服务
///
/// 端口绑定完成（或失败）后通过返回的通道通知调用方。
pub fn spawn(
  directory: PathBuf,
  port: u16,
) -> oneshot::Receiver<Result<SocketAddr, ImageServerError>> {
  let (ready_tx, ready_rx) = oneshot::channel();

  tokio::spawn(async move {
    if !directory.is_dir() {
      let _ = ready_tx.send(Err(ImageServerError::MissingDirectory(directory)));
      return;
    }

    let listener = match tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await {
      Ok(listener) => listener,
      Err(source) => {
        let _ = ready_tx.send(Err(ImageServerError::BindError { port, source }));
        return;
      }
    };
    let addr = match listener.local_addr() {
      Ok(addr) => addr,
      Err(source) => {
        let _ = ready_tx.send(Err(ImageServerError::BindError { port, source }));
        return;
      }
    };

    info!("图像服务: 提供 {} 于 http://localhost:{}", directory.display(), addr.port());
    let app = router(directory);
    let _ = ready_tx.send(Ok(addr));

    if let Err(e) = axum::serve(listener, app).await {
      error!("图像服务异常退出: {}", ImageServerError::ServeError(e));
    }
  });

  ready_rx
}
