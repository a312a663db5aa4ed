// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/image_server.rs - 图像服务集成测试
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

mod common;

use biaozhu::server::{self, HEALTH_PATH, Health, ImageServerError};
use biaozhu::task::{port_in_use, image_server_health};

#[tokio::test]
async fn serves_files_with_cors() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("a b.jpg"), b"jpeg-bytes").unwrap();

  let addr = server::spawn(dir.path().to_path_buf(), 0).await.unwrap().unwrap();
  let base = format!("http://127.0.0.1:{}", addr.port());

  let response = reqwest::Client::new()
    .get(format!("{}/a%20b.jpg", base))
    .header("Origin", "http://localhost:8081")
    .send()
    .await
    .unwrap();
  assert!(response.status().is_success());
  assert_eq!(
    response
      .headers()
      .get("access-control-allow-origin")
      .and_then(|v| v.to_str().ok()),
    Some("*")
  );
  assert_eq!(response.bytes().await.unwrap().as_ref(), b"jpeg-bytes");

  let missing = reqwest::get(format!("{}/nope.jpg", base)).await.unwrap();
  assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn answers_cors_preflight() {
  let dir = tempfile::tempdir().unwrap();
  let addr = server::spawn(dir.path().to_path_buf(), 0).await.unwrap().unwrap();

  let response = reqwest::Client::new()
    .request(
      reqwest::Method::OPTIONS,
      format!("http://127.0.0.1:{}/a.jpg", addr.port()),
    )
    .header("Origin", "http://localhost:8081")
    .header("Access-Control-Request-Method", "GET")
    .send()
    .await
    .unwrap();

  assert!(response.status().is_success());
  let header = |name: &str| {
    response
      .headers()
      .get(name)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string)
  };
  assert_eq!(header("access-control-allow-origin").as_deref(), Some("*"));
  assert!(header("access-control-allow-methods").is_some());
}

#[tokio::test]
async fn answers_health_contract() {
  let dir = tempfile::tempdir().unwrap();
  let addr = server::spawn(dir.path().to_path_buf(), 0).await.unwrap().unwrap();

  let health: Health = reqwest::get(format!("http://127.0.0.1:{}{}", addr.port(), HEALTH_PATH))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
  assert!(health.is_compatible());

  assert!(port_in_use("127.0.0.1", addr.port()).await);
  assert_eq!(image_server_health(addr.port()).await, Some(Health::current()));
}

#[tokio::test]
async fn missing_directory_is_reported() {
  let dir = tempfile::tempdir().unwrap();
  let result = server::spawn(dir.path().join("absent"), 0).await.unwrap();
  assert!(matches!(result, Err(ImageServerError::MissingDirectory(_))));
}

#[tokio::test]
async fn occupied_port_fails_to_bind() {
  let listener = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
  let port = listener.local_addr().unwrap().port();
  let dir = tempfile::tempdir().unwrap();

  let result = server::spawn(dir.path().to_path_buf(), port).await.unwrap();
  assert!(matches!(result, Err(ImageServerError::BindError { .. })));
}

#[tokio::test]
async fn foreign_listener_has_no_health() {
  let service = common::FakeReviewService::start(0).await;
  assert!(image_server_health(service.addr.port()).await.is_none());
}
