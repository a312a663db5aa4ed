// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/common/mod.rs - 集成测试辅助：模拟审核服务
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

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
  Json, Router,
  extract::{Path as UrlPath, State},
  http::{HeaderMap, StatusCode, header::AUTHORIZATION},
  routing::{get, post},
};
use serde_json::{Value, json};
use url::Url;

use biaozhu::model::{DetectItem, DetectResult, Vocabulary};
use biaozhu::output::{CocoExporter, ExportSummary};

pub const TOKEN: &str = "test-token";

/// 记录收到的请求，并可让版本接口先失败若干次
#[derive(Default)]
pub struct FakeState {
  pub failures_before_ready: usize,
  pub version_calls: AtomicUsize,
  pub projects: Mutex<Vec<Value>>,
  pub imports: Mutex<Vec<(u64, Vec<Value>)>>,
}

pub struct FakeReviewService {
  pub addr: SocketAddr,
  pub state: Arc<FakeState>,
}

impl FakeReviewService {
  pub async fn start(failures_before_ready: usize) -> Self {
    let state = Arc::new(FakeState {
      failures_before_ready,
      ..FakeState::default()
    });

    let app = Router::new()
      .route("/api/version", get(version))
      .route("/api/projects", post(create_project))
      .route("/api/projects/:id/import", post(import_tasks))
      .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });

    Self { addr, state }
  }

  pub fn url(&self) -> Url {
    Url::parse(&format!("http://127.0.0.1:{}", self.addr.port())).unwrap()
  }

  pub fn version_calls(&self) -> usize {
    self.state.version_calls.load(Ordering::SeqCst)
  }
}

fn authorized(headers: &HeaderMap) -> bool {
  headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v == format!("Token {}", TOKEN))
}

async fn version(State(state): State<Arc<FakeState>>) -> (StatusCode, Json<Value>) {
  let calls = state.version_calls.fetch_add(1, Ordering::SeqCst);
  if calls < state.failures_before_ready {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
  } else {
    (StatusCode::OK, Json(json!({ "release": "test" })))
  }
}

async fn create_project(
  State(state): State<Arc<FakeState>>,
  headers: HeaderMap,
  Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
  if !authorized(&headers) {
    return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "invalid token" })));
  }
  let mut projects = state.projects.lock().unwrap();
  projects.push(body.clone());
  let id = projects.len() as u64;
  (
    StatusCode::CREATED,
    Json(json!({ "id": id, "title": body["title"] })),
  )
}

async fn import_tasks(
  State(state): State<Arc<FakeState>>,
  UrlPath(id): UrlPath<u64>,
  headers: HeaderMap,
  Json(tasks): Json<Vec<Value>>,
) -> (StatusCode, Json<Value>) {
  if !authorized(&headers) {
    return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "invalid token" })));
  }
  let predictions: usize = tasks
    .iter()
    .map(|t| t["predictions"].as_array().map_or(0, Vec::len))
    .sum();
  let count = tasks.len();
  state.imports.lock().unwrap().push((id, tasks));
  (
    StatusCode::CREATED,
    Json(json!({ "task_count": count, "prediction_count": predictions })),
  )
}

/// 获取一个当前空闲的本地端口
pub fn free_port() -> u16 {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  listener.local_addr().unwrap().port()
}

/// 写出包含两张图像的 COCO 文件
pub fn write_sample_coco(dir: &Path) -> ExportSummary {
  let names = Vocabulary::from([(0, "cat".to_string()), (1, "dog".to_string())]);
  let results = vec![
    DetectResult::new("imgs/a b.jpg", 100, 50, names.clone()).with_items(vec![
      DetectItem::new(0, 0.91, [10.0, 5.0, 60.0, 45.0])
        .with_polygon(vec![[10.0, 5.0], [60.0, 5.0], [60.0, 45.0]]),
    ]),
    DetectResult::new("imgs/empty.jpg", 100, 50, names),
  ];

  CocoExporter::new(dir.join("run.json"))
    .export(&results)
    .unwrap()
    .expect("非空输入应写出文件")
}
