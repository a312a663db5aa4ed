// 该文件是 Biaozhu （标注） 项目的一部分。
// src/review/gateway.rs - 审核服务远程接口
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

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{config::Credential, review::ReviewTask};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);
const USER_AGENT: &str = concat!("biaozhu/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum GatewayError {
  #[error("网络错误: {0}")]
  NetworkError(#[from] reqwest::Error),
  #[error("接口错误 {status}: {body}")]
  ApiError { status: u16, body: String },
  #[error("认证失败 {status}: {body}")]
  Unauthorized { status: u16, body: String },
  #[error("地址错误: {0}")]
  UrlError(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectHandle {
  pub id: u64,
  #[serde(default)]
  pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ImportSummary {
  #[serde(default)]
  pub task_count: Option<u64>,
  #[serde(default)]
  pub prediction_count: Option<u64>,
}

/// 项目数据页地址
pub fn project_url(base: &Url, project_id: u64) -> String {
  format!(
    "{}/projects/{}/data",
    base.as_str().trim_end_matches('/'),
    project_id
  )
}

/// 审核服务需要提供的全部能力
///
/// 每个调用只尝试一次，失败直接返回给调用方。
pub trait ReviewClient {
  fn create_project(
    &self,
    title: &str,
    label_config: &str,
  ) -> impl Future<Output = Result<ProjectHandle, GatewayError>> + Send;

  fn import_tasks(
    &self,
    project_id: u64,
    tasks: &[ReviewTask],
  ) -> impl Future<Output = Result<ImportSummary, GatewayError>> + Send;

  fn check_liveness(&self) -> impl Future<Output = bool> + Send;
}

/// 基于 HTTP 的审核服务客户端
#[derive(Debug, Clone)]
pub struct HttpReviewClient {
  http_client: reqwest::Client,
  base: Url,
  credential: Credential,
}

impl HttpReviewClient {
  pub fn new(base: Url, credential: Credential) -> Result<Self, GatewayError> {
    let http_client = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(REQUEST_TIMEOUT)
      .build()?;

    Ok(Self {
      http_client,
      base,
      credential,
    })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  pub fn project_url(&self, project_id: u64) -> String {
    project_url(&self.base, project_id)
  }

  fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
    let base = format!("{}/", self.base.as_str().trim_end_matches('/'));
    Ok(Url::parse(&base)?.join(path.trim_start_matches('/'))?)
  }

  fn authorization(&self) -> String {
    format!("Token {}", self.credential.expose())
  }

  async fn post_json<T>(&self, path: &str, payload: &impl serde::Serialize) -> Result<T, GatewayError>
  where
    T: serde::de::DeserializeOwned,
  {
    let url = self.endpoint(path)?;
    debug!("POST {}", url);
    let response = self
      .http_client
      .post(url)
      .header(reqwest::header::AUTHORIZATION, self.authorization())
      .json(payload)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
          GatewayError::Unauthorized {
            status: status.as_u16(),
            body,
          }
        } else {
          GatewayError::ApiError {
            status: status.as_u16(),
            body,
          }
        },
      );
    }

    Ok(response.json::<T>().await?)
  }
}

impl ReviewClient for HttpReviewClient {
  async fn create_project(
    &self,
    title: &str,
    label_config: &str,
  ) -> Result<ProjectHandle, GatewayError> {
    let payload = json!({
      "title": title,
      "label_config": label_config,
    });
    let project: ProjectHandle = self.post_json("/api/projects", &payload).await?;
    info!("已创建项目 '{}' (ID {})", title, project.id);
    Ok(project)
  }

  async fn import_tasks(
    &self,
    project_id: u64,
    tasks: &[ReviewTask],
  ) -> Result<ImportSummary, GatewayError> {
    info!("上传 {} 个任务到项目 {}", tasks.len(), project_id);
    self
      .post_json(&format!("/api/projects/{}/import", project_id), &tasks)
      .await
  }

  async fn check_liveness(&self) -> bool {
    let Ok(url) = self.endpoint("/api/version") else {
      return false;
    };
    match self
      .http_client
      .get(url)
      .timeout(LIVENESS_TIMEOUT)
      .send()
      .await
    {
      Ok(response) => response.status().is_success(),
      Err(e) => {
        debug!("存活检查失败: {}", e);
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> HttpReviewClient {
    HttpReviewClient::new(Url::parse(base).unwrap(), Credential::new("secret")).unwrap()
  }

  #[test]
  fn endpoints_join_under_base() {
    let c = client("http://localhost:8081");
    assert_eq!(
      c.endpoint("/api/projects").unwrap().as_str(),
      "http://localhost:8081/api/projects"
    );
    let c = client("http://host/ls/");
    assert_eq!(
      c.endpoint("/api/version").unwrap().as_str(),
      "http://host/ls/api/version"
    );
    assert_eq!(c.project_url(7), "http://host/ls/projects/7/data");
  }

  #[test]
  fn token_header() {
    assert_eq!(client("http://x").authorization(), "Token secret");
  }
}
