// 该文件是 Biaozhu （标注） 项目的一部分。
// src/config.rs - 运行配置
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
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// 读取凭据的环境变量
pub const CREDENTIAL_ENV: &str = "LABELSTUDIO_TOKEN";
/// 传给审核服务子进程的环境变量
pub const CHILD_CREDENTIAL_ENV: &str = "LABEL_STUDIO_USER_TOKEN";

pub const DEFAULT_IMAGE_PORT: u16 = 8888;
pub const DEFAULT_REVIEW_PORT: u16 = 8081;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("缺少凭据: 请通过参数提供，或设置环境变量 LABELSTUDIO_TOKEN")]
  MissingCredential,
  #[error("审核服务启动命令为空")]
  EmptyCommand,
  #[error("COCO 文件不存在: {0}")]
  MissingDocument(PathBuf),
  #[error("审核服务地址缺少主机: {0}")]
  InvalidReviewUrl(Url),
}

/// 访问审核服务的凭据，`Debug` 不输出内容
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  /// 显式值优先，否则读取一次环境变量
  pub fn resolve(explicit: Option<String>) -> Result<Self, ConfigError> {
    Self::resolve_with(explicit, std::env::var(CREDENTIAL_ENV).ok())
  }

  pub fn resolve_with(explicit: Option<String>, fallback: Option<String>) -> Result<Self, ConfigError> {
    explicit
      .filter(|t| !t.is_empty())
      .or(fallback.filter(|t| !t.is_empty()))
      .map(Credential)
      .ok_or(ConfigError::MissingCredential)
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Debug for Credential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Credential(***)")
  }
}

/// 就绪轮询策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
  pub interval: Duration,
  pub timeout: Duration,
}

impl Default for ReadinessPolicy {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(1),
      timeout: Duration::from_secs(60),
    }
  }
}

/// 发布流程的完整配置
#[derive(Debug, Clone)]
pub struct PublishConfig {
  pub name: String,
  pub json_path: PathBuf,
  pub image_dir: PathBuf,
  pub image_port: u16,
  pub review_url: Url,
  pub credential: Credential,
  pub include_boxes: bool,
  /// 审核服务启动命令，端口参数由编排器追加
  pub review_command: Vec<String>,
  pub readiness: ReadinessPolicy,
  pub image_server_timeout: Duration,
  /// 请求审核服务退出后等待的时间，超时则强制结束
  pub review_stop_timeout: Duration,
  pub model_version: String,
}

impl PublishConfig {
  pub fn new(
    name: impl Into<String>,
    json_path: impl Into<PathBuf>,
    image_dir: impl Into<PathBuf>,
    review_url: Url,
    credential: Credential,
  ) -> Self {
    Self {
      name: name.into(),
      json_path: json_path.into(),
      image_dir: image_dir.into(),
      image_port: DEFAULT_IMAGE_PORT,
      review_url,
      credential,
      include_boxes: false,
      review_command: vec!["label-studio".to_string(), "start".to_string()],
      readiness: ReadinessPolicy::default(),
      image_server_timeout: Duration::from_secs(5),
      review_stop_timeout: Duration::from_secs(10),
      model_version: "biaozhu".to_string(),
    }
  }

  pub fn image_port(mut self, port: u16) -> Self {
    self.image_port = port;
    self
  }

  pub fn include_boxes(mut self, include_boxes: bool) -> Self {
    self.include_boxes = include_boxes;
    self
  }

  pub fn readiness(mut self, readiness: ReadinessPolicy) -> Self {
    self.readiness = readiness;
    self
  }

  pub fn review_command(mut self, command: Vec<String>) -> Self {
    self.review_command = command;
    self
  }

  pub fn review_stop_timeout(mut self, grace: Duration) -> Self {
    self.review_stop_timeout = grace;
    self
  }

  pub fn image_server_url(&self) -> String {
    format!("http://localhost:{}", self.image_port)
  }

  pub fn review_port(&self) -> u16 {
    self.review_url.port().unwrap_or(DEFAULT_REVIEW_PORT)
  }

  pub fn review_host(&self) -> Result<String, ConfigError> {
    self
      .review_url
      .host_str()
      .map(str::to_string)
      .ok_or_else(|| ConfigError::InvalidReviewUrl(self.review_url.clone()))
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.review_command.is_empty() {
      return Err(ConfigError::EmptyCommand);
    }
    if !self.json_path.is_file() {
      return Err(ConfigError::MissingDocument(self.json_path.clone()));
    }
    self.review_host()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn explicit_credential_wins() {
    let c = Credential::resolve_with(Some("a".into()), Some("b".into())).unwrap();
    assert_eq!(c.expose(), "a");
  }

  #[test]
  fn falls_back_to_environment_value() {
    let c = Credential::resolve_with(None, Some("b".into())).unwrap();
    assert_eq!(c.expose(), "b");
    let c = Credential::resolve_with(Some(String::new()), Some("b".into())).unwrap();
    assert_eq!(c.expose(), "b");
  }

  #[test]
  fn missing_credential() {
    assert!(matches!(
      Credential::resolve_with(None, None),
      Err(ConfigError::MissingCredential)
    ));
  }

  #[test]
  fn debug_hides_secret() {
    let text = format!("{:?}", Credential::new("topsecret"));
    assert!(!text.contains("topsecret"));
  }

  #[test]
  fn review_port_default() {
    let config = PublishConfig::new(
      "run",
      "a.json",
      "imgs",
      Url::parse("http://localhost").unwrap(),
      Credential::new("t"),
    );
    assert_eq!(config.review_port(), DEFAULT_REVIEW_PORT);
    assert_eq!(config.image_server_url(), "http://localhost:8888");
    assert!(matches!(
      config.validate(),
      Err(ConfigError::MissingDocument(_))
    ));

    let config = config.review_command(Vec::new());
    assert!(matches!(config.validate(), Err(ConfigError::EmptyCommand)));
  }
}
