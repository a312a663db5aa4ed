// 该文件是 Biaozhu （标注） 项目的一部分。
// src/task.rs - 发布流程编排
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
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use std::{fmt, thread};

use chrono::Local;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::{
  config::{CHILD_CREDENTIAL_ENV, ConfigError, PublishConfig, ReadinessPolicy},
  output::coco::{CocoDocument, CocoExportError},
  review::{
    ConvertError, ConvertOptions, GatewayError, ImportSummary, ProjectHandle, ReviewClient,
    build_label_config, coco_to_tasks, project_url,
  },
  server::{self, HEALTH_PATH, Health, ImageServerError},
};

const PORT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);
const TITLE_TIME_FORMAT: &str = "%Y-%b-%d_%I-%M%p";

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("图像服务错误: {0}")]
  ImageServerError(#[from] ImageServerError),
  #[error("图像服务在 {0:?} 内未就绪")]
  ImageServerTimeout(Duration),
  #[error("图像服务任务提前退出")]
  ImageServerStopped,
  #[error("端口 {port} 已被其他服务占用（期望 {service}）")]
  PortConflict { port: u16, service: &'static str },
  #[error("{service} 在 {timeout:?} 内未就绪")]
  ReadinessTimeout {
    service: &'static str,
    timeout: Duration,
  },
  #[error("启动审核服务失败: {0}")]
  SpawnError(#[source] std::io::Error),
  #[error("读取 COCO 文件失败: {0}")]
  DocumentError(#[from] CocoExportError),
  #[error("任务转换失败: {0}")]
  ConvertError(#[from] ConvertError),
  #[error("审核服务接口错误: {0}")]
  GatewayError(#[from] GatewayError),
  #[error("设置中断处理失败: {0}")]
  SignalError(#[from] ctrlc::Error),
}

/// 发布流程的阶段，只能按顺序前进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  Idle,
  ImageServerReady,
  ReviewServiceReady,
  DocumentLoaded,
  ProjectCreated,
  TasksUploaded,
  Serving,
  ShuttingDown,
  Terminated,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

/// 上传完成后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
  pub project: ProjectHandle,
  pub project_url: String,
  pub title: String,
  pub tasks: usize,
  pub import: ImportSummary,
}

/// 端口上是否已有监听者，连接失败一律视为空闲
pub async fn port_in_use(host: &str, port: u16) -> bool {
  matches!(
    timeout(PORT_CHECK_TIMEOUT, TcpStream::connect((host, port))).await,
    Ok(Ok(_))
  )
}

/// 查询端口上图像服务的健康信息
pub async fn image_server_health(port: u16) -> Option<Health> {
  let url = format!("http://127.0.0.1:{}{}", port, HEALTH_PATH);
  let client = reqwest::Client::builder()
    .timeout(PORT_CHECK_TIMEOUT)
    .build()
    .ok()?;
  let response = client.get(url).send().await.ok()?;
  if !response.status().is_success() {
    return None;
  }
  response.json::<Health>().await.ok()
}

/// 按固定间隔轮询存活检查，直到成功或超时
///
/// 单次检查也受总时限约束，挂起的检查视为未就绪。
pub async fn wait_until_live<C: ReviewClient>(
  client: &C,
  policy: ReadinessPolicy,
) -> Result<Duration, TaskError> {
  let start = Instant::now();
  let deadline = start + policy.timeout;

  loop {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
      break;
    }
    if timeout(remaining, client.check_liveness())
      .await
      .unwrap_or(false)
    {
      return Ok(start.elapsed());
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
      break;
    }
    sleep(policy.interval.min(remaining)).await;
  }

  Err(TaskError::ReadinessTimeout {
    service: "审核服务",
    timeout: policy.timeout,
  })
}

/// 安装 Ctrl+C 处理，返回收到中断时完成的 future
///
/// 每个进程只能调用一次。若退出流程 30 秒内仍未结束，则强制退出。
pub fn interrupt_signal() -> Result<impl Future<Output = ()>, TaskError> {
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_AFTER);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(async move {
    let _ = rx.recv().await;
  })
}

/// 发布流程编排：启动服务、上传任务、等待中断后清理
pub struct PublishTask<C> {
  config: PublishConfig,
  client: C,
  stage: Stage,
  review_process: Option<Child>,
  review_exit: Option<ExitStatus>,
}

impl<C: ReviewClient> PublishTask<C> {
  pub fn new(config: PublishConfig, client: C) -> Self {
    Self {
      config,
      client,
      stage: Stage::Idle,
      review_process: None,
      review_exit: None,
    }
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn config(&self) -> &PublishConfig {
    &self.config
  }

  /// 是否由本流程启动了审核服务子进程
  pub fn owns_review_process(&self) -> bool {
    self.review_process.is_some()
  }

  /// 本流程启动的审核服务子进程的退出状态
  pub fn review_exit_status(&self) -> Option<ExitStatus> {
    self.review_exit
  }

  fn advance(&mut self, next: Stage) {
    debug_assert!(next > self.stage, "阶段只能前进: {} -> {}", self.stage, next);
    info!("阶段: {} -> {}", self.stage, next);
    self.stage = next;
  }

  /// 完整运行：发布后一直服务，直到 `shutdown` 完成
  ///
  /// 发布过程中收到中断时立即停止，不再发起远程调用，返回 `None`。
  pub async fn run(
    mut self,
    shutdown: impl Future<Output = ()>,
  ) -> Result<Option<Published>, TaskError> {
    tokio::pin!(shutdown);

    let published = tokio::select! {
      result = self.publish() => result,
      _ = &mut shutdown => {
        warn!("发布过程中收到中断 (阶段 {})", self.stage);
        self.shut_down().await;
        return Ok(None);
      }
    }?;

    self.serve_until(shutdown).await?;
    Ok(Some(published))
  }

  /// Idle 到 TasksUploaded
  pub async fn publish(&mut self) -> Result<Published, TaskError> {
    self.config.validate()?;
    self.start_image_server().await?;
    self.start_review_service().await?;
    let document = self.load_document()?;
    let (project, title) = self.create_project(&document).await?;
    let (tasks, import) = self.upload_tasks(&document, &project).await?;

    let published = Published {
      project_url: project_url(&self.config.review_url, project.id),
      project,
      title,
      tasks,
      import,
    };
    announce(&published);
    Ok(published)
  }

  pub async fn start_image_server(&mut self) -> Result<(), TaskError> {
    let port = self.config.image_port;

    if port_in_use("127.0.0.1", port).await {
      match image_server_health(port).await {
        Some(health) if health.is_compatible() => {
          info!("端口 {} 已有图像服务 (版本 {})，直接复用", port, health.version);
        }
        _ => {
          return Err(TaskError::PortConflict {
            port,
            service: server::SERVICE_NAME,
          });
        }
      }
    } else {
      let ready = server::spawn(self.config.image_dir.clone(), port);
      let addr = match timeout(self.config.image_server_timeout, ready).await {
        Err(_) => {
          return Err(TaskError::ImageServerTimeout(
            self.config.image_server_timeout,
          ));
        }
        Ok(Err(_)) => return Err(TaskError::ImageServerStopped),
        Ok(Ok(result)) => result?,
      };
      debug!("图像服务监听于 {}", addr);
    }

    self.advance(Stage::ImageServerReady);
    Ok(())
  }

  pub async fn start_review_service(&mut self) -> Result<(), TaskError> {
    let host = self.config.review_host()?;
    let port = self.config.review_port();

    if port_in_use(&host, port).await {
      info!("端口 {} 已被占用，假定审核服务由外部管理", port);
      if wait_until_live(&self.client, self.config.readiness).await.is_err() {
        return Err(TaskError::PortConflict {
          port,
          service: "审核服务",
        });
      }
    } else {
      info!("在端口 {} 启动审核服务...", port);
      let child = self.spawn_review_process(port)?;
      // 超时时子进程保持运行，不在此处回收
      self.review_process = Some(child);
      let elapsed = wait_until_live(&self.client, self.config.readiness).await?;
      info!("审核服务已就绪，耗时 {:.2?}", elapsed);
    }

    self.advance(Stage::ReviewServiceReady);
    Ok(())
  }

  fn spawn_review_process(&self, port: u16) -> Result<Child, TaskError> {
    let (program, args) = self
      .config
      .review_command
      .split_first()
      .ok_or(ConfigError::EmptyCommand)?;

    Command::new(program)
      .args(args)
      .arg("--port")
      .arg(port.to_string())
      .env(CHILD_CREDENTIAL_ENV, self.config.credential.expose())
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()
      .map_err(TaskError::SpawnError)
  }

  pub fn load_document(&mut self) -> Result<CocoDocument, TaskError> {
    let document = CocoDocument::from_path(&self.config.json_path)?;
    info!(
      "读取 {}: {} 张图像, {} 条标注",
      self.config.json_path.display(),
      document.images.len(),
      document.annotations.len()
    );
    self.advance(Stage::DocumentLoaded);
    Ok(document)
  }

  pub async fn create_project(
    &mut self,
    document: &CocoDocument,
  ) -> Result<(ProjectHandle, String), TaskError> {
    let categories = document.active_categories();
    let label_config = build_label_config(&categories, self.config.include_boxes);
    let title = format!(
      "{} {}",
      self.config.name,
      Local::now().format(TITLE_TIME_FORMAT)
    );

    let project = self.client.create_project(&title, &label_config).await?;
    self.advance(Stage::ProjectCreated);
    Ok((project, title))
  }

  pub async fn upload_tasks(
    &mut self,
    document: &CocoDocument,
    project: &ProjectHandle,
  ) -> Result<(usize, ImportSummary), TaskError> {
    let options = ConvertOptions {
      include_boxes: self.config.include_boxes,
      model_version: self.config.model_version.clone(),
    };
    let tasks = coco_to_tasks(document, &self.config.image_server_url(), &options)?;
    info!("上传 {} 个任务...", tasks.len());

    let import = self.client.import_tasks(project.id, &tasks).await?;
    self.advance(Stage::TasksUploaded);
    Ok((tasks.len(), import))
  }

  /// 等待 `shutdown` 完成，然后停止本流程启动的审核服务
  ///
  /// 图像服务随进程结束，不在这里停止。
  pub async fn serve_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), TaskError> {
    self.advance(Stage::Serving);
    shutdown.await;
    self.shut_down().await;
    Ok(())
  }

  async fn shut_down(&mut self) {
    self.advance(Stage::ShuttingDown);
    if let Some(child) = self.review_process.take() {
      info!("停止审核服务进程...");
      match terminate(child, self.config.review_stop_timeout).await {
        Ok(status) => {
          info!("审核服务进程已退出: {}", status);
          self.review_exit = Some(status);
        }
        Err(e) => warn!("停止审核服务进程失败: {}", e),
      }
    }
    self.advance(Stage::Terminated);
  }
}

/// 先请求子进程退出，超时后强制结束
async fn terminate(mut child: Child, grace: Duration) -> std::io::Result<ExitStatus> {
  request_exit(&child);
  match timeout(grace, child.wait()).await {
    Ok(status) => status,
    Err(_) => {
      warn!("审核服务进程在 {:?} 内未退出，强制结束", grace);
      child.kill().await?;
      child.wait().await
    }
  }
}

#[cfg(unix)]
fn request_exit(child: &Child) {
  use nix::sys::signal::{Signal, kill};
  use nix::unistd::Pid;

  // 已被回收的进程没有 pid
  let Some(pid) = child.id() else {
    return;
  };
  if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
    debug!("发送 SIGTERM 失败: {}", e);
  }
}

#[cfg(not(unix))]
fn request_exit(child: &Child) {
  debug!("当前平台不支持终止请求，等待后强制结束 (pid {:?})", child.id());
}

fn announce(published: &Published) {
  let rule = "=".repeat(60);
  println!();
  println!("{rule}");
  println!("导出完成: 项目 '{}'，共 {} 个任务", published.title, published.tasks);
  println!("查看标注: {}", published.project_url);
  println!("服务在后台运行，按 Ctrl+C 停止");
  println!("{rule}");
  println!();
}
