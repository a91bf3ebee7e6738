//! Engine process supervision
//!
//! The supervisor owns at most one engine child process and tracks its
//! readiness through the state machine:
//!
//! ```text
//! NotStarted ──▶ Starting ──▶ Ready ◀──▶ Unresponsive
//!      │             │          │             │
//!      └─────────────┴──────────┴─────────────┴──▶ Stopped
//! ```
//!
//! All transitions that launch or terminate the process run behind one async
//! mutex, so concurrent callers of [`ProcessSupervisor::ensure_ready`] wait for
//! an in-progress launch instead of starting a second engine.

use std::fmt;
use std::process::Stdio;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::EngineSettings;
use crate::core::error::{Result, TtsError};

/// Lifecycle state of the engine process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineProcessState {
    NotStarted,
    Starting,
    Ready,
    Unresponsive,
    Stopped,
}

impl fmt::Display for EngineProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineProcessState::NotStarted => write!(f, "not_started"),
            EngineProcessState::Starting => write!(f, "starting"),
            EngineProcessState::Ready => write!(f, "ready"),
            EngineProcessState::Unresponsive => write!(f, "unresponsive"),
            EngineProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Owns the engine child process and its readiness state
pub struct ProcessSupervisor {
    settings: EngineSettings,
    base_url: String,
    host: String,
    port: u16,
    http: reqwest::Client,
    state: RwLock<EngineProcessState>,
    /// Lifecycle lock; holds the child when this supervisor launched it
    lifecycle: Mutex<Option<Child>>,
}

impl ProcessSupervisor {
    /// Create a supervisor; no process is started until `ensure_ready`
    pub fn new(settings: EngineSettings) -> Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&base_url).map_err(|e| TtsError::Config {
            message: format!("Invalid engine base URL '{}': {}", base_url, e),
            path: None,
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| TtsError::config(format!("Engine base URL has no host: {}", base_url)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TtsError::config(format!("Engine base URL has no port: {}", base_url)))?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TtsError::Internal {
                message: format!("Failed to build HTTP client: {}", e),
                location: Some("ProcessSupervisor::new".to_string()),
            })?;

        Ok(Self {
            settings,
            base_url,
            host,
            port,
            http,
            state: RwLock::new(EngineProcessState::NotStarted),
            lifecycle: Mutex::new(None),
        })
    }

    /// Current state snapshot
    pub fn state(&self) -> EngineProcessState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: EngineProcessState) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state != next {
            tracing::debug!("Engine state {} -> {}", *state, next);
            *state = next;
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Whether this supervisor launched (and will terminate) the engine
    pub async fn owns_process(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// Process id of the engine this supervisor launched
    pub async fn process_id(&self) -> Option<u32> {
        self.lifecycle.lock().await.as_ref().and_then(|child| child.id())
    }

    /// One liveness check: `GET {base}/version` answering 200
    ///
    /// A failed probe moves a Ready engine to Unresponsive; a successful one
    /// moves NotStarted or Unresponsive to Ready.
    pub async fn probe(&self) -> bool {
        let live = self.check_live().await;
        match (live, self.state()) {
            (false, EngineProcessState::Ready) => {
                tracing::warn!("Engine at {} stopped answering its liveness probe", self.base_url);
                self.set_state(EngineProcessState::Unresponsive);
            }
            (true, EngineProcessState::NotStarted | EngineProcessState::Unresponsive) => {
                tracing::info!("Engine at {} is answering", self.base_url);
                self.set_state(EngineProcessState::Ready);
            }
            _ => {}
        }
        live
    }

    async fn check_live(&self) -> bool {
        let url = format!("{}/version", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(self.settings.probe_timeout())
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::trace!("Liveness probe failed: {}", e);
                false
            }
        }
    }

    /// Make sure a live engine answers at the base URL
    ///
    /// Adopts an engine that is already running. Otherwise launches the
    /// configured command and polls until it answers or `timeout` elapses.
    pub async fn ensure_ready(&self, timeout: Duration) -> Result<()> {
        let mut child_slot = self.lifecycle.lock().await;

        if self.state() == EngineProcessState::Ready {
            return Ok(());
        }

        let previous = self.state();
        if self.check_live().await {
            if child_slot.is_none() {
                tracing::info!("Adopting engine already running at {}", self.base_url);
            }
            self.set_state(EngineProcessState::Ready);
            return Ok(());
        }

        if let Some(child) = child_slot.take() {
            tracing::warn!("Restarting unresponsive engine (state: {})", previous);
            terminate(child, self.settings.shutdown_grace()).await;
        }

        match self.launch(timeout).await {
            Ok(child) => {
                *child_slot = Some(child);
                self.set_state(EngineProcessState::Ready);
                tracing::info!("Engine ready at {}", self.base_url);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Engine startup failed: {}", e);
                self.set_state(EngineProcessState::Stopped);
                Err(e)
            }
        }
    }

    async fn launch(&self, timeout: Duration) -> Result<Child> {
        self.check_port_free().await?;

        let mut command = Command::new(&self.settings.command);
        command
            .args(&self.settings.args)
            .envs(&self.settings.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| TtsError::EngineBinaryNotFound {
            path: self.settings.command.clone(),
            message: e.to_string(),
        })?;

        self.set_state(EngineProcessState::Starting);
        tracing::info!(
            "Launched engine {} (pid {:?}), waiting up to {}ms",
            self.settings.command.display(),
            child.id(),
            timeout.as_millis()
        );

        let deadline = Instant::now() + timeout;
        let interval = self.settings.probe_interval();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(TtsError::EngineExited {
                        status: status.to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill().await;
                    return Err(TtsError::EngineExited {
                        status: format!("unknown ({})", e),
                    });
                }
            }

            if self.check_live().await {
                return Ok(child);
            }

            let now = Instant::now();
            if now >= deadline {
                terminate(child, self.settings.shutdown_grace()).await;
                return Err(TtsError::EngineStartupTimeout { timeout });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Fail when the port is held by something that is not a live engine
    async fn check_port_free(&self) -> Result<()> {
        match tokio::net::TcpListener::bind((self.host.as_str(), self.port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                Err(TtsError::EnginePortConflict {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
            Err(e) => {
                tracing::debug!("Skipping port check for {}:{}: {}", self.host, self.port, e);
                Ok(())
            }
        }
    }

    /// Terminate the owned engine, if any; idempotent
    ///
    /// An adopted engine is left running.
    pub async fn shutdown(&self) -> Result<()> {
        let mut child_slot = self.lifecycle.lock().await;
        if let Some(child) = child_slot.take() {
            terminate(child, self.settings.shutdown_grace()).await;
            tracing::info!("Engine process stopped");
        }
        self.set_state(EngineProcessState::Stopped);
        Ok(())
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("base_url", &self.base_url)
            .field("state", &self.state())
            .finish()
    }
}

/// SIGTERM, bounded wait, then SIGKILL
async fn terminate(mut child: Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if let Some(pid) = child.id() {
        send_term_signal(pid).await;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!("Engine exited with {}", status),
        Ok(Err(e)) => {
            tracing::warn!("Failed to wait for engine exit: {}", e);
            let _ = child.kill().await;
        }
        Err(_) => {
            tracing::warn!(
                "Engine did not exit within {}ms of SIGTERM, killing",
                grace.as_millis()
            );
            let _ = child.kill().await;
        }
    }
}

#[cfg(unix)]
async fn send_term_signal(pid: u32) {
    if pid == 0 || pid > i32::MAX as u32 {
        return;
    }
    if let Err(e) = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        tracing::debug!("Failed to send SIGTERM to {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn send_term_signal(_pid: u32) {}
