use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

use crate::browser::{BrowserSession, LaunchOptions, Viewport};
use crate::config::Config;
use crate::desktop::{DesktopInput, InputDevice, ScreenCapture};
use crate::error::{BotError, Result};
use crate::runs::{ActionLog, LogSink, Outcome, RunWorkspace};
use crate::session::SessionContext;
use crate::steps::Step;

/// Name reported when the session itself could not be set up
const SESSION_STAGE: &str = "Session";

/// Resources a run needs before its first step
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub browser: bool,
    pub headless: bool,
    /// Falls back to the screen size, then 1280x720
    pub viewport: Option<Viewport>,
    /// Name of a state file under the states directory to seed the browser with
    pub state: Option<String>,
    pub desktop: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            browser: true,
            headless: false,
            viewport: None,
            state: None,
            desktop: true,
        }
    }
}

/// The step (or setup stage) that stopped a run
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: BotError,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    /// Steps that returned successfully
    pub executed: usize,
    pub total: usize,
    pub failure: Option<StepFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs an ordered list of steps against one session, stopping at the first failure
pub struct Orchestrator {
    config: Arc<Config>,
    options: SessionOptions,
    steps: Vec<Box<dyn Step>>,
    sinks: Option<Vec<Arc<dyn LogSink>>>,
    input: Option<Arc<dyn InputDevice>>,
    run_id: Option<String>,
}

impl Orchestrator {
    pub fn new(config: Config, options: SessionOptions) -> Self {
        Self {
            config: Arc::new(config),
            options,
            steps: Vec::new(),
            sinks: None,
            input: None,
            run_id: None,
        }
    }

    /// Replace the default file + console log with custom sinks
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.get_or_insert_with(Vec::new).push(sink);
        self
    }

    /// Use this device instead of connecting to the host desktop
    pub fn with_input_device(mut self, device: Arc<dyn InputDevice>) -> Self {
        self.input = Some(device);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Box<dyn Step>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Execute every step in order.
    ///
    /// Only a run folder that cannot be created is an error; step and setup
    /// failures are logged and reported in the returned `RunReport`.
    #[instrument(skip(self), fields(steps = self.steps.len()))]
    pub async fn run(self) -> Result<RunReport> {
        let Self {
            config,
            options,
            steps,
            sinks,
            input,
            run_id,
        } = self;

        let workspace = match run_id {
            Some(id) => RunWorkspace::create_with_id(&config.runs_dir, id)?,
            None => RunWorkspace::create(&config.runs_dir)?,
        };
        let log = match sinks {
            Some(sinks) => ActionLog::new(sinks),
            None => ActionLog::to_file(workspace.log_path()),
        };

        let mut report = RunReport {
            run_id: workspace.run_id().to_string(),
            run_dir: workspace.directory().to_path_buf(),
            executed: 0,
            total: steps.len(),
            failure: None,
        };

        log.record(Outcome::Boot, "Booting up stepwright");
        tracing::info!("Run {} started with {} step(s)", report.run_id, report.total);

        let mut session = Session::default();
        if let Err(error) = session.acquire(&config, &options, input, &log).await {
            log.failure(format!("Error starting session: {}", error));
            report.failure = Some(StepFailure {
                step: SESSION_STAGE.to_string(),
                error,
            });
            session.release().await;
            log.record(Outcome::Finish, "Bot execution completed");
            return Ok(report);
        }

        let mut ctx = SessionContext::new(workspace, log.clone(), Arc::clone(&config));
        if let Some(browser) = &session.browser {
            ctx = ctx.with_browser(browser.clone());
        }
        if let Some(device) = &session.input {
            ctx = ctx.with_input(Arc::clone(device));
        }

        for step in &steps {
            tracing::debug!("Executing {}", step.name());
            match step.execute(ctx).await {
                Ok(next) => {
                    ctx = next;
                    report.executed += 1;
                }
                Err(error) => {
                    log.failure(format!("Error executing {}: {}", step.name(), error));
                    tracing::warn!("Run aborted at {} ({})", step.name(), error.kind());
                    report.failure = Some(StepFailure {
                        step: step.name().to_string(),
                        error,
                    });
                    break;
                }
            }
        }

        session.release().await;
        log.record(Outcome::Finish, "Bot execution completed");
        tracing::info!(
            "Run {} finished: {}/{} step(s) executed",
            report.run_id,
            report.executed,
            report.total
        );
        Ok(report)
    }
}

/// Owning handles for the run's external resources
#[derive(Default)]
struct Session {
    browser: Option<BrowserSession>,
    input: Option<Arc<dyn InputDevice>>,
}

impl Session {
    async fn acquire(
        &mut self,
        config: &Config,
        options: &SessionOptions,
        injected: Option<Arc<dyn InputDevice>>,
        log: &ActionLog,
    ) -> Result<()> {
        self.input = injected;

        if options.browser {
            let launch = LaunchOptions {
                headless: config.headless.unwrap_or(options.headless),
                viewport: resolve_viewport(options, self.input.as_deref()),
            };
            let browser = BrowserSession::launch(launch)
                .await
                .map_err(|e| BotError::Browser(e.to_string()))?;
            self.browser = Some(browser.clone());

            match &options.state {
                Some(name) => {
                    browser
                        .restore_state(&config.state_path(name))
                        .await
                        .map_err(|e| BotError::Resource(e.to_string()))?;
                    log.record(Outcome::Storage, format!("Loaded state {}", name));
                }
                None => log.record(Outcome::Storage, "No state name provided, creating new context"),
            }
        }

        if self.input.is_none() && options.desktop {
            let device = DesktopInput::connect().map_err(|e| BotError::Input(e.to_string()))?;
            self.input = Some(Arc::new(device));
        }
        Ok(())
    }

    /// Close the browser and let go of held input. Each handle is taken, so this runs once.
    async fn release(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
        }
        if let Some(device) = self.input.take() {
            if let Err(e) = device.release() {
                tracing::warn!("Failed to release input device: {}", e);
            }
        }
    }
}

fn resolve_viewport(options: &SessionOptions, device: Option<&dyn InputDevice>) -> Viewport {
    if let Some(viewport) = options.viewport {
        return viewport;
    }

    let screen = match device {
        Some(device) => device.screen_size().ok(),
        None if options.desktop => ScreenCapture::primary_screen_size().ok(),
        None => None,
    };
    screen
        .filter(|(w, h)| *w > 0 && *h > 0)
        .map(|(width, height)| Viewport { width, height })
        .unwrap_or_default()
}
