//! Verification loop orchestrator
//!
//! Runs the bounded build, diagnose, fix, apply, reverify cycle. One loop
//! instance at a time, cycles strictly sequential, at most one build, one
//! fix request, and one patch application per cycle. The loop never errors
//! out: every run ends in a `LoopResult` carrying the full cycle history.

use crate::buffer::{apply_ranged_replacement, whole_buffer_range, LineBuffer};
use crate::build::{BuildOutput, BuildRunner};
use crate::diagnostics::{self, Diagnostic};
use crate::diff::{self, DiffStats};
use crate::error::BuildError;
use crate::rpc::{FixRequest, FixResponse, RpcClient, Tool};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Phase of the loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Building,
    AwaitingFix,
    Applying,
    Verifying,
    Succeeded,
    PartiallyFixed,
    Failed,
    Cancelled,
}

/// Final outcome of a loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Succeeded,
    PartiallyFixed,
    Failed,
    Cancelled,
}

impl LoopStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LoopStatus::Succeeded => "succeeded",
            LoopStatus::PartiallyFixed => "partially fixed",
            LoopStatus::Failed => "failed",
            LoopStatus::Cancelled => "cancelled",
        }
    }
}

/// Terminal outcome of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// Build reported zero error diagnostics.
    Clean,
    /// A fix was obtained and applied to the buffer.
    Fixed,
    /// The build exceeded its time budget; no fix was requested.
    BuildTimedOut,
    /// The build could not be run at all.
    BuildFailed,
    /// No usable fix could be obtained from the service.
    FixFailed,
    /// The fix could not be applied to the buffer.
    ApplyFailed,
    /// Cancellation was observed mid-cycle.
    Cancelled,
}

impl CycleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CycleStatus::Clean => "clean",
            CycleStatus::Fixed => "fix applied",
            CycleStatus::BuildTimedOut => "build timed out",
            CycleStatus::BuildFailed => "build failed to run",
            CycleStatus::FixFailed => "no usable fix",
            CycleStatus::ApplyFailed => "fix could not be applied",
            CycleStatus::Cancelled => "cancelled",
        }
    }
}

/// Record of one completed cycle, kept for reporting only.
#[derive(Debug, Clone)]
pub struct CycleState {
    pub cycle: u32,
    pub diagnostics_at_start: usize,
    pub fixes_applied: u32,
    pub status: CycleStatus,
    pub duration: Duration,
}

/// Summary of a full loop run.
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub cycles_run: u32,
    pub history: Vec<CycleState>,
    /// Error diagnostics remaining after the last build.
    pub diagnostics_at_end: usize,
    /// Distinct diagnostic signatures seen across all cycles.
    pub unique_diagnostics: usize,
    /// Signatures that recurred in more than one cycle.
    pub repeated_diagnostics: usize,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

impl LoopResult {
    pub fn fixes_applied(&self) -> u32 {
        self.history.iter().map(|c| c.fixes_applied).sum()
    }

    /// Human-readable report of the run.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Verification loop {}\n", self.status.label()));
        let elapsed = (self.finished - self.started).num_milliseconds() as f64 / 1000.0;
        out.push_str(&format!(
            "Cycles run: {} in {:.1}s\n",
            self.cycles_run, elapsed
        ));
        out.push_str(&format!("Fixes applied: {}\n", self.fixes_applied()));
        out.push_str(&format!(
            "Diagnostics remaining: {}\n",
            self.diagnostics_at_end
        ));
        if self.repeated_diagnostics > 0 {
            out.push_str(&format!(
                "Recurring diagnostics: {} of {} unique\n",
                self.repeated_diagnostics, self.unique_diagnostics
            ));
        }
        for cycle in &self.history {
            out.push_str(&format!(
                "  cycle {}: {} diagnostics, {} ({:.1}s)\n",
                cycle.cycle,
                cycle.diagnostics_at_start,
                cycle.status.label(),
                cycle.duration.as_secs_f64()
            ));
        }
        out
    }
}

/// Progress messages delivered over a channel so the foreground can report
/// while the loop runs in the background.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    PhaseChanged(LoopPhase),
    CycleStarted { cycle: u32, max_cycles: u32 },
    BuildFinished { errors: usize, warnings: usize },
    FixApplied { stats: DiffStats },
    CycleFinished { cycle: u32, status: CycleStatus },
    Finished(LoopStatus),
}

/// Knobs for one loop run.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub max_cycles: u32,
    pub language: String,
    pub include_warnings: bool,
    pub reverify_after_apply: bool,
    /// Fixes below this confidence are treated as unusable.
    pub min_confidence: f64,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            language: "swift".to_string(),
            include_warnings: false,
            reverify_after_apply: true,
            min_confidence: 0.0,
        }
    }
}

impl From<&crate::config::Config> for LoopOptions {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            max_cycles: config.max_cycles,
            language: config.language.clone(),
            include_warnings: config.include_warnings,
            reverify_after_apply: config.reverify_after_apply,
            min_confidence: config.min_confidence,
        }
    }
}

pub struct VerificationLoop {
    runner: Arc<dyn BuildRunner>,
    client: RpcClient,
    options: LoopOptions,
    cancel: Arc<AtomicBool>,
    events: Option<Sender<LoopEvent>>,
}

impl VerificationLoop {
    pub fn new(runner: Arc<dyn BuildRunner>, client: RpcClient, options: LoopOptions) -> Self {
        Self {
            runner,
            client,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    /// Attach a progress channel. Events are best-effort; a dropped receiver
    /// never stalls the loop.
    pub fn with_events(mut self, sender: Sender<LoopEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Use an externally owned cancellation flag, e.g. one wired to a
    /// signal handler.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Shared flag that requests cooperative cancellation. Checked only at
    /// phase boundaries; an in-flight build or RPC call completes first.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn phase(&self, phase: LoopPhase) {
        self.emit(LoopEvent::PhaseChanged(phase));
    }

    /// Run the loop against `project`, reading and fixing the code held in
    /// `buffer`. All buffer mutation happens here, on the calling task.
    pub async fn run(&self, project: &Path, buffer: &mut dyn LineBuffer) -> LoopResult {
        let started = Utc::now();
        self.phase(LoopPhase::Idle);

        let mut history: Vec<CycleState> = Vec::new();
        let mut signature_cycles: HashMap<String, u32> = HashMap::new();
        let mut diagnostics_at_end = 0usize;
        let mut any_fix_applied = false;
        let mut status: Option<LoopStatus> = None;

        for cycle in 1..=self.options.max_cycles {
            if self.cancelled() {
                status = Some(LoopStatus::Cancelled);
                break;
            }

            let cycle_start = Instant::now();
            self.emit(LoopEvent::CycleStarted {
                cycle,
                max_cycles: self.options.max_cycles,
            });
            self.phase(LoopPhase::Building);

            let output = match self.run_build(project).await {
                Ok(output) => output,
                Err(e) => {
                    let cycle_status = match e {
                        BuildError::Timeout(_) => CycleStatus::BuildTimedOut,
                        BuildError::Spawn(_) => CycleStatus::BuildFailed,
                    };
                    history.push(CycleState {
                        cycle,
                        diagnostics_at_start: 0,
                        fixes_applied: 0,
                        status: cycle_status,
                        duration: cycle_start.elapsed(),
                    });
                    self.emit(LoopEvent::CycleFinished {
                        cycle,
                        status: cycle_status,
                    });
                    continue;
                }
            };

            let all = diagnostics::parse(&output.raw_output);
            let errors = diagnostics::errors_only(&all);
            let warnings = all.len() - errors.len();
            for diag in &errors {
                *signature_cycles.entry(diag.signature()).or_insert(0) += 1;
            }
            diagnostics_at_end = errors.len();
            self.emit(LoopEvent::BuildFinished {
                errors: errors.len(),
                warnings,
            });

            if errors.is_empty() && output.success {
                history.push(CycleState {
                    cycle,
                    diagnostics_at_start: 0,
                    fixes_applied: 0,
                    status: CycleStatus::Clean,
                    duration: cycle_start.elapsed(),
                });
                self.emit(LoopEvent::CycleFinished {
                    cycle,
                    status: CycleStatus::Clean,
                });
                status = Some(LoopStatus::Succeeded);
                break;
            }

            let for_fix: Vec<Diagnostic> = if self.options.include_warnings {
                all.clone()
            } else {
                errors.clone()
            };
            let diagnostics_at_start = for_fix.len();

            if self.cancelled() {
                history.push(CycleState {
                    cycle,
                    diagnostics_at_start,
                    fixes_applied: 0,
                    status: CycleStatus::Cancelled,
                    duration: cycle_start.elapsed(),
                });
                status = Some(LoopStatus::Cancelled);
                break;
            }

            // A failing build with no parseable errors still needs a fix
            // attempt; the raw tail gives the service something to work with.
            self.phase(LoopPhase::AwaitingFix);
            let response = match self.request_fix(buffer, for_fix, &output).await {
                Ok(response) => response,
                Err(msg) => {
                    history.push(CycleState {
                        cycle,
                        diagnostics_at_start,
                        fixes_applied: 0,
                        status: CycleStatus::FixFailed,
                        duration: cycle_start.elapsed(),
                    });
                    self.emit(LoopEvent::CycleFinished {
                        cycle,
                        status: CycleStatus::FixFailed,
                    });
                    eprintln!("  Fix request failed: {}", msg);
                    status = Some(LoopStatus::Failed);
                    break;
                }
            };

            let Some(fixed_code) = response.usable_code(self.options.min_confidence) else {
                history.push(CycleState {
                    cycle,
                    diagnostics_at_start,
                    fixes_applied: 0,
                    status: CycleStatus::FixFailed,
                    duration: cycle_start.elapsed(),
                });
                self.emit(LoopEvent::CycleFinished {
                    cycle,
                    status: CycleStatus::FixFailed,
                });
                status = Some(LoopStatus::Failed);
                break;
            };

            if self.cancelled() {
                history.push(CycleState {
                    cycle,
                    diagnostics_at_start,
                    fixes_applied: 0,
                    status: CycleStatus::Cancelled,
                    duration: cycle_start.elapsed(),
                });
                status = Some(LoopStatus::Cancelled);
                break;
            }

            self.phase(LoopPhase::Applying);
            let before = buffer_text(buffer);
            let range = whole_buffer_range(buffer);
            if apply_ranged_replacement(buffer, range, fixed_code).is_err() {
                history.push(CycleState {
                    cycle,
                    diagnostics_at_start,
                    fixes_applied: 0,
                    status: CycleStatus::ApplyFailed,
                    duration: cycle_start.elapsed(),
                });
                self.emit(LoopEvent::CycleFinished {
                    cycle,
                    status: CycleStatus::ApplyFailed,
                });
                status = Some(LoopStatus::Failed);
                break;
            }

            let diff = diff::generate_diff(&before, fixed_code);
            self.emit(LoopEvent::FixApplied { stats: diff.stats });
            any_fix_applied = true;

            if self.options.reverify_after_apply {
                self.phase(LoopPhase::Verifying);
            }

            history.push(CycleState {
                cycle,
                diagnostics_at_start,
                fixes_applied: 1,
                status: CycleStatus::Fixed,
                duration: cycle_start.elapsed(),
            });
            self.emit(LoopEvent::CycleFinished {
                cycle,
                status: CycleStatus::Fixed,
            });
        }

        // Budget exhausted without a clean build.
        let status = status.unwrap_or(if any_fix_applied {
            LoopStatus::PartiallyFixed
        } else {
            LoopStatus::Failed
        });

        self.phase(match status {
            LoopStatus::Succeeded => LoopPhase::Succeeded,
            LoopStatus::PartiallyFixed => LoopPhase::PartiallyFixed,
            LoopStatus::Failed => LoopPhase::Failed,
            LoopStatus::Cancelled => LoopPhase::Cancelled,
        });
        self.emit(LoopEvent::Finished(status));

        let unique_diagnostics = signature_cycles.len();
        let repeated_diagnostics = signature_cycles.values().filter(|&&n| n > 1).count();

        LoopResult {
            status,
            cycles_run: history.len() as u32,
            history,
            diagnostics_at_end,
            unique_diagnostics,
            repeated_diagnostics,
            started,
            finished: Utc::now(),
        }
    }

    /// One build pass on the blocking pool so the runtime stays responsive.
    async fn run_build(&self, project: &Path) -> Result<BuildOutput, BuildError> {
        let runner = self.runner.clone();
        let project: PathBuf = project.to_path_buf();
        tokio::task::spawn_blocking(move || runner.run(&project))
            .await
            .map_err(|e| BuildError::Spawn(e.to_string()))?
    }

    /// One fix request for the current buffer contents.
    async fn request_fix(
        &self,
        buffer: &dyn LineBuffer,
        diagnostics: Vec<Diagnostic>,
        output: &BuildOutput,
    ) -> Result<FixResponse, String> {
        let instructions = if diagnostics.is_empty() {
            Some(format!(
                "Build failed without parseable diagnostics. Raw output tail:\n{}",
                crate::util::truncate(&output.raw_output, 2000)
            ))
        } else {
            None
        };

        let request = FixRequest {
            code: buffer_text(buffer),
            diagnostics,
            language: self.options.language.clone(),
            instructions,
        };

        let args = request.into_args();
        Tool::Fix
            .validate_args(&args)
            .map_err(|e| e.to_string())?;
        let result = self
            .client
            .call_tool(Tool::Fix.name(), args)
            .await
            .map_err(|e| e.to_string())?;
        Ok(FixResponse::from_result(&result))
    }
}

fn buffer_text(buffer: &dyn LineBuffer) -> String {
    (0..buffer.line_count())
        .filter_map(|i| buffer.line(i))
        .collect::<Vec<_>>()
        .join("\n")
}
