// ABOUTME: Per-run state passed explicitly through every stage.
// ABOUTME: Owns the action log, terminal output, collected warnings and the current stage.

use super::outcome::PipelineOutcome;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{INTERRUPTED_EXIT_CODE, PipelineError, Stage};
use crate::log::ActionLog;
use crate::output::Output;

/// How a run ended.
#[derive(Debug)]
pub enum Completion {
    Succeeded { summary: String },
    Failed(PipelineError),
    Interrupted,
}

pub struct RunContext {
    log: ActionLog,
    output: Output,
    diagnostics: Diagnostics,
    stage: Option<Stage>,
}

impl RunContext {
    pub fn new(log: ActionLog, output: Output) -> Self {
        Self {
            log,
            output,
            diagnostics: Diagnostics::default(),
            stage: None,
        }
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Stage currently running, if any has started.
    pub fn current_stage(&self) -> Option<Stage> {
        self.stage
    }

    /// Mark the start of `stage`.
    pub fn enter(&mut self, stage: Stage) {
        self.stage = Some(stage);
        self.log.info(&format!("stage: {stage}"));
        self.output.progress(&format!("==> {stage}"));
    }

    /// Record a step within the current stage.
    pub fn step(&self, message: &str) {
        self.log.info(message);
        self.output.progress(&format!("    {}", self.log.redact(message)));
    }

    /// Record a non-fatal problem.
    pub fn warn(&mut self, warning: Warning) {
        self.log.warn(&warning.message);
        self.diagnostics.warn(Warning {
            kind: warning.kind,
            message: self.log.redact(&warning.message),
        });
    }

    /// Close the run: write the outcome line, report to the terminal and build the outcome.
    pub fn finish(self, completion: Completion) -> PipelineOutcome {
        let warnings: Vec<String> = self
            .diagnostics
            .warnings()
            .iter()
            .map(|w| w.message.clone())
            .collect();
        for warning in &warnings {
            self.output.warning(warning);
        }

        let outcome = match completion {
            Completion::Succeeded { summary } => {
                let message = self.log.redact(&summary);
                self.log.info(&format!("outcome: success: {message}"));
                self.output.success(&message);
                PipelineOutcome {
                    success: true,
                    failed_stage: None,
                    exit_code: 0,
                    log_path: self.log.path().to_path_buf(),
                    message,
                    warnings,
                }
            }
            Completion::Failed(error) => {
                let stage = error.stage();
                let message = self.log.redact(&error.to_string());
                self.log.error(&format!(
                    "outcome: {} during '{stage}': {message}",
                    stage.failure_kind()
                ));
                self.output.error(&format!(
                    "{} during '{stage}': {message}\nDetails: {}",
                    stage.failure_kind(),
                    self.log.path().display()
                ));
                PipelineOutcome {
                    success: false,
                    failed_stage: Some(stage.failure_kind().to_string()),
                    exit_code: error.exit_code(),
                    log_path: self.log.path().to_path_buf(),
                    message,
                    warnings,
                }
            }
            Completion::Interrupted => {
                let message = match self.stage {
                    Some(stage) => format!("interrupted during '{stage}'"),
                    None => "interrupted before any stage started".to_string(),
                };
                self.log.error(&format!("outcome: {message}"));
                self.output.error(&format!(
                    "{message}\nDetails: {}",
                    self.log.path().display()
                ));
                PipelineOutcome {
                    success: false,
                    failed_stage: Some("interrupted".to_string()),
                    exit_code: INTERRUPTED_EXIT_CODE,
                    log_path: self.log.path().to_path_buf(),
                    message,
                    warnings,
                }
            }
        };

        self.output.report(&outcome);
        outcome
    }
}
