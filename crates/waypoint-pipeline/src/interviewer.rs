//! Interviewer trait and built-in implementations for human gates.
//!
//! The file-based interviewer implements the on-disk gate protocol: a
//! pending gate is `<gates_root>/<gate_id>/question.json` plus a `pending`
//! sentinel file naming the gate id; the answer arrives as `answer.json`
//! in the same directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use waypoint_types::{Result, WaypointError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleSelect,
    FreeText,
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
}

impl Question {
    pub fn single_select(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            question_type: QuestionType::SingleSelect,
            options,
        }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            question_type: QuestionType::FreeText,
            options: Vec::new(),
        }
    }

    pub fn confirm(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            question_type: QuestionType::Confirm,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// When the answer maps onto an option, a single-element array carrying
    /// the canonical option string.
    #[serde(default)]
    pub selected_options: Vec<String>,
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn ask(&self, question: &Question, cancel: &CancellationToken) -> Result<Answer>;
}

// ---------------------------------------------------------------------------
// AutoApproveInterviewer
// ---------------------------------------------------------------------------

/// Headless interviewer for tests and unattended runs: picks the first
/// option, answers "yes" to confirmations, and leaves free text empty.
pub struct AutoApproveInterviewer;

#[async_trait]
impl Interviewer for AutoApproveInterviewer {
    async fn ask(&self, question: &Question, _cancel: &CancellationToken) -> Result<Answer> {
        Ok(match question.question_type {
            QuestionType::SingleSelect => {
                let choice = question.options.first().cloned().unwrap_or_default();
                Answer {
                    text: choice.clone(),
                    selected_options: if choice.is_empty() {
                        Vec::new()
                    } else {
                        vec![choice]
                    },
                }
            }
            QuestionType::Confirm => Answer {
                text: "yes".into(),
                selected_options: Vec::new(),
            },
            QuestionType::FreeText => Answer::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// ConsoleInterviewer
// ---------------------------------------------------------------------------

/// Interactive interviewer reading from stdin.
pub struct ConsoleInterviewer;

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question, _cancel: &CancellationToken) -> Result<Answer> {
        println!("\n{}", question.text);
        for (i, option) in question.options.iter().enumerate() {
            println!("  [{}] {}", i + 1, option);
        }
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(WaypointError::Io)?;
        let trimmed = input.trim();
        if let Ok(idx) = trimmed.parse::<usize>() {
            if idx > 0 && idx <= question.options.len() {
                let choice = question.options[idx - 1].clone();
                return Ok(Answer {
                    text: choice.clone(),
                    selected_options: vec![choice],
                });
            }
        }
        Ok(Answer {
            text: trimmed.to_string(),
            selected_options: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingInterviewer (test double)
// ---------------------------------------------------------------------------

/// Plays back preset answers and records the questions it was asked.
pub struct RecordingInterviewer {
    answers: std::sync::Mutex<Vec<Answer>>,
    questions: std::sync::Mutex<Vec<Question>>,
}

impl RecordingInterviewer {
    pub fn new(answers: Vec<Answer>) -> Self {
        let mut reversed = answers;
        reversed.reverse();
        Self {
            answers: std::sync::Mutex::new(reversed),
            questions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<Question> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Interviewer for RecordingInterviewer {
    async fn ask(&self, question: &Question, _cancel: &CancellationToken) -> Result<Answer> {
        self.questions.lock().unwrap().push(question.clone());
        let answer = self.answers.lock().unwrap().pop().unwrap_or_else(|| {
            let choice = question.options.first().cloned().unwrap_or_default();
            Answer {
                text: choice.clone(),
                selected_options: if choice.is_empty() {
                    Vec::new()
                } else {
                    vec![choice]
                },
            }
        });
        Ok(answer)
    }
}

// ---------------------------------------------------------------------------
// FileBasedInterviewer — the on-disk gate protocol
// ---------------------------------------------------------------------------

/// On-disk question.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateQuestion {
    pub gate_id: String,
    pub text: String,
    pub options: Vec<String>,
}

/// Name of the sentinel file holding the open gate's id.
pub const PENDING_FILE: &str = "pending";

/// Writes `question.json` + the `pending` sentinel, then polls for
/// `answer.json`. Polling honors cancellation; a consumed answer removes
/// the sentinel.
pub struct FileBasedInterviewer {
    gates_root: PathBuf,
    counter: AtomicU64,
    poll_interval: Duration,
}

impl FileBasedInterviewer {
    pub fn new(gates_root: impl Into<PathBuf>) -> Self {
        Self {
            gates_root: gates_root.into(),
            counter: AtomicU64::new(1),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn next_gate_id(&self) -> String {
        format!("gate-{:04}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Interviewer for FileBasedInterviewer {
    async fn ask(&self, question: &Question, cancel: &CancellationToken) -> Result<Answer> {
        let gate_id = self.next_gate_id();
        let gate_dir = self.gates_root.join(&gate_id);
        tokio::fs::create_dir_all(&gate_dir).await?;

        let on_disk = GateQuestion {
            gate_id: gate_id.clone(),
            text: question.text.clone(),
            options: question.options.clone(),
        };
        tokio::fs::write(
            gate_dir.join("question.json"),
            serde_json::to_string_pretty(&on_disk)?,
        )
        .await?;
        tokio::fs::write(self.gates_root.join(PENDING_FILE), &gate_id).await?;
        tracing::info!(gate = %gate_id, "Gate opened, waiting for answer");

        let answer_path = gate_dir.join("answer.json");
        loop {
            if tokio::fs::try_exists(&answer_path).await? {
                // A partially written answer parses later; keep polling
                if let Ok(json) = tokio::fs::read_to_string(&answer_path).await {
                    if let Ok(answer) = serde_json::from_str::<Answer>(&json) {
                        let _ = tokio::fs::remove_file(self.gates_root.join(PENDING_FILE)).await;
                        tracing::info!(gate = %gate_id, "Gate answered");
                        return Ok(answer);
                    }
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Err(WaypointError::Cancelled),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
