use crate::error::{classify, AgentError, ClassifyContext, FailureCause};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Upper bound on the trimmed goal length, in characters.
pub const MAX_GOAL_CHARS: usize = 500;
/// Upper bound on the optional context length, in characters.
pub const MAX_CONTEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Plan,
    Checklist,
    Email,
    SummaryActions,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Plan,
        OutputFormat::Checklist,
        OutputFormat::Email,
        OutputFormat::SummaryActions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Plan => "plan",
            OutputFormat::Checklist => "checklist",
            OutputFormat::Email => "email",
            OutputFormat::SummaryActions => "summary_actions",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                format!("unknown output format '{s}' (expected plan, checklist, email or summary_actions)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Friendly,
    Strict,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Professional, Tone::Friendly, Tone::Strict];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Strict => "strict",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tone '{s}' (expected professional, friendly or strict)"))
    }
}

/// A submitted goal plus formatting preferences. Wire shape of `POST /agent/run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub output_format: OutputFormat,
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

impl RunRequest {
    pub fn new(goal: impl Into<String>, output_format: OutputFormat, tone: Tone) -> Self {
        Self {
            goal: goal.into(),
            context: None,
            output_format,
            tone,
            constraints: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = Some(constraints.into_iter().map(Into::into).collect());
        self
    }

    /// Pre-flight checks that never touch the network or the simulator.
    pub fn validate(&self) -> Result<(), AgentError> {
        let goal = self.goal.trim();
        if goal.is_empty() {
            return Err(invalid("goal is required"));
        }
        let goal_len = goal.chars().count();
        if goal_len > MAX_GOAL_CHARS {
            return Err(invalid(format!(
                "goal must be at most {MAX_GOAL_CHARS} characters (got {goal_len})"
            )));
        }
        if let Some(context) = self.context.as_deref() {
            let context_len = context.chars().count();
            if context_len > MAX_CONTEXT_CHARS {
                return Err(invalid(format!(
                    "context must be at most {MAX_CONTEXT_CHARS} characters (got {context_len})"
                )));
            }
        }
        Ok(())
    }

    /// Trim the goal, drop blank context, and de-duplicate constraints keeping first occurrence.
    pub fn normalized(mut self) -> Self {
        self.goal = self.goal.trim().to_string();
        self.context = self.context.filter(|c| !c.trim().is_empty());
        if let Some(constraints) = self.constraints.take() {
            let mut unique: Vec<String> = Vec::with_capacity(constraints.len());
            for c in constraints {
                if !unique.contains(&c) {
                    unique.push(c);
                }
            }
            self.constraints = (!unique.is_empty()).then_some(unique);
        }
        self
    }

    /// Parse and validate an untyped request body.
    ///
    /// Bodies that are not JSON classify as `INVALID_JSON`; well-formed JSON with the
    /// wrong shape classifies as `VALIDATION_ERROR`.
    pub fn from_json_str(body: &str) -> Result<Self, AgentError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            classify(
                FailureCause::InvalidJson(e.to_string()),
                &ClassifyContext::default(),
            )
        })?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, AgentError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("request body must be a JSON object"))?;

        let goal = match obj.get("goal") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(invalid("goal must be a string")),
            None => return Err(invalid("goal is required")),
        };

        let output_format = match obj.get("outputFormat") {
            Some(Value::String(s)) => s.parse::<OutputFormat>().map_err(invalid)?,
            Some(_) => return Err(invalid("outputFormat must be a string")),
            None => return Err(invalid("outputFormat is required")),
        };

        let tone = match obj.get("tone") {
            Some(Value::String(s)) => s.parse::<Tone>().map_err(invalid)?,
            Some(_) => return Err(invalid("tone must be a string")),
            None => return Err(invalid("tone is required")),
        };

        let context = match obj.get("context") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(invalid("context must be a string")),
        };

        let constraints = match obj.get("constraints") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        _ => return Err(invalid("constraints must all be strings")),
                    }
                }
                Some(out)
            }
            Some(_) => return Err(invalid("constraints must be an array of strings")),
        };

        let request = RunRequest {
            goal,
            context,
            output_format,
            tone,
            constraints,
        };
        request.validate()?;
        Ok(request.normalized())
    }
}

fn invalid(message: impl Into<String>) -> AgentError {
    classify(
        FailureCause::Validation(message.into()),
        &ClassifyContext::default(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub content: Vec<String>,
}

/// Structured output of one completed run. Field order is the canonical export order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub status: ResultStatus,
    pub title: String,
    pub summary: String,
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStep {
    Validating,
    Calling,
    Generating,
    Finalizing,
    Complete,
    Error,
}

impl RunStep {
    /// Linear sequence walked by the simulated executor.
    pub const SEQUENCE: [RunStep; 5] = [
        RunStep::Validating,
        RunStep::Calling,
        RunStep::Generating,
        RunStep::Finalizing,
        RunStep::Complete,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStep::Complete | RunStep::Error)
    }

    /// Progress reached when entering the step at `index` of [`RunStep::SEQUENCE`].
    pub fn progress_at(index: usize) -> u8 {
        let total = Self::SEQUENCE.len();
        let pct = (index.min(total - 1) + 1) * 100 / total;
        pct as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStep::Validating => "Validating",
            RunStep::Calling => "Calling agent",
            RunStep::Generating => "Generating",
            RunStep::Finalizing => "Finalizing",
            RunStep::Complete => "Complete",
            RunStep::Error => "Error",
        }
    }
}

/// Transient progress event. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub current_step: RunStep,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
}

impl RunStatus {
    pub fn step(current_step: RunStep, progress: u8) -> Self {
        Self {
            current_step,
            progress: progress.min(100),
            error: None,
        }
    }

    pub fn failed(progress: u8, error: AgentError) -> Self {
        Self {
            current_step: RunStep::Error,
            progress: progress.min(100),
            error: Some(error),
        }
    }
}

/// Items delivered on a run's event stream. Exactly one of `Completed`/`Failed` ends it.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Status(RunStatus),
    Completed {
        // Boxed so the status variant stays small.
        result: Box<RunResult>,
    },
    Failed {
        error: AgentError,
    },
}

impl RunEvent {
    pub fn is_outcome(&self) -> bool {
        matches!(self, RunEvent::Completed { .. } | RunEvent::Failed { .. })
    }
}

/// A persisted pairing of a past request and its result. Identity is the `runId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub result: RunResult,
    pub request: RunRequest,
}

impl HistoryEntry {
    pub fn new(request: RunRequest, result: RunResult) -> Self {
        Self { result, request }
    }

    pub fn run_id(&self) -> &str {
        &self.result.run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn rejects_blank_and_oversized_goals() {
        let blank = RunRequest::new("   ", OutputFormat::Plan, Tone::Friendly);
        assert_eq!(
            blank.validate().unwrap_err().kind,
            ErrorKind::ValidationError
        );

        let long = RunRequest::new("x".repeat(MAX_GOAL_CHARS + 1), OutputFormat::Plan, Tone::Strict);
        assert_eq!(long.validate().unwrap_err().kind, ErrorKind::ValidationError);

        let padded = format!("  {}  ", "y".repeat(MAX_GOAL_CHARS));
        assert!(RunRequest::new(padded, OutputFormat::Email, Tone::Strict)
            .validate()
            .is_ok());
    }

    #[test]
    fn oversized_context_is_rejected() {
        let req = RunRequest::new("Plan it", OutputFormat::Plan, Tone::Professional)
            .with_context("c".repeat(MAX_CONTEXT_CHARS + 1));
        let err = req.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert!(err.message.contains("context"));
    }

    #[test]
    fn normalizing_trims_goal_and_dedups_constraints() {
        let req = RunRequest::new("  Ship it  ", OutputFormat::Checklist, Tone::Strict)
            .with_context("   ")
            .with_constraints(["budget", "time", "budget"])
            .normalized();
        assert_eq!(req.goal, "Ship it");
        assert_eq!(req.context, None);
        assert_eq!(
            req.constraints,
            Some(vec!["budget".to_string(), "time".to_string()])
        );
    }

    #[test]
    fn untyped_body_errors_are_classified() {
        let err = RunRequest::from_json_str("{not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidJson);

        let err = RunRequest::from_value(&json!({
            "goal": "Plan",
            "outputFormat": "poem",
            "tone": "friendly"
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);

        let err = RunRequest::from_value(&json!({
            "goal": "Plan",
            "outputFormat": "plan",
            "tone": "friendly",
            "constraints": ["ok", 3]
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert!(err.message.contains("constraints"));

        let err = RunRequest::from_value(&json!(["goal"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn untyped_body_round_trips_into_typed_request() {
        let req = RunRequest::from_json_str(
            r#"{"goal":" Plan a product launch ","outputFormat":"summary_actions","tone":"professional","constraints":["Budget-conscious"]}"#,
        )
        .unwrap();
        assert_eq!(req.goal, "Plan a product launch");
        assert_eq!(req.output_format, OutputFormat::SummaryActions);
        assert_eq!(req.tone, Tone::Professional);
        assert_eq!(req.constraints.as_deref(), Some(&["Budget-conscious".to_string()][..]));

        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["outputFormat"], "summary_actions");
        assert!(wire.get("context").is_none());
    }

    #[test]
    fn progress_follows_step_index() {
        let progress: Vec<u8> = (0..RunStep::SEQUENCE.len())
            .map(RunStep::progress_at)
            .collect();
        assert_eq!(progress, vec![20, 40, 60, 80, 100]);
        assert!(RunStep::Complete.is_terminal());
        assert!(!RunStep::Finalizing.is_terminal());
    }

    #[test]
    fn history_entry_flattens_result_fields() {
        let entry = HistoryEntry::new(
            RunRequest::new("Goal", OutputFormat::Email, Tone::Friendly),
            RunResult {
                run_id: "r1".into(),
                status: ResultStatus::Success,
                title: "T".into(),
                summary: "S".into(),
                sections: vec![],
                warnings: None,
                confidence: Some(0.9),
                created_at: "2026-01-01T00:00:00Z".into(),
            },
        );
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["runId"], "r1");
        assert_eq!(v["request"]["outputFormat"], "email");
        let back: HistoryEntry = serde_json::from_value(v).unwrap();
        assert_eq!(back, entry);
    }
}
