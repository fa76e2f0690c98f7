//! Local stand-in for the Backend Agent Service.
//!
//! Walks `validating → calling → generating → finalizing → complete` with a randomized
//! pause between steps and an optional injected fault before the final step. The abort
//! signal is only inspected at checkpoints (before each emitted step), so a cancel that
//! arrives mid-pause is observed when that pause ends.

use super::{AbortSignal, EventSink};
use crate::error::FailureCause;
use crate::model::{
    OutputFormat, ResultStatus, RunRequest, RunResult, RunStatus, RunStep, Section,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

pub(crate) const INJECTED_FAULT_MESSAGE: &str =
    "Agent encountered an unexpected error. Please try again.";
const CONSTRAINT_WARNING: &str = "Some constraints may affect the scope of recommendations";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability in `[0, 1]` that a run ends in `AGENT_ERROR` before completing.
    pub fault_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Fixed seed for reproducible delays, faults and run ids.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fault_rate: 0.1,
            min_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(1200),
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// No pauses and no faults.
    pub fn instant() -> Self {
        Self {
            fault_rate: 0.0,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            seed: None,
        }
    }

    pub fn with_fault_rate(mut self, fault_rate: f64) -> Self {
        self.fault_rate = fault_rate;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self.max_delay = delay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self, run_seq: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(run_seq)),
            None => StdRng::from_entropy(),
        }
    }

    fn pick_delay(&self, rng: &mut StdRng) -> Duration {
        let lo = self.min_delay.as_nanos().min(u64::MAX as u128) as u64;
        let hi = self.max_delay.as_nanos().min(u64::MAX as u128) as u64;
        if hi <= lo {
            return Duration::from_nanos(lo);
        }
        Duration::from_nanos(rng.gen_range(lo..=hi))
    }
}

pub(crate) async fn run(
    cfg: &SimulatorConfig,
    run_seq: u64,
    request: &RunRequest,
    signal: &AbortSignal,
    sink: &EventSink,
) -> Result<RunResult, FailureCause> {
    let mut rng = cfg.rng(run_seq);
    let last = RunStep::SEQUENCE.len() - 1;

    for (index, step) in RunStep::SEQUENCE[..last].iter().enumerate() {
        signal.checkpoint()?;
        let progress = RunStep::progress_at(index);
        tracing::debug!(run_seq, step = ?step, progress, "simulated step");
        sink.status(RunStatus::step(*step, progress));
        tokio::time::sleep(cfg.pick_delay(&mut rng)).await;
    }

    signal.checkpoint()?;

    let fault_rate = cfg.fault_rate.clamp(0.0, 1.0);
    if rng.gen::<f64>() < fault_rate {
        tracing::debug!(run_seq, fault_rate, "injecting simulated fault");
        return Err(FailureCause::AgentFault(INJECTED_FAULT_MESSAGE.to_string()));
    }

    let result = build_result(request, &mut rng);
    sink.status(RunStatus::step(RunStep::Complete, RunStep::progress_at(last)));
    Ok(result)
}

fn build_result(request: &RunRequest, rng: &mut StdRng) -> RunResult {
    let (title, summary, sections) = template(request.output_format);
    let has_constraints = request
        .constraints
        .as_ref()
        .is_some_and(|c| !c.is_empty());
    let run_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();

    RunResult {
        run_id: run_id.to_string(),
        status: ResultStatus::Success,
        title: title.to_string(),
        summary: summary.to_string(),
        sections,
        warnings: has_constraints.then(|| vec![CONSTRAINT_WARNING.to_string()]),
        confidence: Some(0.85 + rng.gen::<f64>() * 0.1),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
    }
}

fn section(heading: &str, content: &[&str]) -> Section {
    Section {
        heading: heading.to_string(),
        content: content.iter().map(|s| s.to_string()).collect(),
    }
}

fn template(format: OutputFormat) -> (&'static str, &'static str, Vec<Section>) {
    match format {
        OutputFormat::Plan => (
            "Strategic Action Plan",
            "A comprehensive plan has been generated based on your goals and context. This plan outlines key phases, milestones, and actionable steps to achieve your objective efficiently.",
            vec![
                section(
                    "Phase 1: Foundation",
                    &[
                        "Conduct initial research and gather requirements",
                        "Define success metrics and KPIs",
                        "Assemble core team and assign responsibilities",
                        "Set up communication channels and workflows",
                    ],
                ),
                section(
                    "Phase 2: Development",
                    &[
                        "Create detailed project timeline with milestones",
                        "Begin iterative development cycles",
                        "Implement feedback loops for continuous improvement",
                        "Document progress and learnings",
                    ],
                ),
                section(
                    "Phase 3: Launch & Review",
                    &[
                        "Prepare launch checklist and contingencies",
                        "Execute soft launch with limited audience",
                        "Gather feedback and iterate",
                        "Full rollout with monitoring in place",
                    ],
                ),
            ],
        ),
        OutputFormat::Checklist => (
            "Action Checklist",
            "Your goal has been broken down into actionable items. Complete each task in order for best results.",
            vec![
                section(
                    "Preparation",
                    &[
                        "Review all available resources and documentation",
                        "Clear your schedule for focused work",
                        "Set up your workspace and tools",
                        "Notify relevant stakeholders",
                    ],
                ),
                section(
                    "Execution",
                    &[
                        "Complete the primary objective first",
                        "Handle secondary tasks in priority order",
                        "Document any blockers or issues",
                        "Request help if stuck for more than 30 minutes",
                    ],
                ),
                section(
                    "Follow-up",
                    &[
                        "Review completed work for quality",
                        "Update relevant documentation",
                        "Share results with stakeholders",
                        "Schedule next steps if needed",
                    ],
                ),
            ],
        ),
        OutputFormat::Email => (
            "Email Draft",
            "A professional email draft has been generated based on your context and tone preferences.",
            vec![
                section("Subject Line", &["Re: Follow-up on Our Recent Discussion"]),
                section(
                    "Email Body",
                    &[
                        "Dear [Recipient],",
                        "I hope this message finds you well. Following up on our recent conversation, I wanted to provide you with a comprehensive update on the progress we've made.",
                        "We have successfully completed the initial phases and are now moving forward with implementation. The team has been working diligently to ensure we meet our agreed-upon timelines.",
                        "Please let me know if you have any questions or would like to schedule a call to discuss further.",
                        "Best regards,",
                        "[Your Name]",
                    ],
                ),
            ],
        ),
        OutputFormat::SummaryActions => (
            "Summary & Action Items",
            "Your input has been analyzed and distilled into a clear summary with specific action items.",
            vec![
                section(
                    "Executive Summary",
                    &[
                        "The primary objective focuses on achieving measurable outcomes within the defined constraints.",
                        "Key success factors have been identified and prioritized.",
                        "Resource allocation has been optimized for maximum efficiency.",
                    ],
                ),
                section(
                    "Immediate Actions",
                    &[
                        "Schedule kickoff meeting with all stakeholders",
                        "Finalize resource allocation and budget approval",
                        "Create project timeline with key milestones",
                    ],
                ),
                section(
                    "Next Steps",
                    &[
                        "Review and approve proposed action items",
                        "Assign owners to each action item",
                        "Set up progress tracking and reporting",
                    ],
                ),
            ],
        ),
    }
}
