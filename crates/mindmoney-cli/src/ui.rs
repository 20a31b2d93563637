use console::{style, Emoji};
use mindmoney_core::PlanProgress;
use mindmoney_schema::{
    ActionItem, AgentTraceStep, ChatTurn, ProfileFormSchema, PriorityScore, Role, SessionSummary,
    TraceStatus,
};

pub static CHECKMARK: Emoji<'_, '_> = Emoji("✅ ", "[x] ");
pub static CIRCLE: Emoji<'_, '_> = Emoji("○ ", "[ ] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
pub static ARROW: Emoji<'_, '_> = Emoji("➜  ", "-> ");
pub static BRAIN: Emoji<'_, '_> = Emoji("🧠 ", "");

pub fn priority_label(score: PriorityScore) -> &'static str {
    if score >= PriorityScore::HIGH {
        "high"
    } else if score == PriorityScore::MEDIUM {
        "medium"
    } else {
        "low"
    }
}

pub fn render_step(step: &AgentTraceStep) -> String {
    let marker = match step.status {
        TraceStatus::Complete => CHECKMARK,
        TraceStatus::Active => CIRCLE,
        TraceStatus::Failed => CROSS,
    };
    let mut line = format!(
        "  {}{}: {}",
        marker,
        style(&step.source_agent_name).bold(),
        step.reasoning_text
    );
    if let Some(output) = step.result_summary.as_deref().filter(|o| !o.is_empty()) {
        line.push_str(&format!(" {}{}", ARROW, style(output).dim()));
    }
    line
}

pub fn render_turn(turn: &ChatTurn) -> String {
    match turn.role {
        Role::User => format!("{} {}", style("you:").cyan().bold(), turn.text),
        Role::Assistant => format!("{} {}", style("coach:").green().bold(), turn.text),
    }
}

pub fn render_actions(items: &[ActionItem], progress: PlanProgress) -> Vec<String> {
    if items.is_empty() {
        return vec!["No action items yet. Ask the coach for a plan.".to_string()];
    }

    let mut lines = vec![format!(
        "{}Action plan: {}/{} done ({}%)",
        BRAIN, progress.completed, progress.total, progress.percent
    )];
    for item in items {
        let marker = if item.is_completed { CHECKMARK } else { CIRCLE };
        let description = if item.is_completed {
            style(&item.description).dim().to_string()
        } else {
            item.description.clone()
        };
        lines.push(format!("  {}{}", marker, description));
        lines.push(format!(
            "      id {} | {} | {} | {} priority",
            item.id,
            item.deadline_label,
            item.difficulty.as_str(),
            priority_label(item.priority_score())
        ));
        if !item.impact_summary.is_empty() {
            lines.push(format!("      impact: {}", item.impact_summary));
        }
    }
    lines
}

pub fn render_form(schema: &ProfileFormSchema) -> Vec<String> {
    let mut lines = vec![style(&schema.title).bold().to_string()];
    if !schema.description.is_empty() {
        lines.push(schema.description.clone());
    }
    for (_, section) in &schema.sections {
        lines.push(String::new());
        lines.push(format!("{}", style(&section.title).underlined()));
        for field in &section.fields {
            let required = if field.required { "*" } else { "" };
            let mut line = format!(
                "  {}{} ({})",
                field.label,
                required,
                String::from(field.field_type.clone())
            );
            if let Some(prefix) = field.unit_prefix() {
                line.push_str(&format!(" in {prefix}"));
            }
            if let Some(options) = field.options.as_ref().filter(|o| !o.is_empty()) {
                line.push_str(&format!(": {}", options.join(" / ")));
            }
            if let Some(placeholder) = field.placeholder.as_deref() {
                line.push_str(&format!(" e.g. {placeholder}"));
            }
            lines.push(line);
        }
    }
    lines
}

pub fn render_session(summary: &SessionSummary) -> String {
    let when = summary
        .last_message_at
        .as_deref()
        .or(summary.created_at.as_deref())
        .unwrap_or("-");
    let preview = summary.preview.as_deref().unwrap_or("");
    format!("  {}  {}  {}", summary.session_id, style(when).dim(), preview)
}
