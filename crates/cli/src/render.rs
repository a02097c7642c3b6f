use colored::{ColoredString, Colorize};
use events::{Event, EventEnvelope};
use orchestrator::{MonitorSnapshot, Plan};
use sowcrew_core::{RunSummary, Task, TaskStatus};

pub fn status_label(status: TaskStatus) -> ColoredString {
    let label = format!("{:<9}", status.as_str());
    let label = label.as_str();
    match status {
        TaskStatus::Pending => label.dimmed(),
        TaskStatus::Assigned => label.cyan(),
        TaskStatus::Running => label.blue(),
        TaskStatus::Succeeded => label.green(),
        TaskStatus::Failed => label.red(),
        TaskStatus::Skipped => label.yellow(),
    }
}

/// One line of the live feed.
pub fn event_line(envelope: &EventEnvelope) -> String {
    let time = envelope.timestamp.format("%H:%M:%S").to_string().dimmed();
    let rendered = envelope.event.to_string();
    let text = rendered.as_str();
    let text = match &envelope.event {
        Event::TaskStatusChanged { to_status, .. } => match to_status {
            TaskStatus::Succeeded => text.green(),
            TaskStatus::Failed => text.red(),
            TaskStatus::Skipped => text.yellow(),
            _ => text.normal(),
        },
        Event::TaskRetryScheduled { .. } => text.yellow(),
        Event::AgentMessage { .. } | Event::LateResultDiscarded { .. } => text.dimmed(),
        Event::RunAborted { .. } | Event::RunCancelled { .. } => text.red().bold(),
        Event::RunStarted { .. } | Event::RunFinished { .. } => text.bold(),
    };
    format!("{} {}", time, text)
}

pub fn print_plan(plan: &Plan) {
    if !plan.preamble.is_empty() {
        let first = plan.preamble.lines().next().unwrap_or_default();
        println!("Overview: {}", first.dimmed());
        println!();
    }

    println!("Tasks ({}):", plan.entries.len());
    for entry in &plan.entries {
        let role = match &entry.role {
            Ok(name) => name.cyan(),
            Err(e) => e.to_string().as_str().red(),
        };
        println!("  {:<4} {}  → {}", entry.task.id.as_str().bold(), entry.task.title, role);
    }
}

pub fn print_summary(summary: &RunSummary) {
    let counts = format!(
        "{} succeeded, {} failed, {} skipped (of {})",
        summary.succeeded, summary.failed, summary.skipped, summary.total
    );
    let line = counts.as_str();
    let line = if summary.is_clean() {
        line.green()
    } else if summary.failed > 0 {
        line.red()
    } else {
        line.yellow()
    };
    println!("Summary: {}", line);
    if summary.cancelled {
        println!("         {}", "run was cancelled".yellow());
    }
}

pub fn print_tasks(tasks: &[Task]) {
    for task in tasks {
        let role = task.assigned_role.as_deref().unwrap_or("-");
        println!(
            "  {} {:<4} {} [{}]",
            status_label(task.status),
            task.id.as_str(),
            task.title,
            role.cyan()
        );
        if let Some(ref reason) = task.failure_reason {
            println!("                 {}", reason.dimmed());
        }
    }
}

pub fn print_snapshot(snapshot: &MonitorSnapshot) {
    if !snapshot.tasks.is_empty() {
        println!("Tasks:");
        for view in &snapshot.tasks {
            let detail = view.detail.as_deref().unwrap_or_default();
            println!(
                "  {} {:<4} {}",
                status_label(view.status),
                view.task_id.as_str(),
                detail.dimmed()
            );
        }
        println!();
    }

    println!("Events (last {}):", snapshot.recent.len());
    for line in &snapshot.recent {
        println!("  {}", line);
    }
}
