use chrono::{DateTime, Local};

use super::backend::{ModuleSnapshot, VideoProgress};

pub(crate) fn completion_percentage(progress: &VideoProgress) -> u16 {
    if !progress.last_position.is_finite() {
        return 0;
    }
    progress.last_position.round().clamp(0.0, 100.0) as u16
}

pub(crate) fn completion_label(progress: &VideoProgress) -> &'static str {
    if progress.completed {
        "Completed"
    } else {
        "In Progress"
    }
}

/// Locators handed to the player for a module page: the module's single video.
pub(crate) fn module_locators(snapshot: &ModuleSnapshot) -> Vec<String> {
    vec![snapshot.progress.video.url.clone()]
}

pub(crate) fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub(crate) fn format_module_summary(snapshot: &ModuleSnapshot) -> String {
    let module = &snapshot.module;
    let progress = &snapshot.progress;
    let mut out = format!(
        "Module {}: {}\n\n{}\n\n{}\n\nVideo: {} ({})\n  {}",
        module.serial_number,
        module.name,
        module.heading,
        module.content,
        progress.video.title,
        format_clock(progress.video.duration),
        progress.video.url,
    );
    if let Some(description) = progress.video.description.as_deref()
        && !description.trim().is_empty()
    {
        out.push_str(&format!("\n  {}", description.trim()));
    }
    out.push_str(&format!(
        "\nProgress: {}% ({})",
        completion_percentage(progress),
        completion_label(progress)
    ));
    if let Some(completed_at) = progress.completed_at.as_deref() {
        out.push_str(&format!(", completed {}", format_saved_at_display(completed_at)));
    }
    out
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_saved_at_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}
