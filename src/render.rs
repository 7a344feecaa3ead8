use crate::capture::ScreenCapture;
use crate::timeline::{ResultEntry, ResultKind};

/// Coarse confidence level used to colour or label an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn of(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceBand::High
        } else if confidence >= 0.6 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }
}

/// `0.85` -> `85%`.
pub fn percent(confidence: f64) -> String {
    format!("{}%", (confidence * 100.0).round() as i64)
}

fn marker(kind: ResultKind) -> &'static str {
    match kind {
        ResultKind::Success => "[ok]",
        ResultKind::Error => "[error]",
        ResultKind::Step => "  >",
    }
}

/// One entry as printed by the CLI.
pub fn entry_line(entry: &ResultEntry) -> String {
    let time = entry.created_at.format("%H:%M:%S");
    match entry.confidence {
        Some(c) => format!(
            "{time} {} {} ({} {})",
            marker(entry.kind),
            entry.content,
            percent(c),
            ConfidenceBand::of(c).as_str()
        ),
        None => format!("{time} {} {}", marker(entry.kind), entry.content),
    }
}

/// Header naming the screenshot a submission was made with.
pub fn capture_line(capture: &ScreenCapture) -> String {
    let meta = capture.meta();
    format!(
        "{} [capture] monitor {} {}x{}",
        capture.captured_at().format("%H:%M:%S"),
        meta.monitor_index,
        meta.physical_width,
        meta.physical_height
    )
}

/// Entries in the order given, one block per entry.
pub fn timeline_text(entries: &[ResultEntry]) -> String {
    entries
        .iter()
        .map(entry_line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::CaptureMeta;
    use crate::timeline::Timeline;

    #[test]
    fn bands_split_at_point_eight_and_point_six() {
        assert_eq!(ConfidenceBand::of(0.9), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::of(0.8), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::of(0.7), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::of(0.59), ConfidenceBand::Low);
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(percent(0.85), "85%");
        assert_eq!(percent(0.7), "70%");
        assert_eq!(percent(1.0), "100%");
    }

    #[test]
    fn lines_show_confidence_only_when_present() {
        let timeline = Timeline::new();
        timeline.error("Network error: refused");
        timeline.step("Step 1: click - Search", 0.95);
        let text = timeline_text(&timeline.snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("Step 1: click - Search (95% high)"));
        assert!(lines[1].ends_with("[error] Network error: refused"));
    }

    #[test]
    fn capture_header_names_monitor_and_size() {
        let capture = ScreenCapture::new("iVBORw0KGgo=".into(), CaptureMeta::new(1, 2560, 1440));
        let line = capture_line(&capture);
        let time = capture.captured_at().format("%H:%M:%S").to_string();
        assert_eq!(line, format!("{time} [capture] monitor 1 2560x1440"));
    }
}
