use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::features::sync::{DeadLetter, DeadReason, QueueStats, QueuedRequest};

fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Format queued requests as a table, in the order given
pub fn format_requests_pretty(requests: &[QueuedRequest], title: &str) -> String {
    if requests.is_empty() {
        return format!("{} (0 requests)\n  Queue is empty", title);
    }

    let mut output = format!("{} ({} requests)\n", title, requests.len());
    output.push_str(&"─".repeat(80));
    output.push('\n');

    for req in requests {
        let priority = match req.priority {
            Some(p) => p.to_string(),
            None => "-".to_string(),
        };
        let priority = match req.priority_rank() {
            3 => priority.red().bold(),
            2 => priority.yellow(),
            _ => priority.dimmed(),
        };

        let tries = format!("{}/{}", req.retry_count, req.max_retries);
        let tries = if req.is_failed() {
            tries.red()
        } else {
            tries.normal()
        };

        output.push_str(&format!(
            "{:<7} {:<6} {}  {}\n",
            req.method.bold(),
            priority,
            shorten(&req.url, 50),
            tries
        ));
        output.push_str(&format!(
            "        {}  {}\n",
            req.id.dimmed(),
            format_time(req.timestamp).dimmed()
        ));
    }

    output
}

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats) -> String {
    let mut lines = Vec::new();

    lines.push("Offline Queue Status".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!("  Queued:       {}", stats.total));
    lines.push(format!(
        "  Pending:      {} {}",
        stats.pending,
        "never attempted".dimmed()
    ));
    lines.push(format!(
        "  Failed:       {} {}",
        stats.failed,
        if stats.failed > 0 {
            "awaiting retry".yellow()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Dead letters: {} {}",
        stats.dead_letters,
        if stats.dead_letters > 0 {
            "need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest {
        let age = Utc::now().signed_duration_since(oldest);
        let age_str = if age.num_hours() > 0 {
            format!("{} hours ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{} minutes ago", age.num_minutes())
        } else {
            "just now".to_string()
        };
        lines.push(format!("  Oldest:       {}", age_str.dimmed()));
    }

    if stats.total > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'imarisha-sync process' to replay queued requests"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format dead letters, most recent first
pub fn format_dead_letters_pretty(letters: &[DeadLetter]) -> String {
    if letters.is_empty() {
        return "Dead letters (0)\n  Nothing has failed permanently".to_string();
    }

    let mut output = format!("Dead letters ({})\n", letters.len());
    output.push_str(&"─".repeat(80));
    output.push('\n');

    for letter in letters {
        let req = &letter.request;
        output.push_str(&format!(
            "{} {:<7} {}\n",
            "✗".red(),
            req.method.bold(),
            shorten(&req.url, 60)
        ));
        let why = match letter.reason {
            DeadReason::Exhausted => format!("after {} attempts", req.retry_count),
            DeadReason::Skipped => "skipped on conflict".to_string(),
        };
        output.push_str(&format!(
            "        {}  failed {} {}\n",
            req.id.dimmed(),
            format_time(letter.failed_at).dimmed(),
            why
        ));
        output.push_str(&format!("        {}\n", shorten(&letter.last_error, 70).red()));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::{NewRequest, Priority};

    #[test]
    fn test_format_requests_pretty_empty() {
        let output = format_requests_pretty(&[], "Queued requests");
        assert!(output.contains("0 requests"));
        assert!(output.contains("Queue is empty"));
    }

    #[test]
    fn test_format_requests_pretty() {
        let req = NewRequest::new("POST", "http://api.test/repayments")
            .priority(Priority::High)
            .stamp(1_700_000_000_000, 3);
        let output = format_requests_pretty(std::slice::from_ref(&req), "Queued requests");

        assert!(output.contains("1 requests"));
        assert!(output.contains("POST"));
        assert!(output.contains("http://api.test/repayments"));
        assert!(output.contains(&req.id));
        assert!(output.contains("0/3"));
    }

    #[test]
    fn test_shorten_long_url() {
        let long = format!("http://x/{}", "a".repeat(100));
        let short = shorten(&long, 20);
        assert_eq!(short.chars().count(), 20);
        assert!(short.ends_with("..."));
        assert_eq!(shorten("short", 20), "short");
    }

    #[test]
    fn test_format_stats_pretty() {
        let stats = QueueStats {
            total: 3,
            pending: 2,
            failed: 1,
            dead_letters: 0,
            oldest: None,
        };
        let output = format_stats_pretty(&stats);
        assert!(output.contains("Queued:       3"));
        assert!(output.contains("imarisha-sync process"));
    }

    #[test]
    fn test_format_dead_letters_pretty() {
        let mut req = NewRequest::new("DELETE", "http://api.test/members/9").stamp(1, 3);
        req.retry_count = 3;
        let output = format_dead_letters_pretty(&[DeadLetter::new(req, "HTTP 500")]);

        assert!(output.contains("Dead letters (1)"));
        assert!(output.contains("after 3 attempts"));
        assert!(output.contains("HTTP 500"));
    }

    #[test]
    fn test_format_skipped_dead_letter() {
        let req = NewRequest::new("PUT", "http://api.test/members/9").stamp(1, 3);
        let output = format_dead_letters_pretty(&[DeadLetter::skipped(req, "HTTP 409")]);

        assert!(output.contains("skipped on conflict"));
        assert!(!output.contains("attempts"));
    }
}
