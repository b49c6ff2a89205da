use std::time::Duration;

use tokio_util::sync::CancellationToken;

// ============== Waits ==============

/// Sleep for `wait`, returning early if `shutdown` fires.
///
/// Returns `true` when the full wait elapsed, `false` when it was cut short.
pub async fn sleep_or_shutdown(shutdown: &CancellationToken, wait: Duration) -> bool {
    if wait.is_zero() {
        return !shutdown.is_cancelled();
    }
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Split plain text into chunks of at most `limit` bytes, preferring line breaks.
pub fn split_text_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(16);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut cur = String::new();
    for line in text.split_inclusive('\n') {
        if cur.len() + line.len() > limit && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
        }
        let mut rest = line;
        while rest.len() > limit {
            let (head, tail) = split_utf8_prefix(rest, limit);
            out.push(head.to_string());
            rest = tail;
        }
        cur.push_str(rest);
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    let mut idx = max_bytes.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    s.split_at(idx)
}

/// `1h 2m 3s` style durations for status replies.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(110);
        let t = truncate_text(&s, 100);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), 103);
        assert_eq!(truncate_text("short", 100), "short");
    }

    #[test]
    fn splits_long_text_on_lines_and_char_boundaries() {
        let text = format!("{}\n{}", "x".repeat(30), "é".repeat(40));
        let chunks = split_text_chunks(&text, 32);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 32));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3725), "1h 2m 5s");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_shutdown() {
        let token = CancellationToken::new();
        let t2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            t2.cancel();
        });
        let started = tokio::time::Instant::now();
        assert!(!sleep_or_shutdown(&token, Duration::from_secs(3600)).await);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_shutdown() {
        let token = CancellationToken::new();
        assert!(sleep_or_shutdown(&token, Duration::from_millis(800)).await);
    }
}
