//! Throughput result formatting.

use super::ThroughputResult;

/// Format a throughput result as a human-readable summary.
pub fn format_summary(result: &ThroughputResult) -> String {
    let mbps = result.megabits_per_second;
    let speed = if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    };

    format!(
        "download: {} ({:.1} MB in {:.1}s, {} endpoint{}, {} connection{})",
        speed,
        result.bytes_total as f64 / 1_000_000.0,
        result.duration_secs,
        result.endpoints,
        if result.endpoints == 1 { "" } else { "s" },
        result.concurrency,
        if result.concurrency == 1 { "" } else { "s" },
    )
}
