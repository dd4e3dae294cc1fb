use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Returns how long to sleep from `now` (time since the UNIX epoch) until the
/// next whole wall-clock second, together with that second as an epoch value.
///
/// A time that already sits exactly on a boundary waits for the following one,
/// so consecutive calls never yield the same second twice.
pub fn until_next_second(now: Duration) -> (Duration, u64) {
    let delay = Duration::from_nanos(u64::from(NANOS_PER_SEC - now.subsec_nanos()));
    (delay, now.as_secs() + 1)
}

/// Pretty-print the elapsed time (used in logs and diagnostics)
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    let micros = nanos / 1_000;
    let millis = duration.as_millis();
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = seconds / 3_600;

    if hours > 0 {
        format!("{:.3}h", hours as f64 + (minutes % 60) as f64 / 60.0)
    } else if minutes > 0 {
        format!("{:.3}m", minutes as f64 + (seconds % 60) as f64 / 60.0)
    } else if seconds > 0 {
        format!("{:.3}s", duration.as_secs_f64())
    } else if millis > 0 {
        format!("{:.3}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.3}μs", nanos as f64 / 1_000.0)
    }
}

/// Time since the UNIX epoch according to the real-time clock.
///
/// A clock set before 1970 reads as the epoch itself.
pub fn now_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Returns the current time in nanoseconds since the UNIX epoch.
pub fn now_as_u64() -> u64 {
    now_since_epoch().as_nanos() as u64
}

pub fn elapsed_duration_since(start_time: u64) -> Duration {
    Duration::from_nanos(now_as_u64().saturating_sub(start_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_remainder_of_current_second() {
        let now = Duration::new(1_000, 250_000_000);
        let (delay, epoch) = until_next_second(now);

        assert_eq!(delay, Duration::from_millis(750));
        assert_eq!(epoch, 1_001);
    }

    #[test]
    fn exact_boundary_waits_a_full_second() {
        let (delay, epoch) = until_next_second(Duration::from_secs(1_000));

        assert_eq!(delay, Duration::from_secs(1));
        assert_eq!(epoch, 1_001);
    }

    #[test]
    fn late_wakeup_does_not_accumulate_drift() {
        // A tick that finished 300ms after its boundary only sleeps 700ms.
        let (delay, epoch) = until_next_second(Duration::new(1_001, 300_000_000));

        assert_eq!(delay, Duration::from_millis(700));
        assert_eq!(epoch, 1_002);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_micros(12)), "12.000μs");
        assert_eq!(format_duration(Duration::from_millis(3)), "3.000ms");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.500m");
    }
}
