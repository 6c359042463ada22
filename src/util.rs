/*
 * File: /src/util.rs
 * Created Date: Monday, July 13th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
use std::time::Duration;

use chrono::Local;

/// Wall-clock tag for coordinator progress lines.
pub fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Human-readable elapsed time for coordinator progress lines: seconds up
/// to a minute, minutes up to an hour, hours beyond.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2} seconds elapsed", secs)
    } else if secs < 3600.0 {
        format!("{:.2} minutes elapsed", secs / 60.0)
    } else {
        format!("{:.2} hours elapsed", secs / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_scales() {
        assert_eq!(
            format_elapsed(Duration::from_secs_f64(12.5)),
            "12.50 seconds elapsed"
        );
        assert_eq!(
            format_elapsed(Duration::from_secs(90)),
            "1.50 minutes elapsed"
        );
        assert_eq!(
            format_elapsed(Duration::from_secs(7200)),
            "2.00 hours elapsed"
        );
    }
}
