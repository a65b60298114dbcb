//! Monotonic time helpers for `SLEEP` and `TIMER`.

use std::time::Duration;

use crate::runtime;

/// Sleep for `ms` milliseconds; negative durations clamp to zero.
/// `std::thread::sleep` already retries interrupted waits.
pub fn sleep_ms(ms: i32) {
    let ms = ms.max(0) as u64;
    std::thread::sleep(Duration::from_millis(ms));
}

/// Monotonic milliseconds since the runtime came up; never decreases.
pub fn timer_ms() -> i64 {
    let epoch = runtime::lock().epoch;
    i64::try_from(epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[no_mangle]
pub extern "C" fn rt_sleep_ms(ms: i32) {
    sleep_ms(ms);
}

#[no_mangle]
pub extern "C" fn rt_timer_ms() -> i64 {
    timer_ms()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn timer_is_monotonic() {
        let mut last = timer_ms();
        for _ in 0..100 {
            let now = timer_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn sleep_elapsed_in_range() {
        let before = Instant::now();
        sleep_ms(50);
        let elapsed = before.elapsed().as_millis();
        assert!((45..=300).contains(&elapsed), "slept {elapsed}ms");
    }

    #[test]
    fn negative_sleep_clamps_to_zero() {
        let before = Instant::now();
        sleep_ms(-100);
        assert!(before.elapsed().as_millis() < 50);
    }
}
