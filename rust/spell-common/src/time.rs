//! Cross-platform time utilities.
//!
//! `std::time::Instant::now` panics on `wasm32-unknown-unknown`; this module
//! hands out an [`Instant`] that works on both native and WASM targets.

pub use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;

#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;

/// Returns the current monotonic instant.
pub fn now() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_measures_elapsed_time() {
        let start = now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(now().duration_since(start) >= Duration::from_millis(2));
    }
}
