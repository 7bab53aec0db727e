//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `sqlitemulti_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("sqlitemulti_core ping={}", sqlitemulti_core::ping());
    println!(
        "sqlitemulti_core version={}",
        sqlitemulti_core::core_version()
    );
}
