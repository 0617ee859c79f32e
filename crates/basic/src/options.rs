//! Process-wide frontend feature flags
//!
//! Relaxed atomics so tooling can flip behavior between compiles; set
//! them before compilation begins and do not toggle mid-compile.

use std::sync::atomic::{AtomicBool, Ordering};

static RUNTIME_NAMESPACES: AtomicBool = AtomicBool::new(true);
static RUNTIME_TYPE_BRIDGING: AtomicBool = AtomicBool::new(true);
static SELECT_CASE_CONST_LABELS: AtomicBool = AtomicBool::new(true);

pub struct FrontendOptions;

impl FrontendOptions {
    /// Allow references to runtime namespaces from source programs.
    pub fn enable_runtime_namespaces() -> bool {
        RUNTIME_NAMESPACES.load(Ordering::Relaxed)
    }

    pub fn set_enable_runtime_namespaces(on: bool) {
        RUNTIME_NAMESPACES.store(on, Ordering::Relaxed);
    }

    /// Allow lowering of runtime type constructors.
    pub fn enable_runtime_type_bridging() -> bool {
        RUNTIME_TYPE_BRIDGING.load(Ordering::Relaxed)
    }

    pub fn set_enable_runtime_type_bridging(on: bool) {
        RUNTIME_TYPE_BRIDGING.store(on, Ordering::Relaxed);
    }

    /// Accept CONST names and CHR$ expressions as SELECT CASE labels.
    pub fn enable_select_case_const_labels() -> bool {
        SELECT_CASE_CONST_LABELS.load(Ordering::Relaxed)
    }

    pub fn set_enable_select_case_const_labels(on: bool) {
        SELECT_CASE_CONST_LABELS.store(on, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_are_on() {
        assert!(FrontendOptions::enable_runtime_namespaces());
        assert!(FrontendOptions::enable_runtime_type_bridging());
        assert!(FrontendOptions::enable_select_case_const_labels());
    }

    #[test]
    #[serial]
    fn test_toggle_round_trip() {
        FrontendOptions::set_enable_select_case_const_labels(false);
        assert!(!FrontendOptions::enable_select_case_const_labels());
        FrontendOptions::set_enable_select_case_const_labels(true);
        assert!(FrontendOptions::enable_select_case_const_labels());
    }
}
