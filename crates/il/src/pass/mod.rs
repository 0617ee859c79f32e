//! Pass manager
//!
//! A lightweight, instrumentation-friendly facade: string identifiers map
//! to callbacks, pipelines are ordered identifier lists, and optional
//! hooks run around each pass. Callbacks capture their own execution
//! context (module, diagnostics); the manager only sequences them.

use std::collections::HashMap;

/// Callback executing one pass. `false` aborts the pipeline.
pub type PassCallback<'a> = Box<dyn FnMut() -> bool + 'a>;

/// Instrumentation hook running before or after a pass.
pub type PrintHook<'a> = Box<dyn FnMut(&str) + 'a>;

/// Verification hook running after a pass. `false` aborts the pipeline.
pub type VerifyHook<'a> = Box<dyn FnMut(&str) -> bool + 'a>;

/// Ordered list of pass identifiers.
pub type Pipeline = Vec<String>;

#[derive(Default)]
pub struct PassManager<'a> {
    passes: HashMap<String, PassCallback<'a>>,
    print_before: Option<PrintHook<'a>>,
    print_after: Option<PrintHook<'a>>,
    verify_each: Option<VerifyHook<'a>>,
}

impl<'a> PassManager<'a> {
    pub fn new() -> PassManager<'a> {
        PassManager::default()
    }

    /// Register or replace the callback associated with `id`. Replacement
    /// lets tests inject alternate implementations.
    pub fn register_pass(&mut self, id: impl Into<String>, callback: PassCallback<'a>) {
        self.passes.insert(id.into(), callback);
    }

    pub fn set_print_before(&mut self, hook: Option<PrintHook<'a>>) {
        self.print_before = hook;
    }

    pub fn set_print_after(&mut self, hook: Option<PrintHook<'a>>) {
        self.print_after = hook;
    }

    pub fn set_verify_each(&mut self, hook: Option<VerifyHook<'a>>) {
        self.verify_each = hook;
    }

    pub fn has_pass(&self, id: &str) -> bool {
        self.passes.contains_key(id)
    }

    /// Execute a pipeline. Aborts on the first missing pass, failed pass,
    /// or failed verification; returns whether everything succeeded.
    pub fn run_pipeline(&mut self, pipeline: &[String]) -> bool {
        for id in pipeline {
            if let Some(hook) = &mut self.print_before {
                hook(id);
            }
            let Some(callback) = self.passes.get_mut(id) else {
                tracing::warn!(pass = %id, "unknown pass in pipeline");
                return false;
            };
            if !callback() {
                return false;
            }
            if let Some(verify) = &mut self.verify_each
                && !verify(id)
            {
                return false;
            }
            if let Some(hook) = &mut self.print_after {
                hook(id);
            }
        }
        true
    }
}

/// Preset pipelines.
pub mod pipelines {
    /// `O0` performs no transformation.
    pub const O0: &[&str] = &[];
    /// `O1`: promote memory, clean up, fold constants, simplify control flow.
    pub const O1: &[&str] = &["mem2reg", "constfold", "dce", "simplifycfg"];
    /// `O2`: `O1` plus loop and value optimizations.
    pub const O2: &[&str] = &[
        "mem2reg",
        "constfold",
        "dce",
        "simplifycfg",
        "licm",
        "gvn",
        "instcombine",
    ];

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<&'static [&'static str]> {
        match name {
            "O0" => Some(O0),
            "O1" => Some(O1),
            "O2" => Some(O2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn to_pipeline(ids: &[&str]) -> Pipeline {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_runs_in_order_with_hooks() {
        let log = RefCell::new(Vec::<String>::new());
        let mut pm = PassManager::new();
        pm.register_pass("a", {
            let log = &log;
            Box::new(move || {
                log.borrow_mut().push("run a".to_string());
                true
            })
        });
        pm.register_pass("b", {
            let log = &log;
            Box::new(move || {
                log.borrow_mut().push("run b".to_string());
                true
            })
        });
        pm.set_print_before(Some({
            let log = &log;
            Box::new(move |id: &str| log.borrow_mut().push(format!("before {id}")))
        }));
        pm.set_print_after(Some({
            let log = &log;
            Box::new(move |id: &str| log.borrow_mut().push(format!("after {id}")))
        }));

        assert!(pm.run_pipeline(&to_pipeline(&["a", "b"])));
        drop(pm);
        assert_eq!(
            log.into_inner(),
            vec!["before a", "run a", "after a", "before b", "run b", "after b"]
        );
    }

    #[test]
    fn test_missing_pass_fails() {
        let mut pm = PassManager::new();
        pm.register_pass("a", Box::new(|| true));
        assert!(!pm.run_pipeline(&to_pipeline(&["a", "missing"])));
    }

    #[test]
    fn test_false_return_aborts() {
        let ran_second = RefCell::new(false);
        let mut pm = PassManager::new();
        pm.register_pass("fails", Box::new(|| false));
        pm.register_pass("later", {
            let ran = &ran_second;
            Box::new(move || {
                *ran.borrow_mut() = true;
                true
            })
        });
        assert!(!pm.run_pipeline(&to_pipeline(&["fails", "later"])));
        drop(pm);
        assert!(!ran_second.into_inner());
    }

    #[test]
    fn test_verify_hook_aborts() {
        let mut pm = PassManager::new();
        pm.register_pass("a", Box::new(|| true));
        pm.set_verify_each(Some(Box::new(|_| false)));
        assert!(!pm.run_pipeline(&to_pipeline(&["a"])));
    }

    #[test]
    fn test_presets() {
        assert!(pipelines::by_name("O0").unwrap().is_empty());
        assert!(pipelines::by_name("O1").unwrap().contains(&"mem2reg"));
        assert!(pipelines::by_name("O2").unwrap().contains(&"licm"));
        assert!(pipelines::by_name("O3").is_none());
    }
}
