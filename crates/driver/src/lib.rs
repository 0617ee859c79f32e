//! Driver glue shared by the `run-il` and `il-opt` binaries
//!
//! Pipeline resolution (preset name or explicit comma-separated list,
//! unknown passes fail fast), pass-manager wiring with the verify-after
//! hook, module loading with path-prefixed diagnostics, and the exit
//! code conventions: VM return clamped to 0..=255, 10 on breakpoint
//! stop, 1 on trap.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use viper_il::Module;
use viper_il::io::parse_module;
use viper_il::pass::{PassManager, pipelines};
use viper_il::transform;
use viper_il::verify::verify_module;

/// Read and parse a textual IL module.
pub fn load_module(path: &Path) -> Result<Module, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    parse_module(&text).map_err(|e| format!("{}: {e}", path.display()))
}

/// Split an explicit `--passes "a, b, c"` list, trimming whitespace and
/// dropping empty entries.
pub fn parse_pass_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the pipeline to run: an explicit pass list wins, then a
/// preset name, then the `O1` default. Unknown presets and unknown
/// passes fail fast.
pub fn resolve_pipeline(
    pipeline: Option<&str>,
    passes: Option<&str>,
) -> Result<Vec<String>, String> {
    let ids: Vec<String> = match (passes, pipeline) {
        (Some(list), _) => parse_pass_list(list),
        (None, Some(name)) => pipelines::by_name(name)
            .ok_or_else(|| format!("unknown pipeline '{name}'"))?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        (None, None) => pipelines::O1.iter().map(|s| s.to_string()).collect(),
    };
    for id in &ids {
        if transform::pass_by_name(id).is_none() {
            return Err(format!("unknown pass '{id}'"));
        }
    }
    Ok(ids)
}

/// Run a resolved pipeline over a module through the pass manager,
/// optionally re-verifying after every pass.
pub fn run_passes(
    module: &mut Module,
    ids: &[String],
    verify_each: bool,
) -> Result<(), String> {
    let failure: RefCell<Option<String>> = RefCell::new(None);
    let cell = RefCell::new(module);

    let mut manager = PassManager::new();
    for (name, run) in transform::PASSES {
        let cell = &cell;
        manager.register_pass(
            *name,
            Box::new(move || {
                run(&mut cell.borrow_mut());
                true
            }),
        );
    }
    if verify_each {
        let cell = &cell;
        let failure = &failure;
        manager.set_verify_each(Some(Box::new(move |id: &str| {
            let sink = verify_module(&cell.borrow());
            if sink.has_errors() {
                *failure.borrow_mut() = Some(format!(
                    "verification failed after pass '{id}':\n{}",
                    sink.error_summary()
                ));
                false
            } else {
                true
            }
        })));
    }
    let ok = manager.run_pipeline(ids);
    drop(manager);
    if let Some(message) = failure.into_inner() {
        return Err(message);
    }
    if !ok {
        return Err("pipeline aborted".to_string());
    }
    Ok(())
}

/// Clamp the VM return value into the exit-code range.
pub fn clamp_exit_code(value: i64) -> i32 {
    value.clamp(0, 255) as i32
}

/// Exit code when a breakpoint stopped the run.
pub const EXIT_BREAK: i32 = 10;
/// Exit code for an uncaught trap.
pub const EXIT_TRAP: i32 = 1;

/// Display name used for `.loc` file ids and source breakpoints: the
/// module path as given.
pub fn module_display_name(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pass_list_trims() {
        assert_eq!(
            parse_pass_list("constfold, dce ,  simplifycfg"),
            vec!["constfold", "dce", "simplifycfg"]
        );
        assert_eq!(parse_pass_list(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_resolve_pipeline_presets_and_default() {
        assert!(resolve_pipeline(Some("O0"), None).unwrap().is_empty());
        let o1 = resolve_pipeline(Some("O1"), None).unwrap();
        assert!(o1.contains(&"mem2reg".to_string()));
        // Default is O1.
        assert_eq!(resolve_pipeline(None, None).unwrap(), o1);
        // Explicit passes win over the preset.
        let explicit = resolve_pipeline(Some("O2"), Some("dce")).unwrap();
        assert_eq!(explicit, vec!["dce"]);
    }

    #[test]
    fn test_resolve_pipeline_rejects_unknown() {
        assert!(resolve_pipeline(Some("O9"), None).is_err());
        assert!(resolve_pipeline(None, Some("constfold, bogus")).is_err());
    }

    #[test]
    fn test_clamp_exit_code() {
        assert_eq!(clamp_exit_code(0), 0);
        assert_eq!(clamp_exit_code(42), 42);
        assert_eq!(clamp_exit_code(255), 255);
        assert_eq!(clamp_exit_code(300), 255);
        assert_eq!(clamp_exit_code(-1), 0);
    }

    #[test]
    fn test_o1_promotes_stack_traffic_and_o0_keeps_it() {
        let text = "il 0.2.0\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 5\n\
             \x20 %v = load i64 %ptr\n\
             \x20 ret %v\n\
             }\n";

        let mut o0 = parse_module(text).unwrap();
        let ids = resolve_pipeline(Some("O0"), None).unwrap();
        run_passes(&mut o0, &ids, true).unwrap();
        let o0_text = viper_il::io::print_module(&o0);
        assert!(o0_text.contains("alloca"));
        assert!(o0_text.contains("store"));
        assert!(o0_text.contains("load"));

        let mut o1 = parse_module(text).unwrap();
        let ids = resolve_pipeline(None, None).unwrap();
        run_passes(&mut o1, &ids, true).unwrap();
        let o1_text = viper_il::io::print_module(&o1);
        assert!(!o1_text.contains("alloca"));
        assert!(!o1_text.contains("store"));
        assert!(!o1_text.contains("load"));
        assert!(o1_text.contains("ret 5"));
    }

    #[test]
    fn test_explicit_pass_order_constfold_then_dce() {
        let text = "il 0.2.0\n\
             extern @rt_abs_i64(i64) -> i64\n\
             func @main() -> i64 {\n\
             entry:\n\
             \x20 %abs = call @rt_abs_i64(-5)\n\
             \x20 %ptr = alloca 8\n\
             \x20 store i64 %ptr, 0\n\
             \x20 ret %abs\n\
             }\n";
        let mut module = parse_module(text).unwrap();
        let ids = resolve_pipeline(None, Some("constfold, dce")).unwrap();
        run_passes(&mut module, &ids, false).unwrap();
        let out = viper_il::io::print_module(&module);
        assert!(!out.contains("call @rt_abs_i64"), "{out}");
        assert!(!out.contains("alloca"), "{out}");
        assert!(!out.contains("store"), "{out}");
        assert!(out.contains("ret 5"), "{out}");
    }
}
