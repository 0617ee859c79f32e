//! Frontend lowering contract
//!
//! Checks the observable IL shape (deterministic naming, EH lowering,
//! GOSUB prologue, SELECT CASE strategies) and that lowered modules
//! verify cleanly and execute on the VM.

use serial_test::serial;
use viper_basic::compile_source;
use viper_il::io::print_module;
use viper_il::verify::verify_module;
use viper_il::{Module, Opcode, TrapKind};
use viper_vm::{RunStatus, Vm, VmOptions};

fn compile_ok(source: &str) -> Module {
    let module = compile_source(source).expect("program must lower");
    let sink = verify_module(&module);
    assert!(
        !sink.has_errors(),
        "lowered module must verify:\n{}\n---\n{}",
        sink.error_summary(),
        print_module(&module)
    );
    module
}

fn run_ok(source: &str) {
    let module = compile_ok(source);
    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run() {
        RunStatus::Completed(0) => {}
        other => panic!("expected clean completion, got {other:?}\n{}", print_module(&module)),
    }
}

#[test]
#[serial]
fn test_hello_world_lowers_and_runs() {
    run_ok("10 PRINT \"hello\"\n20 END\n");
}

#[test]
#[serial]
fn test_deterministic_lowering() {
    let source = "10 LET x = 1\n20 IF x > 0 THEN\n30 PRINT x\n40 END IF\n50 END\n";
    let first = print_module(&compile_ok(source));
    let second = print_module(&compile_ok(source));
    assert_eq!(first, second);
}

#[test]
#[serial]
fn test_block_naming_shape() {
    let module = compile_ok(
        "10 x = 1\n\
         20 IF x > 0 THEN\n\
         30 PRINT 1\n\
         40 END IF\n\
         50 IF x > 1 THEN\n\
         60 PRINT 2\n\
         70 END IF\n\
         80 WHILE x < 3\n\
         90 x = x + 1\n\
         95 WEND\n\
         99 END\n",
    );
    let main = module.find_function("main").unwrap();
    let labels: Vec<&str> = main.blocks.iter().map(|b| b.label.as_str()).collect();
    assert!(labels.contains(&"entry_main"));
    assert!(labels.contains(&"ret_main"));
    assert!(labels.contains(&"L10_main"));
    assert!(labels.contains(&"if_then_0_main"));
    // The second IF gets the next counter value.
    assert!(labels.contains(&"if_then_1_main"));
    assert!(labels.contains(&"while_head_0_main"));
    assert!(labels.contains(&"while_body_0_main"));
}

#[test]
#[serial]
fn test_externs_declared_up_front() {
    let module = compile_ok("10 PRINT \"a\"; 1\n20 END\n");
    for helper in ["rt_print_str", "rt_print_i64", "rt_print_nl"] {
        assert!(
            module.find_extern(helper).is_some(),
            "missing extern {helper}"
        );
    }
}

#[test]
#[serial]
fn test_integer_arithmetic_is_checked() {
    let module = compile_ok("10 a% = 2\n20 b% = a% + 3\n30 END\n");
    let text = print_module(&module);
    assert!(text.contains("iadd.ovf"), "{text}");
}

#[test]
#[serial]
fn test_float_arithmetic_is_unchecked() {
    let module = compile_ok("10 a = 2.5\n20 b = a * 2.0\n30 END\n");
    let text = print_module(&module);
    assert!(text.contains("fmul"), "{text}");
    assert!(!text.contains("imul.ovf"), "{text}");
}

#[test]
#[serial]
fn test_on_error_lowering_shape() {
    let module = compile_ok(
        "10 ON ERROR GOTO 100\n\
         20 a% = 1 \\ 0\n\
         30 END\n\
         100 RESUME NEXT\n",
    );
    let text = print_module(&module);
    assert!(text.contains("eh.push eh_handler_0_main"), "{text}");
    assert!(text.contains("eh_handler_0_main(%err: error, %tok: resume_tok):"), "{text}");
    assert!(text.contains("resume.next"), "{text}");
}

#[test]
#[serial]
fn test_on_error_goto_zero_pops() {
    let module = compile_ok(
        "10 ON ERROR GOTO 100\n\
         20 ON ERROR GOTO 0\n\
         30 END\n\
         100 RESUME NEXT\n",
    );
    let text = print_module(&module);
    assert!(text.contains("eh.pop"), "{text}");
}

#[test]
#[serial]
fn test_resume_next_recovers_at_runtime() {
    // The divide by zero is caught and skipped; the program completes.
    run_ok(
        "10 ON ERROR GOTO 100\n\
         20 a% = 5 \\ 0\n\
         30 END\n\
         100 RESUME NEXT\n",
    );
}

#[test]
#[serial]
fn test_uncaught_divide_by_zero_traps() {
    let module = compile_ok("10 a% = 5 \\ 0\n20 END\n");
    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run() {
        RunStatus::Trapped(info) => assert_eq!(info.kind, TrapKind::DivideByZero),
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_gosub_prologue_is_emitted_once() {
    let module = compile_ok(
        "10 GOSUB 100\n\
         20 GOSUB 100\n\
         30 END\n\
         100 x = 1\n\
         110 RETURN\n",
    );
    let main = module.find_function("main").unwrap();
    let entry = &main.blocks[0];
    // Prologue: variable cell + stack pointer cell + return-site array.
    let allocas = entry
        .instructions
        .iter()
        .filter(|i| i.op == Opcode::Alloca)
        .count();
    assert_eq!(allocas, 3, "{}", print_module(&module));
    let text = print_module(&module);
    assert!(text.contains("gosub_dispatch_0_main"), "{text}");
    assert!(text.contains("gosub_ret_0_main"), "{text}");
    assert!(text.contains("gosub_ret_1_main"), "{text}");
    assert!(text.contains("switch.i32"), "{text}");
}

#[test]
#[serial]
fn test_gosub_runs_and_returns() {
    run_ok(
        "10 GOSUB 100\n\
         20 GOSUB 100\n\
         30 END\n\
         100 x = x + 1\n\
         110 RETURN\n",
    );
}

#[test]
#[serial]
fn test_return_without_gosub_traps_bounds() {
    let module = compile_ok("10 RETURN\n20 END\n");
    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run() {
        RunStatus::Trapped(info) => {
            assert_eq!(info.kind, TrapKind::Bounds);
            assert_eq!(info.message.as_deref(), Some("RETURN without GOSUB"));
        }
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_select_case_dense_labels_use_switch() {
    let module = compile_ok(
        "10 n% = 2\n\
         20 SELECT CASE n%\n\
         30 CASE 1\n\
         40 PRINT 1\n\
         50 CASE 2, 3\n\
         60 PRINT 2\n\
         70 CASE ELSE\n\
         80 PRINT 9\n\
         90 END SELECT\n\
         99 END\n",
    );
    let text = print_module(&module);
    assert!(text.contains("switch.i32"), "{text}");
}

#[test]
#[serial]
fn test_select_case_string_labels_use_cbr_chain() {
    let module = compile_ok(
        "10 s$ = \"b\"\n\
         20 SELECT CASE s$\n\
         30 CASE \"a\"\n\
         40 PRINT 1\n\
         50 CASE \"b\"\n\
         60 PRINT 2\n\
         70 END SELECT\n\
         80 END\n",
    );
    let text = print_module(&module);
    assert!(!text.contains("switch.i32"), "{text}");
    assert!(text.contains("rt_str_eq"), "{text}");
    assert!(text.contains("cbr"), "{text}");
}

#[test]
#[serial]
fn test_select_case_chr_label_via_feature_flag() {
    let source = "10 s$ = \"A\"\n\
         20 SELECT CASE s$\n\
         30 CASE CHR$(65)\n\
         40 PRINT 1\n\
         50 END SELECT\n\
         60 END\n";
    // Enabled (default): lowers to a string comparison chain.
    let module = compile_ok(source);
    assert!(print_module(&module).contains("rt_str_eq"));

    // Disabled: lowering reports an error.
    viper_basic::FrontendOptions::set_enable_select_case_const_labels(false);
    let result = compile_source(source);
    viper_basic::FrontendOptions::set_enable_select_case_const_labels(true);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("disabled"));
}

#[test]
#[serial]
fn test_functions_and_calls() {
    let module = compile_ok(
        "FUNCTION ADDONE(n)\n\
         ADDONE = n + 1\n\
         END FUNCTION\n\
         10 PRINT ADDONE(4)\n\
         20 END\n",
    );
    assert!(module.find_function("addone").is_some());
    let text = print_module(&module);
    assert!(text.contains("call @addone"), "{text}");
    run_ok(
        "FUNCTION ADDONE(n)\n\
         ADDONE = n + 1\n\
         END FUNCTION\n\
         10 x = ADDONE(4)\n\
         20 END\n",
    );
}

#[test]
#[serial]
fn test_sub_call_lowering() {
    run_ok(
        "SUB NOOP(n)\n\
         x = n\n\
         END SUB\n\
         10 CALL NOOP(3)\n\
         20 END\n",
    );
}

#[test]
#[serial]
fn test_for_loop_runs() {
    run_ok(
        "10 s = 0\n\
         20 FOR i = 1 TO 10\n\
         30 s = s + i\n\
         40 NEXT i\n\
         50 END\n",
    );
}

#[test]
#[serial]
fn test_for_loop_negative_step() {
    run_ok(
        "10 FOR i = 5 TO 1 STEP -1\n\
         20 x = i\n\
         30 NEXT\n\
         40 END\n",
    );
}

#[test]
#[serial]
fn test_goto_and_line_blocks() {
    let module = compile_ok("10 GOTO 30\n20 x = 1\n30 END\n");
    let text = print_module(&module);
    assert!(text.contains("br L30_main"), "{text}");
}

#[test]
#[serial]
fn test_string_variables_retain_release() {
    let module = compile_ok("10 s$ = \"abc\"\n20 s$ = s$ + \"d\"\n30 END\n");
    let text = print_module(&module);
    assert!(text.contains("rt_str_retain"), "{text}");
    assert!(text.contains("rt_str_release"), "{text}");
    assert!(text.contains("rt_concat"), "{text}");
    run_ok("10 s$ = \"abc\"\n20 s$ = s$ + \"d\"\n30 END\n");
}

#[test]
#[serial]
fn test_pow_goes_through_runtime_domain_check() {
    let module = compile_ok("10 x = 2 ^ 10\n20 END\n");
    assert!(print_module(&module).contains("rt_pow_f64_chkdom"));
    // A domain violation traps through the bridge. Unary minus binds
    // looser than `^`, so the negative base needs its own variable.
    let module = compile_ok("10 a = -2.0\n20 x = a ^ 0.5\n30 END\n");
    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run() {
        RunStatus::Trapped(info) => assert_eq!(info.kind, TrapKind::DomainError),
        other => panic!("expected domain trap, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_loc_trivia_carries_source_lines() {
    let module = compile_ok("10 x = 1\n20 END\n");
    let text = print_module(&module);
    assert!(text.contains(".loc 1 10 1"), "{text}");
}

#[test]
#[serial]
fn test_mem2reg_pipeline_cleans_lowered_output() {
    // The classic cell-based lowering should melt under O1 for straight
    // line code.
    let mut module = compile_ok("10 x = 1\n20 y = x\n30 END\n");
    viper_il::transform::mem2reg::run(&mut module);
    viper_il::transform::constfold::run(&mut module);
    viper_il::transform::dce::run(&mut module);
    let sink = verify_module(&module);
    assert!(!sink.has_errors(), "{}", sink.error_summary());
}
