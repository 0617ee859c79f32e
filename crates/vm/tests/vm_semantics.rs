//! End-to-end VM semantics
//!
//! Each scenario builds a small module from IL text, runs it, and
//! checks the observable outcome: return values, trap kinds, handler
//! transfers, and frame behavior.

use viper_il::TrapKind;
use viper_il::io::parse_module;
use viper_vm::{RunStatus, Vm, VmOptions};

fn run_text(text: &str) -> RunStatus {
    let module = parse_module(text).expect("test module must parse");
    let sink = viper_il::verify::verify_module(&module);
    assert!(!sink.has_errors(), "{}", sink.error_summary());
    let mut vm = Vm::new(&module, VmOptions::default());
    vm.run()
}

fn expect_value(status: RunStatus) -> i64 {
    match status {
        RunStatus::Completed(v) => v,
        other => panic!("expected completion, got {other:?}"),
    }
}

fn expect_trap(status: RunStatus) -> TrapKind {
    match status {
        RunStatus::Trapped(info) => info.kind,
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn test_wrapping_add_wraps_to_min() {
    let text = format!(
        "il 0.2.0\n\
         func @main() -> i64 {{\n\
         entry:\n\
         \x20 %r = add {}, 1\n\
         \x20 ret %r\n\
         }}\n",
        i64::MAX
    );
    assert_eq!(expect_value(run_text(&text)), i64::MIN);
}

#[test]
fn test_checked_add_traps_overflow() {
    let text = format!(
        "il 0.2.0\n\
         func @main() -> i64 {{\n\
         entry:\n\
         \x20 %r = iadd.ovf {}, 1\n\
         \x20 ret %r\n\
         }}\n",
        i64::MAX
    );
    assert_eq!(expect_trap(run_text(&text)), TrapKind::Overflow);
}

#[test]
fn test_division_by_zero_traps() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %q = sdiv.chk0 5, 0\n\
         \x20 ret %q\n\
         }\n",
    );
    assert_eq!(expect_trap(status), TrapKind::DivideByZero);
}

#[test]
fn test_handler_receives_error_payload() {
    // With a handler pushed, the div-by-zero transfers to the handler;
    // the program then returns the error's code (2 = DivideByZero).
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 eh.push handler\n\
         \x20 %q = sdiv.chk0 5, 0\n\
         \x20 ret %q\n\
         handler(%err: error, %tok: resume_tok):\n\
         \x20 ret 2\n\
         }\n",
    );
    assert_eq!(expect_value(status), 2);
}

#[test]
fn test_eh_pop_uninstalls_handler() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 eh.push handler\n\
         \x20 eh.pop\n\
         \x20 %q = sdiv.chk0 5, 0\n\
         \x20 ret %q\n\
         handler(%err: error, %tok: resume_tok):\n\
         \x20 ret 2\n\
         }\n",
    );
    assert_eq!(expect_trap(status), TrapKind::DivideByZero);
}

#[test]
fn test_resume_next_skips_faulting_instruction() {
    // The handler resumes after the failing divide; %best keeps its
    // pre-fault value routed through the alloca cell.
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %cell = alloca 8\n\
         \x20 store i64 %cell, 41\n\
         \x20 eh.push handler\n\
         \x20 %q = sdiv.chk0 5, 0\n\
         \x20 store i64 %cell, %q\n\
         \x20 %v = load i64 %cell\n\
         \x20 %r = add %v, 1\n\
         \x20 ret %r\n\
         handler(%err: error, %tok: resume_tok):\n\
         \x20 resume.next %tok\n\
         }\n",
    );
    // resume.next lands on the store of %q; %q is still zero-initialised,
    // so the cell holds 0 and the result is 1.
    assert_eq!(expect_value(status), 1);
}

#[test]
fn test_resume_label_transfers_to_block() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 eh.push handler\n\
         \x20 %q = sdiv.chk0 1, 0\n\
         \x20 ret %q\n\
         handler(%err: error, %tok: resume_tok):\n\
         \x20 resume.label %tok, recovered\n\
         recovered:\n\
         \x20 ret 77\n\
         }\n",
    );
    assert_eq!(expect_value(status), 77);
}

#[test]
fn test_switch_dispatch_matches_case_and_default() {
    let template = |scrutinee: i32| {
        format!(
            "il 0.2.0\n\
             func @main() -> i64 {{\n\
             entry:\n\
             \x20 switch.i32 {scrutinee}, default_block, 0, case_a, 1, case_b, 2, case_c\n\
             case_a:\n\
             \x20 ret 100\n\
             case_b:\n\
             \x20 ret 101\n\
             case_c:\n\
             \x20 ret 102\n\
             default_block:\n\
             \x20 ret 99\n\
             }}\n"
        )
    };
    assert_eq!(expect_value(run_text(&template(1))), 101);
    assert_eq!(expect_value(run_text(&template(7))), 99);
    assert_eq!(expect_value(run_text(&template(0))), 100);
}

#[test]
fn test_alloca_store_load_round_trip() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %p = alloca 8\n\
         \x20 store i64 %p, 42\n\
         \x20 %q = addrof %p\n\
         \x20 %v = load i64 %q\n\
         \x20 ret %v\n\
         }\n",
    );
    assert_eq!(expect_value(status), 42);
}

#[test]
fn test_trunc_and_zext() {
    let template = |input: i64| {
        format!(
            "il 0.2.0\n\
             func @main() -> i64 {{\n\
             entry:\n\
             \x20 %b = trunc1 {input}\n\
             \x20 %w = zext1 %b\n\
             \x20 ret %w\n\
             }}\n"
        )
    };
    assert_eq!(expect_value(run_text(&template(0))), 0);
    assert_eq!(expect_value(run_text(&template(7))), 1);
    assert_eq!(expect_value(run_text(&template(-2))), 0);
    assert_eq!(expect_value(run_text(&template(i64::MAX))), 1);
    assert_eq!(expect_value(run_text(&template(i64::MIN))), 0);
}

#[test]
fn test_shift_amount_masks_to_six_bits() {
    let shl = |value: i64, amount: i64| {
        let text = format!(
            "il 0.2.0\n\
             func @main() -> i64 {{\n\
             entry:\n\
             \x20 %r = shl {value}, {amount}\n\
             \x20 ret %r\n\
             }}\n"
        );
        expect_value(run_text(&text))
    };
    assert_eq!(shl(1, 10), 1024);
    assert_eq!(shl(1, 64), shl(1, 0));
    assert_eq!(shl(1, 65), shl(1, 1));
    assert_eq!(shl(1, -1), shl(1, 63));
}

#[test]
fn test_float_conversions_truncate_toward_zero() {
    let fptosi = |value: f64| {
        let text = format!(
            "il 0.2.0\n\
             func @main() -> i64 {{\n\
             entry:\n\
             \x20 %f = const.f64 {value:?}\n\
             \x20 %i = fptosi %f\n\
             \x20 ret %i\n\
             }}\n"
        );
        expect_value(run_text(&text))
    };
    assert_eq!(fptosi(42.5), 42);
    assert_eq!(fptosi(-42.5), -42);
    assert_eq!(fptosi(0.0), 0);
}

#[test]
fn test_fdiv_propagates_infinity_without_trap() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %a = const.f64 1.0\n\
         \x20 %b = const.f64 0.0\n\
         \x20 %q = fdiv %a, %b\n\
         \x20 %inf = fcmp.gt %q, 1e300\n\
         \x20 %r = zext1 %inf\n\
         \x20 ret %r\n\
         }\n",
    );
    assert_eq!(expect_value(status), 1);
}

#[test]
fn test_call_and_return_values() {
    let status = run_text(
        "il 0.2.0\n\
         func @square(%x: i64) -> i64 {\n\
         entry(%x: i64):\n\
         \x20 %r = mul %x, %x\n\
         \x20 ret %r\n\
         }\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %v = call @square(9)\n\
         \x20 ret %v\n\
         }\n",
    );
    assert_eq!(expect_value(status), 81);
}

#[test]
fn test_block_params_carry_loop_state() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 br head(0, 0)\n\
         head(%i: i64, %acc: i64):\n\
         \x20 %c = scmp.lt %i, 5\n\
         \x20 cbr %c, body, done\n\
         body:\n\
         \x20 %acc2 = add %acc, %i\n\
         \x20 %i2 = add %i, 1\n\
         \x20 br head(%i2, %acc2)\n\
         done:\n\
         \x20 ret %acc\n\
         }\n",
    );
    assert_eq!(expect_value(status), 10);
}

fn tail_chain_text() -> &'static str {
    "il 0.2.0\n\
     func @f3(%x: i64) -> i64 {\n\
     entry(%x: i64):\n\
     \x20 %r = add %x, 100\n\
     \x20 ret %r\n\
     }\n\
     func @f2(%x: i64) -> i64 {\n\
     entry(%x: i64):\n\
     \x20 %r = call @f3(%x)\n\
     \x20 ret %r\n\
     }\n\
     func @f1(%x: i64) -> i64 {\n\
     entry(%x: i64):\n\
     \x20 %r = call @f2(%x)\n\
     \x20 ret %r\n\
     }\n\
     func @main() -> i64 {\n\
     entry:\n\
     \x20 %v = call @f1(1)\n\
     \x20 ret %v\n\
     }\n"
}

#[test]
fn test_tail_calls_reuse_one_frame() {
    let module = parse_module(tail_chain_text()).unwrap();

    let mut with_tc = Vm::new(
        &module,
        VmOptions {
            enable_tail_calls: true,
            ..VmOptions::default()
        },
    );
    let tc_value = match with_tc.run() {
        RunStatus::Completed(v) => v,
        other => panic!("unexpected {other:?}"),
    };

    let mut without_tc = Vm::new(&module, VmOptions::default());
    let plain_value = match without_tc.run() {
        RunStatus::Completed(v) => v,
        other => panic!("unexpected {other:?}"),
    };

    // Same observable value either way.
    assert_eq!(tc_value, 101);
    assert_eq!(plain_value, 101);
    // With reuse the chain stays at depth 2 (main + the reused frame);
    // without it each call grows the stack.
    assert_eq!(with_tc.max_frame_depth(), 2);
    assert_eq!(without_tc.max_frame_depth(), 4);
}

#[test]
fn test_trap_instruction_reports_kind_and_message() {
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 trap domain_error \"negative base\"\n\
         }\n",
    );
    match status {
        RunStatus::Trapped(info) => {
            assert_eq!(info.kind, TrapKind::DomainError);
            assert_eq!(info.message.as_deref(), Some("negative base"));
            assert!(info.to_string().contains("DomainError (code=3)"));
        }
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn test_trap_message_reaches_handler_error_payload() {
    // The user message rides into the handler's error payload: the
    // handler returns the error code to prove it saw the right error.
    let status = run_text(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 eh.push handler\n\
         \x20 trap bounds \"index 9 out of range\"\n\
         handler(%err: error, %tok: resume_tok):\n\
         \x20 ret 5\n\
         }\n",
    );
    assert_eq!(expect_value(status), 5);
}

#[test]
fn test_max_steps_traps_runtime_error() {
    let module = parse_module(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 br spin\n\
         spin:\n\
         \x20 br spin\n\
         }\n",
    )
    .unwrap();
    let mut vm = Vm::new(
        &module,
        VmOptions {
            max_steps: Some(100),
            ..VmOptions::default()
        },
    );
    match vm.run() {
        RunStatus::Trapped(info) => {
            assert_eq!(info.kind, TrapKind::RuntimeError);
            assert_eq!(info.message.as_deref(), Some("maximum step count exceeded"));
        }
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn test_poll_callback_pauses_and_resumes() {
    let module = parse_module(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 br head(0)\n\
         head(%i: i64):\n\
         \x20 %c = scmp.lt %i, 50\n\
         \x20 cbr %c, body, done\n\
         body:\n\
         \x20 %i2 = add %i, 1\n\
         \x20 br head(%i2)\n\
         done:\n\
         \x20 ret %i\n\
         }\n",
    )
    .unwrap();
    let mut vm = Vm::new(&module, VmOptions::default());
    let mut polls = 0u32;
    vm.set_poll(
        10,
        Box::new(move || {
            polls += 1;
            polls != 1 // pause on the first poll only
        }),
    );
    match vm.run() {
        RunStatus::Paused => {}
        other => panic!("expected pause, got {other:?}"),
    }
    // No IL state changed between pause and resume; the loop finishes.
    match vm.continue_run() {
        RunStatus::Completed(v) => assert_eq!(v, 50),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn test_missing_main_is_a_trap() {
    let module = parse_module(
        "il 0.2.0\n\
         func @helper() -> i64 {\n\
         entry:\n\
         \x20 ret 1\n\
         }\n",
    )
    .unwrap();
    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run() {
        RunStatus::Trapped(info) => {
            assert_eq!(info.kind, TrapKind::RuntimeError);
        }
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn test_instruction_counts_accumulate() {
    let module = parse_module(
        "il 0.2.0\n\
         func @main() -> i64 {\n\
         entry:\n\
         \x20 %a = add 1, 2\n\
         \x20 %b = add %a, 3\n\
         \x20 ret %b\n\
         }\n",
    )
    .unwrap();
    let mut vm = Vm::new(&module, VmOptions::default());
    let _ = vm.run();
    assert_eq!(vm.steps_executed(), 3);
    let add_count = vm.opcode_counts()[viper_il::Opcode::Add as usize];
    assert_eq!(add_count, 2);
}
