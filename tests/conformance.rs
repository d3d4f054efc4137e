// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use wasm_tape::format::Writer;
use wasm_tape::host::{Host, HostError, NoHost};
use wasm_tape::imports::Imports;
use wasm_tape::memory::{LinearMemory, PAGE_SIZE};
use wasm_tape::module::{InstantiateError, MemoryDecl, Module};
use wasm_tape::opcode::{Opcode, EXTENDED_PREFIX};
use wasm_tape::sig::{Signature, ValueKind};
use wasm_tape::value::Value;
use wasm_tape::vm::{Limits, Trap, Vm};

struct TestHost {
    calls: u32,
}

impl TestHost {
    fn new() -> Self {
        Self { calls: 0 }
    }
}

impl Host for TestHost {
    fn call(
        &mut self,
        module: &str,
        field: &str,
        _sig: &Signature,
        args: &[Value],
    ) -> Result<Vec<Value>, HostError> {
        self.calls += 1;
        match (module, field) {
            ("env", "add1") => Ok(vec![Value::I32(args[0].as_i32() + 1)]),
            ("env", "pi") => Ok(vec![Value::F64(core::f64::consts::PI)]),
            ("env", "fail") => Err(HostError::Failed),
            ("env", "lie") => Ok(vec![Value::I64(0)]),
            _ => Err(HostError::UnknownImport),
        }
    }
}

fn op(w: &mut Writer, o: Opcode) {
    w.write_u8(o as u8);
}

fn local_get(w: &mut Writer, i: u32) {
    op(w, Opcode::LocalGet);
    w.write_uleb128_u32(i);
}

fn local_set(w: &mut Writer, i: u32) {
    op(w, Opcode::LocalSet);
    w.write_uleb128_u32(i);
}

fn i32_const(w: &mut Writer, v: i32) {
    op(w, Opcode::I32Const);
    w.write_sleb128_i32(v);
}

fn i64_const(w: &mut Writer, v: i64) {
    op(w, Opcode::I64Const);
    w.write_sleb128_i64(v);
}

fn f64_const(w: &mut Writer, v: f64) {
    op(w, Opcode::F64Const);
    w.write_f64_le(v);
}

fn mem_op(w: &mut Writer, o: Opcode, align: u32, offset: u32) {
    op(w, o);
    w.write_uleb128_u32(align);
    w.write_uleb128_u32(offset);
}

/// Writes a body and terminates it with `end`.
fn body(build: impl FnOnce(&mut Writer)) -> Vec<u8> {
    let mut w = Writer::new();
    build(&mut w);
    op(&mut w, Opcode::End);
    w.into_vec()
}

fn run_no_host(module: &Module, func: u32, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let mut vm = Vm::new(NoHost);
    let mut instance = vm.instantiate(module, &Imports::new()).unwrap();
    vm.invoke(module, &mut instance, func, args)
}

#[test]
fn add_two() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(
        &[ValueKind::I32, ValueKind::I32],
        &[ValueKind::I32],
    ));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                local_get(w, 1);
                op(w, Opcode::I32Add);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    let out = run_no_host(&m, f, &[Value::I32(10), Value::I32(25)]).unwrap();
    assert_eq!(out, [Value::I32(35)]);
}

#[test]
fn recursive_factorial() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                i32_const(w, 2);
                op(w, Opcode::I32LtS);
                op(w, Opcode::If);
                w.write_u8(0x7f); // result i32
                i32_const(w, 1);
                op(w, Opcode::Else);
                local_get(w, 0);
                local_get(w, 0);
                i32_const(w, 1);
                op(w, Opcode::I32Sub);
                op(w, Opcode::Call);
                w.write_uleb128_u32(0);
                op(w, Opcode::I32Mul);
                op(w, Opcode::End);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(9)]).unwrap(),
        [Value::I32(362_880)]
    );
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(0)]).unwrap(),
        [Value::I32(1)]
    );
}

#[test]
fn if_else_takes_both_arms() {
    // sign(x): 1 for positive, -1 for negative, 0 otherwise.
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                i32_const(w, 0);
                op(w, Opcode::I32GtS);
                op(w, Opcode::If);
                w.write_u8(0x7f);
                i32_const(w, 1);
                op(w, Opcode::Else);
                local_get(w, 0);
                i32_const(w, 0);
                op(w, Opcode::I32LtS);
                op(w, Opcode::If);
                w.write_u8(0x7f);
                i32_const(w, -1);
                op(w, Opcode::Else);
                i32_const(w, 0);
                op(w, Opcode::End);
                op(w, Opcode::End);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    for (input, expected) in [(42, 1), (-42, -1), (0, 0)] {
        assert_eq!(
            run_no_host(&m, f, &[Value::I32(input)]).unwrap(),
            [Value::I32(expected)]
        );
    }
}

#[test]
fn loop_with_back_edge_sums() {
    // sum(n) = 1 + 2 + ... + n with a loop and two locals.
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[ValueKind::I32, ValueKind::I32], // i, acc
            body(|w| {
                op(w, Opcode::Block);
                w.write_u8(0x40);
                op(w, Opcode::Loop);
                w.write_u8(0x40);
                local_get(w, 1);
                local_get(w, 0);
                op(w, Opcode::I32GeS);
                op(w, Opcode::BrIf);
                w.write_uleb128_u32(1);
                local_get(w, 1);
                i32_const(w, 1);
                op(w, Opcode::I32Add);
                local_set(w, 1);
                local_get(w, 2);
                local_get(w, 1);
                op(w, Opcode::I32Add);
                local_set(w, 2);
                op(w, Opcode::Br);
                w.write_uleb128_u32(0);
                op(w, Opcode::End);
                op(w, Opcode::End);
                local_get(w, 2);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(10)]).unwrap(),
        [Value::I32(55)]
    );
    // Locals start zeroed, so sum(0) never enters the loop body.
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(0)]).unwrap(),
        [Value::I32(0)]
    );
}

#[test]
fn br_table_selects_targets_and_default() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::Block);
                w.write_u8(0x40);
                op(w, Opcode::Block);
                w.write_u8(0x40);
                op(w, Opcode::Block);
                w.write_u8(0x40);
                local_get(w, 0);
                op(w, Opcode::BrTable);
                w.write_uleb128_u32(2);
                w.write_uleb128_u32(0);
                w.write_uleb128_u32(1);
                w.write_uleb128_u32(2);
                op(w, Opcode::End);
                i32_const(w, 10);
                op(w, Opcode::Return);
                op(w, Opcode::End);
                i32_const(w, 20);
                op(w, Opcode::Return);
                op(w, Opcode::End);
                i32_const(w, 99);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    for (sel, expected) in [(0, 10), (1, 20), (2, 99), (7, 99)] {
        assert_eq!(
            run_no_host(&m, f, &[Value::I32(sel)]).unwrap(),
            [Value::I32(expected)]
        );
    }
}

#[test]
fn calling_convention_covers_all_kind_pairs() {
    // A callee (A, B) -> B that returns its second parameter, for every
    // pair of kinds, exercises slot addressing across sizes.
    let kinds = [
        ValueKind::I32,
        ValueKind::I64,
        ValueKind::F32,
        ValueKind::F64,
    ];
    let sample = |k: ValueKind| match k {
        ValueKind::I32 => Value::I32(-7),
        ValueKind::I64 => Value::I64(1 << 40),
        ValueKind::F32 => Value::F32(2.5),
        ValueKind::F64 => Value::F64(-0.125),
    };
    for a in kinds {
        for b in kinds {
            let mut m = Module::new();
            let t = m.add_type(Signature::new(&[a, b], &[b]));
            let f = m
                .add_function(
                    t,
                    &[],
                    body(|w| {
                        local_get(w, 1);
                    }),
                )
                .unwrap();
            m.expand().unwrap();
            let out = run_no_host(&m, f, &[sample(a), sample(b)]).unwrap();
            assert_eq!(out, [sample(b)], "pair ({a:?}, {b:?})");
        }
    }
}

#[test]
fn mixed_width_arithmetic_through_a_call() {
    // (i32, f64) -> i64: widen both and add, through a helper call.
    let mut m = Module::new();
    let t = m.add_type(Signature::new(
        &[ValueKind::I32, ValueKind::F64],
        &[ValueKind::I64],
    ));
    let helper = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                op(w, Opcode::I64ExtendI32S);
                local_get(w, 1);
                op(w, Opcode::I64TruncF64S);
                op(w, Opcode::I64Add);
            }),
        )
        .unwrap();
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                local_get(w, 1);
                op(w, Opcode::Call);
                w.write_uleb128_u32(helper);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    let out = run_no_host(&m, f, &[Value::I32(-5), Value::F64(1000.9)]).unwrap();
    assert_eq!(out, [Value::I64(995)]);
}

#[test]
fn multi_result_function() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(
        &[ValueKind::I32],
        &[ValueKind::I32, ValueKind::I32],
    ));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                i32_const(w, 1);
                op(w, Opcode::I32Add);
                local_get(w, 0);
                i32_const(w, 2);
                op(w, Opcode::I32Mul);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(10)]).unwrap(),
        [Value::I32(11), Value::I32(20)]
    );
}

#[test]
fn early_return_discards_residual_operands() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                // An i64 left on the stack beneath the returned value.
                i64_const(w, 0x0abc_def0);
                local_get(w, 0);
                op(w, Opcode::Return);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(123)]).unwrap(),
        [Value::I32(123)]
    );
}

#[test]
fn opcode_stack_deltas_hold_over_residual_operands() {
    // Every op shape runs above a residual operand of the other width, so
    // a stack-pointer delta that is off by a word shears the final sum
    // instead of cancelling out.
    let mut m = Module::new();
    m.set_memory(MemoryDecl {
        initial_pages: 1,
        max_pages: 1,
    })
    .unwrap();

    // const, binary, compare, test, and convert ops over an i64 residual.
    let t64 = m.add_type(Signature::new(&[], &[ValueKind::I64]));
    let ints = m
        .add_function(
            t64,
            &[],
            body(|w| {
                i64_const(w, 0x1122_3344_5566_7788);
                i32_const(w, 6);
                i32_const(w, 7);
                op(w, Opcode::I32Mul);
                i32_const(w, 100);
                op(w, Opcode::I32LtU);
                op(w, Opcode::I32Eqz);
                op(w, Opcode::I32Eqz);
                op(w, Opcode::I64ExtendI32U);
                op(w, Opcode::I64Add);
            }),
        )
        .unwrap();

    // load/store, float unary, and truncation over an f64 residual.
    let t32 = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let floats = m
        .add_function(
            t32,
            &[ValueKind::I32],
            body(|w| {
                f64_const(w, 6.25);
                i32_const(w, 8);
                i32_const(w, 0x0bad_f00d);
                mem_op(w, Opcode::I32Store, 2, 0);
                i32_const(w, 8);
                mem_op(w, Opcode::I32Load, 2, 0);
                local_set(w, 0);
                op(w, Opcode::F64Sqrt);
                op(w, Opcode::F64Neg);
                op(w, Opcode::I32TruncF64S);
                local_get(w, 0);
                op(w, Opcode::I32Add);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    assert_eq!(
        run_no_host(&m, ints, &[]).unwrap(),
        [Value::I64(0x1122_3344_5566_7789)]
    );
    assert_eq!(
        run_no_host(&m, floats, &[]).unwrap(),
        [Value::I32(0x0bad_f00b)]
    );
}

#[test]
fn local_tee_keeps_the_value() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I64], &[ValueKind::I64]));
    let f = m
        .add_function(
            t,
            &[ValueKind::I64],
            body(|w| {
                local_get(w, 0);
                op(w, Opcode::LocalTee);
                w.write_uleb128_u32(1);
                local_get(w, 1);
                op(w, Opcode::I64Add);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I64(21)]).unwrap(),
        [Value::I64(42)]
    );
}

#[test]
fn select_picks_by_condition() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(
        &[ValueKind::I64, ValueKind::I64, ValueKind::I32],
        &[ValueKind::I64],
    ));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                local_get(w, 1);
                local_get(w, 2);
                op(w, Opcode::Select);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    let a = Value::I64(111);
    let b = Value::I64(222);
    assert_eq!(run_no_host(&m, f, &[a, b, Value::I32(1)]).unwrap(), [a]);
    assert_eq!(run_no_host(&m, f, &[a, b, Value::I32(0)]).unwrap(), [b]);
}

#[test]
fn memory_store_load_and_narrow_access() {
    let mut m = Module::new();
    m.set_memory(MemoryDecl {
        initial_pages: 1,
        max_pages: 2,
    })
    .unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                i32_const(w, 16);
                i32_const(w, 0x1122_33ff_u32 as i32);
                mem_op(w, Opcode::I32Store, 2, 0);
                // Lowest byte back, sign-extended via load8_s: 0xff -> -1.
                i32_const(w, 0);
                mem_op(w, Opcode::I32Load8S, 0, 16);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(run_no_host(&m, f, &[]).unwrap(), [Value::I32(-1)]);
}

#[test]
fn memory_size_grow_and_sentinel() {
    let mut m = Module::new();
    m.set_memory(MemoryDecl {
        initial_pages: 1,
        max_pages: 2,
    })
    .unwrap();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let grow = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                op(w, Opcode::MemoryGrow);
                w.write_u8(0x00);
            }),
        )
        .unwrap();
    let size = {
        let t0 = m.add_type(Signature::new(&[], &[ValueKind::I32]));
        m.add_function(
            t0,
            &[],
            body(|w| {
                op(w, Opcode::MemorySize);
                w.write_u8(0x00);
            }),
        )
        .unwrap()
    };
    m.expand().unwrap();
    let mut vm = Vm::new(NoHost);
    let mut instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, size, &[]).unwrap(),
        [Value::I32(1)]
    );
    assert_eq!(
        vm.invoke(&m, &mut instance, grow, &[Value::I32(1)]).unwrap(),
        [Value::I32(1)]
    );
    assert_eq!(
        vm.invoke(&m, &mut instance, size, &[]).unwrap(),
        [Value::I32(2)]
    );
    // Past the maximum: -1, and the size is unchanged.
    assert_eq!(
        vm.invoke(&m, &mut instance, grow, &[Value::I32(1)]).unwrap(),
        [Value::I32(-1)]
    );
    assert_eq!(
        vm.invoke(&m, &mut instance, size, &[]).unwrap(),
        [Value::I32(2)]
    );
}

#[test]
fn memory_fill_writes_a_run() {
    let mut m = Module::new();
    m.set_memory(MemoryDecl {
        initial_pages: 1,
        max_pages: 1,
    })
    .unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                i32_const(w, 32);
                i32_const(w, 0xab);
                i32_const(w, 4);
                w.write_u8(EXTENDED_PREFIX);
                w.write_uleb128_u32(11);
                w.write_u8(0x00);
                i32_const(w, 0);
                mem_op(w, Opcode::I32Load, 2, 32);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[]).unwrap(),
        [Value::I32(0xabab_abab_u32 as i32)]
    );
}

#[test]
fn imported_memory_provides_initial_contents() {
    let mut m = Module::new();
    m.import_memory("env", "mem", 1).unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                i32_const(w, 0);
                mem_op(w, Opcode::I32Load, 2, 8);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    let mut mem = LinearMemory::new(1, 1);
    assert!(mem.store_u32(8, 0x5150));
    let mut imports = Imports::new();
    imports.bind_memory("env", "mem", mem);

    let mut vm = Vm::new(NoHost);
    let mut instance = vm.instantiate(&m, &imports).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[]).unwrap(),
        [Value::I32(0x5150)]
    );
}

#[test]
fn globals_get_set_and_imported_initial_value() {
    let mut m = Module::new();
    m.import_global("env", "base", ValueKind::I32, false).unwrap();
    let counter = m.add_global(ValueKind::I32, true, Value::I32(0)).unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::GlobalGet);
                w.write_uleb128_u32(counter);
                i32_const(w, 1);
                op(w, Opcode::I32Add);
                op(w, Opcode::GlobalSet);
                w.write_uleb128_u32(counter);
                op(w, Opcode::GlobalGet);
                w.write_uleb128_u32(0);
                op(w, Opcode::GlobalGet);
                w.write_uleb128_u32(counter);
                op(w, Opcode::I32Add);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    let mut imports = Imports::new();
    imports.bind_global("env", "base", Value::I32(100));
    let mut vm = Vm::new(NoHost);
    let mut instance = vm.instantiate(&m, &imports).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[]).unwrap(),
        [Value::I32(101)]
    );
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[]).unwrap(),
        [Value::I32(102)]
    );
    assert_eq!(instance.read_global(&m, counter), Some(Value::I32(2)));
}

#[test]
fn global_access_through_a_foreign_instance_traps() {
    let mut m = Module::new();
    let g = m.add_global(ValueKind::I32, true, Value::I32(5)).unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::GlobalGet);
                w.write_uleb128_u32(g);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    // An instance built from a module without globals has an empty global
    // region; the access must trap, not panic.
    let mut other = Module::new();
    other.expand().unwrap();
    let mut vm = Vm::new(NoHost);
    let mut instance = vm.instantiate(&other, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[]),
        Err(Trap::GlobalOutOfBounds)
    );
}

#[test]
fn imported_function_round_trips_through_host() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let add1 = m.import_function("env", "add1", t).unwrap();
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                op(w, Opcode::Call);
                w.write_uleb128_u32(add1);
                op(w, Opcode::Call);
                w.write_uleb128_u32(add1);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    let mut vm = Vm::new(TestHost::new());
    let mut instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[Value::I32(40)]).unwrap(),
        [Value::I32(42)]
    );
    assert_eq!(vm.host().calls, 2);

    // Imports are also directly invocable.
    assert_eq!(
        vm.invoke(&m, &mut instance, add1, &[Value::I32(1)]).unwrap(),
        [Value::I32(2)]
    );
}

#[test]
fn host_failure_and_result_mismatch_trap() {
    let mut m = Module::new();
    let ti = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let fail = m.import_function("env", "fail", ti).unwrap();
    let lie = m.import_function("env", "lie", ti).unwrap();
    let t = m.add_type(Signature::new(&[], &[ValueKind::I32]));
    let call_fail = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::Call);
                w.write_uleb128_u32(fail);
            }),
        )
        .unwrap();
    let call_lie = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::Call);
                w.write_uleb128_u32(lie);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    let mut vm = Vm::new(TestHost::new());
    let mut instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, call_fail, &[]),
        Err(Trap::HostFailed(HostError::Failed))
    );
    // The host returned an i64 where the signature declares an i32.
    assert_eq!(
        vm.invoke(&m, &mut instance, call_lie, &[]),
        Err(Trap::HostResultMismatch {
            expected: 1,
            actual: 1,
        })
    );
}

#[test]
fn start_function_runs_at_instantiation() {
    let mut m = Module::new();
    let flag = m.add_global(ValueKind::I32, true, Value::I32(0)).unwrap();
    let t = m.add_type(Signature::new(&[], &[]));
    let start = m
        .add_function(
            t,
            &[],
            body(|w| {
                i32_const(w, 7);
                op(w, Opcode::GlobalSet);
                w.write_uleb128_u32(flag);
            }),
        )
        .unwrap();
    m.set_start(start).unwrap();
    m.expand().unwrap();

    let mut vm = Vm::new(NoHost);
    let instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(instance.read_global(&m, flag), Some(Value::I32(7)));
}

#[test]
fn trapping_start_fails_instantiation() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[], &[]));
    let start = m
        .add_function(t, &[], body(|w| op(w, Opcode::Unreachable)))
        .unwrap();
    m.set_start(start).unwrap();
    m.expand().unwrap();

    let mut vm = Vm::new(NoHost);
    assert_eq!(
        vm.instantiate(&m, &Imports::new()),
        Err(InstantiateError::StartTrapped(Trap::Unreachable))
    );
}

#[test]
fn arithmetic_traps() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(
        &[ValueKind::I32, ValueKind::I32],
        &[ValueKind::I32],
    ));
    let div = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                local_get(w, 1);
                op(w, Opcode::I32DivS);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, div, &[Value::I32(7), Value::I32(0)]),
        Err(Trap::DivideByZero)
    );
    assert_eq!(
        run_no_host(&m, div, &[Value::I32(i32::MIN), Value::I32(-1)]),
        Err(Trap::IntegerOverflow)
    );
    assert_eq!(
        run_no_host(&m, div, &[Value::I32(7), Value::I32(-2)]).unwrap(),
        [Value::I32(-3)]
    );
}

#[test]
fn memory_access_out_of_bounds_traps() {
    let mut m = Module::new();
    m.set_memory(MemoryDecl {
        initial_pages: 1,
        max_pages: 1,
    })
    .unwrap();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                mem_op(w, Opcode::I32Load, 2, 0);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[Value::I32((PAGE_SIZE - 2) as i32)]),
        Err(Trap::MemoryOutOfBounds)
    );
    assert_eq!(
        run_no_host(&m, f, &[Value::I32(-4)]),
        Err(Trap::MemoryOutOfBounds)
    );
    assert_eq!(
        run_no_host(&m, f, &[Value::I32((PAGE_SIZE - 4) as i32)]).unwrap(),
        [Value::I32(0)]
    );
}

#[test]
fn runaway_recursion_hits_depth_limit() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[], &[]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::Call);
                w.write_uleb128_u32(0);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(run_no_host(&m, f, &[]), Err(Trap::CallDepthExceeded));
}

#[test]
fn deep_frames_exhaust_the_value_stack() {
    // Each frame carries 40 KiB of locals; the 1 MiB default stack fills
    // long before the depth limit.
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[], &[]));
    let locals = vec![ValueKind::I64; 5 * 1024];
    let f = m
        .add_function(
            t,
            &locals,
            body(|w| {
                op(w, Opcode::Call);
                w.write_uleb128_u32(0);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(run_no_host(&m, f, &[]), Err(Trap::StackExhausted));
}

#[test]
fn unreachable_and_indirect_call_trap() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[], &[]));
    let boom = m
        .add_function(t, &[], body(|w| op(w, Opcode::Unreachable)))
        .unwrap();
    let indirect = m
        .add_function(
            t,
            &[],
            body(|w| {
                i32_const(w, 0);
                op(w, Opcode::CallIndirect);
                w.write_uleb128_u32(0);
                w.write_u8(0x00);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    assert_eq!(run_no_host(&m, boom, &[]), Err(Trap::Unreachable));
    assert_eq!(
        run_no_host(&m, indirect, &[]),
        Err(Trap::IndirectCallUnsupported)
    );
}

#[test]
fn float_truncation_traps_and_saturates() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::F64], &[ValueKind::I32]));
    let trapping = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                op(w, Opcode::I32TruncF64S);
            }),
        )
        .unwrap();
    let saturating = m
        .add_function(
            t,
            &[],
            body(|w| {
                local_get(w, 0);
                w.write_u8(EXTENDED_PREFIX);
                w.write_uleb128_u32(2); // i32.trunc_sat_f64_s
            }),
        )
        .unwrap();
    m.expand().unwrap();

    assert_eq!(
        run_no_host(&m, trapping, &[Value::F64(-2.9)]).unwrap(),
        [Value::I32(-2)]
    );
    assert_eq!(
        run_no_host(&m, trapping, &[Value::F64(f64::NAN)]),
        Err(Trap::InvalidConversion)
    );
    assert_eq!(
        run_no_host(&m, trapping, &[Value::F64(1e30)]),
        Err(Trap::InvalidConversion)
    );
    assert_eq!(
        run_no_host(&m, saturating, &[Value::F64(f64::NAN)]).unwrap(),
        [Value::I32(0)]
    );
    assert_eq!(
        run_no_host(&m, saturating, &[Value::F64(1e30)]).unwrap(),
        [Value::I32(i32::MAX)]
    );
    assert_eq!(
        run_no_host(&m, saturating, &[Value::F64(-1e30)]).unwrap(),
        [Value::I32(i32::MIN)]
    );
}

#[test]
fn float_intrinsics() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::F64], &[ValueKind::F64]));
    let mut build =
        |m: &mut Module, o: Opcode| {
            m.add_function(
                t,
                &[],
                body(|w| {
                    local_get(w, 0);
                    op(w, o);
                }),
            )
            .unwrap()
        };
    let sqrt = build(&mut m, Opcode::F64Sqrt);
    let floor = build(&mut m, Opcode::F64Floor);
    let nearest = build(&mut m, Opcode::F64Nearest);
    m.expand().unwrap();

    assert_eq!(
        run_no_host(&m, sqrt, &[Value::F64(9.0)]).unwrap(),
        [Value::F64(3.0)]
    );
    assert_eq!(
        run_no_host(&m, floor, &[Value::F64(-1.5)]).unwrap(),
        [Value::F64(-2.0)]
    );
    // Ties round to even.
    assert_eq!(
        run_no_host(&m, nearest, &[Value::F64(2.5)]).unwrap(),
        [Value::F64(2.0)]
    );
}

#[test]
fn host_constant_import() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[], &[ValueKind::F64]));
    let pi = m.import_function("env", "pi", t).unwrap();
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                op(w, Opcode::Call);
                w.write_uleb128_u32(pi);
                f64_const(w, 2.0);
                op(w, Opcode::F64Mul);
            }),
        )
        .unwrap();
    m.expand().unwrap();
    let mut vm = Vm::new(TestHost::new());
    let mut instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[]).unwrap(),
        [Value::F64(core::f64::consts::TAU)]
    );
}

#[test]
fn invoke_checks_arity_and_converts_argument_kinds() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(t, &[], body(|w| local_get(w, 0)))
        .unwrap();
    m.expand().unwrap();
    assert_eq!(
        run_no_host(&m, f, &[]),
        Err(Trap::ArgCountMismatch {
            expected: 1,
            actual: 0,
        })
    );
    // Mismatched argument kinds are converted, not rejected.
    assert_eq!(
        run_no_host(&m, f, &[Value::F32(7.9)]),
        Ok(vec![Value::I32(7)])
    );
    assert_eq!(
        run_no_host(&m, f, &[Value::I64(0x1_0000_0005)]),
        Ok(vec![Value::I32(5)])
    );
    assert_eq!(
        run_no_host(&m, 9, &[]),
        Err(Trap::BadFunctionIndex { index: 9 })
    );
}

#[test]
fn custom_limits_apply() {
    let mut m = Module::new();
    let t = m.add_type(Signature::new(&[ValueKind::I32], &[ValueKind::I32]));
    let f = m
        .add_function(
            t,
            &[],
            body(|w| {
                // f(n) = n == 0 ? 0 : f(n - 1)
                local_get(w, 0);
                op(w, Opcode::I32Eqz);
                op(w, Opcode::If);
                w.write_u8(0x7f);
                i32_const(w, 0);
                op(w, Opcode::Else);
                local_get(w, 0);
                i32_const(w, 1);
                op(w, Opcode::I32Sub);
                op(w, Opcode::Call);
                w.write_uleb128_u32(0);
                op(w, Opcode::End);
            }),
        )
        .unwrap();
    m.expand().unwrap();

    let mut vm = Vm::with_limits(
        NoHost,
        Limits {
            max_call_depth: 8,
            ..Limits::default()
        },
    );
    let mut instance = vm.instantiate(&m, &Imports::new()).unwrap();
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[Value::I32(4)]).unwrap(),
        [Value::I32(0)]
    );
    assert_eq!(
        vm.invoke(&m, &mut instance, f, &[Value::I32(100)]),
        Err(Trap::CallDepthExceeded)
    );
}
