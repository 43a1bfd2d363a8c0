use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gvm_classfile::access::{ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::{ClassBuilder, CodeBuilder, Opcode};
use gvm_core::{MemoryClassSource, Value, Vm};

/// `Bench.sum(n)`, `Bench.fib(n)` and `Bench.fill(n)`
fn bench_class() -> Vec<u8> {
    let mut class = ClassBuilder::new("Bench", Some("java/lang/Object"));
    let fib = class.method_ref("Bench", "fib", "(I)I");

    // int s = 0; for (int i = 0; i < n; i++) s += i; return s;
    let mut sum = CodeBuilder::new(2, 3);
    let (top, done) = (sum.new_label(), sum.new_label());
    sum.op(Opcode::Iconst0).op(Opcode::Istore1);
    sum.op(Opcode::Iconst0).op(Opcode::Istore2);
    sum.label(top);
    sum.op(Opcode::Iload2).op(Opcode::Iload0).branch(Opcode::IfIcmpge, done);
    sum.op(Opcode::Iload1).op(Opcode::Iload2).op(Opcode::Iadd).op(Opcode::Istore1);
    sum.iinc(2, 1).branch(Opcode::Goto, top);
    sum.label(done);
    sum.op(Opcode::Iload1).op(Opcode::Ireturn);

    // n < 2 ? n : fib(n - 1) + fib(n - 2)
    let mut fib_code = CodeBuilder::new(3, 1);
    let recurse = fib_code.new_label();
    fib_code.op(Opcode::Iload0).op(Opcode::Iconst2).branch(Opcode::IfIcmpge, recurse);
    fib_code.op(Opcode::Iload0).op(Opcode::Ireturn);
    fib_code.label(recurse);
    fib_code.op(Opcode::Iload0).op(Opcode::Iconst1).op(Opcode::Isub);
    fib_code.op_u16(Opcode::Invokestatic, fib);
    fib_code.op(Opcode::Iload0).op(Opcode::Iconst2).op(Opcode::Isub);
    fib_code.op_u16(Opcode::Invokestatic, fib);
    fib_code.op(Opcode::Iadd).op(Opcode::Ireturn);

    // long[] a = new long[n]; for (i = 0; i < n; i++) a[i] = i; return a.length;
    let mut fill = CodeBuilder::new(4, 3);
    let (top, done) = (fill.new_label(), fill.new_label());
    fill.op(Opcode::Iload0).op_u8(Opcode::Newarray, gvm_classfile::opcode::array_type::T_LONG);
    fill.op(Opcode::Astore1).op(Opcode::Iconst0).op(Opcode::Istore2);
    fill.label(top);
    fill.op(Opcode::Iload2).op(Opcode::Iload0).branch(Opcode::IfIcmpge, done);
    fill.op(Opcode::Aload1).op(Opcode::Iload2).op(Opcode::Iload2).op(Opcode::I2l);
    fill.op(Opcode::Lastore).iinc(2, 1).branch(Opcode::Goto, top);
    fill.label(done);
    fill.op(Opcode::Aload1).op(Opcode::Arraylength).op(Opcode::Ireturn);

    let access = ACC_PUBLIC | ACC_STATIC;
    class.method(access, "sum", "(I)I", Some(sum.finish().unwrap()));
    class.method(access, "fib", "(I)I", Some(fib_code.finish().unwrap()));
    class.method(access, "fill", "(I)I", Some(fill.finish().unwrap()));
    class.build()
}

fn bench_vm() -> Vm {
    let mut source = MemoryClassSource::new();
    source.add(bench_class()).unwrap();
    Vm::builder().source(source).build()
}

fn bench_loop(c: &mut Criterion) {
    let vm = bench_vm();
    let mut group = c.benchmark_group("loop");

    for n in [100, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("sum", n), &n, |b, &n| {
            b.iter(|| {
                vm.invoke_static("Bench", "sum", "(I)I", &[Value::Int(black_box(n))])
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_calls(c: &mut Criterion) {
    let vm = bench_vm();

    c.bench_function("fib_20", |b| {
        b.iter(|| {
            vm.invoke_static("Bench", "fib", "(I)I", &[Value::Int(black_box(20))])
                .unwrap()
        });
    });
}

fn bench_arrays(c: &mut Criterion) {
    let vm = bench_vm();

    c.bench_function("fill_long_array_1000", |b| {
        b.iter(|| {
            vm.invoke_static("Bench", "fill", "(I)I", &[Value::Int(black_box(1000))])
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_loop, bench_calls, bench_arrays);
criterion_main!(benches);
