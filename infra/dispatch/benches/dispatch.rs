use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use evd_dispatch::*;
use std::hint::black_box;

type BenchDispatcher = Dispatcher<u16, u32, u32>;

fn populated(handlers: u32) -> BenchDispatcher {
    let dispatcher = BenchDispatcher::new();
    for key in 0..handlers {
        dispatcher.add_type_handler(0, key, handler_fn(|event| {
            black_box(event.value());
            Ok(())
        }), false);
        dispatcher.add_handler(EventId::new(0, key), key, handler_fn(|event| {
            black_box(event.kind());
            Ok(())
        }), false);
    }
    dispatcher
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for handlers in [1_u32, 16, 256] {
        let dispatcher = populated(handlers);
        group.throughput(Throughput::Elements(u64::from(handlers) + 1));

        group.bench_with_input(BenchmarkId::new("kind_and_value", handlers), &dispatcher, |b, d| {
            let id = EventId::new(0, handlers / 2);
            b.iter(|| d.dispatch(black_box(&id), None, &[]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("unknown_kind", handlers), &dispatcher, |b, d| {
            let id = EventId::new(1, 0);
            b.iter(|| d.dispatch(black_box(&id), None, &[]).unwrap());
        });
    }

    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    for handlers in [16_u32, 256] {
        group.bench_with_input(BenchmarkId::new("add_remove", handlers), &handlers, |b, &n| {
            b.iter(|| {
                let dispatcher = populated(n);
                for key in 0..n {
                    dispatcher.remove_handler(&EventId::new(0, key), &key);
                }
                black_box(dispatcher.type_count())
            });
        });

        group.bench_with_input(BenchmarkId::new("fire_once", handlers), &handlers, |b, &n| {
            b.iter(|| {
                let dispatcher = BenchDispatcher::new();
                for key in 0..n {
                    dispatcher.add_type_handler(7, key, handler_fn(|_| Ok(())), true);
                }
                dispatcher.dispatch(&EventId::new(7, 0), None, &[]).unwrap();
                black_box(dispatcher.is_empty())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_registration);
criterion_main!(benches);
