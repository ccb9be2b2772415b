//! Reclamation-overhead benchmarks for the SMR substrate (L2/L3a/L3b).
//!
//! Grounded on `rust/knhk-mu-kernel/benches/concurrent_structures.rs`'s
//! `bench_epoch_reclamation`/`bench_atomic_arc` shape (pin/retire/drop under
//! a fixed thread count, `Throughput::Elements` over the op count) — applied
//! here to compare [`HazardPointer`] against [`DeferredHazard`] and against
//! [`NoReclaim`] as a no-protection floor, and to measure `MsQueue` push/pop
//! throughput under each strategy to see how protection cost actually shows
//! up in a real structure rather than in isolation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread;

use knhk_concurrent::queue::MsQueue;
use knhk_concurrent::smr::{DeferredHazard, HazardPointer, NoReclaim, Reclaim, ReclaimGuard, RetireEntry};

const OPS: u64 = 4_000;
const THREAD_COUNTS: [u64; 3] = [1, 2, 4];

fn bench_pin_protect_retire<R: Reclaim>(c: &mut Criterion, name: &str) {
    let mut group = c.benchmark_group(name);
    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        thread::spawn(move || {
                            R::attach();
                            let per_thread = OPS / threads;
                            for _ in 0..per_thread {
                                let boxed: *mut u64 = Box::into_raw(Box::new(0u64));
                                let atomic = AtomicPtr::new(boxed);
                                {
                                    let guard = R::pin();
                                    let p = guard.protect(&atomic);
                                    assert!(!p.is_null());
                                    guard.retire(RetireEntry::for_boxed(atomic.load(Ordering::Acquire)));
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
                R::force_dispose();
            });
        });
    }
    group.finish();
}

fn bench_hazard_pointer_cycle(c: &mut Criterion) {
    bench_pin_protect_retire::<HazardPointer>(c, "smr_cycle_hazard_pointer");
}

fn bench_deferred_cycle(c: &mut Criterion) {
    bench_pin_protect_retire::<DeferredHazard>(c, "smr_cycle_deferred_epoch");
}

fn bench_no_reclaim_cycle(c: &mut Criterion) {
    bench_pin_protect_retire::<NoReclaim>(c, "smr_cycle_no_reclaim");
}

fn bench_ms_queue_under_hazard_pointer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ms_queue_under_hazard_pointer");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("four_threads", |b| {
        b.iter(|| {
            let queue = Arc::new(MsQueue::<u64, HazardPointer>::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        HazardPointer::attach();
                        for i in 0..(OPS / 4) {
                            queue.push(t * (OPS / 4) + i);
                            queue.pop();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
    });
    group.finish();
}

fn bench_ms_queue_under_deferred(c: &mut Criterion) {
    let mut group = c.benchmark_group("ms_queue_under_deferred_epoch");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("four_threads", |b| {
        b.iter(|| {
            let queue = Arc::new(MsQueue::<u64, DeferredHazard>::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        DeferredHazard::attach();
                        for i in 0..(OPS / 4) {
                            queue.push(t * (OPS / 4) + i);
                            queue.pop();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_hazard_pointer_cycle,
    bench_deferred_cycle,
    bench_no_reclaim_cycle,
    bench_ms_queue_under_hazard_pointer,
    bench_ms_queue_under_deferred,
);
criterion_main!(benches);
