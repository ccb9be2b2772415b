//! Throughput benchmarks for the queue family (L6) across thread counts.
//!
//! Grounded on `rust/knhk-mu-kernel/benches/concurrent_structures.rs`'s
//! `benchmark_group` + `BenchmarkId::from_parameter(thread_count)` shape:
//! one group per structure, one bar per thread count, `Throughput::Elements`
//! set so criterion reports elements/sec rather than raw iteration time.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use knhk_concurrent::queue::{BasketQueue, MoirQueue, MsQueue, OptimisticQueue, TsigasCycleQueue, VyukovMpmcCycleQueue, WeakRingBuffer};
use knhk_concurrent::smr::{HazardPointer, Reclaim};

const OPS: u64 = 10_000;
const THREAD_COUNTS: [u64; 4] = [1, 2, 4, 8];

fn bench_ms_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ms_queue_push_pop");
    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let queue = Arc::new(MsQueue::<u64>::new());
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            HazardPointer::attach();
                            let per_thread = OPS / threads;
                            for i in 0..per_thread {
                                queue.push(t * per_thread + i);
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
    }
    group.finish();
}

fn bench_moir_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("moir_queue_push_pop");
    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let queue = Arc::new(MoirQueue::<u64>::new());
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            HazardPointer::attach();
                            let per_thread = OPS / threads;
                            for i in 0..per_thread {
                                queue.push(t * per_thread + i);
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
    }
    group.finish();
}

fn bench_optimistic_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimistic_queue_push_pop");
    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let queue = Arc::new(OptimisticQueue::<u64>::new());
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            HazardPointer::attach();
                            let per_thread = OPS / threads;
                            for i in 0..per_thread {
                                queue.push(t * per_thread + i);
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
    }
    group.finish();
}

fn bench_basket_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("basket_queue_push_pop");
    for &threads in &THREAD_COUNTS {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let queue = Arc::new(BasketQueue::<u64>::new());
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            HazardPointer::attach();
                            let per_thread = OPS / threads;
                            for i in 0..per_thread {
                                queue.push(t * per_thread + i);
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
    }
    group.finish();
}

fn bench_bounded_cycle_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_cycle_queue_push_pop");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("tsigas", |b| {
        b.iter(|| {
            let queue = Arc::new(TsigasCycleQueue::<u64>::new(1024));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..(OPS / 4) {
                            let _ = queue.push(t * (OPS / 4) + i);
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

    group.bench_function("vyukov", |b| {
        b.iter(|| {
            let queue = Arc::new(VyukovMpmcCycleQueue::<u64>::new(1024));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..(OPS / 4) {
                            let _ = queue.push(t * (OPS / 4) + i);
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

fn bench_spsc_ring_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring_buffer");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("single_producer_single_consumer", |b| {
        b.iter(|| {
            let ring = Arc::new(WeakRingBuffer::new(65536));
            let producer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..OPS {
                        let record = i.to_le_bytes();
                        loop {
                            if let Some(ptr) = ring.back(record.len()) {
                                unsafe { std::ptr::copy_nonoverlapping(record.as_ptr(), ptr, record.len()) };
                                ring.push_back();
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                })
            };
            let consumer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    let mut received = 0u64;
                    while received < OPS {
                        if ring.front().is_some() {
                            ring.pop_front();
                            received += 1;
                        }
                    }
                })
            };
            producer.join().unwrap();
            consumer.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ms_queue,
    bench_moir_queue,
    bench_optimistic_queue,
    bench_basket_queue,
    bench_bounded_cycle_queues,
    bench_spsc_ring_buffer,
);
criterion_main!(benches);
