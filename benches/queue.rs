use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use handoff::{Queue, RunLoop};

fn bench_async_cycle(c: &mut Criterion) {
  c.bench_function("async_push_pop_1024", |b| {
    b.iter(|| {
      let ex = RunLoop::new();
      let q = Queue::new(ex.clone(), 1024);
      for i in 0..1024u64 {
        q.async_push(i, |_| {});
      }
      for _ in 0..1024 {
        q.async_pop(|result| {
          black_box(result.ok());
        });
      }
      ex.run()
    })
  });

  c.bench_function("async_rendezvous_256", |b| {
    b.iter(|| {
      let ex = RunLoop::new();
      let q = Queue::new(ex.clone(), 0);
      for i in 0..256u64 {
        q.async_pop(|result| {
          black_box(result.ok());
        });
        q.async_push(i, |_| {});
      }
      ex.run()
    })
  });
}

fn bench_try_cycle(c: &mut Criterion) {
  c.bench_function("try_push_pop_64", |b| {
    let ex = RunLoop::new();
    let q = Queue::new(ex, 64);
    b.iter(|| {
      for i in 0..64u64 {
        let _ = q.try_push(i);
      }
      let mut acc = 0;
      while let Ok(v) = q.try_pop() {
        acc += v;
      }
      black_box(acc)
    })
  });
}

criterion_group!(benches, bench_async_cycle, bench_try_cycle);
criterion_main!(benches);
