use std::fs::OpenOptions;
use std::hint::black_box;
use std::os::fd::AsRawFd;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use molt_runtime_core::with_gil;
use molt_runtime_unix::{buffered_write, UNIX_BUFFER_SIZE};

fn bench_buffered_write(c: &mut Criterion) {
    let sink = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .expect("open /dev/null");
    let fd = sink.as_raw_fd();
    let mut group = c.benchmark_group("buffered_write");
    for size in [512usize, UNIX_BUFFER_SIZE, UNIX_BUFFER_SIZE * 16] {
        let data = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("dev_null", size), &data, |b, data| {
            with_gil(|mut py| {
                let buffer = py.heap().alloc_bytes(data);
                b.iter(|| black_box(buffered_write(&mut py, fd, buffer, 0, data.len() as i64)));
                py.heap().dec_ref(buffer);
            });
        });
    }
    group.finish();
}

criterion_group!(buffered_write_benches, bench_buffered_write);
criterion_main!(buffered_write_benches);
