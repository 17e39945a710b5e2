//! Warp benchmarks: one 640x480 frame per antialiasing mode on the CPU kernel.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use juliacam::antialias::AntialiasingMode;
use juliacam::kernel::KernelLibrary;
use juliacam::{Frame, FrameParameters, FramePipeline};

fn checkerboard(width: u32, height: u32) -> Frame {
    let mut frame = Frame::filled(width, height, [16, 16, 16, 255]);
    for y in 0..height {
        for x in 0..width {
            if (x / 32 + y / 32) % 2 == 0 {
                frame.put_pixel(x, y, [240, (x % 256) as u8, (y % 256) as u8, 255]);
            }
        }
    }
    frame
}

fn bench_warp_modes(c: &mut Criterion) {
    let source = checkerboard(640, 480);
    let pipeline = FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default())
        .expect("default parameters are valid");

    let mut group = c.benchmark_group("warp_frame");
    group.sample_size(20);

    for mode in AntialiasingMode::ALL {
        let params = FrameParameters {
            antialiasing: mode,
            ..FrameParameters::default()
        };
        group.bench_function(format!("cpu_640x480_{mode}"), |b| {
            b.iter(|| black_box(pipeline.process(&source, &params).expect("frame")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_warp_modes);
criterion_main!(benches);
