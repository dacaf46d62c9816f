//! Slot handoff throughput and round-trip benchmark.
//!
//! Usage:
//!     cargo run --release --bin ring_bench
//!
//! Environment variables:
//!     BLOCKRING_BLOCK_SIZE=4096  Bytes per slot, at least 8 (default: 4096)
//!     BLOCKRING_NUM_BLOCKS=64    Slots per ring (default: 64)
//!     ITERATIONS=1000000         Slots handed over per run (default: 1 << 20)
//!     PRODUCER_CPU=0             Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2             Pin consumer to CPU 2 (default: 2)
//!     RUST_LOG=blockring=debug   Log filter when built with `--features tracing`

use std::env;

use minstant::Instant;

use blockring::config::BLOCK_SIZE_VAR;
use blockring::{ConfigError, Consumer, Producer, RingConfig};

const DEFAULT_ITERATIONS: u64 = 1 << 20;
const SEQ_LEN: usize = size_of::<u64>();

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    (
        Some(env_or("PRODUCER_CPU", 0)),
        Some(env_or("CONSUMER_CPU", 2)),
    )
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn write_seq(producer: &mut Producer, seq: u64) {
    let mut slot = producer.acquire();
    slot[..SEQ_LEN].copy_from_slice(&seq.to_le_bytes());
    slot.release();
}

fn read_seq(consumer: &mut Consumer) -> u64 {
    let slot = consumer.acquire();
    let mut bytes = [0u8; SEQ_LEN];
    bytes.copy_from_slice(&slot[..SEQ_LEN]);
    slot.release();
    u64::from_le_bytes(bytes)
}

fn bench_throughput(
    config: &RingConfig,
    iterations: u64,
    producer_cpu: Option<usize>,
    consumer_cpu: Option<usize>,
) -> Result<(), ConfigError> {
    let (mut producer, mut consumer) = blockring::create_with(config)?;

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for expected in 0..iterations {
            let value = read_seq(&mut consumer);
            if value != expected {
                panic!("Data corruption: expected {}, got {}", expected, value);
            }
        }
    });

    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for seq in 0..iterations {
        write_seq(&mut producer, seq);
    }
    consumer_thread.join().expect("consumer thread panicked");
    let elapsed = start.elapsed();

    let ops_per_ms = u128::from(iterations) * 1_000_000 / elapsed.as_nanos().max(1);
    let mib_per_s = (iterations as f64 * config.block_size_bytes as f64)
        / elapsed.as_secs_f64()
        / (1024.0 * 1024.0);
    println!("{} slots/ms, {:.1} MiB/s", ops_per_ms, mib_per_s);
    Ok(())
}

fn bench_rtt(
    config: &RingConfig,
    iterations: u64,
    producer_cpu: Option<usize>,
    consumer_cpu: Option<usize>,
) -> Result<(), ConfigError> {
    let (mut ping_tx, mut ping_rx) = blockring::create_with(config)?;
    let (mut pong_tx, mut pong_rx) = blockring::create_with(config)?;

    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        for _ in 0..iterations {
            // Echo in place: copy straight from the inbound slot to the outbound one.
            let inbound = ping_rx.acquire();
            let mut outbound = pong_tx.acquire();
            outbound.copy_from_slice(&inbound);
            outbound.release();
            inbound.release();
        }
    });

    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for seq in 0..iterations {
        write_seq(&mut ping_tx, seq);
        let echoed = read_seq(&mut pong_rx);
        assert_eq!(echoed, seq, "echo out of order");
    }
    let elapsed = start.elapsed();
    responder.join().expect("responder thread panicked");

    let rtt_ns = elapsed.as_nanos() / u128::from(iterations.max(1));
    println!("{} ns RTT", rtt_ns);
    Ok(())
}

fn run() -> Result<(), ConfigError> {
    blockring::init_tracing();

    let config = RingConfig::from_env()?;
    if config.block_size_bytes < SEQ_LEN {
        return Err(ConfigError::Invalid {
            var: BLOCK_SIZE_VAR,
            value: config.block_size_bytes.to_string(),
        });
    }
    let iterations = env_or("ITERATIONS", DEFAULT_ITERATIONS);
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!(
        "blockring (block={}B, blocks={}, iters={}):",
        config.block_size_bytes, config.num_blocks, iterations
    );
    bench_throughput(&config, iterations, producer_cpu, consumer_cpu)?;
    bench_rtt(&config, iterations, producer_cpu, consumer_cpu)?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("ring_bench: {e}");
        std::process::exit(1);
    }
}
