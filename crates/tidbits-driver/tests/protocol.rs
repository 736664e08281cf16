//! End-to-end protocol tests against the simulated platform
//!
//! Each test drives a full configure/trigger/poll/read cycle through the
//! public API, with the register traffic checked where ordering matters.

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidbits_driver::regs::regs::{accumulate_vector, bram, dram_sum, memcpy};
use tidbits_driver::regs::AcceleratorKind;
use tidbits_driver::{
    verify_copy, AccumulateJob, BramDriver, CopyCheck, DriverConfig, DriverError, MemCopyDriver, MemCopyJob,
    OpState, PhysAllocator, PhysBuffer, RecordingBus, RegOpsDriver, SimPlatform, SimTiming, StreamSumDriver,
    StreamSumJob, VectorAccumulateDriver,
};

fn config() -> DriverConfig {
    DriverConfig::default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scalar_op_is_wrapping_add(a: u32, b: u32) {
        let mut driver = RegOpsDriver::attach(&SimPlatform::new(), &config()).unwrap();
        prop_assert_eq!(driver.add(a, b).unwrap(), a.wrapping_add(b));
    }

    #[test]
    fn bram_round_trip(addr in 0..bram::DEPTH, data: u32) {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &config()).unwrap();
        driver.write(addr, data).unwrap();
        prop_assert_eq!(driver.read(addr).unwrap(), data);
    }

    #[test]
    fn accumulate_matches_modular_sum(values in prop::collection::vec(any::<u32>(), accumulate_vector::NUM_ELEMS as usize)) {
        let mut driver = VectorAccumulateDriver::attach(&SimPlatform::new(), &config()).unwrap();
        let expected = values.iter().copied().fold(0u32, u32::wrapping_add);
        prop_assert_eq!(driver.accumulate(&values).unwrap(), expected);
    }

    #[test]
    fn stream_sum_of_one_to_ub(bursts in 1usize..64) {
        let ub = bursts * 16;
        let platform = SimPlatform::new();
        let mut buf = platform.sim_allocator().allocate(ub, 4).unwrap();
        let values: Vec<u32> = (1..=ub as u32).collect();
        buf.write_u32s(&values).unwrap();

        let mut driver = StreamSumDriver::attach(&platform, &config()).unwrap();
        let expected = (ub * (ub + 1) / 2) as u32;
        prop_assert_eq!(driver.sum(buf.descriptor()).unwrap(), expected);
    }
}

#[test]
fn bram_holds_many_words_at_once() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7EB1);
    let mut driver = BramDriver::attach(&SimPlatform::new(), &config()).unwrap();
    let words: Vec<u32> = (0..bram::DEPTH).map(|_| rng.gen()).collect();
    driver.write_block(0, &words).unwrap();
    assert_eq!(driver.read_block(0, words.len()).unwrap(), words);
}

#[test]
fn second_trigger_and_early_result_are_rejected() {
    let platform = SimPlatform::with_timing(SimTiming { latency_polls: 50, stalled: false });
    let buf = platform.sim_allocator().allocate(16, 4).unwrap();
    let mut driver = StreamSumDriver::attach(&platform, &config()).unwrap();

    let mut op = driver.configure(StreamSumJob::new(buf.descriptor())).unwrap();
    assert!(matches!(op.result(), Err(DriverError::NotReady { state: OpState::Configured })));
    op.trigger().unwrap();
    assert!(matches!(op.trigger(), Err(DriverError::OperationInProgress)));
    assert!(matches!(op.result(), Err(DriverError::NotReady { state: OpState::Running })));
    op.wait().unwrap();
    assert_eq!(op.finish().unwrap(), 0);
}

#[test]
fn memcpy_aligned_copy_matches_source() {
    let platform = SimPlatform::new();
    let alloc = platform.sim_allocator();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut src = alloc.allocate(1024, 4).unwrap();
    let dst = alloc.allocate(1024, 4).unwrap();
    let data: Vec<u32> = (0..1024).map(|_| rng.gen()).collect();
    src.write_u32s(&data).unwrap();

    let mut driver = MemCopyDriver::attach(&platform, &config()).unwrap();
    let report = driver.run(MemCopyJob::whole(src.descriptor(), dst.descriptor())).unwrap();
    assert_eq!(report.byte_count, 4096);
    assert_eq!(verify_copy(&src, &dst, 4096).unwrap(), CopyCheck::Identical);
    assert_eq!(dst.to_u32s().unwrap(), data);
}

#[test]
fn memcpy_misaligned_count_is_rejected_without_side_effects() {
    let platform = SimPlatform::new();
    let alloc = platform.sim_allocator();
    let mut src = alloc.allocate(64, 4).unwrap();
    let dst = alloc.allocate(64, 4).unwrap();
    src.write_u32s(&[0x5555_5555; 64]).unwrap();

    let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::MemCpy));
    let mut driver = MemCopyDriver::open(bus, &config()).unwrap();
    log.clear();

    let err = driver
        .configure(MemCopyJob::new(src.descriptor(), dst.descriptor(), 100))
        .unwrap_err();
    assert!(matches!(err, DriverError::AlignmentError { byte_count: 100, alignment: 64 }));
    assert!(log.transactions().is_empty());
    assert_eq!(driver.state(), OpState::Idle);
    assert!(matches!(verify_copy(&src, &dst, 64).unwrap(), CopyCheck::Mismatch { offset: 0, .. }));
}

#[test]
fn start_bit_goes_high_once_and_is_cleared_on_finish() {
    let platform = SimPlatform::new();
    let buf = platform.sim_allocator().allocate(16, 4).unwrap();
    let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::DramSum));
    let mut driver = StreamSumDriver::open(bus, &config()).unwrap();
    log.clear();

    driver.sum(buf.descriptor()).unwrap();
    assert_eq!(log.writes_to(dram_sum::START.offset), vec![1, 0]);
    assert_eq!(log.writes_to(dram_sum::BASE_ADDR.offset), vec![buf.descriptor().phys_addr()]);
    assert_eq!(log.writes_to(dram_sum::BYTE_COUNT.offset), vec![64]);
    assert!(log.reads_of(dram_sum::FINISHED.offset) >= 1);
    assert_eq!(log.reads_of(dram_sum::SUM.offset), 1);
}

#[test]
fn commits_from_concurrent_threads_never_interleave() {
    let platform = SimPlatform::new();
    let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::Bram));
    let driver = Arc::new(Mutex::new(BramDriver::open(bus, &config()).unwrap()));
    log.clear();

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let driver = Arc::clone(&driver);
            std::thread::spawn(move || {
                for i in 0..50 {
                    driver.lock().unwrap().write(t * 100 + i, t).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let enables = log.writes_to(bram::WRITE_ENABLE.offset);
    assert_eq!(enables.len(), 400);
    assert!(enables.chunks(2).all(|pair| pair == [1u64, 0]));

    let mut driver = driver.lock().unwrap();
    for t in 0..4u32 {
        assert_eq!(driver.read(t * 100 + 49).unwrap(), t);
    }
}

#[test]
fn timeout_wedges_and_reset_recovers() {
    let platform = SimPlatform::with_timing(SimTiming { latency_polls: 0, stalled: true });
    let mut src = platform.sim_allocator().allocate(16, 4).unwrap();
    src.write_u32s(&[1; 16]).unwrap();
    let dst = platform.sim_allocator().allocate(16, 4).unwrap();
    let quick = config().with_timeout(Some(Duration::from_millis(10)));
    let mut driver = MemCopyDriver::attach(&platform, &quick).unwrap();

    let err = driver.run(MemCopyJob::whole(src.descriptor(), dst.descriptor())).unwrap_err();
    assert!(matches!(err, DriverError::TimedOut { register, .. } if register == memcpy::FINISHED.name));
    assert_eq!(driver.state(), OpState::Wedged);
    assert!(matches!(
        driver.configure(MemCopyJob::whole(src.descriptor(), dst.descriptor())),
        Err(DriverError::Wedged)
    ));

    driver.reset().unwrap();
    assert_eq!(driver.state(), OpState::Idle);
}

#[test]
fn accumulate_guard_exposes_its_job() {
    let mut driver = VectorAccumulateDriver::attach(&SimPlatform::new(), &config()).unwrap();
    let values: Vec<u32> = (10..20).collect();
    let mut op = driver.configure(AccumulateJob::new(&values)).unwrap();
    assert_eq!(op.job().values.len(), 10);
    op.trigger().unwrap();
    op.wait_for(None).unwrap();
    assert_eq!(op.finish().unwrap(), (10..20).sum::<u32>());
}

#[test]
#[ignore] // Requires hardware
fn reg_ops_on_hardware() {
    use tidbits_driver::{MmioPlatform, Platform};

    let device = std::env::var("TIDBITS_DEVICE").unwrap_or_else(|_| "/dev/uio0".to_string());
    let platform = MmioPlatform::new(device, 0);
    let mut driver = RegOpsDriver::attach(&platform, &config()).expect("Failed to attach TestRegOps");
    assert_eq!(driver.add(1, 2).expect("register access failed"), 3);
    assert!(platform.name().starts_with("mmio"));
}
