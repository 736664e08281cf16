//! `tidbits` - run the accelerator demo flows from the command line.
//!
//! ```text
//! USAGE:
//!   tidbits signature <kind>            Read a build's signature register
//!   tidbits reg-ops <a> <b>             Scalar add, checked against a+b mod 2^32
//!   tidbits bram <op>...                BRAM commands: w:ADDR:DATA, r:ADDR
//!   tidbits dram-sum <ub>               Stream-sum 1..=ub, checked against ub(ub+1)/2
//!   tidbits accumulate [--seed N]       Load random values, check the vector sum
//!   tidbits memcpy <ub>                 Copy 1..=ub between buffers, verify, report cycles
//!   tidbits all                         Every flow above with default inputs
//! ```
//!
//! `--platform sim` (the default) runs against the software models;
//! `--platform mmio --device /dev/uio0 [--base 0x...] [--udmabuf udmabuf0]`
//! drives real hardware.

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tidbits_driver::regs::regs::bram::DEPTH as BRAM_DEPTH;
use tidbits_driver::regs::AcceleratorKind;
use tidbits_driver::{
    verify_copy, AccumulateJob, BramDriver, CopyCheck, DriverConfig, MemCopyDriver, MemCopyJob,
    MmioPlatform, PhysAllocator, PhysBuffer, Platform, PlatformSelection, RegOpsDriver, RegisterMap,
    SimPlatform, StreamSumDriver, StreamSumJob, VectorAccumulateDriver,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tidbits", about = "Polling accelerator demo runner", version)]
struct Cli {
    /// Where the accelerators live.
    #[arg(long, value_enum, default_value_t = PlatformKind::Sim, global = true)]
    platform: PlatformKind,

    /// Register window device for `--platform mmio` (e.g. /dev/uio0, /dev/mem).
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Byte offset of the register window within the device (hex with 0x).
    #[arg(long, value_parser = parse_u64, default_value = "0", global = true)]
    base: u64,

    /// u-dma-buf device name for buffer-backed flows (e.g. udmabuf0).
    #[arg(long, global = true)]
    udmabuf: Option<String>,

    /// Completion timeout in milliseconds; 0 waits forever. Overrides TIDBITS_POLL_TIMEOUT_MS.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Skip the signature check on attach.
    #[arg(long, global = true)]
    no_verify_signature: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformKind {
    /// Software models, no hardware required.
    Sim,
    /// Memory-mapped hardware.
    Mmio,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    RegOps,
    Bram,
    DramSum,
    Accumulate,
    Memcpy,
}

impl From<Kind> for AcceleratorKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::RegOps => Self::RegOps,
            Kind::Bram => Self::Bram,
            Kind::DramSum => Self::DramSum,
            Kind::Accumulate => Self::AccumulateVector,
            Kind::Memcpy => Self::MemCpy,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Read the signature register of one build.
    Signature {
        /// Accelerator build.
        #[arg(value_enum)]
        kind: Kind,
    },
    /// Add two operands on the scalar register-op build.
    RegOps {
        /// First operand.
        a: u32,
        /// Second operand.
        b: u32,
    },
    /// Issue BRAM writes and reads in order.
    Bram {
        /// `w:ADDR:DATA` to write, `r:ADDR` to read.
        #[arg(required = true)]
        ops: Vec<BramOp>,
    },
    /// Sum the sequence 1..=ub streamed from DRAM.
    DramSum {
        /// Upper bound, a multiple of 16.
        #[arg(default_value_t = 64)]
        ub: usize,
    },
    /// Load random values into the vector accumulator and sum them.
    Accumulate {
        /// RNG seed for reproducible values.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Copy the sequence 1..=ub between two DRAM buffers.
    Memcpy {
        /// Upper bound, a multiple of 16.
        #[arg(default_value_t = 64)]
        ub: usize,
    },
    /// Run every flow with default inputs.
    All,
}

#[derive(Clone, Copy, Debug)]
enum BramOp {
    Write { addr: u32, data: u32 },
    Read { addr: u32 },
}

impl FromStr for BramOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let num = |t: &str| parse_u64(t).and_then(|v| u32::try_from(v).map_err(|e| e.to_string()));
        match parts.as_slice() {
            ["w", addr, data] => Ok(Self::Write {
                addr: num(*addr)?,
                data: num(*data)?,
            }),
            ["r", addr] => Ok(Self::Read { addr: num(*addr)? }),
            _ => Err(format!("expected w:ADDR:DATA or r:ADDR, got '{s}'")),
        }
    }
}

fn parse_u64(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{s}': {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    let mut config = DriverConfig::from_env().context("Invalid TIDBITS_* environment")?;
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout((ms > 0).then(|| Duration::from_millis(ms)));
    }
    if cli.no_verify_signature {
        config = config.with_signature_check(false);
    }

    let selection = match cli.platform {
        PlatformKind::Sim => PlatformSelection::Simulated(SimPlatform::new()),
        PlatformKind::Mmio => {
            let device = cli.device.clone().context("--platform mmio needs --device")?;
            let mut platform = MmioPlatform::new(device, cli.base);
            if let Some(name) = &cli.udmabuf {
                platform = platform.with_udmabuf(name.clone());
            }
            PlatformSelection::Mmio(platform)
        }
    };
    tracing::info!("Platform: {}", selection.name());

    match &selection {
        PlatformSelection::Simulated(p) => dispatch(p, &cli.command, &config),
        PlatformSelection::Mmio(p) => dispatch(p, &cli.command, &config),
    }
}

fn dispatch<P: Platform>(platform: &P, cmd: &Cmd, config: &DriverConfig) -> Result<()> {
    match cmd {
        Cmd::Signature { kind } => cmd_signature(platform, (*kind).into()),
        Cmd::RegOps { a, b } => cmd_reg_ops(platform, config, *a, *b),
        Cmd::Bram { ops } => cmd_bram(platform, config, ops),
        Cmd::DramSum { ub } => cmd_dram_sum(platform, config, *ub),
        Cmd::Accumulate { seed } => cmd_accumulate(platform, config, *seed),
        Cmd::Memcpy { ub } => cmd_memcpy(platform, config, *ub),
        Cmd::All => {
            cmd_reg_ops(platform, config, 0xFFFF_FFF0, 0x20)?;
            cmd_bram(
                platform,
                config,
                &[
                    BramOp::Write { addr: 7, data: 0xC0DE },
                    BramOp::Write { addr: BRAM_DEPTH - 1, data: 42 },
                    BramOp::Read { addr: 7 },
                    BramOp::Read { addr: BRAM_DEPTH - 1 },
                ],
            )?;
            cmd_dram_sum(platform, config, 256)?;
            cmd_accumulate(platform, config, Some(0))?;
            cmd_memcpy(platform, config, 256)
        }
    }
}

fn cmd_signature<P: Platform>(platform: &P, kind: AcceleratorKind) -> Result<()> {
    let map = RegisterMap::new(platform.open_bus(kind.layout())?, kind.layout())?;
    let found = map.signature()?;
    let expected = kind.layout().signature;
    println!("{kind}: signature {found:#010x} (expected {expected:#010x})");
    ensure!(found == expected, "{kind} signature mismatch");
    Ok(())
}

fn cmd_reg_ops<P: Platform>(platform: &P, config: &DriverConfig, a: u32, b: u32) -> Result<()> {
    let mut accel = RegOpsDriver::attach(platform, config).context("Failed to attach TestRegOps")?;
    println!("Signature: {:#x}", accel.signature()?);
    let result = accel.add(a, b)?;
    let expected = a.wrapping_add(b);
    println!("Result = {result}, Expected = {expected}");
    ensure!(result == expected, "TestRegOps failed");
    Ok(())
}

fn cmd_bram<P: Platform>(platform: &P, config: &DriverConfig, ops: &[BramOp]) -> Result<()> {
    let mut accel = BramDriver::attach(platform, config).context("Failed to attach BRAMExample")?;
    println!("Signature: {:#x}", accel.signature()?);
    for op in ops {
        match *op {
            BramOp::Write { addr, data } => {
                accel.write(addr, data)?;
                println!("[{addr}] <- {data}");
            }
            BramOp::Read { addr } => println!("[{addr}] = {}", accel.read(addr)?),
        }
    }
    Ok(())
}

fn check_upper_bound(ub: usize) -> Result<()> {
    if ub == 0 || ub % 16 != 0 {
        bail!("Upper bound must be a positive multiple of 16, got {ub}");
    }
    Ok(())
}

fn sequence(ub: usize) -> Result<Vec<u32>> {
    let top = u32::try_from(ub).context("Upper bound exceeds u32")?;
    Ok((1..=top).collect())
}

fn cmd_dram_sum<P: Platform>(platform: &P, config: &DriverConfig, ub: usize) -> Result<()> {
    check_upper_bound(ub)?;
    let mut accel = StreamSumDriver::attach(platform, config).context("Failed to attach DRAMExample")?;
    println!("Signature: {:#x}", accel.signature()?);

    let alloc = platform.allocator().context("No physical allocator")?;
    let mut in_buf = alloc.allocate(ub, 4)?;
    in_buf.write_u32s(&sequence(ub)?)?;

    let result = accel.run(StreamSumJob::new(in_buf.descriptor()))?;
    alloc.release(in_buf);

    #[allow(clippy::cast_possible_truncation)] // the register is 32 bits wide
    let expected = (ub as u64 * (ub as u64 + 1) / 2) as u32;
    println!("Result = {result}, Expected = {expected}");
    ensure!(result == expected, "DRAMExample failed");
    Ok(())
}

fn cmd_accumulate<P: Platform>(platform: &P, config: &DriverConfig, seed: Option<u64>) -> Result<()> {
    let mut accel =
        VectorAccumulateDriver::attach(platform, config).context("Failed to attach TestAccumulateVector")?;
    println!("Signature: {:#x}", accel.signature()?);

    let mut rng = match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let values: Vec<u32> = (0..accel.vector_capacity()?).map(|_| rng.gen_range(0..=100)).collect();
    let expected = values.iter().copied().fold(0u32, u32::wrapping_add);

    let mut op = accel.configure(AccumulateJob::new(&values))?;
    op.trigger()?;
    op.wait()?;
    let result = op.finish()?;
    println!("Result = {result}, Expected = {expected}");
    ensure!(result == expected, "TestAccumulateVector failed");
    Ok(())
}

fn cmd_memcpy<P: Platform>(platform: &P, config: &DriverConfig, ub: usize) -> Result<()> {
    check_upper_bound(ub)?;
    let mut accel = MemCopyDriver::attach(platform, config).context("Failed to attach MemCpyExample")?;
    println!("Signature: {:#x}", accel.signature()?);

    let alloc = platform.allocator().context("No physical allocator")?;
    let mut in_buf = alloc.allocate(ub, 4)?;
    let out_buf = alloc.allocate(ub, 4)?;
    in_buf.write_u32s(&sequence(ub)?)?;

    let report = accel.run(MemCopyJob::whole(in_buf.descriptor(), out_buf.descriptor()))?;
    println!("Cycle count = {}", report.cycle_count);

    match verify_copy(&in_buf, &out_buf, report.byte_count)? {
        CopyCheck::Identical => Ok(()),
        CopyCheck::Mismatch { offset, expected, found } => {
            bail!("MemCpyExample failed: byte {offset} is {found:#04x}, expected {expected:#04x}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bram_ops() {
        assert!(matches!("w:3:0x10".parse::<BramOp>(), Ok(BramOp::Write { addr: 3, data: 16 })));
        assert!(matches!("r:1023".parse::<BramOp>(), Ok(BramOp::Read { addr: 1023 })));
        assert!("x:1".parse::<BramOp>().is_err());
        assert!("w:1".parse::<BramOp>().is_err());
    }

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_u64("0x40000000"), Ok(0x4000_0000));
        assert_eq!(parse_u64("64"), Ok(64));
        assert!(parse_u64("sixty").is_err());
    }

    #[test]
    fn every_flow_passes_on_the_simulator() {
        let config = DriverConfig::default();
        dispatch(&SimPlatform::new(), &Cmd::All, &config).unwrap();
    }

    #[test]
    fn upper_bound_must_be_a_burst_multiple() {
        let platform = SimPlatform::new();
        assert!(cmd_dram_sum(&platform, &DriverConfig::default(), 15).is_err());
        assert!(cmd_memcpy(&platform, &DriverConfig::default(), 0).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
