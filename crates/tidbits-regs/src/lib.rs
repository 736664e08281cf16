//! Register model for the tidbits polling accelerators.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure description of the hardware contract every accelerator build exposes:
//! register offsets, widths, access modes, build signatures, and the DMA
//! alignment rules the streaming engines impose.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`layout`] | `RegisterDef`, `Layout`, access modes and widths |
//! | [`regs`] | Per-variant register maps (scalar op, BRAM, DRAM sum, vector accumulate, memcpy) |
//! | [`platform`] | Word size, DMA alignment, physical address width |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod layout;
pub mod platform;
pub mod regs;

pub use layout::{Access, AcceleratorKind, Layout, RegisterDef, Width};
