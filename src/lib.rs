//! # Oort CPU Emulator
//!
//! A complete implementation of the Oort 64-bit instruction set in Rust.
//! The emulator provides deterministic instruction execution over a
//! byte-addressable memory with rotating aligned-block word access, a
//! four-way accumulator condition scheme, pattern- and sign-extended
//! immediates, and pluggable trap handling.
//!
//! ## Features
//!
//! - Complete Oort instruction set implementation (all 256 opcode bytes)
//! - Rotating word access that never crosses an aligned 8-byte block
//! - Explicit bounds checking with a reported memory fault, never UB
//! - Pluggable null/trace/syscall/extension trap hooks
//! - Multi-instance HTTP emulation service with snapshots and metrics
//! - Comprehensive test suite
//!
//! ## Example
//!
//! ```rust
//! use oort_emulator::cpu::{CPU, HaltOnTrap};
//! use oort_emulator::memory::Memory;
//!
//! let mut cpu = CPU::new();
//! let mut memory = Memory::new(65536);
//!
//! // Load a simple program: test $zpmn, mt r5, halt
//! memory.write(0, 0x1F).unwrap();
//! memory.write(1, 0x35).unwrap();
//! memory.write(2, 0x0F).unwrap();
//!
//! cpu.run(&mut memory, &mut HaltOnTrap).unwrap();
//!
//! assert_eq!(cpu.get_gpr(5), u64::MAX);
//! assert!(cpu.is_halted());
//! ```

#![recursion_limit = "2048"]

pub mod cpu;
pub mod error;
pub mod memory;
pub mod server;
pub mod metrics;
pub mod auth;
pub mod instance_types;
pub mod snapshots;

pub use cpu::CPU;
pub use error::EmulatorError;
pub use memory::Memory;
