use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::cpu::CPU;
use crate::memory::Memory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub emulator_id: String,
    pub owner_id: String,
    pub cpu_state: CpuSnapshot,
    pub memory_dump: Vec<u8>,
    pub metadata: SnapshotMetadata,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u64,
    pub acc: u64,
    pub lr: u64,
    pub sr: u64,
    pub gpr: [u64; 16],
    pub cycles: u64,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub emulator_type: String,
    pub template_id: Option<String>,
    pub memory_size: u64,
    pub checkpoint_reason: CheckpointReason,
    pub instruction_count: u64,
    pub execution_time_ms: u64,
    pub compression_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckpointReason {
    Manual,
    Automatic,
    BeforeRisk,     // Before potentially dangerous operation
    Scheduled,      // Periodic backup
    BeforeShutdown,
    Breakpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSnapshotRequest {
    pub snapshot_id: String,
    pub force: Option<bool>, // Restore even if it would overwrite running state
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotListResponse {
    pub snapshots: Vec<SnapshotSummary>,
    pub total_count: usize,
    pub total_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub checkpoint_reason: CheckpointReason,
    pub tags: Vec<String>,
}

pub type SnapshotStore = std::sync::Arc<std::sync::Mutex<HashMap<String, EmulatorSnapshot>>>;

impl EmulatorSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn create_from_emulator(
        name: String,
        description: String,
        emulator_id: String,
        owner_id: String,
        cpu: &CPU,
        memory: &Memory,
        emulator_type: String,
        template_id: Option<String>,
        reason: CheckpointReason,
        execution_time_ms: u64,
        tags: Vec<String>,
    ) -> Self {
        let cpu_state = CpuSnapshot {
            pc: cpu.get_pc(),
            acc: cpu.get_acc(),
            lr: cpu.get_lr(),
            sr: cpu.get_sr(),
            gpr: cpu.gpr,
            cycles: cpu.get_cycles(),
            halted: cpu.is_halted(),
        };

        // Compress the memory image; zero-filled regions are the common case
        let original_size = memory.size();
        let compressed_dump = compress_memory(memory.bytes());
        let compression_ratio = compressed_dump.len() as f32 / original_size as f32;

        let metadata = SnapshotMetadata {
            emulator_type,
            template_id,
            memory_size: original_size,
            checkpoint_reason: reason,
            instruction_count: cpu.get_cycles(),
            execution_time_ms,
            compression_ratio,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            emulator_id,
            owner_id,
            cpu_state,
            memory_dump: compressed_dump.clone(),
            metadata,
            created_at: Utc::now(),
            size_bytes: compressed_dump.len() as u64,
            tags,
        }
    }

    pub fn restore_to_emulator(&self, cpu: &mut CPU, memory: &mut Memory) -> Result<(), String> {
        if self.metadata.memory_size != memory.size() {
            return Err(format!(
                "snapshot memory size {} does not match emulator memory size {}",
                self.metadata.memory_size,
                memory.size()
            ));
        }

        // Restore CPU state
        cpu.set_pc(self.cpu_state.pc);
        cpu.set_acc(self.cpu_state.acc);
        cpu.set_lr(self.cpu_state.lr);
        cpu.set_sr(self.cpu_state.sr);
        cpu.gpr = self.cpu_state.gpr;
        cpu.set_cycles(self.cpu_state.cycles);

        if self.cpu_state.halted {
            cpu.halt();
        } else {
            cpu.resume();
        }

        // Restore memory
        let decompressed_memory =
            decompress_memory(&self.memory_dump, self.metadata.memory_size as usize)?;
        memory.load_image(&decompressed_memory);

        Ok(())
    }

    pub fn can_user_access(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.owner_id == user_id
    }

    pub fn get_summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            size_bytes: self.size_bytes,
            checkpoint_reason: self.metadata.checkpoint_reason.clone(),
            tags: self.tags.clone(),
        }
    }
}

// Simple run-length encoding for memory compression
fn compress_memory(memory: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < memory.len() {
        let current_byte = memory[i];
        let mut count = 1;

        // Count consecutive identical bytes (max 255)
        while i + count < memory.len() &&
              memory[i + count] == current_byte &&
              count < 255 {
            count += 1;
        }

        if count > 3 || current_byte == 0 {
            // Use RLE for runs of 4+ or any zeros
            compressed.push(0xFF); // RLE marker
            compressed.push(count as u8);
            compressed.push(current_byte);
        } else {
            // Store literal bytes
            for j in 0..count {
                if memory[i + j] == 0xFF {
                    // Escape literal 0xFF
                    compressed.push(0xFF);
                    compressed.push(0x00);
                } else {
                    compressed.push(memory[i + j]);
                }
            }
        }

        i += count;
    }

    compressed
}

fn decompress_memory(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
    let mut decompressed = Vec::with_capacity(expected_len);
    let mut i = 0;

    while i < compressed.len() {
        if compressed[i] == 0xFF {
            if i + 1 >= compressed.len() {
                return Err("Truncated RLE data".to_string());
            }

            if compressed[i + 1] == 0x00 {
                // Escaped literal 0xFF
                decompressed.push(0xFF);
                i += 2;
            } else {
                // RLE sequence
                if i + 2 >= compressed.len() {
                    return Err("Truncated RLE sequence".to_string());
                }

                let count = compressed[i + 1];
                let value = compressed[i + 2];

                for _ in 0..count {
                    decompressed.push(value);
                }

                i += 3;
            }
        } else {
            // Literal byte
            decompressed.push(compressed[i]);
            i += 1;
        }
    }

    if decompressed.len() != expected_len {
        return Err(format!(
            "Decompressed size {} != {}",
            decompressed.len(),
            expected_len
        ));
    }

    Ok(decompressed)
}

// Extensions to CPU for snapshot support
impl CPU {
    pub fn set_pc(&mut self, value: u64) {
        self.pc = value;
    }

    pub fn set_acc(&mut self, value: u64) {
        self.acc = value;
    }

    pub fn set_lr(&mut self, value: u64) {
        self.lr = value;
    }

    pub fn set_sr(&mut self, value: u64) {
        self.sr = value;
    }

    pub fn set_gpr(&mut self, r: usize, value: u64) {
        self.gpr[r] = value;
    }

    pub fn set_cycles(&mut self, value: u64) {
        self.cycles = value;
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::HaltOnTrap;
    use crate::instance_types::MASK_BUILDER_IMAGE;

    #[test]
    fn test_memory_compression() {
        let mut memory = vec![0u8; 4096];

        // Add some patterns
        memory[0x100] = 0xFF;
        memory[0x101] = 0xFF;
        memory[0x102] = 0xFF;
        memory[0x103] = 0xFF;

        memory[0x200] = 0xAA;
        memory[0x201] = 0xBB;
        memory[0x202] = 0xCC;

        let compressed = compress_memory(&memory);
        let decompressed = decompress_memory(&compressed, memory.len()).unwrap();

        assert_eq!(memory, decompressed);
        assert!(compressed.len() < memory.len()); // Should be smaller
    }

    #[test]
    fn test_rle_escape() {
        let mut memory = vec![0x00; 4096];
        memory[0] = 0xFF;
        memory[1] = 0xFF;
        memory[2] = 0xAA;
        memory[3] = 0xFF;
        memory[4] = 0x00;

        let compressed = compress_memory(&memory);
        let decompressed = decompress_memory(&compressed, memory.len()).unwrap();

        assert_eq!(memory, decompressed);
    }

    #[test]
    fn test_decompress_rejects_wrong_size() {
        let memory = vec![0u8; 64];
        let compressed = compress_memory(&memory);
        assert!(decompress_memory(&compressed, 128).is_err());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut cpu = CPU::new();
        let mut memory = Memory::new(4096);
        memory.load_image(&MASK_BUILDER_IMAGE);
        cpu.run(&mut memory, &mut HaltOnTrap).unwrap();
        assert_eq!(cpu.get_acc(), 0xEFCDAB8967452301);

        let snapshot = EmulatorSnapshot::create_from_emulator(
            "checkpoint".to_string(),
            "after mask build".to_string(),
            "emulator-1".to_string(),
            "owner-1".to_string(),
            &cpu,
            &memory,
            "micro".to_string(),
            None,
            CheckpointReason::Manual,
            0,
            vec![],
        );

        // Clobber the machine, then restore
        let mut other_cpu = CPU::new();
        let mut other_memory = Memory::new(4096);
        other_cpu.set_acc(123);
        other_memory.write(0, 0xEE).unwrap();

        snapshot
            .restore_to_emulator(&mut other_cpu, &mut other_memory)
            .unwrap();

        assert_eq!(other_cpu.get_acc(), 0xEFCDAB8967452301);
        assert_eq!(other_cpu.get_pc(), cpu.get_pc());
        assert_eq!(other_cpu.get_cycles(), cpu.get_cycles());
        assert!(other_cpu.is_halted());
        assert_eq!(other_memory.bytes(), memory.bytes());
    }

    #[test]
    fn test_snapshot_restore_size_mismatch() {
        let cpu = CPU::new();
        let memory = Memory::new(4096);
        let snapshot = EmulatorSnapshot::create_from_emulator(
            "checkpoint".to_string(),
            String::new(),
            "emulator-1".to_string(),
            "owner-1".to_string(),
            &cpu,
            &memory,
            "micro".to_string(),
            None,
            CheckpointReason::Manual,
            0,
            vec![],
        );

        let mut small_cpu = CPU::new();
        let mut small_memory = Memory::new(64);
        assert!(snapshot
            .restore_to_emulator(&mut small_cpu, &mut small_memory)
            .is_err());
    }
}
