use crate::error::EmulatorError;

/// Default memory capacity in bytes when no size is configured.
pub const DEFAULT_MEMSIZE: u64 = 65536;

pub struct Memory {
    data: Vec<u8>, // capacity is always a positive multiple of 8
}

impl Memory {
    // Capacity is rounded up to the next multiple of 8 so that every byte
    // lives inside a complete aligned block.
    pub fn new(memsize: u64) -> Self {
        let memsize = ((memsize.max(1) - 1) | 7) + 1;
        Memory {
            data: vec![0; memsize as usize],
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    // Load a binary image at address 0, truncated or zero-padded to capacity.
    pub fn load_image(&mut self, image: &[u8]) {
        self.data.fill(0);
        let len = image.len().min(self.data.len());
        self.data[..len].copy_from_slice(&image[..len]);
    }

    pub fn read(&self, address: u64) -> Result<u8, EmulatorError> {
        self.data
            .get(address as usize)
            .copied()
            .ok_or(EmulatorError::MemoryFault {
                addr: address,
                capacity: self.size(),
            })
    }

    pub fn write(&mut self, address: u64, value: u8) -> Result<(), EmulatorError> {
        let capacity = self.size();
        match self.data.get_mut(address as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EmulatorError::MemoryFault {
                addr: address,
                capacity,
            }),
        }
    }

    // Read the 8-byte aligned block containing `idx`, rotated so the byte at
    // `idx` lands in the least-significant lane. The access never crosses
    // into the next or previous block: a fixed-width bus always reads one
    // aligned block, and sub-block addressing only selects which byte lands
    // in which lane.
    pub fn read_word(&self, idx: u64) -> Result<u64, EmulatorError> {
        let base = idx & !7;
        self.check_block(idx, base)?;
        let off = idx & 7;
        let mut val = 0u64;
        for i in 0..8 {
            let byte = self.data[(base + ((off + i) & 7)) as usize];
            val |= (byte as u64) << (i * 8);
        }
        Ok(val)
    }

    // Inverse of `read_word`: the little-endian bytes of `val` go into the
    // same rotated positions within the aligned block.
    pub fn write_word(&mut self, idx: u64, val: u64) -> Result<(), EmulatorError> {
        let base = idx & !7;
        self.check_block(idx, base)?;
        let off = idx & 7;
        for i in 0..8 {
            self.data[(base + ((off + i) & 7)) as usize] = (val >> (i * 8)) as u8;
        }
        Ok(())
    }

    fn check_block(&self, idx: u64, base: u64) -> Result<(), EmulatorError> {
        // base ends in 0b000, so base + 7 cannot overflow
        if base + 7 >= self.size() {
            return Err(EmulatorError::MemoryFault {
                addr: idx,
                capacity: self.size(),
            });
        }
        Ok(())
    }

    // 16-byte window rendered as space-separated hex bytes, clipped to
    // capacity. Diagnostic only.
    pub fn dump_window(&self, address: u64) -> String {
        let mut out = String::new();
        for i in 0..16 {
            let byte = address
                .checked_add(i)
                .and_then(|addr| self.data.get(addr as usize));
            if let Some(&byte) = byte {
                out.push_str(&format!(" {:02x}", byte));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_rounds_up_to_multiple_of_8() {
        assert_eq!(Memory::new(0).size(), 8);
        assert_eq!(Memory::new(1).size(), 8);
        assert_eq!(Memory::new(8).size(), 8);
        assert_eq!(Memory::new(9).size(), 16);
        assert_eq!(Memory::new(65536).size(), 65536);
        assert_eq!(Memory::new(65537).size(), 65544);
    }

    #[test]
    fn test_byte_read_write() {
        let mut memory = Memory::new(16);
        memory.write(3, 0xAB).unwrap();
        assert_eq!(memory.read(3).unwrap(), 0xAB);
        assert_eq!(memory.read(4).unwrap(), 0x00);
    }

    #[test]
    fn test_byte_access_out_of_bounds() {
        let mut memory = Memory::new(16);
        assert!(memory.read(16).is_err());
        assert!(memory.write(16, 0x01).is_err());
        assert!(matches!(
            memory.read(100),
            Err(EmulatorError::MemoryFault {
                addr: 100,
                capacity: 16
            })
        ));
    }

    #[test]
    fn test_read_word_rotates_within_block() {
        let mut memory = Memory::new(24);
        for i in 0..8 {
            memory.write(8 + i, 0x10 + i as u8).unwrap();
        }

        // Aligned read is a plain little-endian load of the block
        assert_eq!(memory.read_word(8).unwrap(), 0x1716151413121110);

        // Offset 3: the byte at idx becomes the least-significant lane and
        // the low bytes of the block wrap around to the top
        assert_eq!(
            memory.read_word(11).unwrap(),
            u64::from_le_bytes([0x13, 0x14, 0x15, 0x16, 0x17, 0x10, 0x11, 0x12])
        );
    }

    #[test]
    fn test_write_word_round_trip_at_every_offset() {
        for off in 0..8 {
            let mut memory = Memory::new(32);
            let val = 0x0123456789ABCDEF;
            memory.write_word(8 + off, val).unwrap();
            assert_eq!(memory.read_word(8 + off).unwrap(), val);
        }
    }

    #[test]
    fn test_unaligned_write_is_a_rotation_of_the_block() {
        let mut memory = Memory::new(32);
        let val = 0x0123456789ABCDEF;
        memory.write_word(11, val).unwrap();
        // Reading the block at its base sees the value rotated left by the
        // offset (3 bytes)
        assert_eq!(memory.read_word(8).unwrap(), val.rotate_left(24));
    }

    #[test]
    fn test_word_access_never_crosses_block_boundary() {
        let mut memory = Memory::new(32);
        memory.write_word(13, u64::MAX).unwrap();
        // Adjacent blocks stay untouched
        for addr in 0..8 {
            assert_eq!(memory.read(addr).unwrap(), 0);
        }
        for addr in 16..32 {
            assert_eq!(memory.read(addr).unwrap(), 0);
        }
        // The whole containing block is written
        for addr in 8..16 {
            assert_eq!(memory.read(addr).unwrap(), 0xFF);
        }
    }

    #[test]
    fn test_same_offset_different_block_reads_disjoint_bytes() {
        let mut memory = Memory::new(32);
        memory.write_word(5, 0x1111111111111111).unwrap();
        memory.write_word(13, 0x2222222222222222).unwrap();
        assert_eq!(memory.read_word(5).unwrap(), 0x1111111111111111);
        assert_eq!(memory.read_word(13).unwrap(), 0x2222222222222222);
    }

    #[test]
    fn test_word_access_out_of_bounds() {
        let mut memory = Memory::new(16);
        assert!(memory.read_word(15).is_ok());
        assert!(memory.read_word(16).is_err());
        assert!(memory.write_word(16, 0).is_err());
        // An index whose containing block cannot fit is a fault even when
        // the block base itself is far beyond capacity
        assert!(memory.read_word(u64::MAX).is_err());
    }

    #[test]
    fn test_load_image_truncates_and_pads() {
        let mut memory = Memory::new(8);
        memory.load_image(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(memory.bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut memory = Memory::new(8);
        memory.write(7, 0xFF).unwrap();
        memory.load_image(&[1, 2]);
        assert_eq!(memory.bytes(), &[1, 2, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_dump_window_format() {
        let mut memory = Memory::new(32);
        memory.write(0, 0x1F).unwrap();
        memory.write(1, 0x35).unwrap();
        assert_eq!(
            memory.dump_window(0),
            " 1f 35 00 00 00 00 00 00 00 00 00 00 00 00 00 00"
        );
        // Clipped at capacity
        assert_eq!(memory.dump_window(24), " 00 00 00 00 00 00 00 00");
    }
}
