//! Pointer words read out of another process's address space.
//!
//! A 64-bit scanner inspecting a 32-bit target must read 4-byte slots and
//! widen them. Reading a full native word instead would pick up the
//! neighbouring slot in the upper half on big-endian hosts.

/// Byte order of the words being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Data model of a target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignPointerWidth {
    Ilp32,
    Lp64,
}

impl ForeignPointerWidth {
    /// Pointer width of the running scanner.
    pub fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            ForeignPointerWidth::Lp64
        } else {
            ForeignPointerWidth::Ilp32
        }
    }

    pub fn word_size(&self) -> usize {
        match self {
            ForeignPointerWidth::Ilp32 => 4,
            ForeignPointerWidth::Lp64 => 8,
        }
    }

    /// Decodes one pointer word. Returns `None` when `bytes` is shorter than
    /// the word size; extra trailing bytes are ignored.
    pub fn decode(&self, bytes: &[u8], order: ByteOrder) -> Option<u64> {
        match self {
            ForeignPointerWidth::Ilp32 => {
                let word: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
                Some(match order {
                    ByteOrder::Little => u32::from_le_bytes(word),
                    ByteOrder::Big => u32::from_be_bytes(word),
                } as u64)
            }
            ForeignPointerWidth::Lp64 => {
                let word: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
                Some(match order {
                    ByteOrder::Little => u64::from_le_bytes(word),
                    ByteOrder::Big => u64::from_be_bytes(word),
                })
            }
        }
    }

    /// Address of slot `index` in a pointer array starting at `base`.
    pub fn slot_address(&self, base: u64, index: usize) -> Option<u64> {
        let offset = (index as u64).checked_mul(self.word_size() as u64)?;
        base.checked_add(offset)
    }
}
