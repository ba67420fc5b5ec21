use std::hint::black_box;

use rand::Rng;

pub const BYTES_PER_MB: usize = 1024 * 1024;

/// Distance between committed bytes. One write per page is enough to force
/// the kernel to back the whole page.
pub const PAGE_STRIDE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBuffer {
    bytes: Vec<u8>,
}

impl ResourceBuffer {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn size_mb(&self) -> u32 {
        (self.bytes.len() / BYTES_PER_MB) as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Allocates `size_mb` MiB (0 is treated as 1) and commits every page.
///
/// Allocation failure is not recoverable here: the global allocator aborts
/// the process, which is the intended outcome of an over-dialed stress run.
pub fn allocate(size_mb: u32) -> ResourceBuffer {
    allocate_with(size_mb, &mut rand::thread_rng())
}

pub fn allocate_with<R: Rng + ?Sized>(size_mb: u32, rng: &mut R) -> ResourceBuffer {
    let size_mb = size_mb.max(1) as usize;
    let mut bytes = vec![0u8; size_mb * BYTES_PER_MB];
    for offset in (0..bytes.len()).step_by(PAGE_STRIDE) {
        bytes[offset] = rng.gen_range(0..=u8::MAX);
    }
    ResourceBuffer { bytes }
}

/// Single linear pass reading one byte per stride.
pub fn touch(buffer: &ResourceBuffer) -> u64 {
    let bytes = black_box(buffer.as_slice());
    let mut checksum = 0u64;
    for offset in (0..bytes.len()).step_by(PAGE_STRIDE) {
        checksum = checksum.wrapping_add(u64::from(bytes[offset]));
    }
    black_box(checksum)
}

/// Allocate, touch, release. The buffer never escapes, so from the caller's
/// side this is one uninterruptible unit of pressure.
pub fn churn(size_mb: u32) -> u64 {
    let buffer = allocate(size_mb);
    touch(&buffer)
}
