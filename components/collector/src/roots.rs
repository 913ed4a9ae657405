//! Conservative root discovery.
//!
//! Roots come from three places: callee-saved registers, the native
//! stack between the current stack pointer and the thread's registered
//! stack base, and word spans of global data registered by the host.
//! Every word is treated as a potential pointer and filtered down to
//! exact, allocated object addresses.

use page_allocator::{resolve_object, PageTable};

/// A registered span of global words scanned on every collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSpan {
    /// First word address. Must be 8-aligned.
    pub base: usize,
    /// Number of words in the span.
    pub words: usize,
}

/// Reads the current stack pointer.
#[cfg(target_arch = "x86_64")]
pub fn current_sp() -> usize {
    let sp: usize;
    // SAFETY: reads rsp into a local without touching memory.
    unsafe {
        core::arch::asm!("mov {0}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}

/// Reads the current stack pointer.
#[cfg(target_arch = "aarch64")]
pub fn current_sp() -> usize {
    let sp: usize;
    // SAFETY: reads sp into a local without touching memory.
    unsafe {
        core::arch::asm!("mov {0}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}

/// Stack scanning is unsupported on this architecture.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn current_sp() -> usize {
    0
}

/// Captures the callee-saved registers of the calling frame.
///
/// Values the mutator still holds in registers at the collection call
/// are either visible here or were spilled into a frame the stack walk
/// covers.
#[cfg(target_arch = "x86_64")]
pub fn capture_registers() -> Vec<usize> {
    let rbx: usize;
    let rbp: usize;
    let r12: usize;
    let r13: usize;
    let r14: usize;
    let r15: usize;
    // SAFETY: each instruction copies one named register into a local.
    // A self-move is harmless if the output lands in the named register.
    unsafe {
        core::arch::asm!("mov {0}, rbx", out(reg) rbx, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, r12", out(reg) r12, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, r13", out(reg) r13, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, r14", out(reg) r14, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, r15", out(reg) r15, options(nomem, nostack, preserves_flags));
    }
    vec![rbx, rbp, r12, r13, r14, r15, current_sp()]
}

/// Captures the callee-saved registers of the calling frame.
#[cfg(target_arch = "aarch64")]
pub fn capture_registers() -> Vec<usize> {
    let x19: usize;
    let x20: usize;
    let x21: usize;
    let x22: usize;
    let x23: usize;
    let x24: usize;
    let x25: usize;
    let x26: usize;
    let x27: usize;
    let x28: usize;
    let x29: usize;
    // SAFETY: each instruction copies one named register into a local.
    unsafe {
        core::arch::asm!("mov {0}, x19", out(reg) x19, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x20", out(reg) x20, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x21", out(reg) x21, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x22", out(reg) x22, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x23", out(reg) x23, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x24", out(reg) x24, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x25", out(reg) x25, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x26", out(reg) x26, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x27", out(reg) x27, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x28", out(reg) x28, options(nomem, nostack, preserves_flags));
        core::arch::asm!("mov {0}, x29", out(reg) x29, options(nomem, nostack, preserves_flags));
    }
    vec![
        x19,
        x20,
        x21,
        x22,
        x23,
        x24,
        x25,
        x26,
        x27,
        x28,
        x29,
        current_sp(),
    ]
}

/// Register capture is unsupported on this architecture.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn capture_registers() -> Vec<usize> {
    Vec::new()
}

/// Filters one candidate word down to an exact allocated object address.
///
/// The checks run cheapest first: alignment, heap envelope, then the
/// membership index, then page-exact resolution. Words pointing into the
/// scanned stack span itself are dropped so stack-internal addresses
/// never masquerade as heap pointers.
fn filter_candidate(
    word: usize,
    stack_lo: usize,
    stack_hi: usize,
    table: &PageTable,
) -> Option<usize> {
    if word == 0 || word & 7 != 0 {
        return None;
    }
    if !table.in_envelope(word) {
        return None;
    }
    if word >= stack_lo && word < stack_hi {
        return None;
    }
    if !table.query(word) {
        return None;
    }
    // SAFETY: the membership index says the page holding word is resident.
    let obj = unsafe { resolve_object(word)? };
    if !obj.header().is_allocated() {
        return None;
    }
    Some(obj.addr())
}

/// Discovers the root set for the calling thread.
///
/// Scans registers and the native stack when `scan_native_stack` is on,
/// then every registered global span. Returns exact object addresses,
/// sorted and deduplicated.
#[inline(never)]
pub fn discover_roots(
    stack_base: usize,
    globals: &[GlobalSpan],
    scan_native_stack: bool,
    table: &PageTable,
) -> Vec<usize> {
    let mut roots = Vec::new();
    let mut stack_lo = 0usize;
    let mut stack_hi = 0usize;

    if scan_native_stack {
        let sp = current_sp();
        if sp != 0 && sp < stack_base {
            stack_lo = sp;
            stack_hi = stack_base;
        }
        for word in capture_registers() {
            if let Some(addr) = filter_candidate(word, stack_lo, stack_hi, table) {
                roots.push(addr);
            }
        }
        let mut cursor = (stack_lo + 7) & !7;
        while cursor + 8 <= stack_hi {
            // SAFETY: [stack_lo, stack_hi) is mapped stack memory of the
            // calling thread; every read stays inside it.
            let word = unsafe { *(cursor as *const usize) };
            if let Some(addr) = filter_candidate(word, stack_lo, stack_hi, table) {
                roots.push(addr);
            }
            cursor += 8;
        }
    }

    for span in globals {
        for i in 0..span.words {
            // SAFETY: registered spans point at live global data sized in
            // whole words.
            let word = unsafe { *((span.base + i * 8) as *const usize) };
            if let Some(addr) = filter_candidate(word, stack_lo, stack_hi, table) {
                roots.push(addr);
            }
        }
    }

    roots.sort_unstable();
    roots.dedup();
    roots
}
