//! Static change-of-flow-instruction map.
//!
//! The map is built once, eagerly, from a disassembled binary image and is
//! immutable afterwards. Unlike a lazily-resolved CFG, every branch-affecting
//! instruction in the image is classified up front, which lets the walker
//! treat lookups as a pure, side-effect-free function.

use hashbrown::HashMap;
use iced_x86::{Code, Decoder as IcedDecoder, DecoderOptions as IcedDecoderOptions, FlowControl, Instruction};

use covpt_decoder::TraceeMode;

/// Classification of a change-of-flow instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CofiKind {
    /// A conditional Jcc/LOOP/LOOPcc.
    ConditionalBranch,
    /// A direct JMP or direct CALL.
    UnconditionalDirect,
    /// An indirect JMP or indirect CALL.
    IndirectBranch,
    /// A RET.
    NearRet,
    /// Any other control-flow-changing instruction (IRET, SYSCALL, ...).
    FarTransfer,
}

/// One entry of the [`CofiMap`], keyed by instruction address.
#[derive(Clone, Copy, Debug)]
pub struct CofiRecord {
    /// Classification of this instruction.
    pub kind: CofiKind,
    /// Static branch target, if statically known.
    ///
    /// Defined for [`CofiKind::ConditionalBranch`] and
    /// [`CofiKind::UnconditionalDirect`]; `None` otherwise.
    pub target_addr: Option<u64>,
    /// Address of the next COFI record in program order, i.e. the record
    /// reached if this branch is not taken.
    ///
    /// Only defined for [`CofiKind::ConditionalBranch`].
    pub fallthrough_next: Option<u64>,
}

/// Eagerly-built, read-only map from instruction address to [`CofiRecord`].
pub struct CofiMap {
    base: u64,
    max: u64,
    records: HashMap<u64, CofiRecord>,
}

/// Initial capacity for the COFI map's backing hash map.
const COFI_MAP_INITIAL_CAPACITY: usize = 0x1000;

impl CofiMap {
    /// Build a [`CofiMap`] from a raw image covering `[base, base + image.len())`.
    ///
    /// The image is disassembled once, linearly, from `base`. Instructions
    /// that do not change control flow are elided from the map. The
    /// `fallthrough_next` chain is linked in a single backward pass over the
    /// collected records, so it never needs to be patched during decoding.
    #[must_use]
    pub fn build(image: &[u8], base: u64, tracee_mode: TraceeMode) -> Self {
        let max = base.saturating_add(image.len() as u64);

        let mut decoder =
            IcedDecoder::with_ip(tracee_mode.bitness(), image, base, IcedDecoderOptions::NONE);
        let mut instruction = Instruction::default();
        let mut ordered = Vec::with_capacity(COFI_MAP_INITIAL_CAPACITY);

        while decoder.can_decode() {
            decoder.decode_out(&mut instruction);
            if instruction.is_invalid() {
                continue;
            }
            if let Some((kind, target_addr)) = classify(&instruction) {
                ordered.push((instruction.ip(), kind, target_addr));
            }
        }

        let mut records = HashMap::with_capacity(ordered.len());
        let mut next_cofi_addr = None;
        for (addr, kind, target_addr) in ordered.into_iter().rev() {
            let fallthrough_next = match kind {
                CofiKind::ConditionalBranch => next_cofi_addr,
                _ => None,
            };
            records.insert(
                addr,
                CofiRecord {
                    kind,
                    target_addr,
                    fallthrough_next,
                },
            );
            next_cofi_addr = Some(addr);
        }

        Self { base, max, records }
    }

    /// Look up the COFI record at `ip`, if any.
    ///
    /// Idempotent and side-effect free.
    #[must_use]
    pub fn lookup(&self, ip: u64) -> Option<&CofiRecord> {
        self.records.get(&ip)
    }

    /// Whether `addr` lies within `[base, max)` of the image this map was built from.
    #[must_use]
    pub fn in_range(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.max
    }

    /// Number of COFI records in the map.
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.len()
    }
}

/// Classify an instruction into a [`CofiKind`], merging CALL and JMP variants
/// into a single direct/indirect distinction.
///
/// Returns `None` for instructions that do not change control flow.
fn classify(instruction: &Instruction) -> Option<(CofiKind, Option<u64>)> {
    if instruction.is_jcc_short_or_near() || instruction.is_loop() || instruction.is_loopcc() {
        Some((CofiKind::ConditionalBranch, Some(instruction.near_branch_target())))
    } else if instruction.is_jmp_near_indirect() || instruction.is_call_near_indirect() {
        Some((CofiKind::IndirectBranch, None))
    } else if instruction.is_jmp_short_or_near() || instruction.is_call_near() {
        Some((CofiKind::UnconditionalDirect, Some(instruction.near_branch_target())))
    } else if matches!(
        instruction.code(),
        Code::Retnd
            | Code::Retnd_imm16
            | Code::Retnq
            | Code::Retnq_imm16
            | Code::Retnw
            | Code::Retnw_imm16
    ) {
        Some((CofiKind::NearRet, None))
    } else if !matches!(instruction.flow_control(), FlowControl::Next) {
        Some((CofiKind::FarTransfer, None))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_branch_links_fallthrough() {
        // 0: 74 02       jz +2   (-> 4)
        // 2: 90          nop
        // 3: 90          nop
        // 4: eb fe       jmp -2  (-> 4)
        let image = [0x74, 0x02, 0x90, 0x90, 0xeb, 0xfe];
        let map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);

        let jz = map.lookup(0x1000).expect("jz should be a COFI record");
        assert_eq!(jz.kind, CofiKind::ConditionalBranch);
        assert_eq!(jz.target_addr, Some(0x1004));
        assert_eq!(jz.fallthrough_next, Some(0x1004));

        let jmp = map.lookup(0x1004).expect("jmp should be a COFI record");
        assert_eq!(jmp.kind, CofiKind::UnconditionalDirect);
        assert_eq!(jmp.target_addr, Some(0x1004));
        assert_eq!(jmp.fallthrough_next, None);

        assert_eq!(map.size(), 2);
        assert!(map.lookup(0x1002).is_none());
    }

    #[test]
    fn indirect_and_ret_leave_target_undefined() {
        // 0: ff e0       jmp rax
        // 2: c3          ret
        let image = [0xff, 0xe0, 0xc3];
        let map = CofiMap::build(&image, 0x2000, TraceeMode::Mode64);

        let jmp_rax = map.lookup(0x2000).unwrap();
        assert_eq!(jmp_rax.kind, CofiKind::IndirectBranch);
        assert_eq!(jmp_rax.target_addr, None);
        assert_eq!(jmp_rax.fallthrough_next, None);

        let ret = map.lookup(0x2002).unwrap();
        assert_eq!(ret.kind, CofiKind::NearRet);
        assert_eq!(ret.target_addr, None);
    }

    #[test]
    fn in_range_respects_image_bounds() {
        let image = [0xc3];
        let map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);
        assert!(map.in_range(0x1000));
        assert!(!map.in_range(0xFFF));
        assert!(!map.in_range(0x1001));
    }
}
