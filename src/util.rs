use crate::Flags;

pub const RCODE_NO_ERROR: u8 = 0;
pub const RCODE_FORMAT_ERROR: u8 = 1;
pub const RCODE_NOT_IMPLEMENTED: u8 = 4;

/// Flags for a reply to a request carrying `flags`: opcode, RD and CD are
/// kept, everything else is reset for a successful recursive answer.
pub fn set_response_flags(flags: Flags) -> Flags {
    let mut ret = Flags::default();
    ret.set_qr(true);
    ret.set_opcode(flags.opcode());
    ret.set_aa(false);
    ret.set_rd(flags.rd());
    ret.set_ra(true);
    ret.set_cd(flags.cd());
    ret.set_rcode(RCODE_NO_ERROR);
    ret
}
