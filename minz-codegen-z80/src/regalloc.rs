//! Register assignment (spec §4.5).
//!
//! The Z80 has too few real registers to hold every MIR virtual register
//! live across a whole function body, so each virtual register gets a
//! fixed memory cell (`vr_<func>_<n>`), sized 1 or 2 bytes from its known
//! type (params/locals) or 2 bytes by default (MIR registers are 16-bit
//! per spec §3.4). The general registers {A, B, C, D, E, H, L} and pairs
//! {BC, DE, HL} are then used only as scratch space within one
//! instruction's template (§4.5: "Instruction selection... each case
//! emits a fixed template"), never held live across instructions — this
//! is the "simple linear-scan" the spec describes, scoped down to a
//! single-slot-per-register scheme rather than tracking live ranges and
//! register pressure, since a memory-backed virtual register file never
//! needs to spill. `IX`/`IY` stay reserved for the frame pointer and SMC
//! scratch as the spec directs, but this scheme has no stack frame to
//! point at (every local/temporary already has a fixed static address),
//! so in practice neither register is emitted by this backend yet; a
//! real stack-allocated frame is future work for recursive functions.
use minz_ir::{Function, Reg, Type};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bits8,
    Bits16,
}

impl Width {
    pub fn bytes(self) -> u32 {
        match self {
            Width::Bits8 => 1,
            Width::Bits16 => 2,
        }
    }

    pub fn from_type(ty: &Type) -> Width {
        match ty.byte_size() {
            1 => Width::Bits8,
            _ => Width::Bits16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegSlot {
    pub label: String,
    pub width: Width,
}

pub struct RegAlloc {
    slots: HashMap<Reg, RegSlot>,
}

impl RegAlloc {
    /// Assigns a memory slot to every register mentioned anywhere in `f`
    /// (params, locals, and bare temporaries that never got a name).
    pub fn build(f: &Function) -> RegAlloc {
        let mangled = crate::sanitized_name(&f.name);
        let mut slots = HashMap::new();

        for p in &f.params {
            slots.insert(p.reg, RegSlot { label: format!("vr_{mangled}_{}", p.reg), width: Width::from_type(&p.ty) });
        }
        for l in &f.locals {
            slots.entry(l.reg).or_insert_with(|| RegSlot {
                label: format!("vr_{mangled}_{}", l.reg),
                width: Width::from_type(&l.ty),
            });
        }
        for inst in &f.instructions {
            if let Some(dst) = inst.opcode.dst() {
                slots.entry(dst).or_insert_with(|| RegSlot {
                    label: format!("vr_{mangled}_{dst}"),
                    width: width_hint(inst.size),
                });
            }
            for src in inst.opcode.sources() {
                slots.entry(src).or_insert_with(|| RegSlot {
                    label: format!("vr_{mangled}_{src}"),
                    width: width_hint(inst.size),
                });
            }
        }

        RegAlloc { slots }
    }

    pub fn slot(&self, r: Reg) -> &RegSlot {
        self.slots.get(&r).expect("every referenced register has a slot by construction")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Reg, &RegSlot)> {
        self.slots.iter()
    }
}

fn width_hint(size: Option<u32>) -> Width {
    match size {
        Some(8) => Width::Bits8,
        _ => Width::Bits16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Instruction, Opcode};

    #[test]
    fn params_get_slots_sized_from_their_type() {
        let mut f = Function::new("m_f$u8$u16", Type::Void);
        let a = f.add_param("a", Type::UInt(8));
        let b = f.add_param("b", Type::UInt(16));
        f.push(Instruction::new(Opcode::Return { src: None }));
        let alloc = RegAlloc::build(&f);
        assert_eq!(alloc.slot(a).width, Width::Bits8);
        assert_eq!(alloc.slot(b).width, Width::Bits16);
    }

    #[test]
    fn bare_temporaries_default_to_16_bit() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let t = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: t, imm: 5 }));
        let alloc = RegAlloc::build(&f);
        assert_eq!(alloc.slot(t).width, Width::Bits16);
    }
}
