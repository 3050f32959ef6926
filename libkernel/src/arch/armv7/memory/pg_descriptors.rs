use bitflags::bitflags;
use tock_registers::interfaces::{ReadWriteable, Readable};
use tock_registers::{register_bitfields, registers::InMemoryRegister};

use crate::memory::{
    PAGE_MASK, PAGE_SHIFT, SECTION_SHIFT,
    address::{PA, VA},
};

/// The only domain used; everything is checked against the AP bits.
pub const DOMAIN0: u8 = 0;

// ARMv6+ extended short-descriptor formats (subpages disabled).
register_bitfields![u32,
    L1Fields [
        TYPE         OFFSET(0)  NUMBITS(2) [
            Fault = 0,
            Coarse = 1,
            Section = 2,
            Reserved = 3
        ],
        B            OFFSET(2)  NUMBITS(1) [],
        C            OFFSET(3)  NUMBITS(1) [],
        XN           OFFSET(4)  NUMBITS(1) [],
        DOMAIN       OFFSET(5)  NUMBITS(4) [],
        COARSE_BASE  OFFSET(10) NUMBITS(22) [],
        AP           OFFSET(10) NUMBITS(2) [],
        TEX          OFFSET(12) NUMBITS(3) [],
        S            OFFSET(16) NUMBITS(1) [],
        SECTION_BASE OFFSET(20) NUMBITS(12) []
    ],
    L2Fields [
        XN           OFFSET(0)  NUMBITS(1) [],
        SMALL        OFFSET(1)  NUMBITS(1) [],
        B            OFFSET(2)  NUMBITS(1) [],
        C            OFFSET(3)  NUMBITS(1) [],
        AP           OFFSET(4)  NUMBITS(2) [],
        TEX          OFFSET(6)  NUMBITS(3) [],
        S            OFFSET(10) NUMBITS(1) [],
        BASE         OFFSET(12) NUMBITS(20) []
    ]
];

const COARSE_BASE_SHIFT: usize = 10;

/// TEX value selecting outer/inner write-back, write-allocate.
const TEX_WRITE_ALLOC: u32 = 0b001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccessPermission {
    NoAccess = 0,
    KernelRw = 1,
    UserRo = 2,
    UserRw = 3,
}

impl AccessPermission {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::NoAccess,
            1 => Self::KernelRw,
            2 => Self::UserRo,
            _ => Self::UserRw,
        }
    }
}

bitflags! {
    /// Memory attributes independent of which level they are encoded at.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemAttrs: u8 {
        const BUFFERABLE  = 1 << 0;
        const CACHEABLE   = 1 << 1;
        const WRITE_ALLOC = 1 << 2;
        const SHAREABLE   = 1 << 3;
    }
}

bitflags! {
    /// Intent carried in the low bits of a physical address handed to the
    /// fault path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: usize {
        const VALID    = 1 << 0;
        const WRITE    = 1 << 1;
        const UNCACHED = 1 << 2;
        const KERNEL   = 1 << 3;
        const NOEXEC   = 1 << 4;
    }
}

/// A page frame address with [`PteFlags`] folded into its offset bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPa(usize);

impl EncodedPa {
    pub fn new(frame: PA, flags: PteFlags) -> Self {
        assert!(frame.is_page_aligned(), "frame {frame} is not page aligned");
        Self(frame.value() | flags.bits())
    }

    pub const fn from_raw(v: usize) -> Self {
        Self(v)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn frame(self) -> PA {
        PA::from_value(self.0 & !PAGE_MASK)
    }

    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & PAGE_MASK)
    }
}

/// A decoded translation table entry of either level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Fault,
    Section {
        base: PA,
        domain: u8,
        ap: AccessPermission,
        attrs: MemAttrs,
        exec: bool,
    },
    Coarse {
        table: PA,
        domain: u8,
    },
    Small {
        base: PA,
        ap: AccessPermission,
        attrs: MemAttrs,
        exec: bool,
    },
}

impl Descriptor {
    /// Physical address `va` resolves to, when this is a leaf mapping.
    pub fn output_address(self, va: VA) -> Option<PA> {
        match self {
            Self::Section { base, .. } => Some(base.add_bytes(va.section_offset())),
            Self::Small { base, .. } => Some(base.add_bytes(va.page_offset())),
            Self::Fault | Self::Coarse { .. } => None,
        }
    }

    pub fn is_fault(self) -> bool {
        matches!(self, Self::Fault)
    }
}

/// First-level entry.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L1Descriptor(u32);

impl L1Descriptor {
    pub const FAULT: Self = Self(0);

    pub const fn from_raw(v: u32) -> Self {
        Self(v)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub fn is_fault(self) -> bool {
        self.decode().is_fault()
    }

    /// A 1MB section mapping of `pa`, which must be section aligned.
    pub fn section(
        pa: PA,
        domain: u8,
        ap: AccessPermission,
        attrs: MemAttrs,
        exec: bool,
    ) -> Self {
        debug_assert!(pa.is_section_aligned());

        let reg = InMemoryRegister::<u32, L1Fields::Register>::new(0);
        reg.modify(
            L1Fields::TYPE::Section
                + L1Fields::XN.val(!exec as u32)
                + L1Fields::DOMAIN.val(domain as u32)
                + L1Fields::AP.val(ap as u32)
                + L1Fields::SECTION_BASE.val((pa.value() >> SECTION_SHIFT) as u32),
        );
        Self::apply_attrs(&reg, attrs);

        Self(reg.get())
    }

    /// A pointer to a 256-entry second-level table at `table`.
    pub fn coarse(table: PA, domain: u8) -> Self {
        debug_assert!(table.value() & ((1 << COARSE_BASE_SHIFT) - 1) == 0);

        let reg = InMemoryRegister::<u32, L1Fields::Register>::new(0);
        reg.modify(
            L1Fields::TYPE::Coarse
                + L1Fields::DOMAIN.val(domain as u32)
                + L1Fields::COARSE_BASE.val((table.value() >> COARSE_BASE_SHIFT) as u32),
        );

        Self(reg.get())
    }

    pub fn decode(self) -> Descriptor {
        let reg = InMemoryRegister::<u32, L1Fields::Register>::new(self.0);

        match reg.read_as_enum(L1Fields::TYPE) {
            Some(L1Fields::TYPE::Value::Section) => Descriptor::Section {
                base: PA::from_value((reg.read(L1Fields::SECTION_BASE) as usize) << SECTION_SHIFT),
                domain: reg.read(L1Fields::DOMAIN) as u8,
                ap: AccessPermission::from_bits(reg.read(L1Fields::AP)),
                attrs: Self::read_attrs(&reg),
                exec: !reg.is_set(L1Fields::XN),
            },
            Some(L1Fields::TYPE::Value::Coarse) => Descriptor::Coarse {
                table: PA::from_value(
                    (reg.read(L1Fields::COARSE_BASE) as usize) << COARSE_BASE_SHIFT,
                ),
                domain: reg.read(L1Fields::DOMAIN) as u8,
            },
            _ => Descriptor::Fault,
        }
    }

    /// Physical address of the second-level table, for a coarse entry.
    pub fn next_table_address(self) -> Option<PA> {
        match self.decode() {
            Descriptor::Coarse { table, .. } => Some(table),
            _ => None,
        }
    }

    /// The same section with `attrs` cleared; any other entry is returned
    /// unchanged.
    pub fn without_attrs(self, attrs: MemAttrs) -> Self {
        match self.decode() {
            Descriptor::Section {
                base,
                domain,
                ap,
                attrs: cur,
                exec,
            } => Self::section(base, domain, ap, cur.difference(attrs), exec),
            _ => self,
        }
    }

    fn apply_attrs(reg: &InMemoryRegister<u32, L1Fields::Register>, attrs: MemAttrs) {
        let tex = if attrs.contains(MemAttrs::WRITE_ALLOC) {
            TEX_WRITE_ALLOC
        } else {
            0
        };

        reg.modify(
            L1Fields::B.val(attrs.contains(MemAttrs::BUFFERABLE) as u32)
                + L1Fields::C.val(attrs.contains(MemAttrs::CACHEABLE) as u32)
                + L1Fields::TEX.val(tex)
                + L1Fields::S.val(attrs.contains(MemAttrs::SHAREABLE) as u32),
        );
    }

    fn read_attrs(reg: &InMemoryRegister<u32, L1Fields::Register>) -> MemAttrs {
        let mut attrs = MemAttrs::empty();
        attrs.set(MemAttrs::BUFFERABLE, reg.is_set(L1Fields::B));
        attrs.set(MemAttrs::CACHEABLE, reg.is_set(L1Fields::C));
        attrs.set(MemAttrs::WRITE_ALLOC, reg.read(L1Fields::TEX) == TEX_WRITE_ALLOC);
        attrs.set(MemAttrs::SHAREABLE, reg.is_set(L1Fields::S));
        attrs
    }
}

/// Second-level entry.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L2Descriptor(u32);

impl L2Descriptor {
    pub const FAULT: Self = Self(0);

    pub const fn from_raw(v: u32) -> Self {
        Self(v)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub fn is_fault(self) -> bool {
        self.decode().is_fault()
    }

    /// A 4KB small-page mapping of `pa`, which must be page aligned.
    pub fn small(pa: PA, ap: AccessPermission, attrs: MemAttrs, exec: bool) -> Self {
        debug_assert!(pa.is_page_aligned());

        let tex = if attrs.contains(MemAttrs::WRITE_ALLOC) {
            TEX_WRITE_ALLOC
        } else {
            0
        };

        let reg = InMemoryRegister::<u32, L2Fields::Register>::new(0);
        reg.modify(
            L2Fields::SMALL::SET
                + L2Fields::XN.val(!exec as u32)
                + L2Fields::AP.val(ap as u32)
                + L2Fields::B.val(attrs.contains(MemAttrs::BUFFERABLE) as u32)
                + L2Fields::C.val(attrs.contains(MemAttrs::CACHEABLE) as u32)
                + L2Fields::TEX.val(tex)
                + L2Fields::S.val(attrs.contains(MemAttrs::SHAREABLE) as u32)
                + L2Fields::BASE.val((pa.value() >> PAGE_SHIFT) as u32),
        );

        Self(reg.get())
    }

    pub fn decode(self) -> Descriptor {
        let reg = InMemoryRegister::<u32, L2Fields::Register>::new(self.0);

        if !reg.is_set(L2Fields::SMALL) {
            return Descriptor::Fault;
        }

        let mut attrs = MemAttrs::empty();
        attrs.set(MemAttrs::BUFFERABLE, reg.is_set(L2Fields::B));
        attrs.set(MemAttrs::CACHEABLE, reg.is_set(L2Fields::C));
        attrs.set(MemAttrs::WRITE_ALLOC, reg.read(L2Fields::TEX) == TEX_WRITE_ALLOC);
        attrs.set(MemAttrs::SHAREABLE, reg.is_set(L2Fields::S));

        Descriptor::Small {
            base: PA::from_value((reg.read(L2Fields::BASE) as usize) << PAGE_SHIFT),
            ap: AccessPermission::from_bits(reg.read(L2Fields::AP)),
            attrs,
            exec: !reg.is_set(L2Fields::XN),
        }
    }
}
