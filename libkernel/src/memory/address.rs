use core::{fmt, marker::PhantomData};

use super::{PAGE_MASK, SECTION_MASK};

macro_rules! address_type {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[repr(transparent)]
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            pub const fn from_value(v: usize) -> Self {
                Self(v)
            }

            pub const fn value(self) -> usize {
                self.0
            }

            pub const fn add_bytes(self, n: usize) -> Self {
                Self(self.0 + n)
            }

            /// Offset of this address within its 4KB page.
            pub const fn page_offset(self) -> usize {
                self.0 & PAGE_MASK
            }

            pub const fn page_aligned(self) -> Self {
                Self(self.0 & !PAGE_MASK)
            }

            pub const fn section_offset(self) -> usize {
                self.0 & SECTION_MASK
            }

            pub const fn section_aligned(self) -> Self {
                Self(self.0 & !SECTION_MASK)
            }

            pub const fn is_page_aligned(self) -> bool {
                self.page_offset() == 0
            }

            pub const fn is_section_aligned(self) -> bool {
                self.section_offset() == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#010x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }
    };
}

address_type!(
    /// A physical address.
    PA
);

address_type!(
    /// A kernel or user virtual address.
    VA
);

impl VA {
    pub const fn cast<T>(self) -> TVA<T> {
        TVA::from_value(self.0)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }
}

/// A virtual address known to hold a `T`.
pub struct TVA<T> {
    addr: usize,
    _phantom: PhantomData<*mut T>,
}

impl<T> Clone for TVA<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TVA<T> {}

impl<T> TVA<T> {
    pub const fn from_value(addr: usize) -> Self {
        Self {
            addr,
            _phantom: PhantomData,
        }
    }

    pub const fn value(self) -> usize {
        self.addr
    }

    pub const fn to_untyped(self) -> VA {
        VA::from_value(self.addr)
    }

    pub fn as_ptr(self) -> *const T {
        self.addr as *const T
    }

    pub fn as_ptr_mut(self) -> *mut T {
        self.addr as *mut T
    }
}

impl<T> fmt::Debug for TVA<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TVA({:#010x})", self.addr)
    }
}
