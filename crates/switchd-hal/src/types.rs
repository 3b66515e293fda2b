//! Type-safe hardware object id wrappers.
//!
//! Object ids of different kinds cannot be mixed: passing a port id where a
//! router-interface id is expected fails to compile instead of programming
//! the wrong object.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw hardware object id.
pub type RawObjectId = u64;

/// Marker trait for hardware object kinds.
pub trait ObjectKind: Send + Sync + 'static {
    /// Returns the object kind name for debugging.
    fn kind_name() -> &'static str;
}

/// A type-safe hardware object id.
///
/// The phantom parameter `T` records what kind of object the id refers to.
#[derive(Clone, Copy)]
pub struct SwitchObjectId<T: ObjectKind> {
    raw: RawObjectId,
    _marker: PhantomData<T>,
}

impl<T: ObjectKind> SwitchObjectId<T> {
    /// The null object id.
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates an object id from a raw value.
    ///
    /// Returns `None` if the raw value is 0 (the null id); use [`Self::NULL`]
    /// for explicitly null ids.
    pub fn from_raw(raw: RawObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    /// Creates an object id from a raw value, allowing null.
    pub const fn from_raw_unchecked(raw: RawObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw id value.
    pub const fn as_raw(&self) -> RawObjectId {
        self.raw
    }

    /// Returns true if this is the null id.
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Returns true if this is a valid (non-null) id.
    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

impl<T: ObjectKind> fmt::Debug for SwitchObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", T::kind_name(), self.raw)
    }
}

impl<T: ObjectKind> fmt::Display for SwitchObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.raw)
    }
}

impl<T: ObjectKind> PartialEq for SwitchObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ObjectKind> Eq for SwitchObjectId<T> {}

impl<T: ObjectKind> Hash for SwitchObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ObjectKind> Default for SwitchObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

macro_rules! define_object_kind {
    ($name:ident, $kind_name:literal, $oid_alias:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ObjectKind for $name {
            fn kind_name() -> &'static str {
                $kind_name
            }
        }

        pub type $oid_alias = SwitchObjectId<$name>;
    };
}

define_object_kind!(SwitchKind, "Switch", SwitchOid);
define_object_kind!(PortKind, "Port", PortOid);
define_object_kind!(LagKind, "Lag", LagOid);
define_object_kind!(VlanKind, "Vlan", VlanOid);
define_object_kind!(VirtualRouterKind, "VirtualRouter", VirtualRouterOid);
define_object_kind!(RouterInterfaceKind, "RouterInterface", RouterInterfaceOid);
define_object_kind!(NextHopKind, "NextHop", NextHopOid);
