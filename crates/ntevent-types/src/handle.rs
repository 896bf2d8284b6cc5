//! Opaque, instance-scoped resource handles.
//!
//! A handle packs three fields into a single `u32`:
//!
//! ```text
//!  31      24 23  20 19                 0
//! ┌──────────┬──────┬────────────────────┐
//! │   kind   │ inst │       index        │
//! └──────────┴──────┴────────────────────┘
//! ```
//!
//! The all-zero value is reserved as the invalid handle, so a zero kind
//! byte never names a live resource.

use serde::{Deserialize, Serialize};
use std::fmt;

const KIND_SHIFT: u32 = 24;
const INSTANCE_SHIFT: u32 = 20;
const INSTANCE_MASK: u32 = 0xf;
const INDEX_MASK: u32 = 0x000f_ffff;

/// Largest index representable in a handle.
pub const MAX_INDEX: u32 = INDEX_MASK;

/// Largest instance id representable in a handle.
pub const MAX_INSTANCE: u8 = INSTANCE_MASK as u8;

/// The resource type a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HandleKind {
    /// A registered listener.
    Listener = 0x11,
    /// A listener poller (event mailbox).
    ListenerPoller = 0x12,
    /// A pub/sub topic, owned by the store.
    Topic = 0x13,
    /// A topic subscriber, owned by the store.
    Subscriber = 0x14,
    /// A subscriber entry, owned by the store.
    Entry = 0x15,
    /// A remote connection, owned by the transport.
    Connection = 0x16,
}

impl HandleKind {
    /// Returns the numeric tag stored in the top byte of a handle.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a numeric tag back into a kind.
    ///
    /// Returns `None` for tags that do not correspond to a known kind.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x11 => Some(Self::Listener),
            0x12 => Some(Self::ListenerPoller),
            0x13 => Some(Self::Topic),
            0x14 => Some(Self::Subscriber),
            0x15 => Some(Self::Entry),
            0x16 => Some(Self::Connection),
            _ => None,
        }
    }

    /// Returns the string label for this kind.
    pub fn label(self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::ListenerPoller => "poller",
            Self::Topic => "topic",
            Self::Subscriber => "subscriber",
            Self::Entry => "entry",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors produced when interpreting a raw handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The handle is zero or carries an unknown kind tag.
    #[error("invalid handle: {0:#010x}")]
    Invalid(u32),

    /// The handle is well formed but names a different resource type.
    #[error("handle kind mismatch: expected {expected}, found {found}")]
    WrongKind {
        /// The kind the caller asked for.
        expected: HandleKind,
        /// The kind encoded in the handle.
        found: HandleKind,
    },

    /// The instance id does not fit the handle's instance field.
    #[error("instance {0} exceeds the maximum of {max}", max = MAX_INSTANCE)]
    InstanceOutOfRange(u8),
}

/// Checks that `instance` fits the handle's instance field.
///
/// # Errors
///
/// Returns `HandleError::InstanceOutOfRange` above [`MAX_INSTANCE`].
pub fn check_instance(instance: u8) -> Result<u8, HandleError> {
    if instance > MAX_INSTANCE {
        return Err(HandleError::InstanceOutOfRange(instance));
    }
    Ok(instance)
}

/// An untyped resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u32);

impl Handle {
    /// The reserved invalid handle.
    pub const INVALID: Handle = Handle(0);

    /// Packs a kind, instance and index into a handle.
    ///
    /// Instance and index are truncated to their field widths.
    pub fn new(kind: HandleKind, instance: u8, index: u32) -> Self {
        Handle(
            (u32::from(kind.as_u8()) << KIND_SHIFT)
                | ((u32::from(instance) & INSTANCE_MASK) << INSTANCE_SHIFT)
                | (index & INDEX_MASK),
        )
    }

    /// Returns the raw packed value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns the encoded kind, or `None` if the tag is unknown.
    pub fn kind(self) -> Option<HandleKind> {
        HandleKind::from_u8((self.0 >> KIND_SHIFT) as u8)
    }

    /// Returns the encoded instance id.
    pub fn instance(self) -> u8 {
        ((self.0 >> INSTANCE_SHIFT) & INSTANCE_MASK) as u8
    }

    /// Returns the encoded slot index.
    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// A handle is valid when it carries a known kind tag.
    pub fn is_valid(self) -> bool {
        self.kind().is_some()
    }

    /// Checks that this handle names a resource of `expected` kind.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Invalid` for the invalid handle or unknown tags,
    /// and `HandleError::WrongKind` when the tag names another kind.
    pub fn expect_kind(self, expected: HandleKind) -> Result<Self, HandleError> {
        match self.kind() {
            None => Err(HandleError::Invalid(self.0)),
            Some(found) if found != expected => Err(HandleError::WrongKind { expected, found }),
            Some(_) => Ok(self),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}#{}.{}", kind, self.instance(), self.index()),
            None => write!(f, "invalid({:#x})", self.0),
        }
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Handle);

        impl $name {
            /// The reserved invalid handle.
            pub const INVALID: $name = $name(Handle::INVALID);

            /// The resource kind every valid handle of this type carries.
            pub const KIND: HandleKind = $kind;

            /// Builds a handle for the given instance and slot index.
            pub fn new(instance: u8, index: u32) -> Self {
                $name(Handle::new($kind, instance, index))
            }

            /// Returns the untyped handle.
            pub fn handle(self) -> Handle {
                self.0
            }

            /// Returns the raw packed value.
            pub fn raw(self) -> u32 {
                self.0.raw()
            }

            /// Returns the encoded instance id.
            pub fn instance(self) -> u8 {
                self.0.instance()
            }

            /// Returns the encoded slot index.
            pub fn index(self) -> u32 {
                self.0.index()
            }

            /// True unless this is the invalid handle.
            pub fn is_valid(self) -> bool {
                self.0.kind() == Some($kind)
            }
        }

        impl TryFrom<Handle> for $name {
            type Error = HandleError;

            fn try_from(handle: Handle) -> Result<Self, Self::Error> {
                handle.expect_kind($kind).map($name)
            }
        }

        impl From<$name> for Handle {
            fn from(handle: $name) -> Handle {
                handle.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

typed_handle!(
    /// Handle to a registered listener.
    ListenerHandle,
    HandleKind::Listener
);

typed_handle!(
    /// Handle to a listener poller.
    PollerHandle,
    HandleKind::ListenerPoller
);
