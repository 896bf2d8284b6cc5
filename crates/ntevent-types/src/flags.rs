//! Event flag bitmask and the four listener categories derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Bitmask of event kinds.
///
/// Listeners subscribe with a mask; notifications carry the flags that
/// describe what happened. An event reaches a listener when the two
/// intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFlags(u32);

impl EventFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Initial listener addition; delivers a snapshot of current state.
    pub const IMMEDIATE: Self = Self(0x01);
    /// A client connected.
    pub const CONNECTED: Self = Self(0x02);
    /// A client disconnected.
    pub const DISCONNECTED: Self = Self(0x04);
    /// Any connection event.
    pub const CONNECTION: Self = Self(0x06);
    /// A topic was published.
    pub const PUBLISH: Self = Self(0x08);
    /// A topic was unpublished.
    pub const UNPUBLISH: Self = Self(0x10);
    /// Topic properties changed.
    pub const PROPERTIES: Self = Self(0x20);
    /// Any topic event.
    pub const TOPIC: Self = Self(0x38);
    /// A value changed on the network.
    pub const VALUE_REMOTE: Self = Self(0x40);
    /// A value changed locally.
    pub const VALUE_LOCAL: Self = Self(0x80);
    /// Any value event.
    pub const VALUE_ALL: Self = Self(0xC0);
    /// A log message.
    pub const LOG_MESSAGE: Self = Self(0x100);
    /// Time synchronization with the server changed.
    pub const TIME_SYNC: Self = Self(0x200);
    /// Per-level log sub-bits used by level-filtered loggers.
    pub const LOG_LEVELS: Self = Self(0x01ff_0000);

    /// Wraps raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if `self` and `other` share at least one bit.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Categories whose flag range intersects this mask.
    pub fn categories(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.intersects(c.flags()))
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for EventFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for EventFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Display for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The four listener index sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Connection open/close.
    Connection,
    /// Topic publish/unpublish/properties.
    Topic,
    /// Value updates, local or remote.
    Value,
    /// Log messages at any level.
    Log,
}

impl Category {
    /// Every category, in index order.
    pub const ALL: [Category; 4] = [
        Category::Connection,
        Category::Topic,
        Category::Value,
        Category::Log,
    ];

    /// The flag range that places a listener in this category.
    pub const fn flags(self) -> EventFlags {
        match self {
            Self::Connection => EventFlags::CONNECTION,
            Self::Topic => EventFlags::TOPIC,
            Self::Value => EventFlags::VALUE_ALL,
            Self::Log => EventFlags::from_bits(
                EventFlags::LOG_MESSAGE.bits() | EventFlags::LOG_LEVELS.bits(),
            ),
        }
    }

    /// Position of this category in [`Category::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Connection => 0,
            Self::Topic => 1,
            Self::Value => 2,
            Self::Log => 3,
        }
    }

    /// Returns the string label for this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Topic => "topic",
            Self::Value => "value",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
