//! # Dispatch Keys
//!
//! A [`DispatchKey`] names a backend (`Cpu`, `Cuda`, ...) or a cross-cutting
//! mode (`AdInplaceOrView`, the `Autograd*` family) that may carry its own
//! kernel for an operator.
//!
//! The discriminant of a key is its bit position inside a
//! [`DispatchKeySet`](crate::DispatchKeySet) and doubles as its priority:
//! a higher bit wins. Autograd keys sit above `AdInplaceOrView`, which sits
//! above every backend, so a call on an autograd-tracked CPU tensor is seen
//! by `AutogradCpu` first and by `Cpu` last.

use crate::error::ParseKeyError;
use std::{fmt, str::FromStr};

macro_rules! dispatch_keys {
    ($($(#[$doc:meta])* $key:ident = $bit:literal => $name:literal,)+) => {
        /// A backend or mode that participates in operator dispatch.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum DispatchKey {
            $($(#[$doc])* $key = $bit,)+
        }

        impl DispatchKey {
            /// Every key, lowest priority first. `ALL[i] as u8 == i`.
            pub const ALL: &'static [DispatchKey] = &[$(DispatchKey::$key),+];

            /// Stable display name of the key.
            pub const fn name(self) -> &'static str {
                match self {
                    $(DispatchKey::$key => $name,)+
                }
            }
        }

        impl FromStr for DispatchKey {
            type Err = ParseKeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(DispatchKey::$key),)+
                    _ => Err(ParseKeyError(s.to_owned())),
                }
            }
        }
    };
}

dispatch_keys! {
    /// Host CPU backend.
    Cpu = 0 => "CPU",
    /// CUDA-style GPU backend.
    Cuda = 1 => "CUDA",
    Xpu = 2 => "XPU",
    Mps = 3 => "MPS",
    Hpu = 4 => "HPU",
    Xla = 5 => "XLA",
    Lazy = 6 => "Lazy",
    /// Shape-only backend: computes output metadata, never data.
    Meta = 7 => "Meta",
    PrivateUse1 = 8 => "PrivateUse1",
    PrivateUse2 = 9 => "PrivateUse2",
    PrivateUse3 = 10 => "PrivateUse3",
    /// View and inplace tracking. Registered as a fallthrough.
    AdInplaceOrView = 11 => "ADInplaceOrView",
    /// Autograd for backends without a dedicated autograd key.
    AutogradOther = 12 => "AutogradOther",
    AutogradCpu = 13 => "AutogradCPU",
    AutogradCuda = 14 => "AutogradCUDA",
    AutogradXpu = 15 => "AutogradXPU",
    AutogradMps = 16 => "AutogradMPS",
    AutogradHpu = 17 => "AutogradHPU",
    AutogradXla = 18 => "AutogradXLA",
    AutogradLazy = 19 => "AutogradLazy",
    AutogradMeta = 20 => "AutogradMeta",
    AutogradPrivateUse1 = 21 => "AutogradPrivateUse1",
    AutogradPrivateUse2 = 22 => "AutogradPrivateUse2",
    AutogradPrivateUse3 = 23 => "AutogradPrivateUse3",
}

/// Number of distinct dispatch keys.
pub const NUM_DISPATCH_KEYS: usize = DispatchKey::ALL.len();

impl DispatchKey {
    /// Bit position of the key; larger means higher priority.
    #[inline]
    pub const fn priority(self) -> u8 {
        self as u8
    }

    /// Look a key up by its bit position.
    pub const fn from_index(index: u8) -> Option<DispatchKey> {
        if (index as usize) < NUM_DISPATCH_KEYS {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Whether this key belongs to the autograd family.
    pub const fn is_autograd(self) -> bool {
        self as u8 >= DispatchKey::AutogradOther as u8
    }

    /// Whether this key is a concrete backend.
    pub const fn is_backend(self) -> bool {
        (self as u8) < DispatchKey::AdInplaceOrView as u8
    }

    /// The autograd key paired with a backend.
    ///
    /// Backends without a dedicated autograd key map to `AutogradOther`.
    /// Non-backend keys return `None`.
    pub const fn autograd_key(self) -> Option<DispatchKey> {
        use DispatchKey::*;
        match self {
            Cpu => Some(AutogradCpu),
            Cuda => Some(AutogradCuda),
            Xpu => Some(AutogradXpu),
            Mps => Some(AutogradMps),
            Hpu => Some(AutogradHpu),
            Xla => Some(AutogradXla),
            Lazy => Some(AutogradLazy),
            Meta => Some(AutogradMeta),
            PrivateUse1 => Some(AutogradPrivateUse1),
            PrivateUse2 => Some(AutogradPrivateUse2),
            PrivateUse3 => Some(AutogradPrivateUse3),
            _ => None,
        }
    }

    /// The backend an autograd key tracks, if it tracks exactly one.
    pub const fn backend(self) -> Option<DispatchKey> {
        use DispatchKey::*;
        match self {
            AutogradCpu => Some(Cpu),
            AutogradCuda => Some(Cuda),
            AutogradXpu => Some(Xpu),
            AutogradMps => Some(Mps),
            AutogradHpu => Some(Hpu),
            AutogradXla => Some(Xla),
            AutogradLazy => Some(Lazy),
            AutogradMeta => Some(Meta),
            AutogradPrivateUse1 => Some(PrivateUse1),
            AutogradPrivateUse2 => Some(PrivateUse2),
            AutogradPrivateUse3 => Some(PrivateUse3),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
