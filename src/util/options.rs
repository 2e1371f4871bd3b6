//! Runtime-tunable knobs of the substrate.
//!
//! Each knob has a built-in default, a validator, and can be set from an
//! `OMNIMEM_*` environment variable (e.g. `OMNIMEM_SCRATCH_TRIM_THRESHOLD`).
//! Compile-time knobs (inline buffer size, tether cache size) live in
//! [`crate::util::constants`] instead, because they size fixed arrays.

use crate::util::constants::*;
use std::fmt::Debug;
use strum_macros::EnumString;

/// How arenas grow their chunk chain.
#[derive(Copy, Clone, EnumString, Debug, PartialEq, Eq)]
pub enum ArenaGrowth {
    /// Double the chunk size on each growth, up to [`MAX_CHUNK_SIZE`].
    Geometric,
    /// Every chunk is [`FIXED_CHUNK_SIZE`] bytes.
    Fixed,
}

fn always_valid<T>(_: &T) -> bool {
    true
}

/// A substrate option of a given type, bundling the value with its validator.
/// To get the value of an option, dereference it (for example,
/// `*options.dismantle_batch`).
#[derive(Clone)]
pub struct MemOption<T: Debug + Clone> {
    value: T,
    validator: fn(&T) -> bool,
}

impl<T: Debug + Clone> MemOption<T> {
    /// Create a new option with the given initial value and validator.
    pub fn new(value: T, validator: fn(&T) -> bool) -> Self {
        debug_assert!(validator(&value), "invalid default {:?}", value);
        MemOption { value, validator }
    }

    /// Set the option to the given value. Returns true if the value is valid,
    /// and we set the option to the value.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            return true;
        }
        false
    }
}

// Dereference an option to get its value.
impl<T: Debug + Clone> std::ops::Deref for MemOption<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),* $(,)?) => {
        /// The set of knobs consumed when a [`MemContext`](crate::context::MemContext)
        /// is created. Later changes to an `Options` value do not affect
        /// contexts already built from it.
        #[derive(Clone)]
        pub struct Options {
            $(
                $(#[$outer])*
                pub $name: MemOption<$type>,
            )*
        }

        impl Options {
            /// Create an `Options` instance with built-in defaults.
            pub fn new() -> Self {
                Options {
                    $($name: MemOption::new($default, $validator),)*
                }
            }

            /// Set an option by name from its string representation. Returns
            /// false if the name is unknown, the string does not parse, or
            /// the parsed value fails validation.
            pub fn set_from_string(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => match val.parse::<$type>() {
                        Ok(typed) => self.$name.set(typed),
                        Err(_) => false,
                    },)*
                    _ => false,
                }
            }
        }
    };
}

options! {
    /// Requests at or below this size are eligible for a region's inline
    /// buffer. Capped by the buffer's compile-time granularity.
    small_object_threshold: usize [|v| *v > 0 && *v <= MAX_INLINE_OBJECT_SIZE] = MAX_INLINE_OBJECT_SIZE,
    /// An outermost scratch end trims its arena when the footprint exceeds
    /// this many bytes.
    scratch_trim_threshold: usize [|v| *v >= BYTES_IN_PAGE] = DEFAULT_SCRATCH_TRIM_THRESHOLD,
    /// The number of component headers allocated per pool slab.
    component_slab_size: usize [|v| *v >= 8] = DEFAULT_COMPONENT_SLAB_SIZE,
    /// The default batch for `process_dismantle` when the caller passes no
    /// explicit batch. Zero drains the queue.
    dismantle_batch: usize [always_valid] = 0,
    /// Arena chunk growth policy.
    arena_growth: ArenaGrowth [always_valid] = ArenaGrowth::Geometric,
}

impl Options {
    /// Create an `Options` instance, then apply any `OMNIMEM_*` environment
    /// variables. Invalid settings are logged and skipped.
    pub fn from_env() -> Self {
        let mut options = Self::new();
        options.read_env_var_settings();
        options
    }

    /// Apply any `OMNIMEM_*` environment variables to this instance.
    pub fn read_env_var_settings(&mut self) {
        const PREFIX: &str = "OMNIMEM_";
        for (key, val) in std::env::vars() {
            if let Some(rest) = key.strip_prefix(PREFIX) {
                let key = rest.to_lowercase();
                if !self.set_from_string(&key, &val) {
                    warn!("Invalid option {}={} (ignored)", key, val);
                }
            }
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
