//! Small atomic-type helpers used for the host's single-writer/multiple-reader shared scalars
//! (transport tempo/meter, feature flags). See `transport.rs` for how these are used.

use atomic_float::{AtomicF32, AtomicF64};
use std::sync::atomic::AtomicI32;

// Type families galore!
pub trait AtomicType {
    /// An atomic version of this type with interior mutability.
    type AtomicType;

    fn new_atomic(self) -> Self::AtomicType;
}

impl AtomicType for f32 {
    type AtomicType = AtomicF32;

    fn new_atomic(self) -> AtomicF32 {
        AtomicF32::new(self)
    }
}

impl AtomicType for f64 {
    type AtomicType = AtomicF64;

    fn new_atomic(self) -> AtomicF64 {
        AtomicF64::new(self)
    }
}

impl AtomicType for i32 {
    type AtomicType = AtomicI32;

    fn new_atomic(self) -> AtomicI32 {
        AtomicI32::new(self)
    }
}
