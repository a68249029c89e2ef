//! Opaque handle types for native tkv objects.
//!
//! The native library only ever hands out pointers to these; the types have
//! no fields a caller could touch. Each gets its own type so a database
//! pointer cannot be passed where a future pointer is expected.

/// Macro to define an opaque native type.
macro_rules! define_opaque {
    ($name:ident) => {
        /// Opaque native object. Only ever used behind a raw pointer.
        #[repr(C)]
        pub struct $name {
            _private: [u8; 0],
        }
    };
}

define_opaque!(TkvDatabase);
define_opaque!(TkvTransaction);
define_opaque!(TkvFuture);
