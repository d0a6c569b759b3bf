//! Single-value atomic cells
//!
//! An [`AtomicCell`] holds the most recent value written to it, with no
//! history. `store` is `Release`, `load` is `Acquire`, `exchange` is `AcqRel`.
//! Typical use is a parameter the control thread sets and the audio callback
//! reads each block.
//!
//! Only types with native lock-free atomics implement [`AtomicValue`]. The
//! trait is sealed and each impl is gated on `target_has_atomic`, so a type
//! that would need a lock on the current target simply doesn't compile:
//!
//! ```compile_fail
//! use sunrt::AtomicCell;
//! let cell = AtomicCell::new([0u8; 32]);
//! ```

use std::fmt;
use std::sync::atomic::Ordering;

mod sealed {
    pub trait Sealed {}
}

/// A `Copy` type that maps onto a native lock-free atomic.
pub trait AtomicValue: Copy + sealed::Sealed {
    #[doc(hidden)]
    type Atomic: Send + Sync;

    #[doc(hidden)]
    fn new_atomic(v: Self) -> Self::Atomic;
    #[doc(hidden)]
    fn load(a: &Self::Atomic, order: Ordering) -> Self;
    #[doc(hidden)]
    fn store(a: &Self::Atomic, v: Self, order: Ordering);
    #[doc(hidden)]
    fn swap(a: &Self::Atomic, v: Self, order: Ordering) -> Self;
}

macro_rules! atomic_value {
    ($width:literal => $($t:ty : $atomic:ty),+ $(,)?) => {$(
        #[cfg(target_has_atomic = $width)]
        impl sealed::Sealed for $t {}

        #[cfg(target_has_atomic = $width)]
        impl AtomicValue for $t {
            type Atomic = $atomic;

            #[inline]
            fn new_atomic(v: Self) -> Self::Atomic {
                <$atomic>::new(v)
            }

            #[inline]
            fn load(a: &Self::Atomic, order: Ordering) -> Self {
                a.load(order)
            }

            #[inline]
            fn store(a: &Self::Atomic, v: Self, order: Ordering) {
                a.store(v, order)
            }

            #[inline]
            fn swap(a: &Self::Atomic, v: Self, order: Ordering) -> Self {
                a.swap(v, order)
            }
        }
    )+};
}

use std::sync::atomic as sa;

atomic_value!("8" => bool: sa::AtomicBool, u8: sa::AtomicU8, i8: sa::AtomicI8);
atomic_value!("16" => u16: sa::AtomicU16, i16: sa::AtomicI16);
atomic_value!("32" => u32: sa::AtomicU32, i32: sa::AtomicI32);
atomic_value!("64" => u64: sa::AtomicU64, i64: sa::AtomicI64);
atomic_value!("ptr" => usize: sa::AtomicUsize, isize: sa::AtomicIsize);

// Floats go through portable-atomic, which stores the bit pattern in the
// native integer atomic of the same width on these targets.
atomic_value!("32" => f32: portable_atomic::AtomicF32);
atomic_value!("64" => f64: portable_atomic::AtomicF64);

#[cfg(target_has_atomic = "32")]
const _: () = assert!(portable_atomic::AtomicF32::is_always_lock_free());
#[cfg(target_has_atomic = "64")]
const _: () = assert!(portable_atomic::AtomicF64::is_always_lock_free());

/// Latest-value cell shared between threads.
pub struct AtomicCell<T: AtomicValue> {
    inner: T::Atomic,
}

impl<T: AtomicValue> AtomicCell<T> {
    pub fn new(v: T) -> Self {
        Self {
            inner: T::new_atomic(v),
        }
    }

    #[inline]
    pub fn load(&self) -> T {
        T::load(&self.inner, Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, v: T) {
        T::store(&self.inner, v, Ordering::Release)
    }

    /// Store `v` and return the previous value.
    #[inline]
    pub fn exchange(&self, v: T) -> T {
        T::swap(&self.inner, v, Ordering::AcqRel)
    }
}

impl<T: AtomicValue + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: AtomicValue + fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&self.load()).finish()
    }
}
