use std::sync::atomic::*;

pub trait AtomicExtension {
    type T;
    fn load_acquire(&self) -> Self::T;
    fn store_release(&self, val: Self::T);
}

macro_rules! impl_atomic_extension {
    ($t:ty, $atomicType: ty) => {
        impl AtomicExtension for $atomicType {
            type T = $t;
            fn load_acquire(&self) -> $t {
                self.load(std::sync::atomic::Ordering::Acquire)
            }
            fn store_release(&self, val: $t) {
                self.store(val, std::sync::atomic::Ordering::Release);
            }
        }
    };
}

impl_atomic_extension!(u64, AtomicU64);
