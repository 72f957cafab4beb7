#[cfg(feature = "parallel")]
use rayon::prelude::*;

// Heuristic: Don't spin up Rayon for small inputs
const PARALLEL_THRESHOLD: usize = 64;

/// Maps `f` over `collection`, in parallel when the feature is on and the input is large enough.
/// Output order always matches input order.
#[inline]
pub fn map_collect<T, R, F>(collection: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if collection.len() > PARALLEL_THRESHOLD {
            return collection.par_iter().map(f).collect();
        }
        collection.iter().map(f).collect()
    }
    #[cfg(any(not(feature = "parallel"), target_arch = "wasm32"))]
    {
        collection.iter().map(f).collect()
    }
}

/// Like [`map_collect`] but over an index range.
#[inline]
pub fn map_range<R, F>(len: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if len > PARALLEL_THRESHOLD {
            return (0..len).into_par_iter().map(f).collect();
        }
        (0..len).map(f).collect()
    }
    #[cfg(any(not(feature = "parallel"), target_arch = "wasm32"))]
    {
        (0..len).map(f).collect()
    }
}
