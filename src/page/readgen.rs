//! Read generation values.

/// Generation never assigned.
pub const NOTSET: u64 = 0;
/// Evict as soon as possible.
pub const OLDEST: u64 = 1;
/// Caller said the page won't be needed again.
pub const WONT_NEED: u64 = 11;
/// First value of the global generation.
pub const START_VALUE: u64 = 100;
/// Accessed pages move this far ahead of the global generation.
pub const STEP: u64 = 100;

/// Whether `gen` is one of the reserved "evict soon" values.
pub fn is_evict_soon(gen: u64) -> bool {
    gen != NOTSET && gen <= WONT_NEED
}

/// Generation for a page entering memory.
pub fn new_page(current: u64, oldest: u64) -> u64 {
    ((current + oldest) / 2).max(WONT_NEED + 1)
}

/// Generation after an access, or `None` when the page should keep its value:
/// pages marked for forced eviction, and pages already ahead of `current`.
pub fn bump(page_gen: u64, current: u64) -> Option<u64> {
    if page_gen == OLDEST || page_gen > current {
        return None;
    }
    Some(current + STEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_skips_forced_and_future_pages() {
        assert_eq!(bump(OLDEST, 500), None);
        assert_eq!(bump(700, 500), None);
        assert_eq!(bump(300, 500), Some(600));
        assert_eq!(bump(WONT_NEED, 500), Some(600));
    }

    #[test]
    fn test_new_page_lands_between_oldest_and_current() {
        assert_eq!(new_page(1000, 200), 600);
        assert!(!is_evict_soon(new_page(0, 0)));
    }
}
