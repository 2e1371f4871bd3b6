use crate::util::constants::*;
use crate::util::Address;

/// Align up a raw word to the given power-of-two alignment.
pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/master/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

/// Align down a raw word to the given power-of-two alignment.
pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

/// Is the raw word aligned to the given power-of-two alignment?
pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/// Round a request size up to a whole number of words. Every bump cursor in
/// the crate stays word aligned because sizes are rounded through here.
pub const fn word_align_up(size: usize) -> usize {
    raw_align_up(size, BYTES_IN_WORD)
}

/// The number of word-aligned slots covering `bytes`.
pub const fn bytes_to_words_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_WORD - 1) >> LOG_BYTES_IN_WORD
}

/// Align an address up to the given power-of-two alignment.
pub fn align_up(addr: Address, align: usize) -> Address {
    debug_assert!(align.is_power_of_two());
    unsafe { Address::from_usize(raw_align_up(addr.as_usize(), align)) }
}

/// Align an address down to the given power-of-two alignment.
pub fn align_down(addr: Address, align: usize) -> Address {
    debug_assert!(align.is_power_of_two());
    unsafe { Address::from_usize(raw_align_down(addr.as_usize(), align)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_align_up() {
        assert_eq!(raw_align_up(0, 8), 0);
        assert_eq!(raw_align_up(1, 8), 8);
        assert_eq!(raw_align_up(8, 8), 8);
        assert_eq!(raw_align_up(9, 8), 16);
    }

    #[test]
    fn test_raw_align_down() {
        assert_eq!(raw_align_down(0, 8), 0);
        assert_eq!(raw_align_down(7, 8), 0);
        assert_eq!(raw_align_down(15, 8), 8);
    }

    #[test]
    fn test_word_align_up() {
        assert_eq!(word_align_up(0), 0);
        assert_eq!(word_align_up(1), BYTES_IN_WORD);
        assert_eq!(word_align_up(BYTES_IN_WORD), BYTES_IN_WORD);
    }

    #[test]
    fn test_bytes_to_words_up() {
        assert_eq!(bytes_to_words_up(0), 0);
        assert_eq!(bytes_to_words_up(1), 1);
        assert_eq!(bytes_to_words_up(BYTES_IN_WORD + 1), 2);
    }
}
