//! Seeded value masking for durations in transit.
//!
//! A seed string is folded into a 32-bit state (FNV-1a), which drives a
//! mulberry32 generator. Each byte of the UTF-8 value is XORed with
//! `floor(rng() * 256)`; the result travels as standard base64. Applying
//! the same keystream to the masked bytes restores the value.
//!
//! This keeps a raw duration out of plain sight. It is not encryption.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CodecError;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Fold a seed into the generator state.
///
/// Operates on UTF-16 code units so seeds shared with browser clients
/// produce the same state; for ASCII seeds this is identical to folding
/// bytes.
pub fn seed_to_state(seed: &str) -> u32 {
    seed.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// mulberry32 pseudo-random generator.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(state: u32) -> Self {
        Self { state }
    }

    pub fn from_seed(seed: &str) -> Self {
        Self::new(seed_to_state(seed))
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let a = self.state;
        let mut t = (a ^ (a >> 15)).wrapping_mul(1 | a);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t)) ^ t;
        f64::from(t ^ (t >> 14)) / 4_294_967_296.0
    }

    /// Next keystream byte.
    pub fn next_byte(&mut self) -> u8 {
        (self.next_f64() * 256.0).floor() as u8
    }
}

fn apply_keystream(bytes: &mut [u8], seed: &str) {
    let mut rng = Mulberry32::from_seed(seed);
    for byte in bytes.iter_mut() {
        *byte ^= rng.next_byte();
    }
}

/// Mask `value` with `seed`, returning base64 text.
pub fn mask(value: &str, seed: &str) -> String {
    let mut bytes = value.as_bytes().to_vec();
    apply_keystream(&mut bytes, seed);
    STANDARD.encode(bytes)
}

/// Reverse [`mask`].
///
/// # Errors
/// Returns an error if `masked` is not valid base64 or the unmasked bytes
/// are not valid UTF-8 (typically a wrong seed).
pub fn unmask(masked: &str, seed: &str) -> Result<String, CodecError> {
    let mut bytes = STANDARD.decode(masked.trim())?;
    apply_keystream(&mut bytes, seed);
    Ok(String::from_utf8(bytes)?)
}

/// Unmask a duration in milliseconds.
///
/// Fractional milliseconds are truncated. Zero and negative values decode
/// to `0`, which callers treat as "nothing to record".
///
/// # Errors
/// Returns an error if unmasking fails, or the text is not a finite number
/// below `i64::MAX`.
pub fn unmask_duration_ms(masked: &str, seed: &str) -> Result<u64, CodecError> {
    let text = unmask(masked, seed)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| CodecError::NotADuration(text.clone()))?;
    // Store increments are i64.
    if !value.is_finite() || value >= i64::MAX as f64 {
        return Err(CodecError::NotADuration(text));
    }
    if value <= 0.0 {
        return Ok(0);
    }
    Ok(value.floor() as u64)
}

/// Mask a duration in milliseconds.
pub fn mask_duration_ms(duration_ms: u64, seed: &str) -> String {
    mask(&duration_ms.to_string(), seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn seed_fold_matches_known_states() {
        assert_eq!(seed_to_state("focus-seed"), 915_890_555);
        assert_eq!(seed_to_state("s3cr3t"), 3_641_689_009);
        assert_eq!(seed_to_state(""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn mask_matches_browser_client_output() {
        assert_eq!(mask("1500000", "focus-seed"), "wM+fccg9sA==");
        assert_eq!(mask("5400000", "s3cr3t"), "RUCAFck6zw==");
        assert_eq!(mask("çalışma ⏱", "tohum"), "TCz3fMNEe3UWm/Flew8=");
    }

    #[test]
    fn empty_value_masks_to_empty() {
        assert_eq!(mask("", "x"), "");
        assert_eq!(unmask("", "x").unwrap(), "");
    }

    #[test]
    fn generator_stays_in_unit_interval() {
        let mut rng = Mulberry32::from_seed("interval");
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(mask("1500000", "seed-a"), mask("1500000", "seed-b"));
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(matches!(
            unmask("not base64!!", "seed"),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn duration_decoding() {
        let seed = "focus-seed";
        assert_eq!(unmask_duration_ms("wM+fccg9sA==", seed).unwrap(), 1_500_000);
        assert_eq!(
            unmask_duration_ms(&mask("1500.9", seed), seed).unwrap(),
            1500
        );
        assert_eq!(unmask_duration_ms(&mask("-20", seed), seed).unwrap(), 0);
        assert_eq!(unmask_duration_ms(&mask("", seed), seed).unwrap(), 0);
        assert!(matches!(
            unmask_duration_ms(&mask("soon", seed), seed),
            Err(CodecError::NotADuration(_))
        ));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let seed = "focus-seed";
        for text in ["1e300", "9223372036854775808", "18446744073709551615", "inf"] {
            assert!(
                matches!(
                    unmask_duration_ms(&mask(text, seed), seed),
                    Err(CodecError::NotADuration(_))
                ),
                "{text} was accepted"
            );
        }
        assert_eq!(
            unmask_duration_ms(&mask("9000000000000000000", seed), seed).unwrap(),
            9_000_000_000_000_000_000
        );
    }

    proptest! {
        #[test]
        fn roundtrip_any_string(value in ".*", seed in ".+") {
            prop_assert_eq!(unmask(&mask(&value, &seed), &seed).unwrap(), value);
        }

        #[test]
        fn mask_is_deterministic(value in "[ -~]{0,64}", seed in "[ -~]{1,32}") {
            prop_assert_eq!(mask(&value, &seed), mask(&value, &seed));
        }

        #[test]
        fn duration_roundtrip(ms in 0u64..=10_000_000_000, seed in "[a-z0-9]{1,16}") {
            prop_assert_eq!(unmask_duration_ms(&mask_duration_ms(ms, &seed), &seed).unwrap(), ms);
        }
    }
}
