//! truncated sequence number expansion

/// Expands an 8-bit wire counter against the last known full value.
///
/// Returns the unique `u32` congruent to `truncated` mod 256 that lies
/// nearest to `last` in wrapping distance, with ties broken toward the
/// larger value. Total and side-effect free; correct across the `u32`
/// wraparound boundary.
pub fn expand(last: u32, truncated: u8) -> u32 {
    let forward = (truncated as u32).wrapping_sub(last) & 0xff;
    if forward <= 128 {
        last.wrapping_add(forward)
    } else {
        last.wrapping_sub(256 - forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapping_distance(a: u32, b: u32) -> u32 {
        a.wrapping_sub(b).min(b.wrapping_sub(a))
    }

    #[test]
    fn congruence_and_nearest_value() {
        let lasts = [
            0u32,
            1,
            127,
            128,
            129,
            255,
            256,
            1000,
            0x0001_0000,
            0x7fff_ff80,
            0xffff_ff00,
            0xffff_ff7f,
            u32::MAX - 1,
            u32::MAX,
        ];
        for &last in &lasts {
            for truncated in 0..=255u8 {
                let expanded = expand(last, truncated);
                assert_eq!(expanded & 0xff, truncated as u32);
                assert!(
                    wrapping_distance(expanded, last) <= 128,
                    "expand({last:#x}, {truncated:#x}) = {expanded:#x} strayed too far"
                );
            }
        }
    }

    #[test]
    fn identical_truncated_value_is_stable() {
        for &last in &[0u32, 42, 300, 0xdead_beef, u32::MAX] {
            assert_eq!(expand(last, last as u8), last);
        }
    }

    #[test]
    fn crosses_wraparound() {
        assert_eq!(expand(u32::MAX, 0x00), 0);
        assert_eq!(expand(u32::MAX, 0x01), 1);
        assert_eq!(expand(0, 0xff), u32::MAX);
        assert_eq!(expand(1, 0xfe), u32::MAX - 1);
        assert_eq!(expand(0xffff_fffe, 0x03), 3);
    }

    #[test]
    fn ties_break_toward_larger() {
        // 128 forward and 128 backward are equally near; forward wins.
        assert_eq!(expand(256, 0x80), 256 + 128);
    }

    #[test]
    fn tracks_a_lossy_stream() {
        let mut last = 0u32;
        let mut sent = 0u32;
        // walk a long id sequence with gaps of up to 100 lost blocks
        for gap in [1u32, 3, 7, 100, 1, 50, 99, 2].iter().cycle().take(4096) {
            sent = sent.wrapping_add(*gap);
            last = expand(last, sent as u8);
            assert_eq!(last, sent);
        }
    }
}
