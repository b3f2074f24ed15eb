//! Bitrate estimation for lossy uploads

const COMMON_BITRATES_KBPS: [u32; 9] = [32, 64, 96, 128, 160, 192, 224, 256, 320];

/// Snap distance to a common bitrate
const SNAP_TOLERANCE_KBPS: u32 = 2;

/// Estimate the average bitrate of a file from its size and duration.
///
/// Returns 0 when the duration is not positive. Values within 2 kbps of a
/// common encoder bitrate are snapped to it.
pub fn estimate_bitrate_kbps(filesize_bytes: u64, duration_secs: f64) -> u32 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }

    let estimated = (filesize_bytes as f64 * 8.0 / duration_secs / 1000.0).round();
    if estimated > u32::MAX as f64 {
        return u32::MAX;
    }
    let estimated = estimated as u32;

    COMMON_BITRATES_KBPS
        .iter()
        .copied()
        .find(|common| common.abs_diff(estimated) <= SNAP_TOLERANCE_KBPS)
        .unwrap_or(estimated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_common_bitrate() {
        // 128 kbps for 10 seconds
        assert_eq!(estimate_bitrate_kbps(160_000, 10.0), 128);
    }

    #[test]
    fn test_snaps_within_tolerance() {
        // ~190 kbps raw estimate snaps to 192
        assert_eq!(estimate_bitrate_kbps(237_500, 10.0), 192);
        // ~130 kbps snaps back to 128
        assert_eq!(estimate_bitrate_kbps(162_500, 10.0), 128);
    }

    #[test]
    fn test_keeps_uncommon_bitrate() {
        // 140 kbps is far from any common value
        assert_eq!(estimate_bitrate_kbps(175_000, 10.0), 140);
    }

    #[test]
    fn test_zero_or_invalid_duration() {
        assert_eq!(estimate_bitrate_kbps(1_000_000, 0.0), 0);
        assert_eq!(estimate_bitrate_kbps(1_000_000, -1.0), 0);
        assert_eq!(estimate_bitrate_kbps(1_000_000, f64::NAN), 0);
    }
}
