//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// One rung of the width ladder as it applies to a specific source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderStep {
    /// Requested ladder width (names the output file).
    pub target: u32,
    /// Actual output width, never above `target` or the source width.
    pub width: u32,
    /// Output height preserving the source aspect ratio.
    pub height: u32,
}

/// Height for `width` that keeps the source aspect ratio (at least 1px).
pub fn scaled_height(original: (u32, u32), width: u32) -> u32 {
    let (orig_w, orig_h) = original;
    if orig_w == 0 {
        return orig_h.max(1);
    }
    ((orig_h as f64 * width as f64 / orig_w as f64).round() as u32).max(1)
}

/// Calculate the derivatives to produce for a source of the given dimensions.
///
/// `sizes` must be ascending. Widths up to the source width are produced as
/// requested. The first width that exceeds the source is clamped to the
/// source width (unless a rung already landed exactly on it); every larger
/// width is skipped. A source is therefore never upscaled, and the widths in
/// the result are strictly increasing.
///
/// # Examples
/// ```
/// # use lookbook::imaging::calculate_ladder;
/// let steps = calculate_ladder((1800, 1200), &[320, 640, 1024, 2048]);
/// let widths: Vec<u32> = steps.iter().map(|s| s.width).collect();
/// assert_eq!(widths, vec![320, 640, 1024, 1800]);
/// ```
pub fn calculate_ladder(original: (u32, u32), sizes: &[u32]) -> Vec<LadderStep> {
    let (orig_w, _) = original;
    let mut steps: Vec<LadderStep> = Vec::new();

    for &target in sizes {
        if target <= orig_w {
            steps.push(LadderStep {
                target,
                width: target,
                height: scaled_height(original, target),
            });
            continue;
        }
        let already_native = steps.last().is_some_and(|s| s.width == orig_w);
        if !already_native && orig_w > 0 {
            steps.push(LadderStep {
                target,
                width: orig_w,
                height: scaled_height(original, orig_w),
            });
        }
        break;
    }

    steps
}

/// Dimensions of the blur-up placeholder: `width` wide, or the source width
/// if that is smaller.
pub fn calculate_placeholder_dimensions(original: (u32, u32), width: u32) -> (u32, u32) {
    let w = width.min(original.0).max(1);
    (w, scaled_height(original, w))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LADDER: &[u32] = &[320, 640, 1024, 2048];

    fn widths(steps: &[LadderStep]) -> Vec<u32> {
        steps.iter().map(|s| s.width).collect()
    }

    #[test]
    fn wide_source_gets_full_ladder() {
        let steps = calculate_ladder((4000, 3000), LADDER);
        assert_eq!(widths(&steps), vec![320, 640, 1024, 2048]);
        assert!(steps.iter().all(|s| s.width == s.target));
    }

    #[test]
    fn larger_rung_is_clamped_to_source_width() {
        // 1800px source: 2048 is clamped down, never upscaled
        let steps = calculate_ladder((1800, 1200), LADDER);
        assert_eq!(widths(&steps), vec![320, 640, 1024, 1800]);
        assert_eq!(steps[3].target, 2048);
        assert_eq!(steps[3].height, 1200);
    }

    #[test]
    fn source_exactly_on_a_rung_adds_no_duplicate() {
        let steps = calculate_ladder((1024, 768), LADDER);
        assert_eq!(widths(&steps), vec![320, 640, 1024]);
    }

    #[test]
    fn tiny_source_gets_single_native_variant() {
        let steps = calculate_ladder((200, 300), LADDER);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].target, 320);
        assert_eq!(steps[0].width, 200);
        assert_eq!(steps[0].height, 300);
    }

    #[test]
    fn never_exceeds_source_or_target() {
        for source_w in [1, 50, 320, 321, 999, 1024, 1500, 2048, 5000] {
            for step in calculate_ladder((source_w, 700), LADDER) {
                assert!(step.width <= source_w, "{source_w}: {step:?}");
                assert!(step.width <= step.target, "{source_w}: {step:?}");
            }
        }
    }

    #[test]
    fn widths_strictly_increase() {
        for source_w in [100, 640, 700, 2048, 3000] {
            let steps = calculate_ladder((source_w, 1000), LADDER);
            assert!(steps.windows(2).all(|w| w[0].width < w[1].width));
        }
    }

    #[test]
    fn heights_preserve_aspect_ratio() {
        let steps = calculate_ladder((2000, 3000), &[320, 640]);
        assert_eq!(steps[0].height, 480);
        assert_eq!(steps[1].height, 960);
    }

    #[test]
    fn empty_ladder_produces_nothing() {
        assert!(calculate_ladder((1000, 800), &[]).is_empty());
    }

    #[test]
    fn zero_width_source_produces_nothing() {
        assert!(calculate_ladder((0, 0), LADDER).is_empty());
    }

    #[test]
    fn scaled_height_never_zero() {
        assert_eq!(scaled_height((4000, 10), 20), 1);
    }

    #[test]
    fn placeholder_dimensions_landscape() {
        assert_eq!(calculate_placeholder_dimensions((2000, 1000), 20), (20, 10));
    }

    #[test]
    fn placeholder_dimensions_smaller_source() {
        assert_eq!(calculate_placeholder_dimensions((10, 15), 20), (10, 15));
    }
}
