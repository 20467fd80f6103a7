//! Separates content images (photos, charts, signature blocks) from
//! decorative noise such as logos and icons.

use crate::config::schema::ClassifierConfig;

pub const DEFAULT_MIN_WIDTH: u32 = 200;
pub const DEFAULT_MIN_HEIGHT: u32 = 200;
pub const DEFAULT_MIN_AREA: u64 = 40_000;

/// `width >= min_w && height >= min_h && width * height >= min_area`.
///
/// Dimensions are signed because they come straight out of PDF image
/// dictionaries; anything `<= 0` is never content.
pub fn is_content_image(width: i64, height: i64, min_w: u32, min_h: u32, min_area: u64) -> bool {
    if width <= 0 || height <= 0 {
        return false;
    }
    let area = (width as u128) * (height as u128);
    width >= i64::from(min_w) && height >= i64::from(min_h) && area >= u128::from(min_area)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFilter {
    pub min_width: u32,
    pub min_height: u32,
    pub min_area: u64,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            min_area: DEFAULT_MIN_AREA,
        }
    }
}

impl From<&ClassifierConfig> for ImageFilter {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            min_width: config.min_width,
            min_height: config.min_height,
            min_area: config.min_area,
        }
    }
}

impl ImageFilter {
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        is_content_image(
            i64::from(width),
            i64::from(height),
            self.min_width,
            self.min_height,
            self.min_area,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_check(w: i64, h: i64) -> bool {
        is_content_image(w, h, DEFAULT_MIN_WIDTH, DEFAULT_MIN_HEIGHT, DEFAULT_MIN_AREA)
    }

    #[test]
    fn test_exact_minimum_passes() {
        assert!(default_check(200, 200));
    }

    #[test]
    fn test_one_pixel_short_fails() {
        assert!(!default_check(199, 200));
        assert!(!default_check(200, 199));
    }

    #[test]
    fn test_area_boundary_with_non_square_dimensions() {
        // 160 x 250 = 40_000 exactly; only the area rule applies here.
        assert!(is_content_image(160, 250, 150, 150, 40_000));
        assert!(!is_content_image(160, 249, 150, 150, 40_000));
    }

    #[test]
    fn test_non_positive_dimensions() {
        assert!(!default_check(0, 500));
        assert!(!default_check(500, 0));
        assert!(!default_check(-300, -300));
    }

    #[test]
    fn test_huge_dimensions_do_not_overflow() {
        assert!(default_check(i64::MAX, i64::MAX));
    }

    #[test]
    fn test_filter_from_config() {
        let config = ClassifierConfig {
            min_width: 100,
            min_height: 50,
            min_area: 10_000,
            ..ClassifierConfig::default()
        };
        let filter = ImageFilter::from(&config);
        assert!(filter.accepts(200, 50));
        assert!(!filter.accepts(99, 500));
        assert!(!filter.accepts(150, 60));
    }

    #[test]
    fn test_default_filter_rejects_icons() {
        let filter = ImageFilter::default();
        assert!(!filter.accepts(64, 64));
        assert!(filter.accepts(1240, 1754));
    }
}
