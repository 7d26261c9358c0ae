//! Summed-area tables over a grayscale plane.

/// Integral and squared-integral images with a zero top row and left column.
///
/// Entry `(x, y)` holds the sum over all pixels strictly above and left of
/// `(x, y)`, so a table is `(width + 1) × (height + 1)`.
pub struct IntegralImage {
    width: usize,
    sum: Vec<u64>,
    sqsum: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &[u8], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sqsum = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_sqsum = 0u64;
            for x in 0..width {
                let p = gray[y * width + x] as u64;
                row_sum += p;
                row_sqsum += p * p;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sqsum[idx] = sqsum[idx - stride] + row_sqsum;
            }
        }

        Self { width, sum, sqsum }
    }

    /// Pixel sum over `w × h` starting at `(x, y)`.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sum, self.width + 1, x, y, w, h)
    }

    /// Sum of squared pixels over `w × h` starting at `(x, y)`.
    #[inline]
    pub fn rect_sqsum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sqsum, self.width + 1, x, y, w, h)
    }

    #[inline]
    fn lookup(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let a = table[y * stride + x];
        let b = table[y * stride + x + w];
        let c = table[(y + h) * stride + x];
        let d = table[(y + h) * stride + x + w];
        (d + a) - (b + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_sum(gray: &[u8], width: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let mut s = 0u64;
        for yy in y..y + h {
            for xx in x..x + w {
                s += gray[yy * width + xx] as u64;
            }
        }
        s
    }

    #[test]
    fn test_rect_sum_matches_brute_force() {
        let (w, h) = (9usize, 7usize);
        let gray: Vec<u8> = (0..w * h).map(|i| ((i * 37) % 251) as u8).collect();
        let ii = IntegralImage::new(&gray, w, h);

        for &(x, y, rw, rh) in &[(0, 0, 9, 7), (1, 2, 3, 4), (8, 6, 1, 1), (4, 0, 5, 2)] {
            assert_eq!(ii.rect_sum(x, y, rw, rh), brute_sum(&gray, w, x, y, rw, rh));
        }
    }

    #[test]
    fn test_rect_sqsum() {
        let gray = vec![1u8, 2, 3, 4];
        let ii = IntegralImage::new(&gray, 2, 2);
        assert_eq!(ii.rect_sqsum(0, 0, 2, 2), 1 + 4 + 9 + 16);
        assert_eq!(ii.rect_sqsum(1, 0, 1, 2), 4 + 16);
    }

    #[test]
    fn test_empty_rect_is_zero() {
        let gray = vec![200u8; 16];
        let ii = IntegralImage::new(&gray, 4, 4);
        assert_eq!(ii.rect_sum(2, 2, 0, 0), 0);
        assert_eq!(ii.rect_sum(0, 0, 4, 4), 200 * 16);
    }
}
