//! Binary foreground masks and morphological opening

/// Row-major binary mask, `true` = foreground
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn empty(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![false; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Erode then dilate with a `size x size` square element
    ///
    /// Removes foreground specks smaller than the element while leaving
    /// larger blobs at their original extent.
    pub fn open(&self, size: usize) -> Mask {
        if size <= 1 {
            return self.clone();
        }
        self.erode(size).dilate(size)
    }

    /// Pixels outside the frame count as foreground so borders do not erode
    pub fn erode(&self, size: usize) -> Mask {
        let radius = size / 2;
        let horizontal = self.sweep(radius, true, true);
        horizontal.sweep(radius, false, true)
    }

    /// Pixels outside the frame count as background
    pub fn dilate(&self, size: usize) -> Mask {
        let radius = size / 2;
        let horizontal = self.sweep(radius, true, false);
        horizontal.sweep(radius, false, false)
    }

    /// One separable pass of a min (`erode`) or max filter along one axis
    fn sweep(&self, radius: usize, horizontal: bool, erode: bool) -> Mask {
        let mut out = Mask::empty(self.width, self.height);
        let (len, lines) =
            if horizontal { (self.width, self.height) } else { (self.height, self.width) };

        for line in 0..lines {
            for pos in 0..len {
                let lo = pos.saturating_sub(radius);
                let hi = (pos + radius).min(len - 1);
                let mut hit = erode;
                for k in lo..=hi {
                    let v = if horizontal { self.get(k, line) } else { self.get(line, k) };
                    if erode && !v {
                        hit = false;
                        break;
                    }
                    if !erode && v {
                        hit = true;
                        break;
                    }
                }
                if horizontal {
                    out.set(pos, line, hit);
                } else {
                    out.set(line, pos, hit);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rect(w: usize, h: usize, x0: usize, y0: usize, rw: usize, rh: usize) -> Mask {
        let mut mask = Mask::empty(w, h);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn test_open_removes_isolated_pixels() {
        let mut mask = Mask::empty(10, 10);
        mask.set(2, 2, true);
        mask.set(7, 5, true);
        mask.set(7, 6, true);
        assert_eq!(mask.open(3).count(), 0);
    }

    #[test]
    fn test_open_preserves_large_blob() {
        let mask = mask_with_rect(20, 20, 4, 5, 8, 6);
        let opened = mask.open(3);
        assert_eq!(opened, mask);
    }

    #[test]
    fn test_open_keeps_blob_touching_border() {
        let mask = mask_with_rect(12, 12, 0, 0, 5, 5);
        assert_eq!(mask.open(3).count(), 25);
    }

    #[test]
    fn test_open_strips_thin_spur() {
        let mut mask = mask_with_rect(20, 20, 2, 2, 6, 6);
        // one-pixel-wide line sticking out of the blob
        for x in 8..15 {
            mask.set(x, 4, true);
        }
        let opened = mask.open(3);
        assert_eq!(opened.count(), 36);
    }

    #[test]
    fn test_size_one_is_identity() {
        let mut mask = Mask::empty(4, 4);
        mask.set(1, 1, true);
        assert_eq!(mask.open(1), mask);
    }
}
