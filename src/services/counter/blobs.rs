//! Connected foreground regions
//!
//! Foreground uses 8-connectivity, background 4-connectivity, so every
//! background hole is a closed region. Only outermost regions are reported:
//! a region sitting inside a hole of another region is skipped.

use super::morphology::Mask;

/// One outermost connected foreground region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    /// Foreground pixel count
    pub area: usize,
}

const NONE: u32 = u32::MAX;

/// Label the background reachable from the frame edge
fn outside_background(mask: &Mask) -> Vec<bool> {
    let (w, h) = (mask.width, mask.height);
    let mut outside = vec![false; w * h];
    let mut stack = Vec::new();

    let seed = |x: usize, y: usize, outside: &mut Vec<bool>, stack: &mut Vec<(usize, usize)>| {
        let i = y * w + x;
        if !mask.data[i] && !outside[i] {
            outside[i] = true;
            stack.push((x, y));
        }
    };
    for x in 0..w {
        seed(x, 0, &mut outside, &mut stack);
        seed(x, h - 1, &mut outside, &mut stack);
    }
    for y in 0..h {
        seed(0, y, &mut outside, &mut stack);
        seed(w - 1, y, &mut outside, &mut stack);
    }

    while let Some((x, y)) = stack.pop() {
        for (nx, ny) in neighbours4(x, y, w, h) {
            seed(nx, ny, &mut outside, &mut stack);
        }
    }
    outside
}

fn neighbours4(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let left = (x > 0).then(|| (x - 1, y));
    let right = (x + 1 < w).then(|| (x + 1, y));
    let up = (y > 0).then(|| (x, y - 1));
    let down = (y + 1 < h).then(|| (x, y + 1));
    [left, right, up, down].into_iter().flatten()
}

fn neighbours8(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let xs = x.saturating_sub(1)..=(x + 1).min(w - 1);
    xs.flat_map(move |nx| {
        let ys = y.saturating_sub(1)..=(y + 1).min(h - 1);
        ys.map(move |ny| (nx, ny))
    })
    .filter(move |&(nx, ny)| nx != x || ny != y)
}

/// Extract outermost connected regions of `mask`
pub fn find_blobs(mask: &Mask) -> Vec<Blob> {
    let (w, h) = (mask.width, mask.height);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let outside = outside_background(mask);
    let mut labels = vec![NONE; w * h];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if !mask.data[start] || labels[start] != NONE {
            continue;
        }
        let label = blobs.len() as u32;
        labels[start] = label;
        stack.push((start % w, start / w));

        let mut blob = Blob { area: 0 };
        let mut external = false;

        while let Some((x, y)) = stack.pop() {
            blob.area += 1;

            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                external = true;
            }
            if !external && neighbours4(x, y, w, h).any(|(nx, ny)| outside[ny * w + nx]) {
                external = true;
            }

            for (nx, ny) in neighbours8(x, y, w, h) {
                let i = ny * w + nx;
                if mask.data[i] && labels[i] == NONE {
                    labels[i] = label;
                    stack.push((nx, ny));
                }
            }
        }

        // Keep label indices dense even for skipped nested regions
        blobs.push((blob, external));
    }

    blobs.into_iter().filter(|(_, external)| *external).map(|(blob, _)| blob).collect()
}

/// Number of outermost regions with area strictly above `min_area`
pub fn count_blobs(mask: &Mask, min_area: usize) -> usize {
    find_blobs(mask).iter().filter(|b| b.area > min_area).count()
}
