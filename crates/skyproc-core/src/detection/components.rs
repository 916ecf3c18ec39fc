use ndarray::Array2;

/// Pixel adjacency used when grouping mask pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

/// Statistics for a single connected component.
#[derive(Clone, Debug)]
pub struct ComponentStats {
    /// Unique label for this component.
    pub label: u32,
    /// Number of pixels in the component.
    pub area: usize,
    /// Bounding box: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
}

/// Label image plus per-component statistics.
#[derive(Clone, Debug)]
pub struct Labeling {
    /// Resolved label per pixel, 0 for background.
    pub labels: Array2<u32>,
    /// Components sorted by area descending (largest first).
    pub components: Vec<ComponentStats>,
}

/// Two-pass connected component labeling with union-find.
pub fn label_components(mask: &Array2<bool>, connectivity: Connectivity) -> Labeling {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return Labeling {
            labels,
            components: Vec::new(),
        };
    }

    // Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    // Pass 1: provisional labels from already-visited neighbours.
    let mut neighbours = Vec::with_capacity(4);
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            neighbours.clear();
            if col > 0 {
                neighbours.push(labels[[row, col - 1]]);
            }
            if row > 0 {
                neighbours.push(labels[[row - 1, col]]);
                if connectivity == Connectivity::Eight {
                    if col > 0 {
                        neighbours.push(labels[[row - 1, col - 1]]);
                    }
                    if col + 1 < w {
                        neighbours.push(labels[[row - 1, col + 1]]);
                    }
                }
            }

            let smallest = neighbours.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    labels[[row, col]] = label;
                }
                Some(min_label) => {
                    labels[[row, col]] = min_label;
                    for &l in neighbours.iter().filter(|&&l| l > 0 && l != min_label) {
                        union(&mut parent, min_label, l);
                    }
                }
            }
        }
    }

    // Flatten parent references.
    for i in 1..parent.len() {
        parent[i] = find(&parent, i as u32);
    }

    // Pass 2: resolve labels and collect stats.
    let mut stats_map = std::collections::HashMap::<u32, ComponentStats>::new();
    for ((row, col), lbl) in labels.indexed_iter_mut() {
        if *lbl == 0 {
            continue;
        }
        let root = parent[*lbl as usize];
        *lbl = root;

        let entry = stats_map.entry(root).or_insert(ComponentStats {
            label: root,
            area: 0,
            bbox: (row, row, col, col),
        });
        entry.area += 1;
        entry.bbox.0 = entry.bbox.0.min(row);
        entry.bbox.1 = entry.bbox.1.max(row);
        entry.bbox.2 = entry.bbox.2.min(col);
        entry.bbox.3 = entry.bbox.3.max(col);
    }

    let mut components: Vec<ComponentStats> = stats_map.into_values().collect();
    components.sort_unstable_by(|a, b| b.area.cmp(&a.area).then(a.label.cmp(&b.label)));
    Labeling { labels, components }
}

/// Keep only the components with at least `min_area` pixels.
pub fn remove_small_components(
    mask: &Array2<bool>,
    min_area: usize,
    connectivity: Connectivity,
) -> Array2<bool> {
    if min_area <= 1 {
        return mask.clone();
    }
    let labeling = label_components(mask, connectivity);
    let max_label = labeling
        .components
        .iter()
        .map(|c| c.label as usize)
        .max()
        .unwrap_or(0);
    let mut keep = vec![false; max_label + 1];
    for c in &labeling.components {
        keep[c.label as usize] = c.area >= min_area;
    }
    labeling.labels.mapv(|l| l > 0 && keep[l as usize])
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Merge larger root into smaller root to keep labels consistent.
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
