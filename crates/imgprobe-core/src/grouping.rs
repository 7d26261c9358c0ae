//! Neighbour voting over raw window hits.
//!
//! Clusters similar rectangles, averages each cluster and keeps the clusters
//! that enough windows voted for. Small boxes sitting inside a stronger box
//! are dropped.

use crate::types::Rect;

/// Relative tolerance for two rectangles to count as the same object.
pub const GROUP_EPS: f64 = 0.2;

/// Every edge within `eps * (min width + min height) / 2` of the other's.
fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;

    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.w, b.x + b.w)
        && close(a.y + a.h, b.y + b.h)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Split `rects` into equivalence classes of the transitive `similar` relation.
///
/// Returns a class label per rectangle and the class count. Labels are
/// numbered in order of each class's first member.
pub fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; n];
    let mut labels = Vec::with_capacity(n);
    let mut classes = 0;
    for i in 0..n {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        labels.push(class_of_root[root]);
    }

    (labels, classes)
}

/// Merge raw detections into one box per object.
///
/// A cluster survives when it holds more than `min_neighbors` rectangles.
/// `min_neighbors == 0` returns the input untouched.
pub fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, classes) = partition(rects, eps);

    let mut sums = vec![[0u64; 4]; classes];
    let mut votes = vec![0usize; classes];
    for (r, &cls) in rects.iter().zip(&labels) {
        let s = &mut sums[cls];
        s[0] += r.x as u64;
        s[1] += r.y as u64;
        s[2] += r.w as u64;
        s[3] += r.h as u64;
        votes[cls] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&votes)
        .map(|(s, &n)| {
            let mean = |v: u64| (v as f64 / n as f64).round_ties_even() as u32;
            Rect::new(mean(s[0]), mean(s[1]), mean(s[2]), mean(s[3]))
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = votes[i];
        if n1 <= min_neighbors {
            continue;
        }

        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = votes[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.w as f64 * eps).round_ties_even() as i64;
            let dy = (r2.h as f64 * eps).round_ties_even() as i64;
            let (x1, y1, w1, h1) = (r1.x as i64, r1.y as i64, r1.w as i64, r1.h as i64);
            let (x2, y2, w2, h2) = (r2.x as i64, r2.y as i64, r2.w as i64, r2.h as i64);

            x1 >= x2 - dx
                && y1 >= y2 - dy
                && x1 + w1 <= x2 + w2 + dx
                && y1 + h1 <= y2 + h2 + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            grouped.push(*r1);
        }
    }

    grouped
}
