//! Merge Sort (spec.md §4.7).
//!
//! A bottom-up, iterative mergesort, stable, O(n log n), tolerant of empty
//! input. Implemented directly over a `Vec` rather than calling into
//! `slice::sort_by` so the merge itself stays explicit: ties must resolve
//! by keeping the earlier input element first (P4), which an explicit
//! merge makes easy to get right and easy to test.

/// Sorts `items` in place by `key`, ascending, stable on ties.
pub fn mergesort_by_key<T, K, F>(items: &mut Vec<T>, key: F)
where
    T: Copy,
    K: Ord,
    F: Fn(&T) -> K,
{
    let n = items.len();
    if n < 2 {
        return;
    }

    let mut buf: Vec<Option<T>> = Vec::new();
    let mut width = 1;
    while width < n {
        buf.clear();
        buf.resize_with(n, || None);

        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            merge(items, &mut buf, start, mid, end, &key);
            start += 2 * width;
        }

        for (slot, merged) in items.iter_mut().zip(buf.iter_mut()) {
            *slot = merged.take().expect("every slot filled by merge");
        }

        width *= 2;
    }
}

fn merge<T, K, F>(items: &mut [T], buf: &mut [Option<T>], start: usize, mid: usize, end: usize, key: &F)
where
    T: Copy,
    K: Ord,
    F: Fn(&T) -> K,
{
    let left: Vec<T> = items[start..mid].to_vec();
    let right: Vec<T> = items[mid..end].to_vec();

    let mut out = start;
    let mut left_iter = left.into_iter();
    let mut right_iter = right.into_iter();
    let mut left_cur = left_iter.next();
    let mut right_cur = right_iter.next();

    loop {
        match (&left_cur, &right_cur) {
            (Some(l), Some(r)) => {
                if key(l) <= key(r) {
                    buf[out] = Some(left_cur.take().unwrap());
                    left_cur = left_iter.next();
                } else {
                    buf[out] = Some(right_cur.take().unwrap());
                    right_cur = right_iter.next();
                }
                out += 1;
            }
            (Some(_), None) => {
                buf[out] = Some(left_cur.take().unwrap());
                left_cur = left_iter.next();
                out += 1;
            }
            (None, Some(_)) => {
                buf[out] = Some(right_cur.take().unwrap());
                right_cur = right_iter.next();
                out += 1;
            }
            (None, None) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[derive(Copy, Clone, Debug, PartialEq)]
    struct Item {
        key: i32,
        tag: &'static str,
    }

    #[test]
    fn sorts_empty_and_single() {
        let mut v: Vec<Item> = vec![];
        mergesort_by_key(&mut v, |i| i.key);
        assert!(v.is_empty());

        let mut v = vec![Item { key: 1, tag: "a" }];
        mergesort_by_key(&mut v, |i| i.key);
        assert_eq!(v, vec![Item { key: 1, tag: "a" }]);
    }

    #[test]
    fn sorts_ascending() {
        let mut v = vec![
            Item { key: 5, tag: "a" },
            Item { key: 1, tag: "b" },
            Item { key: 3, tag: "c" },
            Item { key: 2, tag: "d" },
            Item { key: 4, tag: "e" },
        ];
        mergesort_by_key(&mut v, |i| i.key);
        assert_eq!(v.iter().map(|i| i.key).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ties_preserve_input_order() {
        let mut v = vec![
            Item { key: 1, tag: "first" },
            Item { key: 1, tag: "second" },
            Item { key: 0, tag: "zero" },
            Item { key: 1, tag: "third" },
        ];
        mergesort_by_key(&mut v, |i| i.key);
        assert_eq!(
            v,
            vec![
                Item { key: 0, tag: "zero" },
                Item { key: 1, tag: "first" },
                Item { key: 1, tag: "second" },
                Item { key: 1, tag: "third" },
            ]
        );
    }

    #[test]
    fn sorts_longer_random_run() {
        let mut v: Vec<Item> = (0..200)
            .map(|i| Item {
                key: (i * 37) % 101,
                tag: "x",
            })
            .collect();
        mergesort_by_key(&mut v, |i| i.key);
        for w in v.windows(2) {
            assert!(w[0].key <= w[1].key);
        }
    }
}
