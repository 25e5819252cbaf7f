//! アドレス集合の被覆計算
//!
//! 64bitアドレス上の半開区間 `[start, start+length)` の集合を、
//! ソート済み・結合済み・重なりなしの正規形で保持します。

/// 1つの連続区間
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CovRange {
    /// 先頭アドレス
    pub start: u64,
    /// 長さ（アドレス数）
    pub length: u64,
}

impl CovRange {
    /// 区間の終端（排他的）。u64の上限で飽和する
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }
}

/// アドレス集合
///
/// 常に正規形（区間はソート済みで、隣接・重複する区間は結合済み）です。
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Coverage {
    ranges: Vec<CovRange>,
}

impl Coverage {
    /// 空の集合を作る
    pub fn new() -> Self {
        Self::default()
    }

    /// 区間の個数
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// 集合が空かどうか
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 指定位置の区間を取得する
    pub fn at(&self, i: usize) -> CovRange {
        self.ranges[i]
    }

    /// 区間を順に返す
    pub fn iter(&self) -> impl Iterator<Item = CovRange> + '_ {
        self.ranges.iter().copied()
    }

    /// 被覆されるアドレスの総数
    pub fn total_length(&self) -> u64 {
        self.ranges.iter().map(|r| r.length).sum()
    }

    /// 区間 `[start, start+length)` を追加する
    pub fn add(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }
        let end = start.saturating_add(length);

        // 新区間と結合し得る最初の区間を探す
        let mut i = match self.ranges.binary_search_by_key(&start, |r| r.start) {
            Ok(i) => i,
            Err(i) => i,
        };
        // 直前の区間が接触しているかもしれない
        if i > 0 && self.ranges[i - 1].end() >= start {
            i -= 1;
        }

        let mut new_start = start;
        let mut new_end = end;
        let mut j = i;
        while j < self.ranges.len() && self.ranges[j].start <= new_end {
            new_start = new_start.min(self.ranges[j].start);
            new_end = new_end.max(self.ranges[j].end());
            j += 1;
        }

        self.ranges.splice(
            i..j,
            std::iter::once(CovRange {
                start: new_start,
                length: new_end - new_start,
            }),
        );
    }

    /// 別の集合の全区間を追加する
    pub fn add_all(&mut self, other: &Coverage) {
        for r in other.iter() {
            self.add(r.start, r.length);
        }
    }

    /// 区間 `[start, start+length)` を取り除く
    pub fn remove(&mut self, start: u64, length: u64) {
        if length == 0 {
            return;
        }
        let end = start.saturating_add(length);

        let mut result = Vec::with_capacity(self.ranges.len() + 1);
        for r in &self.ranges {
            let r_end = r.end();
            if r_end <= start || r.start >= end {
                // 重なりなし
                result.push(*r);
                continue;
            }
            if r.start < start {
                result.push(CovRange {
                    start: r.start,
                    length: start - r.start,
                });
            }
            if r_end > end {
                result.push(CovRange {
                    start: end,
                    length: r_end - end,
                });
            }
        }
        self.ranges = result;
    }

    /// 別の集合の全区間を取り除く
    pub fn remove_all(&mut self, other: &Coverage) {
        for r in other.iter() {
            self.remove(r.start, r.length);
        }
    }

    /// 区間 `[start, start+length)` との共通部分を返す
    pub fn intersect(&self, start: u64, length: u64) -> Coverage {
        let end = start.saturating_add(length);
        let mut result = Coverage::new();
        for r in &self.ranges {
            let s = r.start.max(start);
            let e = r.end().min(end);
            if s < e {
                result.add(s, e - s);
            }
        }
        result
    }

    /// 区間全体が被覆されているかどうか
    pub fn is_covered(&self, start: u64, length: u64) -> bool {
        if length == 0 {
            return true;
        }
        let end = start.saturating_add(length);
        self.ranges
            .iter()
            .any(|r| r.start <= start && r.end() >= end)
    }

    /// 区間と1アドレスでも重なるかどうか
    pub fn is_overlap(&self, start: u64, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        let end = start.saturating_add(length);
        self.ranges.iter().any(|r| r.start < end && r.end() > start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_adjacent() {
        let mut cov = Coverage::new();
        cov.add(0, 0x10);
        cov.add(0x10, 0x10);
        assert_eq!(cov.len(), 1);
        assert_eq!(cov.at(0), CovRange { start: 0, length: 0x20 });
    }

    #[test]
    fn test_add_keeps_disjoint() {
        let mut cov = Coverage::new();
        cov.add(0, 0x10);
        cov.add(0x100, 0x10);
        assert_eq!(cov.len(), 2);
        assert_eq!(cov.total_length(), 0x20);
    }

    #[test]
    fn test_add_merges_overlap() {
        let mut cov = Coverage::new();
        cov.add(0, 0x10);
        cov.add(0x100, 0x10);
        cov.add(0x8, 0x100);
        assert_eq!(cov.len(), 1);
        assert_eq!(cov.at(0), CovRange { start: 0, length: 0x110 });
    }

    #[test]
    fn test_add_out_of_order() {
        let mut cov = Coverage::new();
        cov.add(0x100, 0x10);
        cov.add(0, 0x10);
        assert_eq!(cov.at(0).start, 0);
        assert_eq!(cov.at(1).start, 0x100);
    }

    #[test]
    fn test_remove_pokes_hole() {
        let mut cov = Coverage::new();
        cov.add(0, 0x20);
        cov.remove(0x10, 1);
        assert_eq!(cov.len(), 2);
        assert_eq!(cov.at(0), CovRange { start: 0, length: 0x10 });
        assert_eq!(cov.at(1), CovRange { start: 0x11, length: 0xf });
        assert!(!cov.is_covered(0x10, 1));
    }

    #[test]
    fn test_remove_entire() {
        let mut cov = Coverage::new();
        cov.add(0x10, 0x10);
        cov.remove(0, 0x100);
        assert!(cov.is_empty());
    }

    #[test]
    fn test_intersect() {
        let mut cov = Coverage::new();
        cov.add(0, 0x10);
        cov.add(0x100, 0x10);
        let i = cov.intersect(0x8, 0x100);
        assert_eq!(i.len(), 2);
        assert_eq!(i.at(0), CovRange { start: 0x8, length: 0x8 });
        assert_eq!(i.at(1), CovRange { start: 0x100, length: 0x8 });
    }

    #[test]
    fn test_covered_and_overlap() {
        let mut cov = Coverage::new();
        cov.add(0, 10);
        assert!(cov.is_covered(9, 1));
        assert!(!cov.is_covered(10, 1));
        assert!(cov.is_overlap(5, 100));
        assert!(!cov.is_overlap(10, 5));
    }

    #[test]
    fn test_zero_length_ignored() {
        let mut cov = Coverage::new();
        cov.add(5, 0);
        assert!(cov.is_empty());
    }
}
