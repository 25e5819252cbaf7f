//! ユニット単位のDIEインデックス
//!
//! ユニットのDIEツリーを一度だけ深さ優先で歩き、行きがけ順の配列に落とします。
//! 配列には各DIEのタグ・親・部分木の終端を記録するため、この1つの構造が
//! 行きがけ順の走査（entry）、子の列挙（child）、親の逆引き（parent）の
//! すべてを支えます。親の逆引きキャッシュは初回アクセス時にここで作られます。

use crate::loader::Reader;
use crate::Result;

/// インデックス内の1つのDIE
#[derive(Debug, Clone, Copy)]
pub struct DieNode {
    /// ユニット内オフセット
    pub offset: gimli::UnitOffset,
    /// DIEのタグ
    pub tag: gimli::DwTag,
    /// 親DIEのインデックス位置（ルートはNone）
    pub parent: Option<usize>,
    /// 部分木の終端（行きがけ順での排他的終了位置）
    pub end: usize,
}

/// ユニットのDIEインデックス
///
/// ノードは行きがけ順で、オフセットは単調増加します。
pub struct DieIndex {
    nodes: Vec<DieNode>,
}

impl DieIndex {
    /// ユニットを1パス走査してインデックスを構築する
    pub fn build(unit: &gimli::Unit<Reader>) -> Result<Self> {
        let mut nodes: Vec<DieNode> = Vec::new();
        // 現在の祖先のインデックス位置
        let mut lineage: Vec<usize> = Vec::new();
        let mut depth: isize = 0;

        let mut cursor = unit.entries();
        while let Some((delta, entry)) = cursor.next_dfs()? {
            depth += delta;
            // 新しい深さより深い祖先は部分木が閉じた
            while lineage.len() as isize > depth {
                let i = lineage.pop().expect("lineage underflow");
                nodes[i].end = nodes.len();
            }

            let parent = lineage.last().copied();
            let i = nodes.len();
            nodes.push(DieNode {
                offset: entry.offset(),
                tag: entry.tag(),
                parent,
                end: 0,
            });
            lineage.push(i);
        }

        // 残った祖先を閉じる
        let n = nodes.len();
        for i in lineage {
            nodes[i].end = n;
        }

        Ok(Self { nodes })
    }

    /// DIEの個数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// インデックスが空かどうか
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 位置からノードを取得する
    pub fn node(&self, pos: usize) -> &DieNode {
        &self.nodes[pos]
    }

    /// ユニット内オフセットから行きがけ順の位置を引く
    pub fn position(&self, offset: gimli::UnitOffset) -> Option<usize> {
        self.nodes
            .binary_search_by_key(&offset.0, |n| n.offset.0)
            .ok()
    }

    /// 親DIEの位置を引く（ルートはNone）
    pub fn find_parent(&self, pos: usize) -> Option<usize> {
        self.nodes[pos].parent
    }

    /// 部分木の終端（排他的）
    pub fn subtree_end(&self, pos: usize) -> usize {
        self.nodes[pos].end
    }

    /// 直接の子の位置を順に返す
    pub fn children(&self, pos: usize) -> ChildIter<'_> {
        ChildIter {
            index: self,
            next: pos + 1,
            end: self.nodes[pos].end,
        }
    }
}

/// 直接の子を列挙するイテレータ
pub struct ChildIter<'a> {
    index: &'a DieIndex,
    next: usize,
    end: usize,
}

impl Iterator for ChildIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.end {
            return None;
        }
        let pos = self.next;
        // 弟は自分の部分木の直後
        self.next = self.index.nodes[pos].end;
        Some(pos)
    }
}
