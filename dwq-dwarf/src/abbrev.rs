//! `.debug_abbrev` の略語テーブル読み込み
//!
//! gimli の読み込み側は略語を code での引き当てしか公開しないため、
//! テーブル全体の列挙はセクションを直接歩いて行います。

use crate::loader::Reader;
use crate::Result;
use gimli::Reader as _;

/// 略語宣言内の1つの属性指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    /// 属性名
    pub name: gimli::DwAt,
    /// 属性のフォーム
    pub form: gimli::DwForm,
}

/// 1つの略語宣言
#[derive(Debug, Clone)]
pub struct AbbrevDecl {
    /// 略語コード
    pub code: u64,
    /// タグ
    pub tag: gimli::DwTag,
    /// 子を持ち得るかどうか
    pub has_children: bool,
    /// 属性指定の一覧
    pub attrs: Vec<AttrSpec>,
    /// `.debug_abbrev` セクション内での宣言のオフセット
    pub offset: u64,
}

/// 1ユニット分の略語テーブル
#[derive(Debug, Clone)]
pub struct AbbrevTable {
    /// テーブル先頭の `.debug_abbrev` オフセット
    pub offset: gimli::DebugAbbrevOffset,
    /// コード順の宣言一覧
    pub decls: Vec<AbbrevDecl>,
}

impl AbbrevTable {
    /// セクションデータの指定オフセットからテーブルを読み込む
    pub fn parse(data: Reader, offset: gimli::DebugAbbrevOffset) -> Result<Self> {
        let section_len = data.len();
        if offset.0 > section_len {
            anyhow::bail!(
                "abbrev table offset {:#x} out of bounds ({:#x})",
                offset.0,
                section_len
            );
        }

        let mut r = data.range_from(offset.0..);
        let mut decls = Vec::new();

        loop {
            let decl_offset = (section_len - r.len()) as u64;
            let code = r.read_uleb128()?;
            // コード0がテーブルの終端
            if code == 0 {
                break;
            }

            let tag = gimli::DwTag(r.read_uleb128()? as u16);
            let has_children = r.read_u8()? != 0;

            let mut attrs = Vec::new();
            loop {
                let name = r.read_uleb128()?;
                let form = r.read_uleb128()?;
                if name == 0 && form == 0 {
                    break;
                }
                let form = gimli::DwForm(form as u16);
                if form == gimli::constants::DW_FORM_implicit_const {
                    // 暗黙値はフォームに続けて格納される
                    r.read_sleb128()?;
                }
                attrs.push(AttrSpec {
                    name: gimli::DwAt(name as u16),
                    form,
                });
            }

            decls.push(AbbrevDecl {
                code,
                tag,
                has_children,
                attrs,
                offset: decl_offset,
            });
        }

        decls.sort_by_key(|d| d.code);
        Ok(Self { offset, decls })
    }

    /// コードから宣言を引く
    pub fn get(&self, code: u64) -> Option<&AbbrevDecl> {
        self.decls
            .binary_search_by_key(&code, |d| d.code)
            .ok()
            .map(|i| &self.decls[i])
    }
}
