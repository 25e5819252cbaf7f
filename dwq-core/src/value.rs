//! クエリ言語の値モデル
//!
//! 値はタグ付きenumで表します。各値は直接の生成元が割り当てた位置（pos）を
//! 持ち、深い複製・表示・三方向比較を備えます。DIE値は raw/cooked の別と、
//! 部分ユニットを経由して到達した場合のインポート連鎖を運びます。

use crate::cst::Constant;
use crate::frame::Closure;
use dwq_dwarf::{Coverage, DwarfContext, Reader};
use num::BigInt;
use num::ToPrimitive;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;

/// 値の型タグ
///
/// 並び順がそのまま型の順位（異なる型同士の比較順）になります。
/// コード0はスタックの型プロファイルで「値なし」を表すため使いません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ValueType {
    Const = 1,
    Str,
    Seq,
    Closure,
    Dwarf,
    Cu,
    Die,
    Attr,
    AbbrevUnit,
    Abbrev,
    AbbrevAttr,
    Aset,
    LoclistElem,
    LoclistOp,
    Elf,
    ElfSection,
    Symbol,
}

impl ValueType {
    /// 型プロファイルに詰めるコード
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 型の表示名
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Const => "T_CONST",
            ValueType::Str => "T_STR",
            ValueType::Seq => "T_SEQ",
            ValueType::Closure => "T_CLOSURE",
            ValueType::Dwarf => "T_DWARF",
            ValueType::Cu => "T_CU",
            ValueType::Die => "T_DIE",
            ValueType::Attr => "T_ATTR",
            ValueType::AbbrevUnit => "T_ABBREV_UNIT",
            ValueType::Abbrev => "T_ABBREV",
            ValueType::AbbrevAttr => "T_ABBREV_ATTR",
            ValueType::Aset => "T_ASET",
            ValueType::LoclistElem => "T_LOCLIST_ELEM",
            ValueType::LoclistOp => "T_LOCLIST_OP",
            ValueType::Elf => "T_ELF",
            ValueType::ElfSection => "T_ELF_SECTION",
            ValueType::Symbol => "T_SYMBOL",
        }
    }
}

/// 型ドメイン定数の表示（cst.rsから呼ばれる）
pub fn type_name_for_code(code: &BigInt) -> String {
    let all = [
        ValueType::Const,
        ValueType::Str,
        ValueType::Seq,
        ValueType::Closure,
        ValueType::Dwarf,
        ValueType::Cu,
        ValueType::Die,
        ValueType::Attr,
        ValueType::AbbrevUnit,
        ValueType::Abbrev,
        ValueType::AbbrevAttr,
        ValueType::Aset,
        ValueType::LoclistElem,
        ValueType::LoclistOp,
        ValueType::Elf,
        ValueType::ElfSection,
        ValueType::Symbol,
    ];
    code.to_u8()
        .and_then(|c| all.iter().find(|t| t.code() == c))
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| format!("T_{}", code))
}

/// 三方向比較の結果
///
/// Fail は「同じ順位の異なる型」を比較した場合にのみ現れます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpResult {
    Less,
    Equal,
    Greater,
    Fail,
}

impl CmpResult {
    /// `Ordering` から変換する
    pub fn from_ordering(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => CmpResult::Less,
            Ordering::Equal => CmpResult::Equal,
            Ordering::Greater => CmpResult::Greater,
        }
    }

    /// 向きを反転する（Fail はそのまま）
    pub fn invert(self) -> Self {
        match self {
            CmpResult::Less => CmpResult::Greater,
            CmpResult::Greater => CmpResult::Less,
            other => other,
        }
    }
}

/// DIE値の raw/cooked の別
///
/// cooked な走査は `DW_TAG_imported_unit` を透過的に辿り、raw な走査は
/// インポートを一切越えません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Doneness {
    Raw,
    Cooked,
}

/// Dwarf値の中身
#[derive(Debug, Clone)]
pub struct DwarfRef {
    pub ctx: Rc<DwarfContext>,
    pub doneness: Doneness,
}

/// CU値の中身
#[derive(Debug, Clone)]
pub struct CuRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    pub doneness: Doneness,
}

impl CuRef {
    /// `.debug_info` 内でのユニットのオフセット
    pub fn offset(&self) -> u64 {
        self.ctx.unit(self.unit).offset.0 as u64
    }
}

/// DIE値の中身
///
/// DIEは (ユニット番号, インデックス上の行きがけ順位置) で同定します。
/// インポート連鎖は、このDIEへ到達するために通過した
/// `DW_TAG_imported_unit` DIEの連結リストです。
#[derive(Debug, Clone)]
pub struct DieRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    pub pos: usize,
    pub offset: gimli::UnitOffset,
    pub tag: gimli::DwTag,
    pub import: Option<Rc<DieRef>>,
    pub doneness: Doneness,
}

impl DieRef {
    /// `.debug_info` 全体でのオフセット
    pub fn global_offset(&self) -> u64 {
        self.ctx.global_offset(self.unit, self.offset).0 as u64
    }

    /// インポート連鎖の長さ
    pub fn import_depth(&self) -> usize {
        let mut n = 0;
        let mut link = self.import.clone();
        while let Some(l) = link {
            n += 1;
            link = l.import.clone();
        }
        n
    }
}

/// 属性値の中身
#[derive(Debug, Clone)]
pub struct AttrRef {
    pub ctx: Rc<DwarfContext>,
    /// 属性を実際に持つDIE
    pub unit: usize,
    pub die_pos: usize,
    pub die_offset: gimli::UnitOffset,
    pub name: gimli::DwAt,
    pub value: gimli::AttributeValue<Reader>,
    pub doneness: Doneness,
}

impl AttrRef {
    /// 持ち主DIEの `.debug_info` 全体でのオフセット
    pub fn die_global(&self) -> u64 {
        self.ctx.global_offset(self.unit, self.die_offset).0 as u64
    }
}

/// 略語テーブル値の中身
#[derive(Debug, Clone)]
pub struct AbbrevUnitRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
}

/// 略語宣言値の中身
#[derive(Debug, Clone)]
pub struct AbbrevRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    pub code: u64,
}

/// 略語宣言内の属性指定値の中身
#[derive(Debug, Clone)]
pub struct AbbrevAttrRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    pub code: u64,
    pub index: usize,
}

/// ロケーションリスト要素の中身
#[derive(Debug, Clone)]
pub struct LoclistElemRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    pub begin: u64,
    pub end: u64,
    pub expr: gimli::Expression<Reader>,
}

/// ロケーション式の1命令の中身
#[derive(Debug, Clone)]
pub struct LoclistOpRef {
    pub ctx: Rc<DwarfContext>,
    pub unit: usize,
    /// 式内でのバイトオフセット
    pub offset: u64,
    pub dwop: gimli::DwOp,
    pub op: gimli::Operation<Reader>,
}

/// ELFファイル値の中身
#[derive(Debug, Clone)]
pub struct ElfRef {
    pub ctx: Rc<DwarfContext>,
}

/// ELFセクション値の中身
#[derive(Debug, Clone)]
pub struct ElfSectionRef {
    pub ctx: Rc<DwarfContext>,
    pub index: usize,
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

/// ELFシンボル値の中身
#[derive(Debug, Clone)]
pub struct SymbolRef {
    pub ctx: Rc<DwarfContext>,
    pub index: usize,
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

/// 値の中身
#[derive(Debug, Clone)]
pub enum ValueKind {
    Const(Constant),
    Str(String),
    Seq(Vec<Value>),
    Closure(Closure),
    Dwarf(DwarfRef),
    Cu(CuRef),
    Die(DieRef),
    Attr(AttrRef),
    AbbrevUnit(AbbrevUnitRef),
    Abbrev(AbbrevRef),
    AbbrevAttr(AbbrevAttrRef),
    Aset(Coverage),
    LoclistElem(LoclistElemRef),
    LoclistOp(LoclistOpRef),
    Elf(ElfRef),
    ElfSection(ElfSectionRef),
    Symbol(SymbolRef),
}

/// クエリ言語の値
#[derive(Debug, Clone)]
pub struct Value {
    /// 直接の生成元が割り当てた位置。公開後は変わらない
    pub pos: u64,
    pub kind: ValueKind,
}

impl Value {
    pub fn new(kind: ValueKind, pos: u64) -> Self {
        Self { pos, kind }
    }

    pub fn cst(c: Constant, pos: u64) -> Self {
        Self::new(ValueKind::Const(c), pos)
    }

    pub fn str(s: impl Into<String>, pos: u64) -> Self {
        Self::new(ValueKind::Str(s.into()), pos)
    }

    pub fn seq(values: Vec<Value>, pos: u64) -> Self {
        Self::new(ValueKind::Seq(values), pos)
    }

    /// 値の型タグ
    pub fn vtype(&self) -> ValueType {
        match &self.kind {
            ValueKind::Const(_) => ValueType::Const,
            ValueKind::Str(_) => ValueType::Str,
            ValueKind::Seq(_) => ValueType::Seq,
            ValueKind::Closure(_) => ValueType::Closure,
            ValueKind::Dwarf(_) => ValueType::Dwarf,
            ValueKind::Cu(_) => ValueType::Cu,
            ValueKind::Die(_) => ValueType::Die,
            ValueKind::Attr(_) => ValueType::Attr,
            ValueKind::AbbrevUnit(_) => ValueType::AbbrevUnit,
            ValueKind::Abbrev(_) => ValueType::Abbrev,
            ValueKind::AbbrevAttr(_) => ValueType::AbbrevAttr,
            ValueKind::Aset(_) => ValueType::Aset,
            ValueKind::LoclistElem(_) => ValueType::LoclistElem,
            ValueKind::LoclistOp(_) => ValueType::LoclistOp,
            ValueKind::Elf(_) => ValueType::Elf,
            ValueKind::ElfSection(_) => ValueType::ElfSection,
            ValueKind::Symbol(_) => ValueType::Symbol,
        }
    }

    /// 三方向比較
    ///
    /// 型の順位が異なればその順で決まり、同じ型なら中身で比較します。
    pub fn cmp_value(&self, other: &Value) -> CmpResult {
        let ta = self.vtype();
        let tb = other.vtype();
        if ta != tb {
            return CmpResult::from_ordering(ta.cmp(&tb));
        }
        self.cmp_payload(other)
    }

    /// 全順序比較（順位→中身）。集合や整列で使う
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let ta = self.vtype();
        let tb = other.vtype();
        if ta != tb {
            return ta.cmp(&tb);
        }
        match self.cmp_payload(other) {
            CmpResult::Less => Ordering::Less,
            CmpResult::Equal => Ordering::Equal,
            CmpResult::Greater => Ordering::Greater,
            // 同じ型の中身比較は失敗しない
            CmpResult::Fail => {
                debug_assert!(false, "payload compare failed for identical types");
                Ordering::Equal
            }
        }
    }

    fn cmp_payload(&self, other: &Value) -> CmpResult {
        match (&self.kind, &other.kind) {
            (ValueKind::Const(a), ValueKind::Const(b)) => CmpResult::from_ordering(a.cmp(b)),
            (ValueKind::Str(a), ValueKind::Str(b)) => CmpResult::from_ordering(a.cmp(b)),
            (ValueKind::Seq(a), ValueKind::Seq(b)) => cmp_seq(a, b),
            (ValueKind::Closure(a), ValueKind::Closure(b)) => {
                CmpResult::from_ordering(a.identity().cmp(&b.identity()))
            }
            (ValueKind::Dwarf(a), ValueKind::Dwarf(b)) => {
                CmpResult::from_ordering(ctx_identity(&a.ctx).cmp(&ctx_identity(&b.ctx)))
            }
            (ValueKind::Cu(a), ValueKind::Cu(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.offset().cmp(&b.offset())),
            ),
            (ValueKind::Die(a), ValueKind::Die(b)) => cmp_die(a, b),
            (ValueKind::Attr(a), ValueKind::Attr(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.die_global().cmp(&b.die_global()))
                    .then(a.name.0.cmp(&b.name.0)),
            ),
            (ValueKind::AbbrevUnit(a), ValueKind::AbbrevUnit(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.unit.cmp(&b.unit)),
            ),
            (ValueKind::Abbrev(a), ValueKind::Abbrev(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.unit.cmp(&b.unit))
                    .then(a.code.cmp(&b.code)),
            ),
            (ValueKind::AbbrevAttr(a), ValueKind::AbbrevAttr(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.unit.cmp(&b.unit))
                    .then(a.code.cmp(&b.code))
                    .then(a.index.cmp(&b.index)),
            ),
            (ValueKind::Aset(a), ValueKind::Aset(b)) => CmpResult::from_ordering(a.cmp(b)),
            (ValueKind::LoclistElem(a), ValueKind::LoclistElem(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.begin.cmp(&b.begin))
                    .then(a.end.cmp(&b.end))
                    .then(a.expr.0.slice().cmp(b.expr.0.slice())),
            ),
            (ValueKind::LoclistOp(a), ValueKind::LoclistOp(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.offset.cmp(&b.offset))
                    .then(a.dwop.0.cmp(&b.dwop.0)),
            ),
            (ValueKind::Elf(a), ValueKind::Elf(b)) => {
                CmpResult::from_ordering(ctx_identity(&a.ctx).cmp(&ctx_identity(&b.ctx)))
            }
            (ValueKind::ElfSection(a), ValueKind::ElfSection(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.index.cmp(&b.index)),
            ),
            (ValueKind::Symbol(a), ValueKind::Symbol(b)) => CmpResult::from_ordering(
                ctx_identity(&a.ctx)
                    .cmp(&ctx_identity(&b.ctx))
                    .then(a.index.cmp(&b.index)),
            ),
            _ => CmpResult::Fail,
        }
    }

    /// 表示用の文字列を作る
    pub fn show(&self) -> String {
        match &self.kind {
            ValueKind::Const(c) => c.show(),
            ValueKind::Str(s) => s.clone(),
            ValueKind::Seq(values) => {
                let mut out = String::from("[");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&v.show());
                }
                out.push(']');
                out
            }
            ValueKind::Closure(_) => "closure".to_string(),
            ValueKind::Dwarf(d) => format!("<Dwarf \"{}\">", d.ctx.name()),
            ValueKind::Cu(c) => format!("CU 0x{:x}", c.offset()),
            ValueKind::Die(d) => {
                format!("[{:x}] {}", d.global_offset(), short_tag(d.tag))
            }
            ValueKind::Attr(a) => {
                let value = crate::atval::show_attr_value(a).unwrap_or_else(|e| {
                    tracing::error!("cannot render attribute value: {}", e);
                    "<error>".to_string()
                });
                format!("{} ({})\t{}", short_at(a.name), form_of(a), value)
            }
            ValueKind::AbbrevUnit(u) => {
                let off = u
                    .ctx
                    .abbrev_table(u.unit)
                    .map(|t| t.offset.0 as u64)
                    .unwrap_or(0);
                format!("abbrev unit 0x{:x}", off)
            }
            ValueKind::Abbrev(a) => match a.ctx.abbrev_table(a.unit) {
                Ok(table) => match table.get(a.code) {
                    Some(decl) => format!(
                        "[{}] offset:0x{:x}, children:{}, tag:{}",
                        decl.code,
                        decl.offset,
                        if decl.has_children { "yes" } else { "no" },
                        short_tag(decl.tag)
                    ),
                    None => format!("[{}] <missing>", a.code),
                },
                Err(_) => format!("[{}] <error>", a.code),
            },
            ValueKind::AbbrevAttr(a) => match abbrev_attr_spec(a) {
                Some(spec) => format!("{} ({})", short_at(spec.name), short_form(spec.form)),
                None => "<missing>".to_string(),
            },
            ValueKind::Aset(cov) => {
                if cov.is_empty() {
                    return "[)".to_string();
                }
                let mut out = String::new();
                for (i, r) in cov.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "[0x{:x}, 0x{:x})", r.start, r.end());
                }
                out
            }
            ValueKind::LoclistElem(e) => {
                let mut out = format!("0x{:x}..0x{:x}:[", e.begin, e.end);
                match crate::atval::expr_ops(e) {
                    Ok(ops) => {
                        for (i, op) in ops.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            out.push_str(&show_loclist_op(op));
                        }
                    }
                    Err(_) => out.push_str("<error>"),
                }
                out.push(']');
                out
            }
            ValueKind::LoclistOp(op) => show_loclist_op(op),
            ValueKind::Elf(e) => format!("<Elf \"{}\">", e.ctx.name()),
            ValueKind::ElfSection(s) => s.name.clone(),
            ValueKind::Symbol(s) => format!("0x{:x} {}", s.addr, s.name),
        }
    }
}

/// コンテキストの同一性キー（ポインタ比較）
fn ctx_identity(ctx: &Rc<DwarfContext>) -> usize {
    Rc::as_ptr(ctx) as usize
}

/// DIE同士の比較。オフセットが同じでもインポート連鎖が違えば別の値
fn cmp_die(a: &DieRef, b: &DieRef) -> CmpResult {
    let ord = ctx_identity(&a.ctx)
        .cmp(&ctx_identity(&b.ctx))
        .then(a.global_offset().cmp(&b.global_offset()));
    if ord != Ordering::Equal {
        return CmpResult::from_ordering(ord);
    }

    let mut ia = a.import.clone();
    let mut ib = b.import.clone();
    loop {
        match (ia, ib) {
            (None, None) => return CmpResult::Equal,
            (None, Some(_)) => return CmpResult::Less,
            (Some(_), None) => return CmpResult::Greater,
            (Some(la), Some(lb)) => {
                let ord = ctx_identity(&la.ctx)
                    .cmp(&ctx_identity(&lb.ctx))
                    .then(la.global_offset().cmp(&lb.global_offset()));
                if ord != Ordering::Equal {
                    return CmpResult::from_ordering(ord);
                }
                ia = la.import.clone();
                ib = lb.import.clone();
            }
        }
    }
}

/// 列は長さ→型→中身の順で比較する
fn cmp_seq(a: &[Value], b: &[Value]) -> CmpResult {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => {}
        ord => return CmpResult::from_ordering(ord),
    }

    for (va, vb) in a.iter().zip(b.iter()) {
        let ord = va.vtype().cmp(&vb.vtype());
        if ord != Ordering::Equal {
            return CmpResult::from_ordering(ord);
        }
    }

    for (va, vb) in a.iter().zip(b.iter()) {
        match va.cmp_value(vb) {
            CmpResult::Equal => {}
            other => return other,
        }
    }

    CmpResult::Equal
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

/// タグ名から DW_TAG_ 接頭辞を落とした短い名前
pub fn short_tag(tag: gimli::DwTag) -> String {
    match tag.static_string() {
        Some(s) => s.trim_start_matches("DW_TAG_").to_string(),
        None => format!("unknown_tag_0x{:x}", tag.0),
    }
}

/// 属性名から DW_AT_ 接頭辞を落とした短い名前
pub fn short_at(at: gimli::DwAt) -> String {
    match at.static_string() {
        Some(s) => s.trim_start_matches("DW_AT_").to_string(),
        None => format!("unknown_at_0x{:x}", at.0),
    }
}

/// フォーム名から DW_FORM_ 接頭辞を落とした短い名前
pub fn short_form(form: gimli::DwForm) -> String {
    match form.static_string() {
        Some(s) => s.trim_start_matches("DW_FORM_").to_string(),
        None => format!("unknown_form_0x{:x}", form.0),
    }
}

fn short_op(op: gimli::DwOp) -> String {
    match op.static_string() {
        Some(s) => s.trim_start_matches("DW_OP_").to_string(),
        None => format!("unknown_op_0x{:x}", op.0),
    }
}

fn form_of(a: &AttrRef) -> String {
    // 実フォームは値からはもう分からないので、略語宣言から引く
    match a.ctx.die_attr_form(a.unit, a.die_offset, a.name) {
        Ok(Some(form)) => short_form(form),
        _ => "value".to_string(),
    }
}

fn abbrev_attr_spec(a: &AbbrevAttrRef) -> Option<dwq_dwarf::AttrSpec> {
    let table = a.ctx.abbrev_table(a.unit).ok()?;
    let decl = table.get(a.code)?;
    decl.attrs.get(a.index).copied()
}

/// ロケーション式の1命令の表示
fn show_loclist_op(op: &LoclistOpRef) -> String {
    use gimli::Operation;

    let name = short_op(op.dwop);
    let operands = match &op.op {
        Operation::Address { address } => format!("<0x{:x}>", address),
        Operation::UnsignedConstant { value } => format!("<{}>", value),
        Operation::SignedConstant { value } => format!("<{}>", value),
        Operation::Register { register } => format!("<{}>", register.0),
        Operation::RegisterOffset {
            register, offset, ..
        } => format!("<{}>/<{}>", register.0, offset),
        Operation::FrameOffset { offset } => format!("<{}>", offset),
        Operation::PlusConstant { value } => format!("<{}>", value),
        Operation::Pick { index } => format!("<{}>", index),
        Operation::Piece {
            size_in_bits,
            bit_offset: None,
        } => format!("<{}>", size_in_bits / 8),
        Operation::Piece {
            size_in_bits,
            bit_offset: Some(off),
        } => format!("<{}>/<{}>", size_in_bits, off),
        _ => String::new(),
    };
    format!("{}:{}{}", op.offset, name, operands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_types() {
        let c = Value::cst(Constant::dec(5), 0);
        let s = Value::str("abc", 0);
        assert_eq!(c.cmp_value(&s), CmpResult::Less);
        assert_eq!(s.cmp_value(&c), CmpResult::Greater);
    }

    #[test]
    fn test_cmp_inversion() {
        let a = Value::cst(Constant::dec(1), 0);
        let b = Value::cst(Constant::dec(2), 0);
        assert_eq!(a.cmp_value(&b), b.cmp_value(&a).invert());
    }

    #[test]
    fn test_seq_compares_length_first() {
        let short = Value::seq(vec![Value::cst(Constant::dec(9), 0)], 0);
        let long = Value::seq(
            vec![Value::cst(Constant::dec(1), 0), Value::cst(Constant::dec(2), 1)],
            0,
        );
        assert_eq!(short.cmp_value(&long), CmpResult::Less);
    }

    #[test]
    fn test_position_ignored_by_equality() {
        let a = Value::cst(Constant::dec(7), 0);
        let b = Value::cst(Constant::dec(7), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_show_seq() {
        let v = Value::seq(
            vec![
                Value::cst(Constant::dec(1), 0),
                Value::str("yes", 1),
                Value::seq(vec![], 2),
            ],
            0,
        );
        assert_eq!(v.show(), "[1, yes, []]");
    }
}
