//! DWARF側の語彙
//!
//! ユニット・DIE・属性の産出と、その上の射影・述語を登録します。
//!
//! DIEの走査には raw と cooked の二相があります。cooked の走査は
//! `DW_TAG_imported_unit` を見つけると参照先の部分ユニットの中身を
//! その場に継ぎ足し、通過したインポートDIEを値のインポート連鎖に
//! 記録します。raw の走査はインポートを越えません。

use crate::cst::{Constant, Domain};
use crate::overload::{
    many_overload, once_overload, pred_overload, Overload, PredOverload, VecProducer,
    ValueProducer, Vocabulary,
};
use crate::op::PredResult;
use crate::stack::Stack;
use crate::value::{
    AbbrevAttrRef, AbbrevRef, AbbrevUnitRef, AttrRef, CuRef, DieRef, Doneness, DwarfRef, ElfRef,
    ElfSectionRef, SymbolRef, Value, ValueKind, ValueType,
};
use crate::Result;
use dwq_dwarf::{Coverage, DwarfContext, Reader};
use object::{Object, ObjectSection, ObjectSymbol};
use std::rc::Rc;

/// インデックス位置からDIE値の中身を作る
pub fn die_ref_at(
    ctx: Rc<DwarfContext>,
    unit: usize,
    pos: usize,
    import: Option<Rc<DieRef>>,
    doneness: Doneness,
) -> Result<DieRef> {
    let index = ctx.die_index(unit)?;
    let node = *index.node(pos);
    Ok(DieRef {
        ctx,
        unit,
        pos,
        offset: node.offset,
        tag: node.tag,
        import,
        doneness,
    })
}

/// ユニット内オフセットからDIE値の中身を作る
pub fn die_ref_at_offset(
    ctx: Rc<DwarfContext>,
    unit: usize,
    offset: gimli::UnitOffset,
    import: Option<Rc<DieRef>>,
    doneness: Doneness,
) -> Result<DieRef> {
    let index = ctx.die_index(unit)?;
    let pos = index
        .position(offset)
        .ok_or_else(|| anyhow::anyhow!("no DIE at offset {:#x}", offset.0))?;
    die_ref_at(ctx, unit, pos, import, doneness)
}

/// `DW_AT_import` 参照を解決する
fn resolve_import(
    ctx: &Rc<DwarfContext>,
    unit: usize,
    offset: gimli::UnitOffset,
) -> Result<Option<(usize, gimli::UnitOffset)>> {
    let entry = ctx.die_entry(unit, offset)?;
    match entry.attr_value(gimli::DW_AT_import)? {
        Some(value) => ctx.resolve_die_ref(unit, &value),
        None => Ok(None),
    }
}

/// 走査の歩幅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// 部分木全体を行きがけ順に
    Subtree,
    /// 直接の子だけを
    Children,
}

struct DieRange {
    unit: usize,
    next: usize,
    end: usize,
}

/// DIE列の産出器
///
/// 明示的な範囲スタックで走査します。cooked ではインポートDIEの直後に
/// 参照先の範囲（部分ユニットの根は飛ばす）を積み、範囲が尽きるたびに
/// インポート連鎖を1つ外します。
struct DieProducer {
    ctx: Rc<DwarfContext>,
    walk: Walk,
    doneness: Doneness,
    stack: Vec<DieRange>,
    import: Option<Rc<DieRef>>,
    i: u64,
}

impl DieProducer {
    /// ユニットの部分木全体（根を含む）
    fn subtree(
        ctx: Rc<DwarfContext>,
        unit: usize,
        root_pos: usize,
        doneness: Doneness,
    ) -> Result<Self> {
        let index = ctx.die_index(unit)?;
        let stack = if index.is_empty() {
            Vec::new()
        } else {
            vec![DieRange {
                unit,
                next: root_pos,
                end: index.subtree_end(root_pos),
            }]
        };
        Ok(Self {
            ctx,
            walk: Walk::Subtree,
            doneness,
            stack,
            import: None,
            i: 0,
        })
    }

    /// DIEの直接の子
    fn children(
        ctx: Rc<DwarfContext>,
        unit: usize,
        pos: usize,
        doneness: Doneness,
    ) -> Result<Self> {
        let index = ctx.die_index(unit)?;
        let end = index.subtree_end(pos);
        Ok(Self {
            ctx,
            walk: Walk::Children,
            doneness,
            stack: vec![DieRange {
                unit,
                next: pos + 1,
                end,
            }],
            import: None,
            i: 0,
        })
    }
}

impl ValueProducer for DieProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        loop {
            let (unit, pos, end) = match self.stack.last() {
                Some(top) => (top.unit, top.next, top.end),
                None => return Ok(None),
            };
            if pos >= end {
                // 範囲が尽きた。インポート連鎖も1つ外す
                self.stack.pop();
                if let Some(link) = self.import.take() {
                    self.import = link.import.clone();
                }
                continue;
            }

            let index = self.ctx.die_index(unit)?;
            let node = *index.node(pos);
            let advance = match self.walk {
                Walk::Subtree => pos + 1,
                Walk::Children => node.end,
            };
            self.stack.last_mut().expect("non-empty").next = advance;

            let die = DieRef {
                ctx: Rc::clone(&self.ctx),
                unit,
                pos,
                offset: node.offset,
                tag: node.tag,
                import: self.import.clone(),
                doneness: self.doneness,
            };

            if self.doneness == Doneness::Cooked && node.tag == gimli::DW_TAG_imported_unit {
                if let Some((t_unit, t_off)) = resolve_import(&self.ctx, unit, node.offset)? {
                    let t_index = self.ctx.die_index(t_unit)?;
                    if let Some(t_pos) = t_index.position(t_off) {
                        // インポートDIE自身を産出してから、参照先の根を
                        // 飛ばして中身を継ぎ足す
                        self.import = Some(Rc::new(die.clone()));
                        self.stack.push(DieRange {
                            unit: t_unit,
                            next: t_pos + 1,
                            end: t_index.subtree_end(t_pos),
                        });
                    }
                }
            }

            let value = Value::new(ValueKind::Die(die), self.i);
            self.i += 1;
            return Ok(Some(value));
        }
    }
}

/// cooked で受け入れられるユニットか（部分ユニットは拒む）
fn acceptable_unit(ctx: &Rc<DwarfContext>, unit: usize, doneness: Doneness) -> Result<bool> {
    if doneness == Doneness::Raw {
        return Ok(true);
    }
    let index = ctx.die_index(unit)?;
    Ok(index.is_empty() || index.node(0).tag != gimli::DW_TAG_partial_unit)
}

/// Dwarf値からユニットを産出する
struct UnitProducer {
    ctx: Rc<DwarfContext>,
    doneness: Doneness,
    next: usize,
    i: u64,
}

impl ValueProducer for UnitProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        while self.next < self.ctx.units().len() {
            let unit = self.next;
            self.next += 1;
            if !acceptable_unit(&self.ctx, unit, self.doneness)? {
                continue;
            }
            let value = Value::new(
                ValueKind::Cu(CuRef {
                    ctx: Rc::clone(&self.ctx),
                    unit,
                    doneness: self.doneness,
                }),
                self.i,
            );
            self.i += 1;
            return Ok(Some(value));
        }
        Ok(None)
    }
}

/// Dwarf値から全ユニットのDIEを順に産出する
///
/// `unit entry` と同じ順序・同じ位置付けで産出する。
struct DwarfEntryProducer {
    ctx: Rc<DwarfContext>,
    doneness: Doneness,
    next_unit: usize,
    cur: Option<DieProducer>,
}

impl ValueProducer for DwarfEntryProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(cur) = &mut self.cur {
                if let Some(value) = cur.next()? {
                    return Ok(Some(value));
                }
                self.cur = None;
            }

            loop {
                if self.next_unit >= self.ctx.units().len() {
                    return Ok(None);
                }
                let unit = self.next_unit;
                self.next_unit += 1;
                if !acceptable_unit(&self.ctx, unit, self.doneness)? {
                    continue;
                }
                if self.ctx.die_index(unit)?.is_empty() {
                    continue;
                }
                self.cur = Some(DieProducer::subtree(
                    Rc::clone(&self.ctx),
                    unit,
                    0,
                    self.doneness,
                )?);
                break;
            }
        }
    }
}

/// 統合の対象外の属性
///
/// 定義側のDIEでだけ意味を持つものは参照先から持ち込まない。
fn attr_should_be_integrated(at: gimli::DwAt) -> bool {
    !matches!(at, gimli::DW_AT_sibling | gimli::DW_AT_declaration)
}

/// 属性の産出器
///
/// raw では持ち主の属性だけ。cooked では `DW_AT_specification` と
/// `DW_AT_abstract_origin` の参照先を辿り、未出の属性を統合する。
/// 参照属性そのものは常に産出する。
struct AttributeProducer {
    ctx: Rc<DwarfContext>,
    doneness: Doneness,
    queue: Vec<(usize, gimli::UnitOffset)>,
    cur_die: (usize, gimli::UnitOffset),
    cur: Vec<(gimli::DwAt, gimli::AttributeValue<Reader>)>,
    cur_idx: usize,
    secondary: bool,
    seen: Vec<gimli::DwAt>,
    i: u64,
}

impl AttributeProducer {
    fn new(
        ctx: Rc<DwarfContext>,
        unit: usize,
        offset: gimli::UnitOffset,
        doneness: Doneness,
    ) -> Result<Self> {
        let mut producer = Self {
            ctx,
            doneness,
            queue: vec![(unit, offset)],
            cur_die: (unit, offset),
            cur: Vec::new(),
            cur_idx: 0,
            secondary: false,
            seen: Vec::new(),
            i: 0,
        };
        producer.next_die()?;
        Ok(producer)
    }

    fn next_die(&mut self) -> Result<bool> {
        let (unit, offset) = match self.queue.pop() {
            Some(target) => target,
            None => return Ok(false),
        };
        self.cur_die = (unit, offset);
        self.cur.clear();
        self.cur_idx = 0;

        let entry = self.ctx.die_entry(unit, offset)?;
        let mut attrs = entry.attrs();
        while let Some(attr) = attrs.next()? {
            self.cur.push((attr.name(), attr.value()));
        }
        Ok(true)
    }

    fn schedule(&mut self, value: &gimli::AttributeValue<Reader>) -> Result<()> {
        if let Some(target) = self.ctx.resolve_die_ref(self.cur_die.0, value)? {
            self.queue.push(target);
        }
        Ok(())
    }

    fn attr_value(&self, at: gimli::DwAt, value: gimli::AttributeValue<Reader>) -> Result<Value> {
        let (unit, offset) = self.cur_die;
        let index = self.ctx.die_index(unit)?;
        let die_pos = index.position(offset).unwrap_or(0);
        Ok(Value::new(
            ValueKind::Attr(AttrRef {
                ctx: Rc::clone(&self.ctx),
                unit,
                die_pos,
                die_offset: offset,
                name: at,
                value,
                doneness: self.doneness,
            }),
            self.i,
        ))
    }
}

impl ValueProducer for AttributeProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        let integrate = self.doneness == Doneness::Cooked;
        loop {
            while self.cur_idx >= self.cur.len() {
                if !integrate || !self.next_die()? {
                    return Ok(None);
                }
                self.secondary = true;
            }

            let (at, value) = self.cur[self.cur_idx].clone();
            self.cur_idx += 1;

            if integrate
                && (at == gimli::DW_AT_specification || at == gimli::DW_AT_abstract_origin)
            {
                // 参照先を後で辿る。参照属性そのものは既出でも隠さない
                self.schedule(&value)?;
                let v = self.attr_value(at, value)?;
                self.seen.push(at);
                self.i += 1;
                return Ok(Some(v));
            }

            if self.secondary && !attr_should_be_integrated(at) {
                continue;
            }
            if integrate && self.seen.contains(&at) {
                continue;
            }

            self.seen.push(at);
            let v = self.attr_value(at, value)?;
            self.i += 1;
            return Ok(Some(v));
        }
    }
}

/// 属性を統合込みで1つ探す
///
/// `@AT_*` と `?AT_*`、DIEの `name`/`low`/`high` の土台。統合の対象外の
/// 属性は持ち主からしか取らない。
pub fn find_attr_integrated(
    ctx: &Rc<DwarfContext>,
    unit: usize,
    offset: gimli::UnitOffset,
    at: gimli::DwAt,
    doneness: Doneness,
) -> Result<Option<AttrRef>> {
    let integrate = doneness == Doneness::Cooked && attr_should_be_integrated(at);
    let mut queue = vec![(unit, offset)];
    let mut visited: Vec<(usize, usize)> = Vec::new();

    while let Some((u, off)) = queue.pop() {
        if visited.contains(&(u, off.0)) {
            continue;
        }
        visited.push((u, off.0));

        let entry = ctx.die_entry(u, off)?;
        if let Some(attr) = entry.attr(at)? {
            let index = ctx.die_index(u)?;
            return Ok(Some(AttrRef {
                ctx: Rc::clone(ctx),
                unit: u,
                die_pos: index.position(off).unwrap_or(0),
                die_offset: off,
                name: at,
                value: attr.value(),
                doneness,
            }));
        }

        if integrate {
            for ref_at in [gimli::DW_AT_specification, gimli::DW_AT_abstract_origin] {
                if let Some(value) = entry.attr_value(ref_at)? {
                    if let Some(target) = ctx.resolve_die_ref(u, &value)? {
                        queue.push(target);
                    }
                }
            }
        }
    }
    Ok(None)
}

fn pop_dwarf(stk: &mut Stack) -> Result<DwarfRef> {
    match stk.pop()?.kind {
        ValueKind::Dwarf(d) => Ok(d),
        _ => anyhow::bail!("expected a Dwarf"),
    }
}

fn pop_cu(stk: &mut Stack) -> Result<CuRef> {
    match stk.pop()?.kind {
        ValueKind::Cu(c) => Ok(c),
        _ => anyhow::bail!("expected a CU"),
    }
}

fn pop_die(stk: &mut Stack) -> Result<DieRef> {
    match stk.pop()?.kind {
        ValueKind::Die(d) => Ok(d),
        _ => anyhow::bail!("expected a DIE"),
    }
}

fn pop_attr(stk: &mut Stack) -> Result<AttrRef> {
    match stk.pop()?.kind {
        ValueKind::Attr(a) => Ok(a),
        _ => anyhow::bail!("expected an attribute"),
    }
}

fn get_die(stk: &Stack, depth: usize) -> Result<&DieRef> {
    match &stk.checked_get(depth)?.kind {
        ValueKind::Die(d) => Ok(d),
        _ => anyhow::bail!("expected a DIE"),
    }
}

fn yes_no(b: bool) -> PredResult {
    if b {
        PredResult::Yes
    } else {
        PredResult::No
    }
}

fn die_value(die: DieRef) -> Value {
    Value::new(ValueKind::Die(die), 0)
}

/// DIEの略語宣言の has_children
fn die_has_children(die: &DieRef) -> Result<bool> {
    let code = die.ctx.die_abbrev_code(die.unit, die.offset)?;
    let table = die.ctx.abbrev_table(die.unit)?;
    Ok(table.get(code).map(|d| d.has_children).unwrap_or(false))
}

/// DIEの名前。cooked では参照先へも手を伸ばす
fn die_name(die: &DieRef) -> Result<Option<String>> {
    let attr = find_attr_integrated(
        &die.ctx,
        die.unit,
        die.offset,
        gimli::DW_AT_name,
        die.doneness,
    )?;
    let attr = match attr {
        Some(attr) => attr,
        None => return Ok(None),
    };
    let values = crate::atval::at_value(&attr)?;
    Ok(values.into_iter().next().and_then(|v| match v.kind {
        ValueKind::Str(s) => Some(s),
        _ => None,
    }))
}

/// `@AT_*` 語の実体
pub fn at_word_overload(at: gimli::DwAt) -> Rc<dyn Overload> {
    many_overload(&[ValueType::Die], move |stk| {
        let die = pop_die(stk)?;
        let attr = find_attr_integrated(&die.ctx, die.unit, die.offset, at, die.doneness)?;
        let values = match attr {
            Some(attr) => crate::atval::at_value(&attr)?,
            None => Vec::new(),
        };
        Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
    })
}

/// `?AT_*` のDIE側。属性を（統合込みで）持つか
pub fn at_die_pred_overload(at: gimli::DwAt) -> Rc<dyn PredOverload> {
    pred_overload(&[ValueType::Die], move |stk| {
        let die = get_die(stk, 0)?;
        let attr = find_attr_integrated(&die.ctx, die.unit, die.offset, at, die.doneness)?;
        Ok(yes_no(attr.is_some()))
    })
}

/// `?AT_*` の属性側。属性の名がそれか
pub fn at_attr_pred_overload(at: gimli::DwAt) -> Rc<dyn PredOverload> {
    pred_overload(&[ValueType::Attr], move |stk| {
        match &stk.checked_get(0)?.kind {
            ValueKind::Attr(a) => Ok(yes_no(a.name == at)),
            _ => anyhow::bail!("expected an attribute"),
        }
    })
}

/// `?TAG_*` のDIE側
pub fn tag_die_pred_overload(tag: gimli::DwTag) -> Rc<dyn PredOverload> {
    pred_overload(&[ValueType::Die], move |stk| {
        Ok(yes_no(get_die(stk, 0)?.tag == tag))
    })
}

/// `?TAG_*` の略語側
pub fn tag_abbrev_pred_overload(tag: gimli::DwTag) -> Rc<dyn PredOverload> {
    pred_overload(&[ValueType::Abbrev], move |stk| {
        match &stk.checked_get(0)?.kind {
            ValueKind::Abbrev(a) => {
                let table = a.ctx.abbrev_table(a.unit)?;
                Ok(yes_no(
                    table.get(a.code).map(|d| d.tag == tag).unwrap_or(false),
                ))
            }
            _ => anyhow::bail!("expected an abbreviation"),
        }
    })
}

/// DWARF語彙を登録する
pub fn register(voc: &mut Vocabulary) {
    // dwopen: 文字列のパスからDwarf値を開く
    voc.add_op_overload(
        "dwopen",
        once_overload(&[ValueType::Str], |stk| {
            let path = match stk.pop()?.kind {
                ValueKind::Str(s) => s,
                _ => anyhow::bail!("expected a string"),
            };
            let ctx = DwarfContext::load(&path)?;
            Ok(Some(Value::new(
                ValueKind::Dwarf(DwarfRef {
                    ctx,
                    doneness: Doneness::Cooked,
                }),
                0,
            )))
        }),
    );

    // raw / cooked: 同じ実体を別の相で見る新しい値を作る
    register_doneness(voc, "raw", Doneness::Raw);
    register_doneness(voc, "cooked", Doneness::Cooked);

    // unit
    voc.add_op_overload(
        "unit",
        many_overload(&[ValueType::Dwarf], |stk| {
            let dw = pop_dwarf(stk)?;
            Ok(Box::new(UnitProducer {
                ctx: dw.ctx,
                doneness: dw.doneness,
                next: 0,
                i: 0,
            }) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "unit",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            Ok(Some(Value::new(
                ValueKind::Cu(CuRef {
                    ctx: die.ctx,
                    unit: die.unit,
                    doneness: die.doneness,
                }),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "unit",
        once_overload(&[ValueType::Attr], |stk| {
            let attr = pop_attr(stk)?;
            Ok(Some(Value::new(
                ValueKind::Cu(CuRef {
                    ctx: attr.ctx,
                    unit: attr.unit,
                    doneness: Doneness::Cooked,
                }),
                0,
            )))
        }),
    );

    // entry
    voc.add_op_overload(
        "entry",
        many_overload(&[ValueType::Dwarf], |stk| {
            let dw = pop_dwarf(stk)?;
            Ok(Box::new(DwarfEntryProducer {
                ctx: dw.ctx,
                doneness: dw.doneness,
                next_unit: 0,
                cur: None,
            }) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "entry",
        many_overload(&[ValueType::Cu], |stk| {
            let cu = pop_cu(stk)?;
            Ok(Box::new(DieProducer::subtree(cu.ctx, cu.unit, 0, cu.doneness)?)
                as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "entry",
        many_overload(&[ValueType::AbbrevUnit], |stk| {
            let au = match stk.pop()?.kind {
                ValueKind::AbbrevUnit(a) => a,
                _ => anyhow::bail!("expected an abbreviation unit"),
            };
            let table = au.ctx.abbrev_table(au.unit)?;
            let values = table
                .decls
                .iter()
                .map(|decl| {
                    Value::new(
                        ValueKind::Abbrev(AbbrevRef {
                            ctx: Rc::clone(&au.ctx),
                            unit: au.unit,
                            code: decl.code,
                        }),
                        0,
                    )
                })
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );

    // child
    voc.add_op_overload(
        "child",
        many_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            let mut producer =
                DieProducer::children(Rc::clone(&die.ctx), die.unit, die.pos, die.doneness)?;
            // 親のインポート文脈を引き継ぐ
            producer.import = die.import.clone();
            Ok(Box::new(producer) as Box<dyn ValueProducer>)
        }),
    );

    // parent
    voc.add_op_overload(
        "parent",
        once_overload(&[ValueType::Die], |stk| {
            let mut die = pop_die(stk)?;
            let doneness = die.doneness;
            loop {
                let index = die.ctx.die_index(die.unit)?;
                let parent_pos = match index.find_parent(die.pos) {
                    Some(pos) => pos,
                    None => return Ok(None),
                };
                let parent_tag = index.node(parent_pos).tag;
                if doneness == Doneness::Cooked
                    && parent_tag == gimli::DW_TAG_partial_unit
                {
                    // 部分ユニットの根に当たったらインポート元の文脈で
                    // 親を引き直す
                    match die.import.clone() {
                        Some(link) => {
                            die = (*link).clone();
                            continue;
                        }
                        None => {}
                    }
                }
                let parent =
                    die_ref_at(Rc::clone(&die.ctx), die.unit, parent_pos, None, doneness)?;
                return Ok(Some(die_value(parent)));
            }
        }),
    );

    // root
    voc.add_op_overload(
        "root",
        once_overload(&[ValueType::Cu], |stk| {
            let cu = pop_cu(stk)?;
            let die = die_ref_at(cu.ctx, cu.unit, 0, None, cu.doneness)?;
            Ok(Some(die_value(die)))
        }),
    );
    voc.add_op_overload(
        "root",
        once_overload(&[ValueType::Die], |stk| {
            let mut die = pop_die(stk)?;
            let doneness = die.doneness;
            if doneness == Doneness::Cooked {
                while let Some(link) = die.import.clone() {
                    die = (*link).clone();
                }
            }
            let root = die_ref_at(Rc::clone(&die.ctx), die.unit, 0, None, doneness)?;
            Ok(Some(die_value(root)))
        }),
    );

    // attribute
    voc.add_op_overload(
        "attribute",
        many_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            Ok(Box::new(AttributeProducer::new(
                die.ctx,
                die.unit,
                die.offset,
                die.doneness,
            )?) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "attribute",
        many_overload(&[ValueType::Abbrev], |stk| {
            let ab = match stk.pop()?.kind {
                ValueKind::Abbrev(a) => a,
                _ => anyhow::bail!("expected an abbreviation"),
            };
            let table = ab.ctx.abbrev_table(ab.unit)?;
            let n = table.get(ab.code).map(|d| d.attrs.len()).unwrap_or(0);
            let values = (0..n)
                .map(|index| {
                    Value::new(
                        ValueKind::AbbrevAttr(AbbrevAttrRef {
                            ctx: Rc::clone(&ab.ctx),
                            unit: ab.unit,
                            code: ab.code,
                            index,
                        }),
                        0,
                    )
                })
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );

    // abbrev
    voc.add_op_overload(
        "abbrev",
        many_overload(&[ValueType::Dwarf], |stk| {
            let dw = pop_dwarf(stk)?;
            let mut seen = Vec::new();
            let mut values = Vec::new();
            for unit in 0..dw.ctx.units().len() {
                let offset = dw.ctx.unit(unit).unit.header.debug_abbrev_offset().0;
                if seen.contains(&offset) {
                    continue;
                }
                seen.push(offset);
                values.push(Value::new(
                    ValueKind::AbbrevUnit(AbbrevUnitRef {
                        ctx: Rc::clone(&dw.ctx),
                        unit,
                    }),
                    0,
                ));
            }
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "abbrev",
        once_overload(&[ValueType::Cu], |stk| {
            let cu = pop_cu(stk)?;
            Ok(Some(Value::new(
                ValueKind::AbbrevUnit(AbbrevUnitRef {
                    ctx: cu.ctx,
                    unit: cu.unit,
                }),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "abbrev",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            let code = die.ctx.die_abbrev_code(die.unit, die.offset)?;
            Ok(Some(Value::new(
                ValueKind::Abbrev(AbbrevRef {
                    ctx: die.ctx,
                    unit: die.unit,
                    code,
                }),
                0,
            )))
        }),
    );

    // offset
    voc.add_op_overload(
        "offset",
        once_overload(&[ValueType::Cu], |stk| {
            let cu = pop_cu(stk)?;
            Ok(Some(Value::cst(
                Constant::new(cu.offset(), Domain::Offset),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "offset",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            Ok(Some(Value::cst(
                Constant::new(die.global_offset(), Domain::Offset),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "offset",
        once_overload(&[ValueType::AbbrevUnit], |stk| {
            let au = match stk.pop()?.kind {
                ValueKind::AbbrevUnit(a) => a,
                _ => anyhow::bail!("expected an abbreviation unit"),
            };
            let offset = au.ctx.abbrev_table(au.unit)?.offset.0 as u64;
            Ok(Some(Value::cst(Constant::new(offset, Domain::Offset), 0)))
        }),
    );
    voc.add_op_overload(
        "offset",
        once_overload(&[ValueType::Abbrev], |stk| {
            let ab = match stk.pop()?.kind {
                ValueKind::Abbrev(a) => a,
                _ => anyhow::bail!("expected an abbreviation"),
            };
            let table = ab.ctx.abbrev_table(ab.unit)?;
            let offset = table
                .get(ab.code)
                .map(|d| d.offset)
                .ok_or_else(|| anyhow::anyhow!("dangling abbreviation code {}", ab.code))?;
            Ok(Some(Value::cst(Constant::new(offset, Domain::Offset), 0)))
        }),
    );
    voc.add_op_overload(
        "offset",
        once_overload(&[ValueType::LoclistOp], |stk| {
            let op = match stk.pop()?.kind {
                ValueKind::LoclistOp(o) => o,
                _ => anyhow::bail!("expected a location expression instruction"),
            };
            Ok(Some(Value::cst(Constant::dec(op.offset), 0)))
        }),
    );

    // label
    voc.add_op_overload(
        "label",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            Ok(Some(Value::cst(
                Constant::new(die.tag.0, Domain::Tag),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "label",
        once_overload(&[ValueType::Attr], |stk| {
            let attr = pop_attr(stk)?;
            Ok(Some(Value::cst(Constant::new(attr.name.0, Domain::At), 0)))
        }),
    );
    voc.add_op_overload(
        "label",
        once_overload(&[ValueType::Abbrev], |stk| {
            let ab = match stk.pop()?.kind {
                ValueKind::Abbrev(a) => a,
                _ => anyhow::bail!("expected an abbreviation"),
            };
            let table = ab.ctx.abbrev_table(ab.unit)?;
            let tag = table
                .get(ab.code)
                .map(|d| d.tag)
                .ok_or_else(|| anyhow::anyhow!("dangling abbreviation code {}", ab.code))?;
            Ok(Some(Value::cst(Constant::new(tag.0, Domain::Tag), 0)))
        }),
    );
    voc.add_op_overload(
        "label",
        once_overload(&[ValueType::AbbrevAttr], |stk| {
            let aa = match stk.pop()?.kind {
                ValueKind::AbbrevAttr(a) => a,
                _ => anyhow::bail!("expected an abbreviation attribute"),
            };
            let table = aa.ctx.abbrev_table(aa.unit)?;
            let spec = table
                .get(aa.code)
                .and_then(|d| d.attrs.get(aa.index).copied())
                .ok_or_else(|| anyhow::anyhow!("dangling abbreviation attribute"))?;
            Ok(Some(Value::cst(
                Constant::new(spec.name.0, Domain::At),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "label",
        once_overload(&[ValueType::LoclistOp], |stk| {
            let op = match stk.pop()?.kind {
                ValueKind::LoclistOp(o) => o,
                _ => anyhow::bail!("expected a location expression instruction"),
            };
            Ok(Some(Value::cst(Constant::new(op.dwop.0, Domain::Op), 0)))
        }),
    );

    // form
    voc.add_op_overload(
        "form",
        once_overload(&[ValueType::Attr], |stk| {
            let attr = pop_attr(stk)?;
            let form = attr
                .ctx
                .die_attr_form(attr.unit, attr.die_offset, attr.name)?;
            Ok(form.map(|f| Value::cst(Constant::new(f.0, Domain::Form), 0)))
        }),
    );
    voc.add_op_overload(
        "form",
        once_overload(&[ValueType::AbbrevAttr], |stk| {
            let aa = match stk.pop()?.kind {
                ValueKind::AbbrevAttr(a) => a,
                _ => anyhow::bail!("expected an abbreviation attribute"),
            };
            let table = aa.ctx.abbrev_table(aa.unit)?;
            let spec = table
                .get(aa.code)
                .and_then(|d| d.attrs.get(aa.index).copied())
                .ok_or_else(|| anyhow::anyhow!("dangling abbreviation attribute"))?;
            Ok(Some(Value::cst(
                Constant::new(spec.form.0, Domain::Form),
                0,
            )))
        }),
    );

    // name
    voc.add_op_overload(
        "name",
        once_overload(&[ValueType::Dwarf], |stk| {
            let dw = pop_dwarf(stk)?;
            Ok(Some(Value::str(dw.ctx.name().to_string(), 0)))
        }),
    );
    voc.add_op_overload(
        "name",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            Ok(die_name(&die)?.map(|s| Value::str(s, 0)))
        }),
    );
    voc.add_op_overload(
        "name",
        once_overload(&[ValueType::ElfSection], |stk| {
            match stk.pop()?.kind {
                ValueKind::ElfSection(s) => Ok(Some(Value::str(s.name, 0))),
                _ => anyhow::bail!("expected a section"),
            }
        }),
    );
    voc.add_op_overload(
        "name",
        once_overload(&[ValueType::Symbol], |stk| {
            match stk.pop()?.kind {
                ValueKind::Symbol(s) => Ok(Some(Value::str(s.name, 0))),
                _ => anyhow::bail!("expected a symbol"),
            }
        }),
    );

    // version
    voc.add_op_overload(
        "version",
        once_overload(&[ValueType::Cu], |stk| {
            let cu = pop_cu(stk)?;
            let version = cu.ctx.unit(cu.unit).version;
            Ok(Some(Value::cst(Constant::dec(version), 0)))
        }),
    );

    // low / high
    voc.add_op_overload(
        "low",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            let low = crate::atval::die_low_pc(&die.ctx, die.unit, die.offset)?;
            Ok(low.map(|a| Value::cst(Constant::new(a, Domain::Address), 0)))
        }),
    );
    voc.add_op_overload(
        "high",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            let high = crate::atval::die_high_pc(&die.ctx, die.unit, die.offset)?;
            Ok(high.map(|a| Value::cst(Constant::new(a, Domain::Address), 0)))
        }),
    );

    // address
    voc.add_op_overload(
        "address",
        once_overload(&[ValueType::Die], |stk| {
            let die = pop_die(stk)?;
            let unit = &die.ctx.unit(die.unit).unit;
            let entry = die.ctx.die_entry(die.unit, die.offset)?;
            let mut cov = Coverage::new();
            let mut ranges = die.ctx.dwarf().die_ranges(unit, &entry)?;
            while let Some(range) = ranges.next()? {
                if range.end > range.begin {
                    cov.add(range.begin, range.end - range.begin);
                }
            }
            Ok(Some(Value::new(ValueKind::Aset(cov), 0)))
        }),
    );
    voc.add_op_overload(
        "address",
        once_overload(&[ValueType::Attr], |stk| {
            let attr = pop_attr(stk)?;
            let unit = &attr.ctx.unit(attr.unit).unit;
            match attr.ctx.dwarf().attr_address(unit, attr.value.clone())? {
                Some(addr) => {
                    let mut cov = Coverage::new();
                    cov.add(addr, 1);
                    Ok(Some(Value::new(ValueKind::Aset(cov), 0)))
                }
                None => Ok(None),
            }
        }),
    );
    voc.add_op_overload(
        "address",
        once_overload(&[ValueType::LoclistElem], |stk| {
            let elem = match stk.pop()?.kind {
                ValueKind::LoclistElem(e) => e,
                _ => anyhow::bail!("expected a location list element"),
            };
            let mut cov = Coverage::new();
            if elem.end > elem.begin {
                cov.add(elem.begin, elem.end - elem.begin);
            }
            Ok(Some(Value::new(ValueKind::Aset(cov), 0)))
        }),
    );
    voc.add_op_overload(
        "address",
        once_overload(&[ValueType::ElfSection], |stk| {
            match stk.pop()?.kind {
                ValueKind::ElfSection(s) => Ok(Some(Value::cst(
                    Constant::new(s.addr, Domain::Address),
                    0,
                ))),
                _ => anyhow::bail!("expected a section"),
            }
        }),
    );
    voc.add_op_overload(
        "address",
        once_overload(&[ValueType::Symbol], |stk| {
            match stk.pop()?.kind {
                ValueKind::Symbol(s) => Ok(Some(Value::cst(
                    Constant::new(s.addr, Domain::Address),
                    0,
                ))),
                _ => anyhow::bail!("expected a symbol"),
            }
        }),
    );

    // size
    voc.add_op_overload(
        "size",
        once_overload(&[ValueType::ElfSection], |stk| {
            match stk.pop()?.kind {
                ValueKind::ElfSection(s) => Ok(Some(Value::cst(Constant::dec(s.size), 0))),
                _ => anyhow::bail!("expected a section"),
            }
        }),
    );
    voc.add_op_overload(
        "size",
        once_overload(&[ValueType::Symbol], |stk| {
            match stk.pop()?.kind {
                ValueKind::Symbol(s) => Ok(Some(Value::cst(Constant::dec(s.size), 0))),
                _ => anyhow::bail!("expected a symbol"),
            }
        }),
    );

    // ELF面
    voc.add_op_overload(
        "elf",
        once_overload(&[ValueType::Dwarf], |stk| {
            let dw = pop_dwarf(stk)?;
            if dw.ctx.object_file().is_none() {
                tracing::error!("no object file behind `{}'", dw.ctx.name());
                return Ok(None);
            }
            Ok(Some(Value::new(ValueKind::Elf(ElfRef { ctx: dw.ctx }), 0)))
        }),
    );
    voc.add_op_overload(
        "section",
        many_overload(&[ValueType::Elf], |stk| {
            let elf = match stk.pop()?.kind {
                ValueKind::Elf(e) => e,
                _ => anyhow::bail!("expected an ELF"),
            };
            let file = elf
                .ctx
                .object_file()
                .ok_or_else(|| anyhow::anyhow!("no object file"))?;
            let values = file
                .sections()
                .map(|s| {
                    Value::new(
                        ValueKind::ElfSection(ElfSectionRef {
                            ctx: Rc::clone(&elf.ctx),
                            index: s.index().0,
                            name: s.name().unwrap_or("").to_string(),
                            addr: s.address(),
                            size: s.size(),
                        }),
                        0,
                    )
                })
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "symbol",
        many_overload(&[ValueType::Elf], |stk| {
            let elf = match stk.pop()?.kind {
                ValueKind::Elf(e) => e,
                _ => anyhow::bail!("expected an ELF"),
            };
            let file = elf
                .ctx
                .object_file()
                .ok_or_else(|| anyhow::anyhow!("no object file"))?;
            let values = file
                .symbols()
                .map(|s| {
                    Value::new(
                        ValueKind::Symbol(SymbolRef {
                            ctx: Rc::clone(&elf.ctx),
                            index: s.index().0,
                            name: s.name().unwrap_or("").to_string(),
                            addr: s.address(),
                            size: s.size(),
                        }),
                        0,
                    )
                })
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );

    // 述語
    voc.add_pred_overload(
        "root",
        pred_overload(&[ValueType::Die], |stk| {
            Ok(yes_no(get_die(stk, 0)?.pos == 0))
        }),
    );
    voc.add_pred_overload(
        "haschildren",
        pred_overload(&[ValueType::Die], |stk| {
            Ok(yes_no(die_has_children(get_die(stk, 0)?)?))
        }),
    );
    voc.add_pred_overload(
        "haschildren",
        pred_overload(&[ValueType::Abbrev], |stk| {
            match &stk.checked_get(0)?.kind {
                ValueKind::Abbrev(a) => {
                    let table = a.ctx.abbrev_table(a.unit)?;
                    Ok(yes_no(
                        table.get(a.code).map(|d| d.has_children).unwrap_or(false),
                    ))
                }
                _ => anyhow::bail!("expected an abbreviation"),
            }
        }),
    );
}

/// raw / cooked の語を登録する
fn register_doneness(voc: &mut Vocabulary, word: &str, doneness: Doneness) {
    voc.add_op_overload(
        word,
        once_overload(&[ValueType::Dwarf], move |stk| {
            let mut dw = pop_dwarf(stk)?;
            dw.doneness = doneness;
            Ok(Some(Value::new(ValueKind::Dwarf(dw), 0)))
        }),
    );
    voc.add_op_overload(
        word,
        once_overload(&[ValueType::Cu], move |stk| {
            let mut cu = pop_cu(stk)?;
            cu.doneness = doneness;
            Ok(Some(Value::new(ValueKind::Cu(cu), 0)))
        }),
    );
    voc.add_op_overload(
        word,
        once_overload(&[ValueType::Die], move |stk| {
            let mut die = pop_die(stk)?;
            die.doneness = doneness;
            Ok(Some(Value::new(ValueKind::Die(die), 0)))
        }),
    );
    voc.add_op_overload(
        word,
        once_overload(&[ValueType::Attr], move |stk| {
            let mut attr = pop_attr(stk)?;
            attr.doneness = doneness;
            Ok(Some(Value::new(ValueKind::Attr(attr), 0)))
        }),
    );
}
