//! 属性値の解釈
//!
//! DWARFの属性値をクエリ言語の値へ写します。文字列参照の解決、アドレスの
//! 解決、ロケーションリストや範囲リストの展開、DIE参照の値化をここで
//! 行います。`@AT_*` と `value` 語の中身です。

use crate::cst::{Constant, Domain};
use crate::overload::{many_overload, VecProducer, ValueProducer, Vocabulary};
use crate::value::{AttrRef, Doneness, LoclistElemRef, LoclistOpRef, Value, ValueKind, ValueType};
use crate::Result;
use dwq_dwarf::{Coverage, DwarfContext};
use gimli::Reader as _;
use std::rc::Rc;

/// 属性値を値の並びへ解釈する
pub fn at_value(attr: &AttrRef) -> Result<Vec<Value>> {
    use gimli::AttributeValue;

    let ctx = &attr.ctx;
    let unit = &ctx.unit(attr.unit).unit;
    let dwarf = ctx.dwarf();

    let cst = |c: Constant| vec![Value::cst(c, 0)];

    Ok(match attr.value.clone() {
        AttributeValue::String(_)
        | AttributeValue::DebugStrRef(_)
        | AttributeValue::DebugStrRefSup(_)
        | AttributeValue::DebugLineStrRef(_)
        | AttributeValue::DebugStrOffsetsIndex(_) => {
            let s = dwarf.attr_string(unit, attr.value.clone())?;
            vec![Value::str(
                String::from_utf8_lossy(s.slice()).into_owned(),
                0,
            )]
        }

        AttributeValue::Addr(a) => cst(Constant::new(a, Domain::Address)),
        AttributeValue::DebugAddrIndex(i) => {
            let a = dwarf.address(unit, i)?;
            cst(Constant::new(a, Domain::Address))
        }

        AttributeValue::Flag(b) => cst(Constant::new(b as u8, Domain::Bool)),

        AttributeValue::UnitRef(_) | AttributeValue::DebugInfoRef(_) => {
            match ctx.resolve_die_ref(attr.unit, &attr.value)? {
                Some((unit_index, offset)) => {
                    let die = crate::dw::die_ref_at_offset(
                        Rc::clone(ctx),
                        unit_index,
                        offset,
                        None,
                        attr.doneness,
                    )?;
                    vec![Value::new(ValueKind::Die(die), 0)]
                }
                None => Vec::new(),
            }
        }

        AttributeValue::Exprloc(expr) => {
            // 単独の式は全アドレス域を覆う1要素として見せる
            vec![Value::new(
                ValueKind::LoclistElem(LoclistElemRef {
                    ctx: Rc::clone(ctx),
                    unit: attr.unit,
                    begin: 0,
                    end: u64::MAX,
                    expr,
                }),
                0,
            )]
        }

        AttributeValue::LocationListsRef(_) | AttributeValue::DebugLocListsIndex(_) => {
            let mut out = Vec::new();
            if let Some(mut iter) = dwarf.attr_locations(unit, attr.value.clone())? {
                let mut i = 0;
                while let Some(entry) = iter.next()? {
                    out.push(Value::new(
                        ValueKind::LoclistElem(LoclistElemRef {
                            ctx: Rc::clone(ctx),
                            unit: attr.unit,
                            begin: entry.range.begin,
                            end: entry.range.end,
                            expr: entry.data,
                        }),
                        i,
                    ));
                    i += 1;
                }
            }
            out
        }

        AttributeValue::RangeListsRef(_) | AttributeValue::DebugRngListsIndex(_) => {
            let mut cov = Coverage::new();
            if let Some(mut iter) = dwarf.attr_ranges(unit, attr.value.clone())? {
                while let Some(range) = iter.next()? {
                    if range.end > range.begin {
                        cov.add(range.begin, range.end - range.begin);
                    }
                }
            }
            vec![Value::new(ValueKind::Aset(cov), 0)]
        }

        AttributeValue::Sdata(v) => cst(Constant::dec(v)),

        AttributeValue::Udata(v)
        | AttributeValue::Data8(v) => udata_value(attr, v)?,
        AttributeValue::Data1(v) => udata_value(attr, v as u64)?,
        AttributeValue::Data2(v) => udata_value(attr, v as u64)?,
        AttributeValue::Data4(v) => udata_value(attr, v as u64)?,

        AttributeValue::FileIndex(i) => match file_name(ctx, attr.unit, i) {
            Some(path) => vec![Value::str(path, 0)],
            None => cst(Constant::dec(i)),
        },

        AttributeValue::Encoding(e) => cst(Constant::new(e.0, Domain::Ate)),
        AttributeValue::Language(l) => cst(Constant::new(l.0, Domain::Lang)),
        AttributeValue::Inline(i) => cst(Constant::new(i.0, Domain::Inl)),
        AttributeValue::DecimalSign(v) => cst(Constant::dec(v.0)),
        AttributeValue::Endianity(v) => cst(Constant::dec(v.0)),
        AttributeValue::Accessibility(v) => cst(Constant::dec(v.0)),
        AttributeValue::Visibility(v) => cst(Constant::dec(v.0)),
        AttributeValue::Virtuality(v) => cst(Constant::dec(v.0)),
        AttributeValue::AddressClass(v) => cst(Constant::dec(v.0)),
        AttributeValue::IdentifierCase(v) => cst(Constant::dec(v.0)),
        AttributeValue::CallingConvention(v) => cst(Constant::dec(v.0)),
        AttributeValue::Ordering(v) => cst(Constant::dec(v.0)),
        AttributeValue::DwoId(id) => cst(Constant::new(id.0, Domain::Hex)),

        AttributeValue::Block(data) => {
            let values = data
                .slice()
                .iter()
                .enumerate()
                .map(|(i, b)| Value::cst(Constant::dec(*b), i as u64))
                .collect();
            vec![Value::seq(values, 0)]
        }

        AttributeValue::SecOffset(o) => cst(Constant::new(o as u64, Domain::Hex)),

        other => anyhow::bail!(
            "unhandled attribute value form for {}: {:?}",
            crate::value::short_at(attr.name),
            other
        ),
    })
}

/// 符号なしデータの解釈
///
/// `DW_AT_high_pc` のオフセット形式だけは low_pc を足してアドレスにする。
fn udata_value(attr: &AttrRef, v: u64) -> Result<Vec<Value>> {
    if attr.name == gimli::DW_AT_high_pc {
        if let Some(low) = die_low_pc(&attr.ctx, attr.unit, attr.die_offset)? {
            return Ok(vec![Value::cst(
                Constant::new(low.wrapping_add(v), Domain::Address),
                0,
            )]);
        }
    }
    Ok(vec![Value::cst(Constant::dec(v), 0)])
}

/// DIEの DW_AT_low_pc を解決する
pub fn die_low_pc(
    ctx: &Rc<DwarfContext>,
    unit_index: usize,
    offset: gimli::UnitOffset,
) -> Result<Option<u64>> {
    let unit = &ctx.unit(unit_index).unit;
    let entry = ctx.die_entry(unit_index, offset)?;
    match entry.attr_value(gimli::DW_AT_low_pc)? {
        Some(value) => Ok(ctx.dwarf().attr_address(unit, value)?),
        None => Ok(None),
    }
}

/// DIEの DW_AT_high_pc を絶対アドレスとして解決する
pub fn die_high_pc(
    ctx: &Rc<DwarfContext>,
    unit_index: usize,
    offset: gimli::UnitOffset,
) -> Result<Option<u64>> {
    let unit = &ctx.unit(unit_index).unit;
    let entry = ctx.die_entry(unit_index, offset)?;
    let value = match entry.attr_value(gimli::DW_AT_high_pc)? {
        Some(value) => value,
        None => return Ok(None),
    };
    if let Some(addr) = ctx.dwarf().attr_address(unit, value.clone())? {
        return Ok(Some(addr));
    }
    match value.udata_value() {
        Some(offset_from_low) => Ok(die_low_pc(ctx, unit_index, offset)?
            .map(|low| low.wrapping_add(offset_from_low))),
        None => Ok(None),
    }
}

/// 行番号プログラムからファイル名を引く
fn file_name(ctx: &Rc<DwarfContext>, unit_index: usize, index: u64) -> Option<String> {
    let unit = &ctx.unit(unit_index).unit;
    let program = unit.line_program.as_ref()?;
    let header = program.header();
    let file = header.file(index)?;

    let name = ctx.dwarf().attr_string(unit, file.path_name()).ok()?;
    let mut path = String::from_utf8_lossy(name.slice()).into_owned();

    if let Some(dir) = file.directory(header) {
        if let Ok(dir) = ctx.dwarf().attr_string(unit, dir) {
            let dir = String::from_utf8_lossy(dir.slice());
            if !dir.is_empty() && !path.starts_with('/') {
                path = format!("{}/{}", dir, path);
            }
        }
    }
    Some(path)
}

/// ロケーション式を命令列に展開する
pub fn expr_ops(elem: &LoclistElemRef) -> Result<Vec<LoclistOpRef>> {
    let encoding = elem.ctx.unit(elem.unit).unit.encoding();
    let total = elem.expr.0.len();
    let mut pc = elem.expr.0;
    let mut ops = Vec::new();

    while !pc.is_empty() {
        let offset = (total - pc.len()) as u64;
        let mut probe = pc;
        let dwop = gimli::DwOp(probe.read_u8()?);
        let op = gimli::Operation::parse(&mut pc, encoding)?;
        ops.push(LoclistOpRef {
            ctx: Rc::clone(&elem.ctx),
            unit: elem.unit,
            offset,
            dwop,
            op,
        });
    }
    Ok(ops)
}

/// 1命令のオペランドを値の並びにする
pub fn op_operands(op: &LoclistOpRef) -> Result<Vec<Value>> {
    use gimli::Operation;

    let cst = |c: Constant| Value::cst(c, 0);

    Ok(match &op.op {
        Operation::Address { address } => vec![cst(Constant::new(*address, Domain::Address))],
        Operation::UnsignedConstant { value } => vec![cst(Constant::dec(*value))],
        Operation::SignedConstant { value } => vec![cst(Constant::dec(*value))],
        Operation::PlusConstant { value } => vec![cst(Constant::dec(*value))],
        Operation::Register { register } => vec![cst(Constant::dec(register.0))],
        Operation::RegisterOffset {
            register, offset, ..
        } => vec![
            cst(Constant::dec(register.0)),
            cst(Constant::dec(*offset)),
        ],
        Operation::FrameOffset { offset } => vec![cst(Constant::dec(*offset))],
        Operation::Pick { index } => vec![cst(Constant::dec(*index))],
        Operation::Bra { target } => vec![cst(Constant::dec(*target))],
        Operation::Skip { target } => vec![cst(Constant::dec(*target))],
        Operation::Piece {
            size_in_bits,
            bit_offset,
        } => {
            let mut out = vec![cst(Constant::dec(*size_in_bits))];
            if let Some(off) = bit_offset {
                out.push(cst(Constant::dec(*off)));
            }
            out
        }
        Operation::ImplicitValue { data } => {
            let bytes = data
                .slice()
                .iter()
                .enumerate()
                .map(|(i, b)| Value::cst(Constant::dec(*b), i as u64))
                .collect();
            vec![Value::seq(bytes, 0)]
        }
        Operation::Call { offset } => match die_of_reference(op, offset)? {
            Some(value) => vec![value],
            None => Vec::new(),
        },
        Operation::ImplicitPointer { value, byte_offset } => {
            let mut out = Vec::new();
            if let Some((unit_index, off)) = op.ctx.find_die(*value) {
                let die = crate::dw::die_ref_at_offset(
                    Rc::clone(&op.ctx),
                    unit_index,
                    off,
                    None,
                    Doneness::Cooked,
                )?;
                out.push(Value::new(ValueKind::Die(die), 0));
            }
            out.push(cst(Constant::dec(*byte_offset)));
            out
        }
        _ => Vec::new(),
    })
}

fn die_of_reference(
    op: &LoclistOpRef,
    reference: &gimli::DieReference,
) -> Result<Option<Value>> {
    let target = match reference {
        gimli::DieReference::UnitRef(off) => Some((op.unit, *off)),
        gimli::DieReference::DebugInfoRef(goff) => op.ctx.find_die(*goff),
    };
    match target {
        Some((unit_index, off)) => {
            let die = crate::dw::die_ref_at_offset(
                Rc::clone(&op.ctx),
                unit_index,
                off,
                None,
                Doneness::Cooked,
            )?;
            Ok(Some(Value::new(ValueKind::Die(die), 0)))
        }
        None => Ok(None),
    }
}

/// 属性値の表示用文字列
pub fn show_attr_value(attr: &AttrRef) -> Result<String> {
    let values = at_value(attr)?;
    Ok(values
        .iter()
        .map(|v| v.show())
        .collect::<Vec<_>>()
        .join(", "))
}

/// `value` 語を登録する
pub fn register(voc: &mut Vocabulary) {
    voc.add_op_overload(
        "value",
        many_overload(&[ValueType::Attr], |stk| {
            let attr = match stk.pop()?.kind {
                ValueKind::Attr(a) => a,
                _ => anyhow::bail!("expected an attribute"),
            };
            let values = at_value(&attr)?;
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "value",
        many_overload(&[ValueType::LoclistOp], |stk| {
            let op = match stk.pop()?.kind {
                ValueKind::LoclistOp(o) => o,
                _ => anyhow::bail!("expected a location expression instruction"),
            };
            let values = op_operands(&op)?;
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );
}
