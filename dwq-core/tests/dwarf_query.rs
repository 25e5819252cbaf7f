//! 合成DWARFに対するクエリのテスト
//!
//! gimli::write で2ユニットのデバッグ情報をメモリ上に組み立てます。
//! 主ユニットの根には subprogram 2つ（片方は specification で他方を参照）
//! と、部分ユニットを取り込む imported_unit がぶら下がります。
//! gimli::write は根を DW_TAG_compile_unit でしか書けないため、
//! 部分ユニットの根は書き出した `.debug_abbrev` のタグを差し替えて
//! DW_TAG_partial_unit にしています。

use dwq_core::value::{Doneness, DwarfRef};
use dwq_core::{Query, Stack, Value, ValueKind};
use dwq_dwarf::{DwarfContext, Reader};
use gimli::write;
use std::collections::HashMap;
use std::rc::Rc;

fn write_sections() -> HashMap<gimli::SectionId, Vec<u8>> {
    let encoding = gimli::Encoding {
        format: gimli::Format::Dwarf32,
        version: 4,
        address_size: 8,
    };

    let mut dwarf = write::Dwarf::new();

    // 主ユニット
    let mut unit_m = write::Unit::new(encoding, write::LineProgram::none());
    let m_root = unit_m.root();
    unit_m.get_mut(m_root).set(
        gimli::DW_AT_name,
        write::AttributeValue::String(b"main.c".to_vec()),
    );
    unit_m.get_mut(m_root).set(
        gimli::DW_AT_producer,
        write::AttributeValue::String(b"dwq test".to_vec()),
    );

    // A: 定義実体の subprogram
    let a = unit_m.add(m_root, gimli::DW_TAG_subprogram);
    unit_m.get_mut(a).set(
        gimli::DW_AT_name,
        write::AttributeValue::String(b"fun".to_vec()),
    );
    unit_m.get_mut(a).set(
        gimli::DW_AT_low_pc,
        write::AttributeValue::Address(write::Address::Constant(0x1000)),
    );
    unit_m
        .get_mut(a)
        .set(gimli::DW_AT_high_pc, write::AttributeValue::Udata(0x10));
    unit_m.get_mut(a).set(
        gimli::DW_AT_frame_base,
        // DW_OP_fbreg <-24>
        write::AttributeValue::Exprloc(write::Expression::raw(vec![0x91, 0x68])),
    );
    unit_m
        .get_mut(a)
        .set(gimli::DW_AT_declaration, write::AttributeValue::Flag(true));

    // D: A を specification で参照する subprogram
    let d = unit_m.add(m_root, gimli::DW_TAG_subprogram);
    unit_m.get_mut(d).set(
        gimli::DW_AT_specification,
        write::AttributeValue::UnitRef(a),
    );
    unit_m
        .get_mut(d)
        .set(gimli::DW_AT_external, write::AttributeValue::Flag(true));

    // B: 部分ユニットの取り込み
    let b = unit_m.add(m_root, gimli::DW_TAG_imported_unit);

    let m_id = dwarf.units.add(unit_m);

    // 部分ユニット。根は書き出し後にタグを差し替える
    let mut unit_p = write::Unit::new(encoding, write::LineProgram::none());
    let p_root = unit_p.root();
    let c = unit_p.add(p_root, gimli::DW_TAG_base_type);
    unit_p.get_mut(c).set(
        gimli::DW_AT_name,
        write::AttributeValue::String(b"c_type".to_vec()),
    );
    unit_p
        .get_mut(c)
        .set(gimli::DW_AT_byte_size, write::AttributeValue::Data1(4));
    let p_id = dwarf.units.add(unit_p);

    dwarf.units.get_mut(m_id).get_mut(b).set(
        gimli::DW_AT_import,
        write::AttributeValue::DebugInfoRef(write::Reference::Entry(p_id, p_root)),
    );

    let mut sections = write::Sections::new(write::EndianVec::new(gimli::LittleEndian));
    dwarf.write(&mut sections).expect("write failed");

    let mut map = HashMap::new();
    sections
        .for_each(|id, data| -> Result<(), gimli::Error> {
            map.insert(id, data.slice().to_vec());
            Ok(())
        })
        .expect("section walk failed");
    map
}

fn load(map: &HashMap<gimli::SectionId, Vec<u8>>) -> Rc<DwarfContext> {
    let dwarf = gimli::Dwarf::load(|id| -> anyhow::Result<Reader> {
        let data: &'static [u8] = match map.get(&id) {
            Some(data) => Box::leak(data.clone().into_boxed_slice()),
            None => &[],
        };
        Ok(gimli::EndianSlice::new(data, gimli::RunTimeEndian::Little))
    })
    .expect("load failed");
    DwarfContext::from_dwarf("<synthetic>", dwarf).expect("context failed")
}

/// 部分ユニットの根のタグを差し替えたコンテキストを作る
fn build_ctx() -> Rc<DwarfContext> {
    let mut map = write_sections();

    // 1度読み、部分ユニット（2番目）の根の略語宣言を特定する
    let probe = load(&map);
    assert_eq!(probe.units().len(), 2);
    let root_offset = probe.die_index(1).expect("index").node(0).offset;
    let code = probe.die_abbrev_code(1, root_offset).expect("abbrev code");
    assert!(code < 0x80, "abbrev code fits a single ULEB byte");
    let table = probe.abbrev_table(1).expect("abbrev table");
    let decl_offset = table.get(code).expect("decl").offset as usize;

    // 宣言はコード1バイトの直後にタグが来る
    let abbrev = map.get_mut(&gimli::SectionId::DebugAbbrev).expect("abbrev");
    assert_eq!(abbrev[decl_offset + 1], gimli::DW_TAG_compile_unit.0 as u8);
    abbrev[decl_offset + 1] = gimli::DW_TAG_partial_unit.0 as u8;

    load(&map)
}

fn eval_ctx(ctx: &Rc<DwarfContext>, program: &str) -> Vec<Vec<String>> {
    let voc = dwq_core::vocabulary();
    let mut query = Query::compile(program, &voc).expect("compile failed");
    let mut stk = Stack::new();
    stk.push(Value::new(
        ValueKind::Dwarf(DwarfRef {
            ctx: Rc::clone(ctx),
            doneness: Doneness::Cooked,
        }),
        0,
    ));
    query
        .run(stk)
        .expect("query failed")
        .iter()
        .map(|stk| stk.values().iter().rev().map(|v| v.show()).collect())
        .collect()
}

fn single(rows: &[&str]) -> Vec<Vec<String>> {
    rows.iter().map(|row| vec![row.to_string()]).collect()
}

#[test]
fn test_cooked_unit_skips_partial() {
    let ctx = build_ctx();
    assert_eq!(eval_ctx(&ctx, "unit root label"), single(&["DW_TAG_compile_unit"]));
    assert_eq!(
        eval_ctx(&ctx, "raw unit root label"),
        single(&["DW_TAG_compile_unit", "DW_TAG_partial_unit"])
    );
}

#[test]
fn test_cooked_entry_splices_partial_unit() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "unit entry label"),
        single(&[
            "DW_TAG_compile_unit",
            "DW_TAG_subprogram",
            "DW_TAG_subprogram",
            "DW_TAG_imported_unit",
            "DW_TAG_base_type",
        ])
    );
}

#[test]
fn test_raw_entry_stops_at_import() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "unit raw entry label"),
        single(&[
            "DW_TAG_compile_unit",
            "DW_TAG_subprogram",
            "DW_TAG_subprogram",
            "DW_TAG_imported_unit",
        ])
    );
}

#[test]
fn test_entry_equals_unit_entry() {
    let ctx = build_ctx();
    // 両辺とも入力の複製上で評価される
    assert_eq!(
        eval_ctx(&ctx, "([entry offset] == [unit entry offset])").len(),
        1
    );
    assert_eq!(eval_ctx(&ctx, "entry label"), eval_ctx(&ctx, "unit entry label"));
}

#[test]
fn test_doneness_idempotence() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "raw cooked entry label"),
        eval_ctx(&ctx, "cooked entry label")
    );
    assert_eq!(
        eval_ctx(&ctx, "cooked raw entry label"),
        eval_ctx(&ctx, "raw entry label")
    );
    assert_eq!(
        eval_ctx(&ctx, "raw raw entry label"),
        eval_ctx(&ctx, "raw entry label")
    );
}

#[test]
fn test_cooked_child_follows_import() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "unit root child label"),
        single(&[
            "DW_TAG_subprogram",
            "DW_TAG_subprogram",
            "DW_TAG_imported_unit",
            "DW_TAG_base_type",
        ])
    );
    assert_eq!(
        eval_ctx(&ctx, "unit root raw child label"),
        single(&[
            "DW_TAG_subprogram",
            "DW_TAG_subprogram",
            "DW_TAG_imported_unit",
        ])
    );
}

#[test]
fn test_child_closure_visits_each_die_once() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "[unit root child* label]"),
        single(&[
            "[DW_TAG_compile_unit, DW_TAG_subprogram, DW_TAG_subprogram, \
             DW_TAG_imported_unit, DW_TAG_base_type]"
        ])
    );
}

#[test]
fn test_parent_pops_import_context() {
    let ctx = build_ctx();
    // 部分ユニット由来のDIEの親は、取り込み元の文脈で引き直される
    assert_eq!(
        eval_ctx(&ctx, "entry ?TAG_base_type parent label"),
        single(&["DW_TAG_compile_unit"])
    );
    // raw では部分ユニットの根がそのまま親
    assert_eq!(
        eval_ctx(&ctx, "raw entry ?TAG_base_type parent label"),
        single(&["DW_TAG_partial_unit"])
    );
}

#[test]
fn test_root_follows_import_chain() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "entry ?TAG_base_type root label"),
        single(&["DW_TAG_compile_unit"])
    );
    assert_eq!(
        eval_ctx(&ctx, "entry ?root label"),
        single(&["DW_TAG_compile_unit"])
    );
}

#[test]
fn test_import_target_is_partial_root() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "entry ?TAG_imported_unit @AT_import label"),
        single(&["DW_TAG_partial_unit"])
    );
}

#[test]
fn test_attribute_integration() {
    let ctx = build_ctx();
    // cooked: 参照属性も自前の属性も出たうえで、specification 先から
    // 未出の属性を統合する。declaration は持ち込まれない
    assert_eq!(
        eval_ctx(&ctx, "entry ?AT_specification attribute label"),
        single(&[
            "DW_AT_specification",
            "DW_AT_external",
            "DW_AT_name",
            "DW_AT_low_pc",
            "DW_AT_high_pc",
            "DW_AT_frame_base",
        ])
    );
    // raw: 自前の属性だけ
    assert_eq!(
        eval_ctx(&ctx, "entry ?AT_specification raw attribute label"),
        single(&["DW_AT_specification", "DW_AT_external"])
    );
}

#[test]
fn test_at_value_integrates() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "entry ?AT_specification @AT_name"),
        single(&["fun"])
    );
    assert_eq!(
        eval_ctx(&ctx, "entry ?AT_specification name"),
        single(&["fun"])
    );
    // raw では統合されず、名前なし
    assert_eq!(
        eval_ctx(&ctx, "entry ?AT_specification raw @AT_name"),
        Vec::<Vec<String>>::new()
    );
}

#[test]
fn test_low_high() {
    let ctx = build_ctx();
    assert_eq!(eval_ctx(&ctx, "raw entry ?AT_low_pc low"), single(&["0x1000"]));
    assert_eq!(eval_ctx(&ctx, "raw entry ?AT_low_pc high"), single(&["0x1010"]));
    assert_eq!(
        eval_ctx(&ctx, "raw entry ?AT_low_pc @AT_high_pc"),
        single(&["0x1010"])
    );
}

#[test]
fn test_location_expression_ops() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "raw entry @AT_frame_base elem label"),
        single(&["DW_OP_fbreg"])
    );
    assert_eq!(
        eval_ctx(&ctx, "raw entry @AT_frame_base elem value"),
        single(&["-24"])
    );
}

#[test]
fn test_unit_projections() {
    let ctx = build_ctx();
    assert_eq!(eval_ctx(&ctx, "unit version"), single(&["4"]));
    assert_eq!(eval_ctx(&ctx, "name"), single(&["<synthetic>"]));
    assert_eq!(eval_ctx(&ctx, "unit offset"), single(&["0x0"]));
}

#[test]
fn test_abbrev_surface() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "unit root abbrev label"),
        single(&["DW_TAG_compile_unit"])
    );
    assert_eq!(
        eval_ctx(&ctx, "unit root abbrev ?haschildren label"),
        single(&["DW_TAG_compile_unit"])
    );
    // subprogram A の略語は name/low_pc/high_pc/frame_base/declaration を
    // 並べている
    assert_eq!(
        eval_ctx(&ctx, "raw entry ?AT_low_pc abbrev attribute label"),
        single(&[
            "DW_AT_name",
            "DW_AT_low_pc",
            "DW_AT_high_pc",
            "DW_AT_frame_base",
            "DW_AT_declaration",
        ])
    );
    assert_eq!(
        eval_ctx(&ctx, "raw entry ?AT_low_pc attribute ?AT_low_pc form"),
        single(&["DW_FORM_addr"])
    );
}

#[test]
fn test_haschildren() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "entry ?haschildren label"),
        single(&["DW_TAG_compile_unit"])
    );
}

#[test]
fn test_die_equality_includes_import_chain() {
    let ctx = build_ctx();
    // 実体は1つの base_type でも、raw の直接視点と cooked の取り込み
    // 視点では文脈が違う
    assert_eq!(eval_ctx(&ctx, "[entry ?TAG_base_type] length"), single(&["1"]));
    assert_eq!(
        eval_ctx(&ctx, "[raw entry ?TAG_base_type] length"),
        single(&["1"])
    );
    // インポート連鎖が違えばオフセットが同じでも等しくない
    assert_eq!(
        eval_ctx(&ctx, "([entry ?TAG_base_type] == [raw entry ?TAG_base_type])").len(),
        0
    );
}

#[test]
fn test_attribute_positions_restart_per_die() {
    let ctx = build_ctx();
    assert_eq!(
        eval_ctx(&ctx, "raw entry ?AT_specification attribute (pos == 0) label"),
        single(&["DW_AT_specification"])
    );
}
