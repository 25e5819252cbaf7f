//! ELFとDWARFの読み込み機能

use crate::abbrev::AbbrevTable;
use crate::index::DieIndex;
use crate::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use gimli::Section as _;
use object::{Object, ObjectSection};

/// このクレート全体で使用するgimliリーダー型
pub type Reader = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

/// 読み込み済みのコンパイルユニット
pub struct UnitData {
    /// gimliのユニット
    pub unit: gimli::Unit<Reader>,
    /// `.debug_info` セクション内でのユニットヘッダのオフセット
    pub offset: gimli::DebugInfoOffset,
    /// ユニットのDWARFバージョン
    pub version: u16,
}

/// DWARFコンテキスト
///
/// 1つのオブジェクトファイルに対応します。全ユニットを先に読み込み、
/// DIEは (ユニット番号, ユニット内オフセット) の組で参照します。
/// DIEインデックスと略語テーブルは初回アクセス時に構築してキャッシュします。
pub struct DwarfContext {
    /// 表示用のファイル名
    name: String,
    /// オブジェクトファイル（合成DWARFの場合はNone）
    object_file: Option<object::File<'static>>,
    /// DWARFコンテキスト
    dwarf: gimli::Dwarf<Reader>,
    /// オフセット順のユニット一覧
    units: Vec<UnitData>,
    /// ユニットごとのDIEインデックス（遅延構築）
    indexes: RefCell<Vec<Option<Rc<DieIndex>>>>,
    /// 略語テーブルのキャッシュ（`.debug_abbrev` オフセットごと）
    abbrevs: RefCell<HashMap<u64, Rc<AbbrevTable>>>,
}

impl DwarfContext {
    /// ELFファイルからDWARF情報を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Rc<Self>> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file {:?}: {}", path, e))?;

        // 値がファイル寿命を超えて生きるため、Box::leakで'staticライフタイムを得る
        let file_data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let object_file = object::File::parse(file_data)
            .map_err(|e| anyhow::anyhow!("Failed to parse object file {:?}: {}", path, e))?;

        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<Reader> {
            let data = object_file
                .section_by_name(id.name())
                .and_then(|section| section.data().ok())
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)
            .map_err(|e| anyhow::anyhow!("Failed to load DWARF sections: {}", e))?;

        Self::new(path.display().to_string(), Some(object_file), dwarf)
    }

    /// 構築済みの `gimli::Dwarf` からコンテキストを作る
    ///
    /// 統合テストが `gimli::write` で合成したセクションを通常の読み込みと
    /// 同じ経路に乗せるための入口です。
    pub fn from_dwarf(name: impl Into<String>, dwarf: gimli::Dwarf<Reader>) -> Result<Rc<Self>> {
        Self::new(name.into(), None, dwarf)
    }

    fn new(
        name: String,
        object_file: Option<object::File<'static>>,
        dwarf: gimli::Dwarf<Reader>,
    ) -> Result<Rc<Self>> {
        // 全ユニットを先読みする
        let mut units = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let offset = match header.offset() {
                gimli::UnitSectionOffset::DebugInfoOffset(off) => off,
                // .debug_types はこのエンジンの走査対象外
                gimli::UnitSectionOffset::DebugTypesOffset(_) => continue,
            };
            let version = header.version();
            let unit = dwarf.unit(header)?;
            units.push(UnitData {
                unit,
                offset,
                version,
            });
        }

        tracing::debug!(file = %name, units = units.len(), "loaded DWARF units");

        let n = units.len();
        Ok(Rc::new(Self {
            name,
            object_file,
            dwarf,
            units,
            indexes: RefCell::new(vec![None; n]),
            abbrevs: RefCell::new(HashMap::new()),
        }))
    }

    /// 表示用のファイル名を取得する
    pub fn name(&self) -> &str {
        &self.name
    }

    /// gimliのDWARFコンテキストへの参照を取得する
    pub fn dwarf(&self) -> &gimli::Dwarf<Reader> {
        &self.dwarf
    }

    /// オブジェクトファイルへの参照を取得する
    pub fn object_file(&self) -> Option<&object::File<'static>> {
        self.object_file.as_ref()
    }

    /// ユニット一覧を取得する
    pub fn units(&self) -> &[UnitData] {
        &self.units
    }

    /// 指定番号のユニットを取得する
    pub fn unit(&self, index: usize) -> &UnitData {
        &self.units[index]
    }

    /// ユニットのDIEインデックスを取得する（初回は構築してキャッシュ）
    pub fn die_index(&self, unit_index: usize) -> Result<Rc<DieIndex>> {
        if let Some(index) = &self.indexes.borrow()[unit_index] {
            return Ok(Rc::clone(index));
        }

        let index = Rc::new(DieIndex::build(&self.units[unit_index].unit)?);
        self.indexes.borrow_mut()[unit_index] = Some(Rc::clone(&index));
        Ok(index)
    }

    /// DIEの実体を読み出す
    pub fn die_entry(
        &self,
        unit_index: usize,
        offset: gimli::UnitOffset,
    ) -> Result<gimli::DebuggingInformationEntry<'_, '_, Reader>> {
        Ok(self.units[unit_index].unit.entry(offset)?)
    }

    /// `.debug_info` 全体でのオフセットから (ユニット番号, ユニット内オフセット) を引く
    pub fn find_die(
        &self,
        offset: gimli::DebugInfoOffset,
    ) -> Option<(usize, gimli::UnitOffset)> {
        // ユニットはオフセット昇順に並んでいる
        let unit_index = match self
            .units
            .binary_search_by_key(&offset.0, |u| u.offset.0)
        {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let unit = &self.units[unit_index].unit;
        let local = offset.to_unit_offset(&unit.header)?;
        Some((unit_index, local))
    }

    /// DIE参照形式の属性値を (ユニット番号, ユニット内オフセット) に解決する
    pub fn resolve_die_ref(
        &self,
        unit_index: usize,
        value: &gimli::AttributeValue<Reader>,
    ) -> Result<Option<(usize, gimli::UnitOffset)>> {
        match *value {
            gimli::AttributeValue::UnitRef(offset) => Ok(Some((unit_index, offset))),
            gimli::AttributeValue::DebugInfoRef(offset) => Ok(self.find_die(offset)),
            _ => Ok(None),
        }
    }

    /// DIEの `.debug_info` 全体でのオフセットを求める
    pub fn global_offset(
        &self,
        unit_index: usize,
        offset: gimli::UnitOffset,
    ) -> gimli::DebugInfoOffset {
        offset
            .to_debug_info_offset(&self.units[unit_index].unit.header)
            .unwrap_or(gimli::DebugInfoOffset(offset.0))
    }

    /// DIEの略語コードを読み出す
    pub fn die_abbrev_code(
        &self,
        unit_index: usize,
        offset: gimli::UnitOffset,
    ) -> Result<u64> {
        let unit = &self.units[unit_index].unit;
        let mut raw = unit
            .header
            .entries_raw(&unit.abbreviations, Some(offset))?;
        match raw.read_abbreviation()? {
            Some(abbrev) => Ok(abbrev.code()),
            None => anyhow::bail!("null DIE at offset {:#x}", offset.0),
        }
    }

    /// DIEの属性のフォームを略語宣言から引く
    pub fn die_attr_form(
        &self,
        unit_index: usize,
        offset: gimli::UnitOffset,
        name: gimli::DwAt,
    ) -> Result<Option<gimli::DwForm>> {
        let unit = &self.units[unit_index].unit;
        let mut raw = unit
            .header
            .entries_raw(&unit.abbreviations, Some(offset))?;
        let abbrev = match raw.read_abbreviation()? {
            Some(abbrev) => abbrev,
            None => return Ok(None),
        };
        Ok(abbrev
            .attributes()
            .iter()
            .find(|spec| spec.name() == name)
            .map(|spec| spec.form()))
    }

    /// ユニットの略語テーブルを取得する（初回は構築してキャッシュ）
    pub fn abbrev_table(&self, unit_index: usize) -> Result<Rc<AbbrevTable>> {
        let offset = self.units[unit_index].unit.header.debug_abbrev_offset();
        if let Some(table) = self.abbrevs.borrow().get(&(offset.0 as u64)) {
            return Ok(Rc::clone(table));
        }

        let data = *self.dwarf.debug_abbrev.reader();
        let table = Rc::new(AbbrevTable::parse(data, offset)?);
        self.abbrevs
            .borrow_mut()
            .insert(offset.0 as u64, Rc::clone(&table));
        Ok(table)
    }
}

impl std::fmt::Debug for DwarfContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DwarfContext")
            .field("name", &self.name)
            .field("units", &self.units.len())
            .finish()
    }
}
