//! dwq の ELF/DWARF 読み込み層
//!
//! このクレートは、ELFファイルとDWARFデバッグ情報へのアクセスを提供します。
//! クエリエンジン本体（dwq-core）は、ここで定義するコンテキストとインデックスを
//! 通してのみ gimli / object に触れます。

pub mod loader;
pub mod index;
pub mod abbrev;
pub mod coverage;

pub use loader::{DwarfContext, Reader, UnitData};
pub use index::{DieIndex, DieNode};
pub use abbrev::{AbbrevDecl, AbbrevTable, AttrSpec};
pub use coverage::{CovRange, Coverage};

/// DWARF読み込みの結果型
pub type Result<T> = anyhow::Result<T>;
