//! dwq クエリエンジンのコア
//!
//! このクレートは、DWARFデバッグ情報に対する連接型（スタック指向）クエリ言語の
//! 実行エンジンを提供します。パースした式を遅延プル型の演算子グラフへ変換し、
//! 結果スタックを1つずつ取り出します。

pub mod cst;
pub mod value;
pub mod stack;
pub mod frame;
pub mod op;
pub mod overload;
pub mod builtin;
pub mod tree;
pub mod parse;
pub mod build;
pub mod atval;
pub mod aset;
pub mod dw;
pub mod dwcst;

pub use cst::{Constant, Domain};
pub use value::{CmpResult, Doneness, Value, ValueKind, ValueType};
pub use stack::Stack;
pub use frame::{Closure, Frame};
pub use op::{Op, OpRef, Origin, Pred, PredResult};
pub use overload::{BuiltinDef, Vocabulary};
pub use build::Query;
pub use tree::Tree;

/// クエリエンジンの結果型
pub type Result<T> = anyhow::Result<T>;

/// コア語彙・DWARF語彙・定数をすべて登録した語彙を作る
pub fn vocabulary() -> Vocabulary {
    let mut voc = Vocabulary::new();
    builtin::register(&mut voc);
    dw::register(&mut voc);
    aset::register(&mut voc);
    atval::register(&mut voc);
    dwcst::register(&mut voc);
    voc
}
