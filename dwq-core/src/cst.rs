//! 定数値とドメイン
//!
//! 定数は任意精度整数（num::BigInt）と、表示や比較の流儀を決めるドメインの
//! 組です。ドメインには素朴な数値（10進・16進）のほか、DW_TAG_* などの
//! 記号的な列挙ドメインがあります。

use num::bigint::Sign;
use num::BigInt;
use std::cmp::Ordering;

/// 定数のドメイン
///
/// 表示形式・算術の可否・ドメインをまたぐ等価性を決めます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Domain {
    /// 10進表示
    Dec,
    /// 16進表示
    Hex,
    /// 真偽値
    Bool,
    /// `.debug_info` オフセット
    Offset,
    /// ターゲットアドレス
    Address,
    /// 略語コード
    AbbrevCode,
    /// 値型の名前（T_CONST など）
    Type,
    /// DW_TAG_*
    Tag,
    /// DW_AT_*
    At,
    /// DW_FORM_*
    Form,
    /// DW_OP_*
    Op,
    /// DW_ATE_*
    Ate,
    /// DW_LANG_*
    Lang,
    /// DW_INL_*
    Inl,
}

impl Domain {
    /// 記号的でない（数として読める）ドメインかどうか
    ///
    /// 素なドメイン同士の定数は数値だけで比較できます。
    pub fn is_plain(self) -> bool {
        matches!(
            self,
            Domain::Dec | Domain::Hex | Domain::Offset | Domain::Address | Domain::AbbrevCode
        )
    }

    /// 算術演算に安全に使えるかどうか
    pub fn is_arith(self) -> bool {
        self.is_plain()
    }
}

/// 任意精度の定数値
///
/// 注意: 導出のPartialEqは (値, ドメイン) の厳密比較で、ドメインを
/// またぐ等価性は `cmp` が決める。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    value: BigInt,
    dom: Domain,
}

impl Constant {
    /// 値とドメインから定数を作る
    pub fn new(value: impl Into<BigInt>, dom: Domain) -> Self {
        Self {
            value: value.into(),
            dom,
        }
    }

    /// 10進ドメインの定数を作る
    pub fn dec(value: impl Into<BigInt>) -> Self {
        Self::new(value, Domain::Dec)
    }

    /// 値を取得する
    pub fn value(&self) -> &BigInt {
        &self.value
    }

    /// ドメインを取得する
    pub fn dom(&self) -> Domain {
        self.dom
    }

    /// 定数同士の三方向比較
    ///
    /// まず数値で比較し、等しい場合はドメインの互換性を確認します。
    /// 素なドメイン同士または同一ドメインなら等しく、そうでなければ
    /// ドメインの順序で分けます（全順序を保つため）。
    pub fn cmp(&self, other: &Constant) -> Ordering {
        match self.value.cmp(&other.value) {
            Ordering::Equal => {
                if self.dom == other.dom || (self.dom.is_plain() && other.dom.is_plain()) {
                    Ordering::Equal
                } else {
                    self.dom.cmp(&other.dom)
                }
            }
            ord => ord,
        }
    }

    /// 表示用の文字列を作る
    pub fn show(&self) -> String {
        match self.dom {
            Domain::Dec => format!("{}", self.value),
            Domain::Hex | Domain::Offset | Domain::Address => self.show_hex(),
            Domain::AbbrevCode => format!("{}", self.value),
            Domain::Bool => {
                if self.value.sign() == Sign::NoSign {
                    "false".to_string()
                } else {
                    "true".to_string()
                }
            }
            Domain::Type => crate::value::type_name_for_code(&self.value),
            Domain::Tag => self.show_symbolic("DW_TAG"),
            Domain::At => self.show_symbolic("DW_AT"),
            Domain::Form => self.show_symbolic("DW_FORM"),
            Domain::Op => self.show_symbolic("DW_OP"),
            Domain::Ate => self.show_symbolic("DW_ATE"),
            Domain::Lang => self.show_symbolic("DW_LANG"),
            Domain::Inl => self.show_symbolic("DW_INL"),
        }
    }

    fn show_hex(&self) -> String {
        if self.value.sign() == Sign::Minus {
            format!("-0x{:x}", self.value.magnitude())
        } else {
            format!("0x{:x}", self.value.magnitude())
        }
    }

    fn show_symbolic(&self, prefix: &str) -> String {
        use num::ToPrimitive;

        let code = match self.value.to_u64() {
            Some(c) => c,
            None => return self.show_hex(),
        };

        let known = match self.dom {
            Domain::Tag => gimli::DwTag(code as u16).static_string(),
            Domain::At => gimli::DwAt(code as u16).static_string(),
            Domain::Form => gimli::DwForm(code as u16).static_string(),
            Domain::Op => gimli::DwOp(code as u8).static_string(),
            Domain::Ate => gimli::DwAte(code as u8).static_string(),
            Domain::Lang => gimli::DwLang(code as u16).static_string(),
            Domain::Inl => gimli::DwInl(code as u8).static_string(),
            _ => None,
        };

        match known {
            Some(name) => name.to_string(),
            None => format!("{}_lo_user+0x{:x}", prefix, code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domains_compare_numerically() {
        let a = Constant::new(5, Domain::Dec);
        let b = Constant::new(5, Domain::Hex);
        assert_eq!(a.cmp(&b), Ordering::Equal);

        let c = Constant::new(6, Domain::Hex);
        assert_eq!(a.cmp(&c), Ordering::Less);
    }

    #[test]
    fn test_symbolic_domains_need_identity() {
        let tag = Constant::new(0x2e, Domain::Tag);
        let num = Constant::new(0x2e, Domain::Dec);
        assert_ne!(tag.cmp(&num), Ordering::Equal);
        assert_eq!(tag.cmp(&tag.clone()), Ordering::Equal);
    }

    #[test]
    fn test_show_formats() {
        assert_eq!(Constant::new(42, Domain::Dec).show(), "42");
        assert_eq!(Constant::new(0x20, Domain::Hex).show(), "0x20");
        assert_eq!(Constant::new(-3, Domain::Hex).show(), "-0x3");
        assert_eq!(Constant::new(0, Domain::Bool).show(), "false");
        assert_eq!(Constant::new(1, Domain::Bool).show(), "true");
        assert_eq!(Constant::new(0x2e, Domain::Tag).show(), "DW_TAG_subprogram");
    }

    #[test]
    fn test_big_values() {
        use num::Num;
        let big = BigInt::from_str_radix("ffffffffffffffffffff", 16).unwrap();
        let c = Constant::new(big, Domain::Hex);
        assert_eq!(c.show(), "0xffffffffffffffffffff");
    }
}
