//! DWARFに依らない組み込み語
//!
//! スタック操作、比較述語、定数の算術、列と文字列の操作を登録します。

use crate::cst::{Constant, Domain};
use crate::op::{Op, OpApply, OpRef, Pred, PredNot, PredResult};
use crate::overload::{
    many_overload, once_overload, pred_overload, VecProducer, ValueProducer, Vocabulary,
};
use crate::stack::Stack;
use crate::tree::CmpWhich;
use crate::value::{CmpResult, Value, ValueKind, ValueType};
use crate::Result;
use num::BigInt;
use num::Zero;

/// スタック操作の種別
#[derive(Debug, Clone, Copy)]
enum Shuffle {
    Drop,
    Dup,
    Over,
    Swap,
    Rot,
}

struct OpShuffle {
    upstream: OpRef,
    which: Shuffle,
}

impl Op for OpShuffle {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            match self.which {
                Shuffle::Drop => {
                    stk.drop_n(1)?;
                }
                Shuffle::Dup => {
                    let v = stk.top()?.clone();
                    stk.push(v);
                }
                Shuffle::Over => {
                    let v = stk.checked_get(1)?.clone();
                    stk.push(v);
                }
                Shuffle::Swap => stk.swap()?,
                Shuffle::Rot => stk.rot()?,
            }
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        match self.which {
            Shuffle::Drop => "drop",
            Shuffle::Dup => "dup",
            Shuffle::Over => "over",
            Shuffle::Swap => "swap",
            Shuffle::Rot => "rot",
        }
        .to_string()
    }
}

/// TOSの型を表す定数を積む
struct OpType {
    upstream: OpRef,
}

impl Op for OpType {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            let code = stk.top()?.vtype().code();
            stk.push(Value::cst(Constant::new(code, Domain::Type), 0));
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "type".to_string()
    }
}

/// TOSの産出位置を積む
struct OpPos {
    upstream: OpRef,
}

impl Op for OpPos {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            let pos = stk.top()?.pos;
            stk.push(Value::cst(Constant::dec(pos), 0));
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "pos".to_string()
    }
}

/// 比較述語
///
/// TOSの1つ下（A）とTOS（B）を調べる。型の順位が違えばその順、同じ型なら
/// 中身の比較で、比較不能なら報告して Fail を返す。
struct PredCmp {
    want: CmpResult,
}

impl Pred for PredCmp {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        let b = stk.checked_get(0)?;
        let a = stk.checked_get(1)?;

        match a.cmp_value(b) {
            CmpResult::Fail => {
                tracing::error!("cannot compare `{}' to `{}'", a.show(), b.show());
                Ok(PredResult::Fail)
            }
            r if r == self.want => Ok(PredResult::Yes),
            _ => Ok(PredResult::No),
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> String {
        match self.want {
            CmpResult::Equal => "eq",
            CmpResult::Less => "lt",
            CmpResult::Greater => "gt",
            CmpResult::Fail => "cmp",
        }
        .to_string()
    }
}

/// 向きによっては否定を重ねて比較述語を作る
pub fn cmp_pred(which: CmpWhich) -> Box<dyn Pred> {
    let (want, positive) = match which {
        CmpWhich::Eq => (CmpResult::Equal, true),
        CmpWhich::Ne => (CmpResult::Equal, false),
        CmpWhich::Lt => (CmpResult::Less, true),
        CmpWhich::Ge => (CmpResult::Less, false),
        CmpWhich::Gt => (CmpResult::Greater, true),
        CmpWhich::Le => (CmpResult::Greater, false),
    };
    maybe_invert(Box::new(PredCmp { want }), positive)
}

/// positive でなければ述語を否定で包む
pub fn maybe_invert(pred: Box<dyn Pred>, positive: bool) -> Box<dyn Pred> {
    if positive {
        pred
    } else {
        Box::new(PredNot::new(pred))
    }
}

fn pop_cst(stk: &mut Stack) -> Result<Constant> {
    match stk.pop()?.kind {
        ValueKind::Const(c) => Ok(c),
        _ => anyhow::bail!("expected a constant"),
    }
}

fn pop_str(stk: &mut Stack) -> Result<String> {
    match stk.pop()?.kind {
        ValueKind::Str(s) => Ok(s),
        _ => anyhow::bail!("expected a string"),
    }
}

fn pop_seq(stk: &mut Stack) -> Result<Vec<Value>> {
    match stk.pop()?.kind {
        ValueKind::Seq(s) => Ok(s),
        _ => anyhow::bail!("expected a sequence"),
    }
}

/// 算術の種別
#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// 定数同士の算術
///
/// 記号的なドメインの値は対象外。結果のドメインは両辺が同じならそれ、
/// 違えば10進に落とす。
fn arith_cst(stk: &mut Stack, which: Arith) -> Result<Option<Value>> {
    let b = pop_cst(stk)?;
    let a = pop_cst(stk)?;

    if !a.dom().is_arith() || !b.dom().is_arith() {
        tracing::error!(
            "arithmetic on symbolic constants: `{}' and `{}'",
            a.show(),
            b.show()
        );
        return Ok(None);
    }

    let dom = if a.dom() == b.dom() { a.dom() } else { Domain::Dec };
    let (x, y) = (a.value(), b.value());

    let value: BigInt = match which {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => {
            if y.is_zero() {
                tracing::error!("division by zero");
                return Ok(None);
            }
            x / y
        }
        Arith::Mod => {
            if y.is_zero() {
                tracing::error!("division by zero");
                return Ok(None);
            }
            x % y
        }
    };

    Ok(Some(Value::cst(Constant::new(value, dom), 0)))
}

/// 文字列を1文字ずつ産出する
struct StrElemProducer {
    chars: Vec<char>,
    i: usize,
    forward: bool,
}

impl ValueProducer for StrElemProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        if self.i >= self.chars.len() {
            return Ok(None);
        }
        let idx = if self.forward {
            self.i
        } else {
            self.chars.len() - 1 - self.i
        };
        let v = Value::str(self.chars[idx].to_string(), self.i as u64);
        self.i += 1;
        Ok(Some(v))
    }
}

/// 部分列の探索。?find の本体
fn seq_contains(hay: &[Value], needle: &[Value]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if hay.len() < needle.len() {
        return false;
    }
    (0..=hay.len() - needle.len()).any(|i| {
        needle
            .iter()
            .zip(&hay[i..])
            .all(|(n, h)| n.cmp_value(h) == CmpResult::Equal)
    })
}

fn seq_pair(stk: &Stack) -> Result<(&Vec<Value>, &Vec<Value>)> {
    let needle = match &stk.checked_get(0)?.kind {
        ValueKind::Seq(s) => s,
        _ => anyhow::bail!("expected a sequence"),
    };
    let hay = match &stk.checked_get(1)?.kind {
        ValueKind::Seq(s) => s,
        _ => anyhow::bail!("expected a sequence"),
    };
    Ok((hay, needle))
}

fn str_pair(stk: &Stack) -> Result<(&String, &String)> {
    let needle = match &stk.checked_get(0)?.kind {
        ValueKind::Str(s) => s,
        _ => anyhow::bail!("expected a string"),
    };
    let hay = match &stk.checked_get(1)?.kind {
        ValueKind::Str(s) => s,
        _ => anyhow::bail!("expected a string"),
    };
    Ok((hay, needle))
}

fn yes_no(b: bool) -> PredResult {
    if b {
        PredResult::Yes
    } else {
        PredResult::No
    }
}

/// コア語彙を登録する
pub fn register(voc: &mut Vocabulary) {
    // スタック操作
    for (name, which) in [
        ("drop", Shuffle::Drop),
        ("dup", Shuffle::Dup),
        ("over", Shuffle::Over),
        ("swap", Shuffle::Swap),
        ("rot", Shuffle::Rot),
    ] {
        voc.add_simple_op(name, move |upstream| {
            Box::new(OpShuffle { upstream, which })
        });
    }

    voc.add_simple_op("apply", |upstream| Box::new(OpApply::new(upstream, false)));
    voc.add_simple_op("type", |upstream| Box::new(OpType { upstream }));
    voc.add_simple_op("pos", |upstream| Box::new(OpPos { upstream }));

    voc.add_const("true", Value::cst(Constant::new(1, Domain::Bool), 0));
    voc.add_const("false", Value::cst(Constant::new(0, Domain::Bool), 0));

    // 比較述語。?と!の両系列を対にして登録する
    for (base, which) in [
        ("eq", CmpWhich::Eq),
        ("ne", CmpWhich::Ne),
        ("lt", CmpWhich::Lt),
        ("le", CmpWhich::Le),
        ("gt", CmpWhich::Gt),
        ("ge", CmpWhich::Ge),
    ] {
        voc.add_simple_pred(base, move || cmp_pred(which));
    }

    // 算術
    for (name, which) in [
        ("add", Arith::Add),
        ("sub", Arith::Sub),
        ("mul", Arith::Mul),
        ("div", Arith::Div),
        ("mod", Arith::Mod),
    ] {
        voc.add_op_overload(
            name,
            once_overload(&[ValueType::Const, ValueType::Const], move |stk| {
                arith_cst(stk, which)
            }),
        );
    }

    // 文字列の連結と長さ
    voc.add_op_overload(
        "add",
        once_overload(&[ValueType::Str, ValueType::Str], |stk| {
            let b = pop_str(stk)?;
            let a = pop_str(stk)?;
            Ok(Some(Value::str(format!("{}{}", a, b), 0)))
        }),
    );
    voc.add_op_overload(
        "length",
        once_overload(&[ValueType::Str], |stk| {
            let s = pop_str(stk)?;
            Ok(Some(Value::cst(Constant::dec(s.chars().count() as u64), 0)))
        }),
    );

    // 列の連結と長さ
    voc.add_op_overload(
        "add",
        once_overload(&[ValueType::Seq, ValueType::Seq], |stk| {
            let b = pop_seq(stk)?;
            let mut a = pop_seq(stk)?;
            a.extend(b);
            Ok(Some(Value::seq(a, 0)))
        }),
    );
    voc.add_op_overload(
        "length",
        once_overload(&[ValueType::Seq], |stk| {
            let s = pop_seq(stk)?;
            Ok(Some(Value::cst(Constant::dec(s.len() as u64), 0)))
        }),
    );

    // 列と文字列の要素
    voc.add_op_overload(
        "elem",
        many_overload(&[ValueType::Seq], |stk| {
            let s = pop_seq(stk)?;
            Ok(Box::new(VecProducer::new(s)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "relem",
        many_overload(&[ValueType::Seq], |stk| {
            let mut s = pop_seq(stk)?;
            s.reverse();
            Ok(Box::new(VecProducer::new(s)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "elem",
        many_overload(&[ValueType::Str], |stk| {
            let s = pop_str(stk)?;
            Ok(Box::new(StrElemProducer {
                chars: s.chars().collect(),
                i: 0,
                forward: true,
            }) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "relem",
        many_overload(&[ValueType::Str], |stk| {
            let s = pop_str(stk)?;
            Ok(Box::new(StrElemProducer {
                chars: s.chars().collect(),
                i: 0,
                forward: false,
            }) as Box<dyn ValueProducer>)
        }),
    );

    // 空述語
    voc.add_pred_overload(
        "empty",
        pred_overload(&[ValueType::Seq], |stk| {
            match &stk.checked_get(0)?.kind {
                ValueKind::Seq(s) => Ok(yes_no(s.is_empty())),
                _ => anyhow::bail!("expected a sequence"),
            }
        }),
    );
    voc.add_pred_overload(
        "empty",
        pred_overload(&[ValueType::Str], |stk| {
            match &stk.checked_get(0)?.kind {
                ValueKind::Str(s) => Ok(yes_no(s.is_empty())),
                _ => anyhow::bail!("expected a string"),
            }
        }),
    );

    // 包含・前置・後置
    voc.add_pred_overload(
        "find",
        pred_overload(&[ValueType::Seq, ValueType::Seq], |stk| {
            let (hay, needle) = seq_pair(stk)?;
            Ok(yes_no(seq_contains(hay, needle)))
        }),
    );
    voc.add_pred_overload(
        "find",
        pred_overload(&[ValueType::Str, ValueType::Str], |stk| {
            let (hay, needle) = str_pair(stk)?;
            Ok(yes_no(hay.contains(needle.as_str())))
        }),
    );
    voc.add_pred_overload(
        "starts",
        pred_overload(&[ValueType::Seq, ValueType::Seq], |stk| {
            let (hay, needle) = seq_pair(stk)?;
            Ok(yes_no(
                hay.len() >= needle.len() && seq_eq(&hay[..needle.len()], needle),
            ))
        }),
    );
    voc.add_pred_overload(
        "starts",
        pred_overload(&[ValueType::Str, ValueType::Str], |stk| {
            let (hay, needle) = str_pair(stk)?;
            Ok(yes_no(hay.starts_with(needle.as_str())))
        }),
    );
    voc.add_pred_overload(
        "ends",
        pred_overload(&[ValueType::Seq, ValueType::Seq], |stk| {
            let (hay, needle) = seq_pair(stk)?;
            Ok(yes_no(
                hay.len() >= needle.len() && seq_eq(&hay[hay.len() - needle.len()..], needle),
            ))
        }),
    );
    voc.add_pred_overload(
        "ends",
        pred_overload(&[ValueType::Str, ValueType::Str], |stk| {
            let (hay, needle) = str_pair(stk)?;
            Ok(yes_no(hay.ends_with(needle.as_str())))
        }),
    );

    // 正規表現の全体一致
    voc.add_pred_overload(
        "match",
        pred_overload(&[ValueType::Str, ValueType::Str], |stk| {
            let (subject, pattern) = str_pair(stk)?;
            let re = match regex::Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) => re,
                Err(e) => {
                    tracing::error!("invalid regular expression `{}': {}", pattern, e);
                    return Ok(PredResult::Fail);
                }
            };
            Ok(yes_no(re.is_match(subject)))
        }),
    );
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.cmp_value(y) == CmpResult::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cst(n: i64) -> Value {
        Value::cst(Constant::dec(n), 0)
    }

    #[test]
    fn test_seq_contains() {
        let hay = vec![cst(1), cst(2), cst(3)];
        assert!(seq_contains(&hay, &[cst(2), cst(3)]));
        assert!(seq_contains(&hay, &[]));
        assert!(!seq_contains(&hay, &[cst(3), cst(2)]));
    }

    #[test]
    fn test_arith_domains() {
        let mut stk = Stack::new();
        stk.push(Value::cst(Constant::new(6, Domain::Hex), 0));
        stk.push(Value::cst(Constant::new(4, Domain::Hex), 0));
        let v = arith_cst(&mut stk, Arith::Add).unwrap().unwrap();
        match v.kind {
            ValueKind::Const(c) => {
                assert_eq!(c.show(), "0xa");
            }
            _ => panic!("expected constant"),
        }
    }

    #[test]
    fn test_arith_rejects_symbolic() {
        let mut stk = Stack::new();
        stk.push(Value::cst(Constant::new(1, Domain::Tag), 0));
        stk.push(Value::cst(Constant::dec(1), 0));
        assert!(arith_cst(&mut stk, Arith::Add).unwrap().is_none());
    }

    #[test]
    fn test_division_by_zero_drops() {
        let mut stk = Stack::new();
        stk.push(cst(5));
        stk.push(cst(0));
        assert!(arith_cst(&mut stk, Arith::Div).unwrap().is_none());
    }
}
