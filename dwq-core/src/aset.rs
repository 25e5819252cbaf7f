//! アドレス集合とロケーション式の語彙
//!
//! 正規形のアドレス被覆に対する構成・合成・検査の語を登録します。
//! ロケーションリスト要素の命令列挙もここにあります。

use crate::cst::{Constant, Domain};
use crate::op::PredResult;
use crate::overload::{
    many_overload, once_overload, pred_overload, VecProducer, ValueProducer, Vocabulary,
};
use crate::stack::Stack;
use crate::value::{Value, ValueKind, ValueType};
use crate::Result;
use dwq_dwarf::Coverage;
use num::ToPrimitive;

fn pop_aset(stk: &mut Stack) -> Result<Coverage> {
    match stk.pop()?.kind {
        ValueKind::Aset(cov) => Ok(cov),
        _ => anyhow::bail!("expected an address set"),
    }
}

fn get_aset(stk: &Stack, depth: usize) -> Result<&Coverage> {
    match &stk.checked_get(depth)?.kind {
        ValueKind::Aset(cov) => Ok(cov),
        _ => anyhow::bail!("expected an address set"),
    }
}

/// 定数をアドレスとして読む。大きすぎる値は報告して捨てる
fn pop_address(stk: &mut Stack) -> Result<Option<u64>> {
    let c = match stk.pop()?.kind {
        ValueKind::Const(c) => c,
        _ => anyhow::bail!("expected a constant"),
    };
    match c.value().to_u64() {
        Some(v) => Ok(Some(v)),
        None => {
            tracing::error!("constant `{}' does not fit an address", c.show());
            Ok(None)
        }
    }
}

fn aset_value(cov: Coverage) -> Value {
    Value::new(ValueKind::Aset(cov), 0)
}

/// アドレス集合の個々のアドレスを産出する
struct AsetElemProducer {
    cov: Coverage,
    idx: usize,
    ai: u64,
    i: u64,
    forward: bool,
}

impl AsetElemProducer {
    fn new(cov: Coverage, forward: bool) -> Self {
        Self {
            cov,
            idx: 0,
            ai: 0,
            i: 0,
            forward,
        }
    }
}

impl AsetElemProducer {
    fn range_at(&self, idx: usize) -> dwq_dwarf::CovRange {
        if self.forward {
            self.cov.at(idx)
        } else {
            self.cov.at(self.cov.len() - 1 - idx)
        }
    }
}

impl ValueProducer for AsetElemProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        if self.idx >= self.cov.len() {
            return Ok(None);
        }

        if self.ai >= self.range_at(self.idx).length {
            self.idx += 1;
            if self.idx >= self.cov.len() {
                return Ok(None);
            }
            self.ai = 0;
        }

        let range = self.range_at(self.idx);
        let ai = if self.forward {
            self.ai
        } else {
            range.length - 1 - self.ai
        };
        let addr = range.start + ai;
        self.ai += 1;

        let v = Value::cst(Constant::new(addr, Domain::Address), self.i);
        self.i += 1;
        Ok(Some(v))
    }
}

/// アドレス集合とロケーション式の語を登録する
pub fn register(voc: &mut Vocabulary) {
    // 2定数から区間を作る。高い側は含まれない
    voc.add_op_overload(
        "aset",
        once_overload(&[ValueType::Const, ValueType::Const], |stk| {
            let b = match pop_address(stk)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let a = match pop_address(stk)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let mut cov = Coverage::new();
            cov.add(lo, hi - lo);
            Ok(Some(aset_value(cov)))
        }),
    );

    // 合併
    voc.add_op_overload(
        "add",
        once_overload(&[ValueType::Aset, ValueType::Const], |stk| {
            let b = match pop_address(stk)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let mut cov = pop_aset(stk)?;
            cov.add(b, 1);
            Ok(Some(aset_value(cov)))
        }),
    );
    voc.add_op_overload(
        "add",
        once_overload(&[ValueType::Aset, ValueType::Aset], |stk| {
            let b = pop_aset(stk)?;
            let mut a = pop_aset(stk)?;
            a.add_all(&b);
            Ok(Some(aset_value(a)))
        }),
    );

    // 差
    voc.add_op_overload(
        "sub",
        once_overload(&[ValueType::Aset, ValueType::Const], |stk| {
            let b = match pop_address(stk)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let mut cov = pop_aset(stk)?;
            cov.remove(b, 1);
            Ok(Some(aset_value(cov)))
        }),
    );
    voc.add_op_overload(
        "sub",
        once_overload(&[ValueType::Aset, ValueType::Aset], |stk| {
            let b = pop_aset(stk)?;
            let mut a = pop_aset(stk)?;
            a.remove_all(&b);
            Ok(Some(aset_value(a)))
        }),
    );

    // 共通部分
    voc.add_op_overload(
        "overlap",
        once_overload(&[ValueType::Aset, ValueType::Aset], |stk| {
            let b = pop_aset(stk)?;
            let a = pop_aset(stk)?;
            let mut out = Coverage::new();
            for r in b.iter() {
                out.add_all(&a.intersect(r.start, r.length));
            }
            Ok(Some(aset_value(out)))
        }),
    );

    // 被覆アドレス数
    voc.add_op_overload(
        "length",
        once_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            Ok(Some(Value::cst(Constant::dec(cov.total_length()), 0)))
        }),
    );

    // 連続区間ごとに1つずつの集合にほどく
    voc.add_op_overload(
        "range",
        many_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            let ranges = cov
                .iter()
                .map(|r| {
                    let mut c = Coverage::new();
                    c.add(r.start, r.length);
                    aset_value(c)
                })
                .collect();
            Ok(Box::new(VecProducer::new(ranges)) as Box<dyn ValueProducer>)
        }),
    );

    // 最小・最大アドレス。空なら産出しない
    voc.add_op_overload(
        "low",
        once_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            if cov.is_empty() {
                return Ok(None);
            }
            Ok(Some(Value::cst(
                Constant::new(cov.at(0).start, Domain::Address),
                0,
            )))
        }),
    );
    voc.add_op_overload(
        "high",
        once_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            if cov.is_empty() {
                return Ok(None);
            }
            Ok(Some(Value::cst(
                Constant::new(cov.at(cov.len() - 1).end(), Domain::Address),
                0,
            )))
        }),
    );

    // 個々のアドレスの列挙
    voc.add_op_overload(
        "elem",
        many_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            Ok(Box::new(AsetElemProducer::new(cov, true)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "relem",
        many_overload(&[ValueType::Aset], |stk| {
            let cov = pop_aset(stk)?;
            Ok(Box::new(AsetElemProducer::new(cov, false)) as Box<dyn ValueProducer>)
        }),
    );

    // ロケーションリスト要素の命令列挙
    voc.add_op_overload(
        "elem",
        many_overload(&[ValueType::LoclistElem], |stk| {
            let elem = match stk.pop()?.kind {
                ValueKind::LoclistElem(e) => e,
                _ => anyhow::bail!("expected a location list element"),
            };
            let ops = crate::atval::expr_ops(&elem)?;
            let values = ops
                .into_iter()
                .map(|op| Value::new(ValueKind::LoclistOp(op), 0))
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );
    voc.add_op_overload(
        "relem",
        many_overload(&[ValueType::LoclistElem], |stk| {
            let elem = match stk.pop()?.kind {
                ValueKind::LoclistElem(e) => e,
                _ => anyhow::bail!("expected a location list element"),
            };
            let mut ops = crate::atval::expr_ops(&elem)?;
            ops.reverse();
            let values = ops
                .into_iter()
                .map(|op| Value::new(ValueKind::LoclistOp(op), 0))
                .collect();
            Ok(Box::new(VecProducer::new(values)) as Box<dyn ValueProducer>)
        }),
    );

    // 包含。TOSの定数または集合が、下の集合に覆われているか
    voc.add_pred_overload(
        "contains",
        pred_overload(&[ValueType::Aset, ValueType::Const], |stk| {
            let c = match &stk.checked_get(0)?.kind {
                ValueKind::Const(c) => c,
                _ => anyhow::bail!("expected a constant"),
            };
            let cov = get_aset(stk, 1)?;
            match c.value().to_u64() {
                Some(addr) => Ok(yes_no(cov.is_covered(addr, 1))),
                None => Ok(PredResult::No),
            }
        }),
    );
    voc.add_pred_overload(
        "contains",
        pred_overload(&[ValueType::Aset, ValueType::Aset], |stk| {
            let b = get_aset(stk, 0)?;
            let a = get_aset(stk, 1)?;
            Ok(yes_no(b.iter().all(|r| a.is_covered(r.start, r.length))))
        }),
    );

    voc.add_pred_overload(
        "overlaps",
        pred_overload(&[ValueType::Aset, ValueType::Aset], |stk| {
            let b = get_aset(stk, 0)?;
            let a = get_aset(stk, 1)?;
            Ok(yes_no(b.iter().any(|r| a.is_overlap(r.start, r.length))))
        }),
    );

    voc.add_pred_overload(
        "empty",
        pred_overload(&[ValueType::Aset], |stk| {
            Ok(yes_no(get_aset(stk, 0)?.is_empty()))
        }),
    );
}

fn yes_no(b: bool) -> PredResult {
    if b {
        PredResult::Yes
    } else {
        PredResult::No
    }
}
