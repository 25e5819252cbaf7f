//! レキシカルフレームとクロージャ
//!
//! フレームは束縛値を入れる固定長のスロット配列で、親フレームへの
//! リンクを持ちます。クロージャは解決済みのコード片と、それが作られた
//! 時点のフレームを捕捉します。
//!
//! クロージャが自分を格納しているフレームを捕捉すると参照の循環になる
//! ため、スコープを抜けるときに「そのフレームを参照しているのが自分の
//! スロット内のクロージャだけ」になったら後方参照を切ります。

use crate::build::RNode;
use crate::value::{Value, ValueKind};
use crate::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// 変数スロットの番号
pub type VarId = usize;

/// レキシカルフレーム
#[derive(Debug)]
pub struct Frame {
    parent: Option<Rc<RefCell<Frame>>>,
    values: Vec<Option<Value>>,
}

impl Frame {
    /// 親フレームの下に新しいフレームを作る
    pub fn fresh(parent: Option<Rc<RefCell<Frame>>>, size: usize) -> Rc<RefCell<Frame>> {
        Rc::new(RefCell::new(Frame {
            parent,
            values: vec![None; size],
        }))
    }

    /// 親フレーム
    pub fn parent(&self) -> Option<Rc<RefCell<Frame>>> {
        self.parent.clone()
    }

    /// スロットに値を束縛する
    pub fn bind_value(&mut self, index: VarId, value: Value) {
        self.values[index] = Some(value);
    }

    /// スロットの値を複製して読む
    pub fn read_value(&self, index: VarId) -> Result<Value> {
        match &self.values[index] {
            Some(value) => Ok(value.clone()),
            None => anyhow::bail!("read of unbound variable slot {}", index),
        }
    }
}

/// スコープ終了時の循環切断
///
/// フレームへの残りの参照が、フレーム自身のスロットに入っている
/// クロージャの捕捉分と呼び出し元の1本だけなら、クロージャ側の
/// 捕捉を外して参照数を落とす。
pub fn maybe_unlink_frame(frame: &Rc<RefCell<Frame>>) {
    let holders = {
        let f = frame.borrow();
        f.values
            .iter()
            .flatten()
            .filter(|v| match &v.kind {
                ValueKind::Closure(c) => c.captures(frame),
                _ => false,
            })
            .count()
    };

    if holders > 0 && Rc::strong_count(frame) == holders + 1 {
        let mut f = frame.borrow_mut();
        for slot in f.values.iter_mut().flatten() {
            if let ValueKind::Closure(c) = &mut slot.kind {
                if c.captures(frame) {
                    c.release_frame();
                }
            }
        }
    }
}

/// クロージャ値
///
/// 解決済みのコード片と捕捉フレームの組。複製はコードとフレームを
/// 共有します。
#[derive(Debug, Clone)]
pub struct Closure {
    body: Rc<RNode>,
    frame: Option<Rc<RefCell<Frame>>>,
}

impl Closure {
    pub fn new(body: Rc<RNode>, frame: Option<Rc<RefCell<Frame>>>) -> Self {
        Self { body, frame }
    }

    /// クロージャ本体のコード
    pub fn body(&self) -> Rc<RNode> {
        Rc::clone(&self.body)
    }

    /// 捕捉したフレーム
    pub fn frame(&self) -> Option<Rc<RefCell<Frame>>> {
        self.frame.clone()
    }

    /// このクロージャが指定のフレームを捕捉しているか
    pub fn captures(&self, frame: &Rc<RefCell<Frame>>) -> bool {
        match &self.frame {
            Some(f) => Rc::ptr_eq(f, frame),
            None => false,
        }
    }

    /// 捕捉フレームを手放す（循環切断用）
    pub fn release_frame(&mut self) {
        self.frame = None;
    }

    /// 比較用の同一性キー
    pub fn identity(&self) -> (usize, usize) {
        let body = Rc::as_ptr(&self.body) as *const () as usize;
        let frame = self
            .frame
            .as_ref()
            .map(|f| Rc::as_ptr(f) as usize)
            .unwrap_or(0);
        (body, frame)
    }
}
