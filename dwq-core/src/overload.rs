//! オーバーロード解決
//!
//! 多相な語（child, elem, name など）は、TOS側の型コード列（セレクタ）から
//! 具体的な実装を引くオーバーロード表を持ちます。照合はスタックが増分維持
//! している型プロファイルに対して行い、該当がなければ一度だけ報告して
//! そのスタックを捨てます。

use crate::op::{Op, OpRef, Pred, PredResult};
use crate::stack::{Profile, Stack};
use crate::value::{Value, ValueType};
use crate::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// オーバーロードのセレクタ
///
/// 期待する型コードをTOS側から詰めたパターンで、スタックのプロファイルに
/// マスク付きで一致させます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    sel: Profile,
    mask: Profile,
}

impl Selector {
    /// 型の並びからセレクタを作る。最後の要素がTOS
    pub fn new(types: &[ValueType]) -> Self {
        let mut sel = 0;
        let mut mask = 0;
        for t in types {
            sel = (sel << 8) | t.code() as Profile;
            mask = (mask << 8) | 0xff;
        }
        Self { sel, mask }
    }

    /// プロファイルと照合する
    pub fn matches(&self, profile: Profile) -> bool {
        profile & self.mask == self.sel
    }
}

/// 値の産出器
///
/// many系オーバーロードが返す、値を1つずつ産む口。位置は産出器が振る。
pub trait ValueProducer {
    fn next(&mut self) -> Result<Option<Value>>;
}

/// 出来合いの値の並びを位置を振り直しながら産出する
pub struct VecProducer {
    values: std::vec::IntoIter<Value>,
    i: u64,
}

impl VecProducer {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
            i: 0,
        }
    }
}

impl ValueProducer for VecProducer {
    fn next(&mut self) -> Result<Option<Value>> {
        match self.values.next() {
            Some(mut v) => {
                v.pos = self.i;
                self.i += 1;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }
}

/// オーバーロード実体の産出形態
pub enum Yield {
    /// 産出なし（入力は消費して捨てる）
    None,
    /// ちょうど1つ
    One(Stack),
    /// 残りスタックに産出器の値を1つずつ積んで産出する
    Many(Stack, Box<dyn ValueProducer>),
}

/// 演算子オーバーロードの1実体
pub trait Overload {
    fn selector(&self) -> Selector;
    /// 照合済みのスタックを受け取り、引数を自分で降ろして産出する
    fn invoke(&self, stk: Stack) -> Result<Yield>;
}

/// once形式のオーバーロードを閉包から作る
///
/// 閉包は引数を降ろし、積むべき値を返す。Noneなら産出なし。
pub fn once_overload<F>(types: &[ValueType], f: F) -> Rc<dyn Overload>
where
    F: Fn(&mut Stack) -> Result<Option<Value>> + 'static,
{
    struct Once<F> {
        sel: Selector,
        f: F,
    }
    impl<F> Overload for Once<F>
    where
        F: Fn(&mut Stack) -> Result<Option<Value>>,
    {
        fn selector(&self) -> Selector {
            self.sel
        }
        fn invoke(&self, mut stk: Stack) -> Result<Yield> {
            match (self.f)(&mut stk)? {
                Some(value) => {
                    stk.push(value);
                    Ok(Yield::One(stk))
                }
                None => Ok(Yield::None),
            }
        }
    }
    Rc::new(Once {
        sel: Selector::new(types),
        f,
    })
}

/// many形式のオーバーロードを閉包から作る
pub fn many_overload<F>(types: &[ValueType], f: F) -> Rc<dyn Overload>
where
    F: Fn(&mut Stack) -> Result<Box<dyn ValueProducer>> + 'static,
{
    struct Many<F> {
        sel: Selector,
        f: F,
    }
    impl<F> Overload for Many<F>
    where
        F: Fn(&mut Stack) -> Result<Box<dyn ValueProducer>>,
    {
        fn selector(&self) -> Selector {
            self.sel
        }
        fn invoke(&self, mut stk: Stack) -> Result<Yield> {
            let producer = (self.f)(&mut stk)?;
            Ok(Yield::Many(stk, producer))
        }
    }
    Rc::new(Many {
        sel: Selector::new(types),
        f,
    })
}

/// 演算子オーバーロード表
#[derive(Default)]
pub struct OverloadTable {
    overloads: RefCell<Vec<Rc<dyn Overload>>>,
}

impl OverloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, overload: Rc<dyn Overload>) {
        self.overloads.borrow_mut().push(overload);
    }

    /// プロファイルに合う最初のオーバーロードを引く
    pub fn find(&self, profile: Profile) -> Option<Rc<dyn Overload>> {
        self.overloads
            .borrow()
            .iter()
            .find(|o| o.selector().matches(profile))
            .cloned()
    }
}

/// 実行時にスタックのプロファイルで実体へ振り分ける演算子
pub struct OpOverload {
    upstream: OpRef,
    word: String,
    table: Rc<OverloadTable>,
    state: Option<(Stack, Box<dyn ValueProducer>)>,
    warned: bool,
}

impl OpOverload {
    pub fn new(upstream: OpRef, word: impl Into<String>, table: Rc<OverloadTable>) -> Self {
        Self {
            upstream,
            word: word.into(),
            table,
            state: None,
            warned: false,
        }
    }
}

impl Op for OpOverload {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            if let Some((base, producer)) = &mut self.state {
                if let Some(value) = producer.next()? {
                    let mut stk = base.clone();
                    stk.push(value);
                    return Ok(Some(stk));
                }
                self.state = None;
            }

            match self.upstream.next()? {
                None => return Ok(None),
                Some(stk) => match self.table.find(stk.profile()) {
                    None => {
                        if !self.warned {
                            tracing::error!(
                                "no overload of `{}' matches the stack; dropping",
                                self.word
                            );
                            self.warned = true;
                        }
                    }
                    Some(overload) => match overload.invoke(stk)? {
                        Yield::None => {}
                        Yield::One(out) => return Ok(Some(out)),
                        Yield::Many(base, producer) => {
                            self.state = Some((base, producer));
                        }
                    },
                },
            }
        }
    }

    fn reset(&mut self) {
        self.state = None;
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("overload<{}>", self.word)
    }
}

/// 述語オーバーロードの1実体
pub trait PredOverload {
    fn selector(&self) -> Selector;
    fn result(&self, stk: &Stack) -> Result<PredResult>;
}

/// 述語オーバーロードを閉包から作る
pub fn pred_overload<F>(types: &[ValueType], f: F) -> Rc<dyn PredOverload>
where
    F: Fn(&Stack) -> Result<PredResult> + 'static,
{
    struct P<F> {
        sel: Selector,
        f: F,
    }
    impl<F> PredOverload for P<F>
    where
        F: Fn(&Stack) -> Result<PredResult>,
    {
        fn selector(&self) -> Selector {
            self.sel
        }
        fn result(&self, stk: &Stack) -> Result<PredResult> {
            (self.f)(stk)
        }
    }
    Rc::new(P {
        sel: Selector::new(types),
        f,
    })
}

/// 述語オーバーロード表
#[derive(Default)]
pub struct PredOverloadTable {
    overloads: RefCell<Vec<Rc<dyn PredOverload>>>,
}

impl PredOverloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, overload: Rc<dyn PredOverload>) {
        self.overloads.borrow_mut().push(overload);
    }

    pub fn find(&self, profile: Profile) -> Option<Rc<dyn PredOverload>> {
        self.overloads
            .borrow()
            .iter()
            .find(|o| o.selector().matches(profile))
            .cloned()
    }
}

/// 実行時に振り分ける述語
pub struct OverloadedPred {
    word: String,
    table: Rc<PredOverloadTable>,
    positive: bool,
    warned: bool,
}

impl OverloadedPred {
    pub fn new(word: impl Into<String>, table: Rc<PredOverloadTable>, positive: bool) -> Self {
        Self {
            word: word.into(),
            table,
            positive,
            warned: false,
        }
    }
}

impl Pred for OverloadedPred {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        match self.table.find(stk.profile()) {
            None => {
                if !self.warned {
                    tracing::error!(
                        "no overload of `{}' matches the stack; dropping",
                        self.word
                    );
                    self.warned = true;
                }
                Ok(PredResult::Fail)
            }
            Some(overload) => {
                let r = overload.result(stk)?;
                Ok(if self.positive { r } else { r.not() })
            }
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> String {
        self.word.clone()
    }
}

/// 語彙に登録される組み込みの形
#[derive(Clone)]
pub enum BuiltinDef {
    /// オーバーロードされた演算子
    Op(Rc<OverloadTable>),
    /// オーバーロードされた述語（?名と!名で共有）
    Pred {
        table: Rc<PredOverloadTable>,
        positive: bool,
    },
    /// 型に依らない演算子
    SimpleOp(Rc<dyn Fn(OpRef) -> OpRef>),
    /// 型に依らない述語
    SimplePred {
        build: Rc<dyn Fn() -> Box<dyn Pred>>,
        positive: bool,
    },
    /// 名前付き定数
    Const(Value),
}

/// 語から組み込みへの大文字小文字を区別する対応表
#[derive(Default)]
pub struct Vocabulary {
    words: BTreeMap<String, BuiltinDef>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 語を引く
    pub fn find(&self, name: &str) -> Option<&BuiltinDef> {
        self.words.get(name)
    }

    /// 演算子オーバーロードを登録する。既存の同名表へ追加する
    pub fn add_op_overload(&mut self, name: &str, overload: Rc<dyn Overload>) {
        if let Some(def) = self.words.get(name) {
            match def {
                BuiltinDef::Op(table) => table.add(overload),
                _ => debug_assert!(false, "word `{}' redefined with a different shape", name),
            }
            return;
        }
        let table = Rc::new(OverloadTable::new());
        table.add(overload);
        self.words.insert(name.to_string(), BuiltinDef::Op(table));
    }

    /// 述語オーバーロードを登録する。?名と!名の両方が引けるようになる
    pub fn add_pred_overload(&mut self, base: &str, overload: Rc<dyn PredOverload>) {
        let positive = format!("?{}", base);
        if let Some(def) = self.words.get(&positive) {
            match def {
                BuiltinDef::Pred { table, .. } => table.add(overload),
                _ => debug_assert!(false, "word `?{}' redefined with a different shape", base),
            }
            return;
        }
        let table = Rc::new(PredOverloadTable::new());
        table.add(overload);
        self.words.insert(
            positive,
            BuiltinDef::Pred {
                table: Rc::clone(&table),
                positive: true,
            },
        );
        self.words.insert(
            format!("!{}", base),
            BuiltinDef::Pred {
                table,
                positive: false,
            },
        );
    }

    /// 型に依らない演算子を登録する
    pub fn add_simple_op<F>(&mut self, name: &str, build: F)
    where
        F: Fn(OpRef) -> OpRef + 'static,
    {
        self.words
            .insert(name.to_string(), BuiltinDef::SimpleOp(Rc::new(build)));
    }

    /// 型に依らない述語を?名と!名で登録する
    pub fn add_simple_pred<F>(&mut self, base: &str, build: F)
    where
        F: Fn() -> Box<dyn Pred> + 'static,
    {
        let build: Rc<dyn Fn() -> Box<dyn Pred>> = Rc::new(build);
        self.words.insert(
            format!("?{}", base),
            BuiltinDef::SimplePred {
                build: Rc::clone(&build),
                positive: true,
            },
        );
        self.words.insert(
            format!("!{}", base),
            BuiltinDef::SimplePred {
                build,
                positive: false,
            },
        );
    }

    /// 名前付き定数を登録する
    pub fn add_const(&mut self, name: &str, value: Value) {
        self.words.insert(name.to_string(), BuiltinDef::Const(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_tos() {
        let sel = Selector::new(&[ValueType::Seq, ValueType::Seq]);
        let code = ValueType::Seq.code() as Profile;
        let profile = (code << 8) | code;
        assert!(sel.matches(profile));
        // 下に余計な値があっても上2つが合えばよい
        let deeper = (0x01 << 16) | profile;
        assert!(sel.matches(deeper));
        // TOSの型違い
        let other = (code << 8) | ValueType::Str.code() as Profile;
        assert!(!sel.matches(other));
    }

    #[test]
    fn test_selector_arity_excludes_short_stacks() {
        let sel = Selector::new(&[ValueType::Const, ValueType::Const]);
        let one = ValueType::Const.code() as Profile;
        assert!(!sel.matches(one));
    }
}
