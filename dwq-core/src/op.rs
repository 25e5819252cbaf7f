//! 演算子プロトコルと構造演算子
//!
//! すべての演算子は「結果スタックを1つ引き出す next」「構築直後の状態へ戻す
//! reset」「診断用の name」を備えます。グラフの葉は origin で、外から
//! 据え付けられたスタックをちょうど1回だけ産出します。
//!
//! 部分パイプライン（条件・捕捉・閉包など）は (origin, 演算子列) の組で
//! 持ち、新しい入力を据える前に必ず reset を伝播させます。

use crate::frame::{maybe_unlink_frame, Frame};
use crate::stack::Stack;
use crate::value::{Value, ValueKind};
use crate::Result;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

/// 演算子のプル型インターフェース
pub trait Op {
    /// 結果スタックを1つ産出する。尽きたらNone
    fn next(&mut self) -> Result<Option<Stack>>;
    /// 自分と配下の演算子を構築直後の状態へ戻す
    fn reset(&mut self);
    /// 診断用の名前
    fn name(&self) -> String;
}

/// 所有された演算子
pub type OpRef = Box<dyn Op>;

/// 述語の三値結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredResult {
    No,
    Yes,
    Fail,
}

impl PredResult {
    /// 否定。Failは伝播する
    pub fn not(self) -> Self {
        match self {
            PredResult::No => PredResult::Yes,
            PredResult::Yes => PredResult::No,
            PredResult::Fail => PredResult::Fail,
        }
    }
}

/// 述語
pub trait Pred {
    fn result(&mut self, stk: &Stack) -> Result<PredResult>;
    fn reset(&mut self);
    fn name(&self) -> String;
}

/// 推移閉包の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrKind {
    /// 0回以上（入力も産出する）
    Star,
    /// 1回以上
    Plus,
}

#[derive(Debug, Default)]
struct OriginState {
    stk: Option<Stack>,
    reset: bool,
}

/// パイプラインの起点
///
/// fresh → armed（set_next） → drained（next） の一方通行で、
/// reset で fresh に戻ります。ハンドルは複製して共有できます。
#[derive(Clone)]
pub struct Origin {
    state: Rc<RefCell<OriginState>>,
}

impl Origin {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(OriginState {
                stk: None,
                reset: true,
            })),
        }
    }

    /// 次に産出するスタックを据える
    ///
    /// 直前に reset が伝播してきていることが前提。
    pub fn set_next(&self, stk: Stack) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.stk.is_none(), "origin armed twice");
        debug_assert!(state.reset, "set_next without preceding reset");
        state.reset = false;
        state.stk = Some(stk);
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl Op for Origin {
    fn next(&mut self) -> Result<Option<Stack>> {
        Ok(self.state.borrow_mut().stk.take())
    }

    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.stk = None;
        state.reset = true;
    }

    fn name(&self) -> String {
        "origin".to_string()
    }
}

/// 素通し
pub struct OpNop {
    upstream: OpRef,
}

impl OpNop {
    pub fn new(upstream: OpRef) -> Self {
        Self { upstream }
    }
}

impl Op for OpNop {
    fn next(&mut self) -> Result<Option<Stack>> {
        self.upstream.next()
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "nop".to_string()
    }
}

/// 定数を積む
pub struct OpConst {
    upstream: OpRef,
    value: Value,
}

impl OpConst {
    pub fn new(upstream: OpRef, value: Value) -> Self {
        Self { upstream, value }
    }
}

impl Op for OpConst {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            stk.push(self.value.clone());
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("const<{}>", self.value.show())
    }
}

/// 述語が成り立つスタックだけ通す
///
/// Fail は No と同じ扱い（報告は述語側で済んでいる）。
pub struct OpAssert {
    upstream: OpRef,
    pred: Box<dyn Pred>,
}

impl OpAssert {
    pub fn new(upstream: OpRef, pred: Box<dyn Pred>) -> Self {
        Self { upstream, pred }
    }
}

impl Op for OpAssert {
    fn next(&mut self) -> Result<Option<Stack>> {
        while let Some(stk) = self.upstream.next()? {
            if self.pred.result(&stk)? == PredResult::Yes {
                return Ok(Some(stk));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.pred.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("assert<{}>", self.pred.name())
    }
}

/// 最初に産出した分岐だけを使う選択
pub struct OpOr {
    upstream: OpRef,
    branches: Vec<(Origin, OpRef)>,
    active: Option<usize>,
}

impl OpOr {
    pub fn new(upstream: OpRef, branches: Vec<(Origin, OpRef)>) -> Self {
        Self {
            upstream,
            branches,
            active: None,
        }
    }

    fn reset_me(&mut self) {
        self.active = None;
        for (_, op) in &mut self.branches {
            op.reset();
        }
    }
}

impl Op for OpOr {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            while self.active.is_none() {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some(stk) => {
                        for i in 0..self.branches.len() {
                            let (origin, op) = &mut self.branches[i];
                            op.reset();
                            origin.set_next(stk.clone());
                            if let Some(out) = op.next()? {
                                self.active = Some(i);
                                return Ok(Some(out));
                            }
                        }
                    }
                }
            }

            let i = self.active.expect("active branch");
            if let Some(out) = self.branches[i].1.next()? {
                return Ok(Some(out));
            }
            self.reset_me();
        }
    }

    fn reset(&mut self) {
        self.reset_me();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        let names: Vec<_> = self.branches.iter().map(|(_, op)| op.name()).collect();
        format!("or<{}>", names.join(" || "))
    }
}

/// 条件を1回だけ確かめて then / else の一方を走らせる
pub struct OpIfElse {
    upstream: OpRef,
    cond: (Origin, OpRef),
    then_branch: (Origin, OpRef),
    else_branch: (Origin, OpRef),
    sel: Option<bool>,
}

impl OpIfElse {
    pub fn new(
        upstream: OpRef,
        cond: (Origin, OpRef),
        then_branch: (Origin, OpRef),
        else_branch: (Origin, OpRef),
    ) -> Self {
        Self {
            upstream,
            cond,
            then_branch,
            else_branch,
            sel: None,
        }
    }
}

impl Op for OpIfElse {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            if self.sel.is_none() {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some(stk) => {
                        self.cond.1.reset();
                        self.cond.0.set_next(stk.clone());
                        let taken = self.cond.1.next()?.is_some();
                        self.sel = Some(taken);

                        let branch = if taken {
                            &mut self.then_branch
                        } else {
                            &mut self.else_branch
                        };
                        branch.1.reset();
                        branch.0.set_next(stk);
                    }
                }
            }

            let branch = if self.sel == Some(true) {
                &mut self.then_branch
            } else {
                &mut self.else_branch
            };
            if let Some(stk) = branch.1.next()? {
                return Ok(Some(stk));
            }
            self.sel = None;
        }
    }

    fn reset(&mut self) {
        self.sel = None;
        self.cond.1.reset();
        self.then_branch.1.reset();
        self.else_branch.1.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "ifelse".to_string()
    }
}

/// 部分式を走り切り、各結果のTOSを列に集めて積む
pub struct OpCapture {
    upstream: OpRef,
    origin: Origin,
    op: OpRef,
}

impl OpCapture {
    pub fn new(upstream: OpRef, origin: Origin, op: OpRef) -> Self {
        Self {
            upstream,
            origin,
            op,
        }
    }
}

impl Op for OpCapture {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            self.op.reset();
            self.origin.set_next(stk.clone());

            let mut values = Vec::new();
            while let Some(mut out) = self.op.next()? {
                values.push(out.pop()?);
            }

            stk.push(Value::seq(values, 0));
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.op.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("capture<{}>", self.op.name())
    }
}

/// 部分式を元のスタックの脇で評価し、上位keep個だけ持ち帰る
pub struct OpSubx {
    upstream: OpRef,
    origin: Origin,
    op: OpRef,
    keep: usize,
    stk: Option<Stack>,
}

impl OpSubx {
    pub fn new(upstream: OpRef, origin: Origin, op: OpRef, keep: usize) -> Self {
        Self {
            upstream,
            origin,
            op,
            keep,
            stk: None,
        }
    }
}

impl Op for OpSubx {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            while self.stk.is_none() {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some(stk) => {
                        self.op.reset();
                        self.origin.set_next(stk.clone());
                        self.stk = Some(stk);
                    }
                }
            }

            if let Some(mut out) = self.op.next()? {
                let mut ret = self.stk.clone().expect("seeded");
                let mut kept = Vec::new();
                for _ in 0..self.keep {
                    kept.push(out.pop()?);
                }
                while let Some(v) = kept.pop() {
                    ret.push(v);
                }
                return Ok(Some(ret));
            }

            self.stk = None;
        }
    }

    fn reset(&mut self) {
        self.stk = None;
        self.op.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("subx<{}>", self.op.name())
    }
}

/// 推移閉包
///
/// 作業リストのスタックを本体に流し込み、産出されたスタックを重複排除
/// しながら産出し直します。上流から新しいスタックが来るたびに既出集合を
/// 空にします。star は入力そのものも産出します。
pub struct OpTrClosure {
    upstream: OpRef,
    origin: Origin,
    op: OpRef,
    is_plus: bool,
    op_drained: bool,
    worklist: Vec<Stack>,
    seen: BTreeSet<Stack>,
}

impl OpTrClosure {
    pub fn new(upstream: OpRef, origin: Origin, op: OpRef, kind: TrKind) -> Self {
        Self {
            upstream,
            origin,
            op,
            is_plus: kind == TrKind::Plus,
            op_drained: true,
            worklist: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    fn yield_and_cache(&mut self, stk: Stack) -> Option<Stack> {
        if self.seen.insert(stk.clone()) {
            self.worklist.push(stk.clone());
            Some(stk)
        } else {
            None
        }
    }

    fn next_from_upstream(&mut self) -> Result<Option<Stack>> {
        // 新しい上流スタックは新しい文脈。既出集合を忘れないと、
        // 上流の2本目以降で産出がまるごと潰れてしまう
        self.seen.clear();
        self.upstream.next()
    }

    fn next_from_op(&mut self) -> Result<Option<Stack>> {
        if self.op_drained {
            return Ok(None);
        }
        match self.op.next()? {
            Some(stk) => Ok(Some(stk)),
            None => {
                self.op_drained = true;
                Ok(None)
            }
        }
    }

    fn seed(&mut self, stk: Stack) {
        self.op.reset();
        self.origin.set_next(stk);
        self.op_drained = false;
    }

    fn send_to_op(&mut self) -> Result<bool> {
        if let Some(stk) = self.worklist.pop() {
            self.seed(stk);
            return Ok(true);
        }
        if self.is_plus {
            if let Some(stk) = self.next_from_upstream()? {
                self.seed(stk);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Op for OpTrClosure {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            while let Some(stk) = self.next_from_op()? {
                if let Some(ret) = self.yield_and_cache(stk) {
                    return Ok(Some(ret));
                }
            }
            if !self.send_to_op()? {
                break;
            }
        }

        if !self.is_plus {
            if let Some(stk) = self.next_from_upstream()? {
                return Ok(self.yield_and_cache(stk));
            }
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.worklist.clear();
        self.seen.clear();
        self.op_drained = true;
        self.op.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("close<{}>", self.op.name())
    }
}

/// 本体の間だけ新しいフレームを張るスコープ
pub struct OpScope {
    upstream: OpRef,
    origin: Origin,
    op: OpRef,
    num_vars: usize,
    primed: bool,
}

impl OpScope {
    pub fn new(upstream: OpRef, origin: Origin, op: OpRef, num_vars: usize) -> Self {
        Self {
            upstream,
            origin,
            op,
            num_vars,
            primed: false,
        }
    }
}

impl Op for OpScope {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            while !self.primed {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some(mut stk) => {
                        stk.set_frame(Some(Frame::fresh(stk.frame(), self.num_vars)));
                        self.op.reset();
                        self.origin.set_next(stk);
                        self.primed = true;
                    }
                }
            }

            if let Some(mut stk) = self.op.next()? {
                let of = stk.frame();
                let parent = stk.nth_frame(1);
                stk.set_frame(parent);
                if let Some(of) = of {
                    maybe_unlink_frame(&of);
                }
                return Ok(Some(stk));
            }

            self.primed = false;
        }
    }

    fn reset(&mut self) {
        self.primed = false;
        self.op.reset();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("scope<vars={}, {}>", self.num_vars, self.op.name())
    }
}

/// TOSをフレームのスロットへ束縛する
pub struct OpBind {
    upstream: OpRef,
    depth: usize,
    index: usize,
}

impl OpBind {
    pub fn new(upstream: OpRef, depth: usize, index: usize) -> Self {
        Self {
            upstream,
            depth,
            index,
        }
    }
}

impl Op for OpBind {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            let frame = stk
                .nth_frame(self.depth)
                .ok_or_else(|| anyhow::anyhow!("bind outside of any scope"))?;
            let value = stk.pop()?;
            frame.borrow_mut().bind_value(self.index, value);
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("bind<{}@{}>", self.index, self.depth)
    }
}

/// フレームのスロットの複製を積む
pub struct OpRead {
    upstream: OpRef,
    depth: usize,
    index: usize,
}

impl OpRead {
    pub fn new(upstream: OpRef, depth: usize, index: usize) -> Self {
        Self {
            upstream,
            depth,
            index,
        }
    }
}

impl Op for OpRead {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            let frame = stk
                .nth_frame(self.depth)
                .ok_or_else(|| anyhow::anyhow!("variable read outside of any scope"))?;
            let value = frame.borrow().read_value(self.index)?;
            stk.push(value);
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        format!("read<{}@{}>", self.index, self.depth)
    }
}

/// 現在のフレームを捕捉したクロージャ値を積む
pub struct OpLexClosure {
    upstream: OpRef,
    body: Rc<crate::build::RNode>,
}

impl OpLexClosure {
    pub fn new(upstream: OpRef, body: Rc<crate::build::RNode>) -> Self {
        Self { upstream, body }
    }
}

impl Op for OpLexClosure {
    fn next(&mut self) -> Result<Option<Stack>> {
        if let Some(mut stk) = self.upstream.next()? {
            let closure = crate::frame::Closure::new(Rc::clone(&self.body), stk.frame());
            stk.push(Value::new(ValueKind::Closure(closure), 0));
            return Ok(Some(stk));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "lex_closure".to_string()
    }
}

/// TOSのクロージャを適用する
///
/// 捕捉フレームを現在のフレームとして本体を走らせ、産出のたびに元の
/// フレームへ戻します。lenient だと非クロージャのTOSは素通しになり、
/// 変数読み出しの後段として使われます。
pub struct OpApply {
    upstream: OpRef,
    skip_non_closures: bool,
    op: Option<OpRef>,
    old_frame: Option<Option<Rc<RefCell<Frame>>>>,
}

impl OpApply {
    pub fn new(upstream: OpRef, skip_non_closures: bool) -> Self {
        Self {
            upstream,
            skip_non_closures,
            op: None,
            old_frame: None,
        }
    }

    fn reset_me(&mut self) {
        self.op = None;
        if let Some(Some(frame)) = self.old_frame.take() {
            maybe_unlink_frame(&frame);
        }
        self.old_frame = None;
    }
}

impl Op for OpApply {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            while self.op.is_none() {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some(mut stk) => {
                        if !matches!(stk.top()?.kind, ValueKind::Closure(_)) {
                            if self.skip_non_closures {
                                return Ok(Some(stk));
                            }
                            tracing::error!("`apply' expects a T_CLOSURE on TOS");
                            continue;
                        }

                        let value = stk.pop()?;
                        let closure = match value.kind {
                            ValueKind::Closure(c) => c,
                            _ => unreachable!("checked above"),
                        };

                        debug_assert!(self.old_frame.is_none());
                        self.old_frame = Some(stk.frame());
                        stk.set_frame(closure.frame());

                        let origin = Origin::new();
                        origin.set_next(stk);
                        let op =
                            crate::build::build_exec(&closure.body(), Box::new(origin))?;
                        self.op = Some(op);
                    }
                }
            }

            if let Some(mut stk) = self.op.as_mut().expect("op set").next()? {
                let of = stk.frame();
                stk.set_frame(self.old_frame.clone().flatten());
                if let Some(of) = of {
                    maybe_unlink_frame(&of);
                }
                return Ok(Some(stk));
            }

            self.reset_me();
        }
    }

    fn reset(&mut self) {
        self.reset_me();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "apply".to_string()
    }
}

/// 文字列化パイプラインの1段が返す (スタック, 部分文字列) の対
pub type StringerPair = (Stack, String);

/// フォーマット文字列を実現する文字列化パイプライン
pub trait Stringer {
    fn next(&mut self) -> Result<Option<StringerPair>>;
    fn reset(&mut self);
}

#[derive(Default)]
struct StringerOriginState {
    stk: Option<Stack>,
    reset: bool,
}

/// 文字列化パイプラインの起点
#[derive(Clone)]
pub struct StringerOrigin {
    state: Rc<RefCell<StringerOriginState>>,
}

impl StringerOrigin {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StringerOriginState {
                stk: None,
                reset: true,
            })),
        }
    }

    pub fn set_next(&self, stk: Stack) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.stk.is_none(), "stringer origin armed twice");
        debug_assert!(state.reset, "set_next without preceding reset");
        state.reset = false;
        state.stk = Some(stk);
    }
}

impl Default for StringerOrigin {
    fn default() -> Self {
        Self::new()
    }
}

impl Stringer for StringerOrigin {
    fn next(&mut self) -> Result<Option<StringerPair>> {
        Ok(self.state.borrow_mut().stk.take().map(|stk| (stk, String::new())))
    }

    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.stk = None;
        state.reset = true;
    }
}

/// 固定文字列を前置する段
pub struct StringerLit {
    upstream: Box<dyn Stringer>,
    text: String,
}

impl StringerLit {
    pub fn new(upstream: Box<dyn Stringer>, text: String) -> Self {
        Self { upstream, text }
    }
}

impl Stringer for StringerLit {
    fn next(&mut self) -> Result<Option<StringerPair>> {
        match self.upstream.next()? {
            None => Ok(None),
            Some((stk, acc)) => Ok(Some((stk, format!("{}{}", self.text, acc)))),
        }
    }

    fn reset(&mut self) {
        self.upstream.reset();
    }
}

/// 部分式を走らせ、そのTOSの表示を前置する段
pub struct StringerOp {
    upstream: Box<dyn Stringer>,
    origin: Origin,
    op: OpRef,
    have: bool,
    acc: String,
}

impl StringerOp {
    pub fn new(upstream: Box<dyn Stringer>, origin: Origin, op: OpRef) -> Self {
        Self {
            upstream,
            origin,
            op,
            have: false,
            acc: String::new(),
        }
    }
}

impl Stringer for StringerOp {
    fn next(&mut self) -> Result<Option<StringerPair>> {
        loop {
            if !self.have {
                match self.upstream.next()? {
                    None => return Ok(None),
                    Some((stk, acc)) => {
                        self.op.reset();
                        self.origin.set_next(stk);
                        self.acc = acc;
                        self.have = true;
                    }
                }
            }

            if let Some(mut stk) = self.op.next()? {
                let shown = stk.pop()?.show();
                return Ok(Some((stk, format!("{}{}", shown, self.acc))));
            }

            self.have = false;
        }
    }

    fn reset(&mut self) {
        self.have = false;
        self.op.reset();
        self.upstream.reset();
    }
}

/// 文字列化パイプラインの結果を文字列値として積む
pub struct OpFormat {
    upstream: OpRef,
    origin: StringerOrigin,
    stringer: Box<dyn Stringer>,
    pos: u64,
}

impl OpFormat {
    pub fn new(upstream: OpRef, origin: StringerOrigin, stringer: Box<dyn Stringer>) -> Self {
        Self {
            upstream,
            origin,
            stringer,
            pos: 0,
        }
    }

    fn reset_me(&mut self) {
        self.stringer.reset();
        self.pos = 0;
    }
}

impl Op for OpFormat {
    fn next(&mut self) -> Result<Option<Stack>> {
        loop {
            if let Some((mut stk, text)) = self.stringer.next()? {
                stk.push(Value::str(text, self.pos));
                self.pos += 1;
                return Ok(Some(stk));
            }

            match self.upstream.next()? {
                None => return Ok(None),
                Some(stk) => {
                    self.reset_me();
                    self.origin.set_next(stk);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.reset_me();
        self.upstream.reset();
    }

    fn name(&self) -> String {
        "format".to_string()
    }
}

/// 選択の1分岐に入力の複製を配る栓
///
/// 全分岐が自分の取り分を消費したら、共有の上流から次を1つ引いて
/// 全員分を複製します。
pub struct OpTine {
    upstream: Rc<RefCell<OpRef>>,
    file: Rc<RefCell<Vec<Option<Stack>>>>,
    done: Rc<Cell<bool>>,
    branch: usize,
}

impl OpTine {
    pub fn new(
        upstream: Rc<RefCell<OpRef>>,
        file: Rc<RefCell<Vec<Option<Stack>>>>,
        done: Rc<Cell<bool>>,
        branch: usize,
    ) -> Self {
        Self {
            upstream,
            file,
            done,
            branch,
        }
    }
}

impl Op for OpTine {
    fn next(&mut self) -> Result<Option<Stack>> {
        if self.done.get() {
            return Ok(None);
        }

        if self.file.borrow().iter().all(Option::is_none) {
            match self.upstream.borrow_mut().next()? {
                Some(stk) => {
                    for slot in self.file.borrow_mut().iter_mut() {
                        *slot = Some(stk.clone());
                    }
                }
                None => {
                    self.done.set(true);
                    return Ok(None);
                }
            }
        }

        Ok(self.file.borrow_mut()[self.branch].take())
    }

    fn reset(&mut self) {
        for slot in self.file.borrow_mut().iter_mut() {
            *slot = None;
        }
        self.upstream.borrow_mut().reset();
    }

    fn name(&self) -> String {
        "tine".to_string()
    }
}

/// 選択の分岐出力を順繰りに刈り取る
pub struct OpMerge {
    ops: Vec<OpRef>,
    it: usize,
    done: Rc<Cell<bool>>,
}

impl OpMerge {
    pub fn new(ops: Vec<OpRef>, done: Rc<Cell<bool>>) -> Self {
        Self { ops, it: 0, done }
    }
}

impl Op for OpMerge {
    fn next(&mut self) -> Result<Option<Stack>> {
        while !self.done.get() {
            if let Some(ret) = self.ops[self.it].next()? {
                return Ok(Some(ret));
            }
            self.it = (self.it + 1) % self.ops.len();
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.done.set(false);
        self.it = 0;
        for op in &mut self.ops {
            op.reset();
        }
    }

    fn name(&self) -> String {
        "merge".to_string()
    }
}

/// 述語の否定
pub struct PredNot {
    pred: Box<dyn Pred>,
}

impl PredNot {
    pub fn new(pred: Box<dyn Pred>) -> Self {
        Self { pred }
    }
}

impl Pred for PredNot {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        Ok(self.pred.result(stk)?.not())
    }

    fn reset(&mut self) {
        self.pred.reset();
    }

    fn name(&self) -> String {
        format!("not<{}>", self.pred.name())
    }
}

/// 短絡する論理積
pub struct PredAnd {
    a: Box<dyn Pred>,
    b: Box<dyn Pred>,
}

impl PredAnd {
    pub fn new(a: Box<dyn Pred>, b: Box<dyn Pred>) -> Self {
        Self { a, b }
    }
}

impl Pred for PredAnd {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        match self.a.result(stk)? {
            PredResult::Yes => self.b.result(stk),
            other => Ok(other),
        }
    }

    fn reset(&mut self) {
        self.a.reset();
        self.b.reset();
    }

    fn name(&self) -> String {
        format!("and<{}><{}>", self.a.name(), self.b.name())
    }
}

/// 短絡する論理和
pub struct PredOr {
    a: Box<dyn Pred>,
    b: Box<dyn Pred>,
}

impl PredOr {
    pub fn new(a: Box<dyn Pred>, b: Box<dyn Pred>) -> Self {
        Self { a, b }
    }
}

impl Pred for PredOr {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        match self.a.result(stk)? {
            PredResult::Yes => Ok(PredResult::Yes),
            _ => self.b.result(stk),
        }
    }

    fn reset(&mut self) {
        self.a.reset();
        self.b.reset();
    }

    fn name(&self) -> String {
        format!("or<{}><{}>", self.a.name(), self.b.name())
    }
}

/// 部分式が1つでも産出すれば成立
pub struct PredSubxAny {
    origin: Origin,
    op: OpRef,
}

impl PredSubxAny {
    pub fn new(origin: Origin, op: OpRef) -> Self {
        Self { origin, op }
    }
}

impl Pred for PredSubxAny {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        self.op.reset();
        self.origin.set_next(stk.clone());
        if self.op.next()?.is_some() {
            Ok(PredResult::Yes)
        } else {
            Ok(PredResult::No)
        }
    }

    fn reset(&mut self) {
        self.op.reset();
    }

    fn name(&self) -> String {
        format!("pred_subx_any<{}>", self.op.name())
    }
}

/// 2つの部分式の結果の直積を比較し、最初の成立で打ち切る
pub struct PredSubxCompare {
    origin1: Origin,
    op1: OpRef,
    origin2: Origin,
    op2: OpRef,
    pred: Box<dyn Pred>,
}

impl PredSubxCompare {
    pub fn new(
        origin1: Origin,
        op1: OpRef,
        origin2: Origin,
        op2: OpRef,
        pred: Box<dyn Pred>,
    ) -> Self {
        Self {
            origin1,
            op1,
            origin2,
            op2,
            pred,
        }
    }
}

impl Pred for PredSubxCompare {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        self.op1.reset();
        self.origin1.set_next(stk.clone());
        while let Some(mut stk1) = self.op1.next()? {
            self.op2.reset();
            self.origin2.set_next(stk.clone());

            while let Some(mut stk2) = self.op2.next()? {
                stk1.push(stk2.pop()?);
                if self.pred.result(&stk1)? == PredResult::Yes {
                    return Ok(PredResult::Yes);
                }
                stk1.pop()?;
            }
        }
        Ok(PredResult::No)
    }

    fn reset(&mut self) {
        self.op1.reset();
        self.op2.reset();
        self.pred.reset();
    }

    fn name(&self) -> String {
        format!(
            "pred_subx_compare<{}><{}><{}>",
            self.op1.name(),
            self.op2.name(),
            self.pred.name()
        )
    }
}

/// TOSが指定の位置で産出されたことを確かめる
pub struct PredPos {
    pos: u64,
}

impl PredPos {
    pub fn new(pos: u64) -> Self {
        Self { pos }
    }
}

impl Pred for PredPos {
    fn result(&mut self, stk: &Stack) -> Result<PredResult> {
        if stk.top()?.pos == self.pos {
            Ok(PredResult::Yes)
        } else {
            Ok(PredResult::No)
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> String {
        format!("pred_pos<{}>", self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Constant;

    struct ConstPred(PredResult);

    impl Pred for ConstPred {
        fn result(&mut self, _stk: &Stack) -> Result<PredResult> {
            Ok(self.0)
        }
        fn reset(&mut self) {}
        fn name(&self) -> String {
            "const".to_string()
        }
    }

    fn pred(r: PredResult) -> Box<dyn Pred> {
        Box::new(ConstPred(r))
    }

    #[test]
    fn test_origin_yields_once_until_rearmed() {
        let mut origin = Origin::new();
        origin.set_next(Stack::new());
        assert!(origin.next().unwrap().is_some());
        assert!(origin.next().unwrap().is_none());

        origin.reset();
        origin.set_next(Stack::new());
        assert!(origin.next().unwrap().is_some());
    }

    #[test]
    fn test_pred_not_propagates_fail() {
        use PredResult::*;
        let stk = Stack::new();
        assert_eq!(PredNot::new(pred(Yes)).result(&stk).unwrap(), No);
        assert_eq!(PredNot::new(pred(No)).result(&stk).unwrap(), Yes);
        assert_eq!(PredNot::new(pred(Fail)).result(&stk).unwrap(), Fail);
    }

    #[test]
    fn test_pred_and_short_circuits() {
        use PredResult::*;
        let stk = Stack::new();
        assert_eq!(PredAnd::new(pred(Yes), pred(No)).result(&stk).unwrap(), No);
        assert_eq!(PredAnd::new(pred(No), pred(Fail)).result(&stk).unwrap(), No);
        assert_eq!(PredAnd::new(pred(Fail), pred(Yes)).result(&stk).unwrap(), Fail);
        assert_eq!(PredAnd::new(pred(Yes), pred(Yes)).result(&stk).unwrap(), Yes);
    }

    #[test]
    fn test_pred_or_short_circuits() {
        use PredResult::*;
        let stk = Stack::new();
        assert_eq!(PredOr::new(pred(Yes), pred(Fail)).result(&stk).unwrap(), Yes);
        assert_eq!(PredOr::new(pred(No), pred(Yes)).result(&stk).unwrap(), Yes);
        assert_eq!(PredOr::new(pred(No), pred(Fail)).result(&stk).unwrap(), Fail);
        assert_eq!(PredOr::new(pred(No), pred(No)).result(&stk).unwrap(), No);
    }

    #[test]
    fn test_pred_pos_checks_tos() {
        let mut stk = Stack::new();
        stk.push(Value::cst(Constant::dec(9), 3));
        assert_eq!(PredPos::new(3).result(&stk).unwrap(), PredResult::Yes);
        assert_eq!(PredPos::new(0).result(&stk).unwrap(), PredResult::No);
    }
}
