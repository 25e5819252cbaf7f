//! パース木から演算子グラフへの変換
//!
//! 2段階で進めます。まず名前解決（語を組み込みか変数参照に確定し、
//! 束縛をスコープに割り付ける）で解決済みの木を作り、次にそれを
//! 演算子グラフへ展開します。クロージャは解決済みの木を持ち、適用の
//! たびにそこからグラフを作り直します。

use crate::op::{
    OpApply, OpAssert, OpBind, OpCapture, OpConst, OpFormat, OpIfElse, OpLexClosure, OpMerge,
    OpOr, OpRead, OpRef, OpScope, OpSubx, OpTine, OpTrClosure, Origin, Pred, PredNot,
    PredSubxAny, PredSubxCompare, Stringer, StringerLit, StringerOp, StringerOrigin, TrKind,
};
use crate::overload::{BuiltinDef, OpOverload, OverloadedPred, Vocabulary};
use crate::stack::Stack;
use crate::tree::{CmpWhich, StrPart, Tree};
use crate::value::Value;
use crate::Result;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// 解決済みのフォーマット区画
#[derive(Debug)]
pub enum RStrPart {
    Lit(String),
    Expr(RNode),
}

/// 名前解決済みの木
#[derive(Debug)]
pub enum RNode {
    Const(Value),
    Format(Vec<RStrPart>),
    Builtin { name: String, def: BuiltinDef },
    ReadVar { depth: usize, index: usize },
    Bind { index: usize },
    Cat(Vec<RNode>),
    Alt(Vec<RNode>),
    Or(Vec<RNode>),
    Capture(Box<RNode>),
    Repeat(Box<RNode>, TrKind),
    Assert { body: Box<RNode>, positive: bool },
    Compare(Box<RNode>, Box<RNode>, CmpWhich),
    If { cond: Box<RNode>, then: Box<RNode>, els: Box<RNode> },
    Scope { num_vars: usize, body: Box<RNode> },
    Subx { body: Box<RNode>, keep: usize },
    Lambda(Rc<RNode>),
}

impl std::fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BuiltinDef::Op(_) => write!(f, "Op"),
            BuiltinDef::Pred { positive, .. } => write!(f, "Pred({})", positive),
            BuiltinDef::SimpleOp(_) => write!(f, "SimpleOp"),
            BuiltinDef::SimplePred { positive, .. } => write!(f, "SimplePred({})", positive),
            BuiltinDef::Const(v) => write!(f, "Const({})", v.show()),
        }
    }
}

/// ブロックが直接宣言する束縛名を集める
///
/// 入れ子のブロック（選択の分岐、捕捉や閉包の本体など）の束縛は
/// そのブロック自身のもの。
fn collect_bindings(tree: &Tree, names: &mut Vec<String>) -> Result<()> {
    match tree {
        Tree::Let(ns, _) | Tree::Formals(ns) => {
            for n in ns {
                if names.iter().any(|m| m == n) {
                    anyhow::bail!("duplicate binding `{}'", n);
                }
                names.push(n.clone());
            }
        }
        Tree::Cat(items) => {
            for item in items {
                collect_bindings(item, names)?;
            }
        }
        _ => {}
    }
    Ok(())
}

struct ScopeInfo {
    names: Vec<String>,
}

impl ScopeInfo {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// 名前解決器
pub struct Resolver<'a> {
    voc: &'a Vocabulary,
    scopes: Vec<ScopeInfo>,
}

impl<'a> Resolver<'a> {
    pub fn new(voc: &'a Vocabulary) -> Self {
        Self {
            voc,
            scopes: Vec::new(),
        }
    }

    /// ブロックを解決する。束縛を宣言していればスコープで包む
    pub fn resolve_block(&mut self, tree: &Tree) -> Result<RNode> {
        let mut names = Vec::new();
        collect_bindings(tree, &mut names)?;
        if names.is_empty() {
            return self.resolve(tree);
        }

        let num_vars = names.len();
        self.scopes.push(ScopeInfo { names });
        let body = self.resolve(tree);
        self.scopes.pop();

        Ok(RNode::Scope {
            num_vars,
            body: Box::new(body?),
        })
    }

    fn lookup_var(&self, name: &str) -> Option<(usize, usize)> {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(index) = scope.index_of(name) {
                return Some((depth, index));
            }
        }
        None
    }

    fn bind_of(&self, name: &str) -> Result<RNode> {
        // 束縛は常に自分のブロックのスコープに落ちる
        let scope = self.scopes.last().expect("binding outside scope");
        let index = scope
            .index_of(name)
            .ok_or_else(|| anyhow::anyhow!("binding `{}' not collected", name))?;
        Ok(RNode::Bind { index })
    }

    fn resolve(&mut self, tree: &Tree) -> Result<RNode> {
        match tree {
            Tree::Const(c) => Ok(RNode::Const(Value::cst(c.clone(), 0))),
            Tree::Format(parts) => {
                let mut rparts = Vec::new();
                for part in parts {
                    rparts.push(match part {
                        StrPart::Lit(s) => RStrPart::Lit(s.clone()),
                        StrPart::Expr(t) => RStrPart::Expr(self.resolve_block(t)?),
                    });
                }
                Ok(RNode::Format(rparts))
            }
            Tree::Word(name) => {
                // 変数が組み込みを隠す
                if let Some((depth, index)) = self.lookup_var(name) {
                    return Ok(RNode::ReadVar { depth, index });
                }
                match self.voc.find(name) {
                    Some(def) => Ok(RNode::Builtin {
                        name: name.clone(),
                        def: def.clone(),
                    }),
                    None => anyhow::bail!("unknown identifier `{}'", name),
                }
            }
            Tree::Cat(items) => {
                let mut rnodes = Vec::new();
                for item in items {
                    rnodes.push(self.resolve(item)?);
                }
                Ok(RNode::Cat(rnodes))
            }
            Tree::Alt(branches) => {
                let mut rbranches = Vec::new();
                for branch in branches {
                    rbranches.push(self.resolve_block(branch)?);
                }
                Ok(RNode::Alt(rbranches))
            }
            Tree::Or(branches) => {
                let mut rbranches = Vec::new();
                for branch in branches {
                    rbranches.push(self.resolve_block(branch)?);
                }
                Ok(RNode::Or(rbranches))
            }
            Tree::Capture(body) => Ok(RNode::Capture(Box::new(self.resolve_block(body)?))),
            Tree::Repeat(body, kind) => {
                Ok(RNode::Repeat(Box::new(self.resolve_block(body)?), *kind))
            }
            Tree::Assert(body, positive) => Ok(RNode::Assert {
                body: Box::new(self.resolve_block(body)?),
                positive: *positive,
            }),
            Tree::Compare(a, b, which) => Ok(RNode::Compare(
                Box::new(self.resolve_block(a)?),
                Box::new(self.resolve_block(b)?),
                *which,
            )),
            Tree::If(cond, then, els) => Ok(RNode::If {
                cond: Box::new(self.resolve_block(cond)?),
                then: Box::new(self.resolve_block(then)?),
                els: Box::new(self.resolve_block(els)?),
            }),
            Tree::Let(names, value) => {
                // 値プログラムを脇で評価し、上位n個を取り込んで束縛する
                let body = self.resolve_block(value)?;
                let mut items = vec![RNode::Subx {
                    body: Box::new(body),
                    keep: names.len(),
                }];
                for name in names.iter().rev() {
                    items.push(self.bind_of(name)?);
                }
                Ok(RNode::Cat(items))
            }
            Tree::Formals(names) => {
                let mut items = Vec::new();
                for name in names.iter().rev() {
                    items.push(self.bind_of(name)?);
                }
                Ok(RNode::Cat(items))
            }
            Tree::Lambda(body) => {
                Ok(RNode::Lambda(Rc::new(self.resolve_block(body)?)))
            }
        }
    }
}

/// 部分パイプラインを作る
fn sub_pipeline(node: &RNode) -> Result<(Origin, OpRef)> {
    let origin = Origin::new();
    let op = build_exec(node, Box::new(origin.clone()))?;
    Ok((origin, op))
}

/// 解決済みの木から演算子グラフを組み立てる
pub fn build_exec(node: &RNode, upstream: OpRef) -> Result<OpRef> {
    Ok(match node {
        RNode::Const(value) => Box::new(OpConst::new(upstream, value.clone())),
        RNode::Format(parts) => {
            let sorigin = StringerOrigin::new();
            let mut chain: Box<dyn Stringer> = Box::new(sorigin.clone());
            // 後ろの区画ほど起点に近い。各段は自分の文字列を前置する
            for part in parts.iter().rev() {
                chain = match part {
                    RStrPart::Lit(s) => Box::new(StringerLit::new(chain, s.clone())),
                    RStrPart::Expr(n) => {
                        let origin = Origin::new();
                        let op = build_exec(n, Box::new(origin.clone()))?;
                        Box::new(StringerOp::new(chain, origin, op))
                    }
                };
            }
            Box::new(OpFormat::new(upstream, sorigin, chain))
        }
        RNode::Builtin { name, def } => match def {
            BuiltinDef::Op(table) => {
                Box::new(OpOverload::new(upstream, name.clone(), Rc::clone(table)))
            }
            BuiltinDef::Pred { table, positive } => {
                let pred = OverloadedPred::new(name.clone(), Rc::clone(table), *positive);
                Box::new(OpAssert::new(upstream, Box::new(pred)))
            }
            BuiltinDef::SimpleOp(build) => build(upstream),
            BuiltinDef::SimplePred { build, positive } => {
                let pred = crate::builtin::maybe_invert(build(), *positive);
                Box::new(OpAssert::new(upstream, pred))
            }
            BuiltinDef::Const(value) => Box::new(OpConst::new(upstream, value.clone())),
        },
        RNode::ReadVar { depth, index } => {
            // 変数がクロージャを持っていれば読みと同時に適用する
            let read = Box::new(OpRead::new(upstream, *depth, *index));
            Box::new(OpApply::new(read, true))
        }
        RNode::Bind { index } => Box::new(OpBind::new(upstream, 0, *index)),
        RNode::Cat(items) => {
            let mut op = upstream;
            for item in items {
                op = build_exec(item, op)?;
            }
            op
        }
        RNode::Alt(branches) => {
            let shared: Rc<RefCell<OpRef>> = Rc::new(RefCell::new(upstream));
            let file = Rc::new(RefCell::new(vec![None; branches.len()]));
            let done = Rc::new(Cell::new(false));
            let mut ops = Vec::new();
            for (i, branch) in branches.iter().enumerate() {
                let tine = Box::new(OpTine::new(
                    Rc::clone(&shared),
                    Rc::clone(&file),
                    Rc::clone(&done),
                    i,
                ));
                ops.push(build_exec(branch, tine)?);
            }
            Box::new(OpMerge::new(ops, done))
        }
        RNode::Or(branches) => {
            let mut built = Vec::new();
            for branch in branches {
                built.push(sub_pipeline(branch)?);
            }
            Box::new(OpOr::new(upstream, built))
        }
        RNode::Capture(body) => {
            let (origin, op) = sub_pipeline(body)?;
            Box::new(OpCapture::new(upstream, origin, op))
        }
        RNode::Repeat(body, kind) => {
            let (origin, op) = sub_pipeline(body)?;
            Box::new(OpTrClosure::new(upstream, origin, op, *kind))
        }
        RNode::Assert { body, positive } => {
            let (origin, op) = sub_pipeline(body)?;
            let pred: Box<dyn Pred> = Box::new(PredSubxAny::new(origin, op));
            let pred = if *positive {
                pred
            } else {
                Box::new(PredNot::new(pred))
            };
            Box::new(OpAssert::new(upstream, pred))
        }
        RNode::Compare(a, b, which) => {
            let (origin1, op1) = sub_pipeline(a)?;
            let (origin2, op2) = sub_pipeline(b)?;
            let pred = PredSubxCompare::new(
                origin1,
                op1,
                origin2,
                op2,
                crate::builtin::cmp_pred(*which),
            );
            Box::new(OpAssert::new(upstream, Box::new(pred)))
        }
        RNode::If { cond, then, els } => {
            let cond = sub_pipeline(cond)?;
            let then = sub_pipeline(then)?;
            let els = sub_pipeline(els)?;
            Box::new(OpIfElse::new(upstream, cond, then, els))
        }
        RNode::Scope { num_vars, body } => {
            let (origin, op) = sub_pipeline(body)?;
            Box::new(OpScope::new(upstream, origin, op, *num_vars))
        }
        RNode::Subx { body, keep } => {
            let (origin, op) = sub_pipeline(body)?;
            Box::new(OpSubx::new(upstream, origin, op, *keep))
        }
        RNode::Lambda(body) => Box::new(OpLexClosure::new(upstream, Rc::clone(body))),
    })
}

/// コンパイル済みのクエリ
///
/// 起点と根の演算子を束ね、入力スタックごとに結果を引き出せるように
/// したもの。
pub struct Query {
    origin: Origin,
    root: OpRef,
}

impl Query {
    /// プログラムをコンパイルする
    pub fn compile(program: &str, voc: &Vocabulary) -> Result<Query> {
        let tree = crate::parse::parse_program(program)?;
        let rnode = Resolver::new(voc).resolve_block(&tree)?;
        let origin = Origin::new();
        let root = build_exec(&rnode, Box::new(origin.clone()))?;
        Ok(Query { origin, root })
    }

    /// 新しい入力スタックを据える。途中の状態は破棄される
    pub fn feed(&mut self, stk: Stack) {
        self.root.reset();
        self.origin.set_next(stk);
    }

    /// 結果スタックを1つ引き出す
    pub fn next(&mut self) -> Result<Option<Stack>> {
        self.root.next()
    }

    /// 1つの入力スタックに対する全結果を集める
    pub fn run(&mut self, stk: Stack) -> Result<Vec<Stack>> {
        self.feed(stk);
        let mut out = Vec::new();
        while let Some(stk) = self.next()? {
            out.push(stk);
        }
        Ok(out)
    }
}
