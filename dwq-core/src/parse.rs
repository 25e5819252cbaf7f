//! クエリ言語の字句解析と構文解析
//!
//! 手書きの字句解析器と再帰下降パーサです。文法のあらまし:
//!
//! ```text
//! program  := alt
//! alt      := or ( ',' or )*
//! or       := cmp ( '||' cmp )*
//! cmp      := cat ( ('=='|'!='|'<'|'<='|'>'|'>=') cat )?
//! cat      := element*
//! element  := postfix | let | formals
//! let      := 'let' Name+ ':=' alt ';'
//! formals  := '|' Name+ '|'
//! postfix  := primary ( '*' | '+' | '?' )*
//! primary  := Int | Str | Word | '(' alt ')' | '[' alt ']'
//!           | '?(' alt ')' | '!(' alt ')' | '{' alt '}'
//!           | 'if' alt 'then' alt ( 'else' alt )?
//! ```
//!
//! 文字列リテラルは `\` エスケープ、`%s`、`%( expr %)` 補間を受け付けます。

use crate::cst::{Constant, Domain};
use crate::op::TrKind;
use crate::tree::{CmpWhich, StrPart, Tree};
use crate::Result;
use num::BigInt;
use num::Num;

/// 字句解析した文字列リテラルの区画
#[derive(Debug, Clone, PartialEq)]
enum RawStrPart {
    Lit(String),
    /// 埋め込みプログラムの原文
    Prog(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(Constant),
    Str(Vec<RawStrPart>),
    Word(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `?(`
    QParen,
    /// `!(`
    BParen,
    Comma,
    Semi,
    Star,
    Plus,
    Question,
    Pipe,
    OrOr,
    Assign,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    If,
    Then,
    Else,
    Let,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '#' => {
                    // 行末までコメント
                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '(' => tokens.push(self.single(Token::LParen)),
                ')' => tokens.push(self.single(Token::RParen)),
                '[' => tokens.push(self.single(Token::LBracket)),
                ']' => tokens.push(self.single(Token::RBracket)),
                '{' => tokens.push(self.single(Token::LBrace)),
                '}' => tokens.push(self.single(Token::RBrace)),
                ',' => tokens.push(self.single(Token::Comma)),
                ';' => tokens.push(self.single(Token::Semi)),
                '*' => tokens.push(self.single(Token::Star)),
                '+' => tokens.push(self.single(Token::Plus)),
                '"' => tokens.push(self.lex_string()?),
                '|' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'|') {
                        self.chars.next();
                        tokens.push(Token::OrOr);
                    } else {
                        tokens.push(Token::Pipe);
                    }
                }
                ':' => {
                    self.chars.next();
                    if self.chars.next() == Some('=') {
                        tokens.push(Token::Assign);
                    } else {
                        anyhow::bail!("expected `:='");
                    }
                }
                '=' => {
                    self.chars.next();
                    if self.chars.next() == Some('=') {
                        tokens.push(Token::EqEq);
                    } else {
                        anyhow::bail!("stray `='");
                    }
                }
                '<' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Le);
                    } else {
                        tokens.push(Token::Lt);
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Ge);
                    } else {
                        tokens.push(Token::Gt);
                    }
                }
                '?' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some(&'(') => {
                            self.chars.next();
                            tokens.push(Token::QParen);
                        }
                        Some(&c) if is_word_start(c) => {
                            let word = self.lex_word_rest('?');
                            tokens.push(Token::Word(word));
                        }
                        _ => tokens.push(Token::Question),
                    }
                }
                '!' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some(&'(') => {
                            self.chars.next();
                            tokens.push(Token::BParen);
                        }
                        Some(&'=') => {
                            self.chars.next();
                            tokens.push(Token::Ne);
                        }
                        Some(&c) if is_word_start(c) => {
                            let word = self.lex_word_rest('!');
                            tokens.push(Token::Word(word));
                        }
                        _ => anyhow::bail!("stray `!'"),
                    }
                }
                '-' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some(&c) if c.is_ascii_digit() => {
                            tokens.push(self.lex_number(true)?);
                        }
                        _ => anyhow::bail!("stray `-'"),
                    }
                }
                c if c.is_ascii_digit() => tokens.push(self.lex_number(false)?),
                c if is_word_start(c) => {
                    let mut word = String::new();
                    word.push(c);
                    self.chars.next();
                    while let Some(&c) = self.chars.peek() {
                        if is_word_char(c) {
                            word.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push(match word.as_str() {
                        "if" => Token::If,
                        "then" => Token::Then,
                        "else" => Token::Else,
                        "let" => Token::Let,
                        _ => Token::Word(word),
                    });
                }
                c => anyhow::bail!("unexpected character `{}'", c),
            }
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn lex_word_rest(&mut self, prefix: char) -> String {
        let mut word = String::new();
        word.push(prefix);
        while let Some(&c) = self.chars.peek() {
            if is_word_char(c) || c == '@' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }

    fn lex_number(&mut self, negative: bool) -> Result<Token> {
        let mut digits = String::new();
        let mut hex = false;

        if self.chars.peek() == Some(&'0') {
            digits.push('0');
            self.chars.next();
            if matches!(self.chars.peek(), Some(&'x') | Some(&'X')) {
                self.chars.next();
                hex = true;
                digits.clear();
            }
        }

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_hexdigit() {
                if !hex && !c.is_ascii_digit() {
                    anyhow::bail!("bad decimal digit `{}'", c);
                }
                digits.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        if digits.is_empty() {
            anyhow::bail!("malformed number literal");
        }

        let mut value = if hex {
            BigInt::from_str_radix(&digits, 16)
                .map_err(|e| anyhow::anyhow!("bad hex literal: {}", e))?
        } else {
            BigInt::from_str_radix(&digits, 10)
                .map_err(|e| anyhow::anyhow!("bad literal: {}", e))?
        };
        if negative {
            value = -value;
        }

        let dom = if hex { Domain::Hex } else { Domain::Dec };
        Ok(Token::Int(Constant::new(value, dom)))
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.chars.next(); // 開きの引用符
        let mut parts = Vec::new();
        let mut lit = String::new();

        loop {
            let c = match self.chars.next() {
                Some(c) => c,
                None => anyhow::bail!("unterminated string literal"),
            };
            match c {
                '"' => break,
                '\\' => match self.chars.next() {
                    Some('n') => lit.push('\n'),
                    Some('t') => lit.push('\t'),
                    Some('\\') => lit.push('\\'),
                    Some('"') => lit.push('"'),
                    Some('%') => lit.push('%'),
                    Some(c) => anyhow::bail!("unknown escape `\\{}'", c),
                    None => anyhow::bail!("unterminated string literal"),
                },
                '%' => match self.chars.next() {
                    Some('s') => {
                        if !lit.is_empty() {
                            parts.push(RawStrPart::Lit(std::mem::take(&mut lit)));
                        }
                        parts.push(RawStrPart::Prog(String::new()));
                    }
                    Some('%') => lit.push('%'),
                    Some('(') => {
                        if !lit.is_empty() {
                            parts.push(RawStrPart::Lit(std::mem::take(&mut lit)));
                        }
                        parts.push(RawStrPart::Prog(self.lex_interp()?));
                    }
                    Some(c) => anyhow::bail!("unknown format directive `%{}'", c),
                    None => anyhow::bail!("unterminated string literal"),
                },
                c => lit.push(c),
            }
        }

        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawStrPart::Lit(lit));
        }
        Ok(Token::Str(parts))
    }

    /// `%( ... %)` の中身を入れ子を数えながら切り出す
    fn lex_interp(&mut self) -> Result<String> {
        let mut text = String::new();
        let mut depth = 1;
        loop {
            let c = match self.chars.next() {
                Some(c) => c,
                None => anyhow::bail!("unterminated `%(' in string literal"),
            };
            if c == '%' {
                match self.chars.peek() {
                    Some(&'(') => {
                        depth += 1;
                        text.push('%');
                        text.push('(');
                        self.chars.next();
                    }
                    Some(&')') => {
                        depth -= 1;
                        self.chars.next();
                        if depth == 0 {
                            return Ok(text);
                        }
                        text.push('%');
                        text.push(')');
                    }
                    _ => text.push('%'),
                }
            } else {
                text.push(c);
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<()> {
        match self.bump() {
            Some(token) if token == want => Ok(()),
            Some(token) => anyhow::bail!("expected {}, found {:?}", what, token),
            None => anyhow::bail!("expected {}, found end of input", what),
        }
    }

    fn parse_alt(&mut self) -> Result<Tree> {
        let mut branches = vec![self.parse_or()?];
        while self.peek() == Some(&Token::Comma) {
            self.bump();
            branches.push(self.parse_or()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().expect("one branch"))
        } else {
            Ok(Tree::Alt(branches))
        }
    }

    fn parse_or(&mut self) -> Result<Tree> {
        let mut items = vec![self.parse_cmp()?];
        while self.peek() == Some(&Token::OrOr) {
            self.bump();
            items.push(self.parse_cmp()?);
        }
        if items.len() == 1 {
            Ok(items.pop().expect("one item"))
        } else {
            Ok(Tree::Or(items))
        }
    }

    fn parse_cmp(&mut self) -> Result<Tree> {
        let lhs = self.parse_cat()?;
        let which = match self.peek() {
            Some(Token::EqEq) => CmpWhich::Eq,
            Some(Token::Ne) => CmpWhich::Ne,
            Some(Token::Lt) => CmpWhich::Lt,
            Some(Token::Le) => CmpWhich::Le,
            Some(Token::Gt) => CmpWhich::Gt,
            Some(Token::Ge) => CmpWhich::Ge,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_cat()?;
        Ok(Tree::Compare(Box::new(lhs), Box::new(rhs), which))
    }

    fn parse_cat(&mut self) -> Result<Tree> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None
                | Some(Token::RParen)
                | Some(Token::RBracket)
                | Some(Token::RBrace)
                | Some(Token::Comma)
                | Some(Token::Semi)
                | Some(Token::OrOr)
                | Some(Token::EqEq)
                | Some(Token::Ne)
                | Some(Token::Lt)
                | Some(Token::Le)
                | Some(Token::Gt)
                | Some(Token::Ge)
                | Some(Token::Then)
                | Some(Token::Else) => break,
                Some(Token::Let) => {
                    self.bump();
                    let mut names = Vec::new();
                    while let Some(Token::Word(_)) = self.peek() {
                        if let Some(Token::Word(name)) = self.bump() {
                            names.push(name);
                        }
                    }
                    if names.is_empty() {
                        anyhow::bail!("`let' needs at least one name");
                    }
                    self.expect(Token::Assign, "`:='")?;
                    let value = self.parse_alt()?;
                    self.expect(Token::Semi, "`;'")?;
                    items.push(Tree::Let(names, Box::new(value)));
                }
                Some(Token::Pipe) => {
                    self.bump();
                    let mut names = Vec::new();
                    while let Some(Token::Word(_)) = self.peek() {
                        if let Some(Token::Word(name)) = self.bump() {
                            names.push(name);
                        }
                    }
                    if names.is_empty() {
                        anyhow::bail!("empty formal argument list");
                    }
                    self.expect(Token::Pipe, "closing `|'")?;
                    items.push(Tree::Formals(names));
                }
                _ => items.push(self.parse_postfix()?),
            }
        }
        if items.len() == 1 {
            Ok(items.pop().expect("one item"))
        } else {
            Ok(Tree::Cat(items))
        }
    }

    fn parse_postfix(&mut self) -> Result<Tree> {
        let mut tree = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    tree = Tree::Repeat(Box::new(tree), TrKind::Star);
                }
                Some(Token::Plus) => {
                    self.bump();
                    tree = Tree::Repeat(Box::new(tree), TrKind::Plus);
                }
                Some(Token::Question) => {
                    self.bump();
                    // `a?` は a と空プログラムの選択
                    tree = Tree::Alt(vec![tree, Tree::nop()]);
                }
                _ => return Ok(tree),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Tree> {
        match self.bump() {
            Some(Token::Int(c)) => Ok(Tree::Const(c)),
            Some(Token::Str(raw_parts)) => {
                let mut parts = Vec::new();
                for part in raw_parts {
                    match part {
                        RawStrPart::Lit(s) => parts.push(StrPart::Lit(s)),
                        RawStrPart::Prog(text) => {
                            parts.push(StrPart::Expr(parse_program(&text)?));
                        }
                    }
                }
                Ok(Tree::Format(parts))
            }
            Some(Token::Word(name)) => Ok(Tree::Word(name)),
            Some(Token::LParen) => {
                let tree = self.parse_alt()?;
                self.expect(Token::RParen, "`)'")?;
                Ok(tree)
            }
            Some(Token::LBracket) => {
                let tree = self.parse_alt()?;
                self.expect(Token::RBracket, "`]'")?;
                Ok(Tree::Capture(Box::new(tree)))
            }
            Some(Token::QParen) => {
                let tree = self.parse_alt()?;
                self.expect(Token::RParen, "`)'")?;
                Ok(Tree::Assert(Box::new(tree), true))
            }
            Some(Token::BParen) => {
                let tree = self.parse_alt()?;
                self.expect(Token::RParen, "`)'")?;
                Ok(Tree::Assert(Box::new(tree), false))
            }
            Some(Token::LBrace) => {
                let tree = self.parse_alt()?;
                self.expect(Token::RBrace, "`}'")?;
                Ok(Tree::Lambda(Box::new(tree)))
            }
            Some(Token::If) => {
                let cond = self.parse_alt()?;
                self.expect(Token::Then, "`then'")?;
                let then = self.parse_alt()?;
                let els = if self.peek() == Some(&Token::Else) {
                    self.bump();
                    self.parse_alt()?
                } else {
                    Tree::nop()
                };
                Ok(Tree::If(Box::new(cond), Box::new(then), Box::new(els)))
            }
            Some(token) => anyhow::bail!("unexpected token {:?}", token),
            None => anyhow::bail!("unexpected end of input"),
        }
    }
}

/// プログラム文字列をパース木にする
pub fn parse_program(input: &str) -> Result<Tree> {
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser { tokens, pos: 0 };
    let tree = parser.parse_alt()?;
    if let Some(token) = parser.peek() {
        anyhow::bail!("trailing input at {:?}", token);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words_and_ints() {
        let tree = parse_program("entry 0x10 17 name").unwrap();
        match tree {
            Tree::Cat(items) => assert_eq!(items.len(), 4),
            other => panic!("expected Cat, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_alternation_and_capture() {
        let tree = parse_program("[1, 2, 3]").unwrap();
        match tree {
            Tree::Capture(inner) => match *inner {
                Tree::Alt(branches) => assert_eq!(branches.len(), 3),
                other => panic!("expected Alt, got {:?}", other),
            },
            other => panic!("expected Capture, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_closure_postfix() {
        let tree = parse_program("child*").unwrap();
        assert!(matches!(tree, Tree::Repeat(_, TrKind::Star)));
        let tree = parse_program("child+").unwrap();
        assert!(matches!(tree, Tree::Repeat(_, TrKind::Plus)));
        let tree = parse_program("child?").unwrap();
        assert!(matches!(tree, Tree::Alt(_)));
    }

    #[test]
    fn test_parse_assert_words() {
        let tree = parse_program("?(child) !(parent)").unwrap();
        match tree {
            Tree::Cat(items) => {
                assert!(matches!(items[0], Tree::Assert(_, true)));
                assert!(matches!(items[1], Tree::Assert(_, false)));
            }
            other => panic!("expected Cat, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pred_word_keeps_prefix() {
        let tree = parse_program("?eq").unwrap();
        match tree {
            Tree::Word(w) => assert_eq!(w, "?eq"),
            other => panic!("expected Word, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_infix_compare() {
        let tree = parse_program("(offset == 0x123)").unwrap();
        assert!(matches!(tree, Tree::Compare(_, _, CmpWhich::Eq)));
        let tree = parse_program("(name != \"x\")").unwrap();
        assert!(matches!(tree, Tree::Compare(_, _, CmpWhich::Ne)));
    }

    #[test]
    fn test_parse_let_and_formals() {
        let tree = parse_program("let A := 1; |B C| A").unwrap();
        match tree {
            Tree::Cat(items) => {
                assert!(matches!(&items[0], Tree::Let(names, _) if names == &["A"]));
                assert!(
                    matches!(&items[1], Tree::Formals(names) if names == &["B", "C"])
                );
            }
            other => panic!("expected Cat, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_string_interpolation() {
        let tree = parse_program("\"a %s b %( name %) c\"").unwrap();
        match tree {
            Tree::Format(parts) => {
                assert_eq!(parts.len(), 5);
                assert!(matches!(&parts[0], StrPart::Lit(s) if s == "a "));
                assert!(matches!(&parts[1], StrPart::Expr(_)));
                assert!(matches!(&parts[2], StrPart::Lit(s) if s == " b "));
                assert!(matches!(&parts[3], StrPart::Expr(_)));
                assert!(matches!(&parts[4], StrPart::Lit(s) if s == " c"));
            }
            other => panic!("expected Format, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_then_else() {
        let tree = parse_program("if ?(child) then 1 else 2").unwrap();
        assert!(matches!(tree, Tree::If(_, _, _)));
    }

    #[test]
    fn test_parse_negative_and_big_numbers() {
        let tree = parse_program("-24").unwrap();
        assert!(matches!(tree, Tree::Const(_)));
        let tree = parse_program("0xffffffffffffffffffff").unwrap();
        assert!(matches!(tree, Tree::Const(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_program("child )").is_err());
        assert!(parse_program("\"unterminated").is_err());
        assert!(parse_program("let := 1;").is_err());
    }

    #[test]
    fn test_parse_at_words() {
        let tree = parse_program("@AT_name ?AT_name !AT_declaration ?TAG_subprogram").unwrap();
        match tree {
            Tree::Cat(items) => {
                assert!(matches!(&items[0], Tree::Word(w) if w == "@AT_name"));
                assert!(matches!(&items[1], Tree::Word(w) if w == "?AT_name"));
                assert!(matches!(&items[2], Tree::Word(w) if w == "!AT_declaration"));
                assert!(matches!(&items[3], Tree::Word(w) if w == "?TAG_subprogram"));
            }
            other => panic!("expected Cat, got {:?}", other),
        }
    }
}
