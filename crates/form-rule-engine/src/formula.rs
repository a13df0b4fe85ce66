//! 计算公式
//!
//! `calculate` 动作使用的小型算术语言：
//!
//! ```text
//! expr    = term (("+" / "-") term)*
//! term    = unary (("*" / "/") unary)*
//! unary   = "-" unary / power
//! power   = primary ["^" unary]        ; 右结合
//! primary = number / "{" path "}" / "(" expr ")"
//! ```
//!
//! `{path}` 按点号路径从评估上下文取值，例如 `{weight} / ({height} / 100) ^ 2`。
//! 公式在保存规则时解析一次，解析失败则拒绝保存。

use crate::error::{Result, RuleError};
use crate::evaluator::to_number;
use crate::models::EvaluationContext;
use std::fmt;

/// 括号/一元负号的最大嵌套层数
const MAX_NESTING: usize = 64;

/// 单个公式最多包含的运算符数，语法树深度因此有上界
const MAX_OPERATORS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        };
        f.write_str(s)
    }
}

/// 公式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Reference(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    OpenParen,
    CloseParen,
    Eof,
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let Some(ch) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '(' => Some(Token::OpenParen),
            ')' => Some(Token::CloseParen),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }

        if ch == '{' {
            let start = self.pos + 1;
            let Some(len) = self.input[start..].find('}') else {
                return Err(RuleError::Formula(format!(
                    "位置 {} 的字段引用缺少 '}}'",
                    self.pos
                )));
            };
            let path = self.input[start..start + len].trim();
            if path.is_empty() {
                return Err(RuleError::Formula(format!("位置 {} 的字段引用为空", self.pos)));
            }
            self.pos = start + len + 1;
            return Ok(Token::Reference(path.to_string()));
        }

        if ch.is_ascii_digit() || ch == '.' {
            let start = self.pos;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() || c == '.' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            let literal = &self.input[start..self.pos];
            return literal
                .parse::<f64>()
                .map(Token::Number)
                .map_err(|_| RuleError::Formula(format!("无效的数字 '{}'", literal)));
        }

        Err(RuleError::Formula(format!(
            "位置 {} 出现意外字符 '{}'",
            self.pos, ch
        )))
    }
}

struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
    nesting: usize,
    operators: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let mut tokenizer = Tokenizer::new(input);
        let current = tokenizer.next_token()?;
        Ok(Self {
            tokenizer,
            current,
            nesting: 0,
            operators: 0,
        })
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.tokenizer.next_token()?;
        Ok(())
    }

    fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        if self.current != Token::Eof {
            return Err(RuleError::Formula(format!(
                "公式末尾有多余内容: {:?}",
                self.current
            )));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.count_operator()?;
            self.advance()?;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.count_operator()?;
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.current == Token::Minus {
            self.count_operator()?;
            self.enter()?;
            self.advance()?;
            let operand = self.parse_unary()?;
            self.nesting -= 1;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;

        if self.current == Token::Caret {
            self.count_operator()?;
            self.enter()?;
            self.advance()?;
            let exponent = self.parse_unary()?;
            self.nesting -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }

        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Reference(path) => {
                self.advance()?;
                Ok(Expr::Reference(path))
            }
            Token::OpenParen => {
                self.enter()?;
                self.advance()?;
                let expr = self.parse_expr()?;
                if self.current != Token::CloseParen {
                    return Err(RuleError::Formula("缺少 ')'".to_string()));
                }
                self.advance()?;
                self.nesting -= 1;
                Ok(expr)
            }
            Token::Eof => Err(RuleError::Formula("公式意外结束".to_string())),
            other => Err(RuleError::Formula(format!("意外的符号 {:?}", other))),
        }
    }

    fn count_operator(&mut self) -> Result<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(RuleError::Formula(format!(
                "运算符超过 {} 个",
                MAX_OPERATORS
            )));
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(RuleError::Formula(format!(
                "嵌套超过 {} 层",
                MAX_NESTING
            )));
        }
        Ok(())
    }
}

/// 已解析的公式
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// 解析公式文本
    pub fn parse(source: &str) -> Result<Self> {
        let expr = Parser::new(source)?.parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// 公式引用的字段路径（按出现顺序去重）
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        let mut stack = vec![&self.expr];

        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Number(_) => {}
                Expr::Reference(path) => {
                    if !refs.contains(path) {
                        refs.push(path.clone());
                    }
                }
                Expr::Negate(inner) => stack.push(inner),
                Expr::Binary { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        refs
    }

    /// 在上下文上求值
    ///
    /// 引用缺失或不是数值、除以零、结果非有限值都会返回 `RuleError::Formula`。
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<f64> {
        let value = eval_expr(&self.expr, context)?;
        if !value.is_finite() {
            return Err(RuleError::Formula(format!(
                "'{}' 的结果不是有限数值",
                self.source
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval_expr(expr: &Expr, context: &EvaluationContext) -> Result<f64> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Reference(path) => to_number(context.get_field(path))
            .ok_or_else(|| RuleError::Formula(format!("字段 {} 缺失或不是数值", path))),
        Expr::Negate(inner) => Ok(-eval_expr(inner, context)?),
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, context)?;
            let r = eval_expr(right, context)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        Err(RuleError::Formula("除数为零".to_string()))
                    } else {
                        Ok(l / r)
                    }
                }
                BinaryOp::Pow => Ok(l.powf(r)),
            }
        }
    }
}
