//! 标量变换表达式
//!
//! 映射上的入库前公式，如 `value * 0.1 - 40`。支持 `value` 变量、
//! 数值字面量、四则运算和括号。解析错误在映射创建时暴露，
//! 运行期只做求值。

/// 表达式解析错误。
#[derive(Debug, thiserror::Error)]
#[error("invalid transform expression: {0}")]
pub struct TransformError(pub String);

/// 已编译的变换表达式。
#[derive(Debug, Clone)]
pub struct Transform {
    root: Expr,
}

#[derive(Debug, Clone)]
enum Expr {
    Value,
    Literal(f64),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Transform {
    /// 解析表达式；非法输入返回错误。
    pub fn parse(source: &str) -> Result<Self, TransformError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(TransformError(format!(
                "unexpected trailing input in `{}`",
                source
            )));
        }
        Ok(Self { root })
    }

    /// 求值（除零遵循 IEEE 754 语义）。
    pub fn eval(&self, value: f64) -> f64 {
        eval_expr(&self.root, value)
    }
}

fn eval_expr(expr: &Expr, value: f64) -> f64 {
    match expr {
        Expr::Value => value,
        Expr::Literal(literal) => *literal,
        Expr::Neg(inner) => -eval_expr(inner, value),
        Expr::Add(lhs, rhs) => eval_expr(lhs, value) + eval_expr(rhs, value),
        Expr::Sub(lhs, rhs) => eval_expr(lhs, value) - eval_expr(rhs, value),
        Expr::Mul(lhs, rhs) => eval_expr(lhs, value) * eval_expr(rhs, value),
        Expr::Div(lhs, rhs) => eval_expr(lhs, value) / eval_expr(rhs, value),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value,
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, TransformError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        match c {
            ' ' | '\t' => pos += 1,
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            '0'..='9' | '.' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                let text: String = chars[start..pos].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| TransformError(format!("bad number `{}`", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_alphanumeric() {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                if word == "value" {
                    tokens.push(Token::Value);
                } else {
                    return Err(TransformError(format!("unknown identifier `{}`", word)));
                }
            }
            other => return Err(TransformError(format!("unexpected character `{}`", other))),
        }
    }
    if tokens.is_empty() {
        return Err(TransformError("empty expression".to_string()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.term()?));
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.term()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.factor()?));
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.factor()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn factor(&mut self) -> Result<Expr, TransformError> {
        match self.peek().cloned() {
            Some(Token::Number(number)) => {
                self.pos += 1;
                Ok(Expr::Literal(number))
            }
            Some(Token::Value) => {
                self.pos += 1;
                Ok(Expr::Value)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.factor()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(TransformError("missing closing parenthesis".to_string())),
                }
            }
            other => Err(TransformError(format!("unexpected token {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_scaling() {
        let t = Transform::parse("value * 0.1 - 40").expect("parse");
        assert_eq!(t.eval(650.0), 25.0);
    }

    #[test]
    fn precedence_and_parens() {
        let t = Transform::parse("value + 2 * 3").expect("parse");
        assert_eq!(t.eval(1.0), 7.0);
        let t = Transform::parse("(value + 2) * 3").expect("parse");
        assert_eq!(t.eval(1.0), 9.0);
    }

    #[test]
    fn unary_minus() {
        let t = Transform::parse("-value / 2").expect("parse");
        assert_eq!(t.eval(10.0), -5.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Transform::parse("").is_err());
        assert!(Transform::parse("volts * 2").is_err());
        assert!(Transform::parse("value +").is_err());
        assert!(Transform::parse("(value").is_err());
        assert!(Transform::parse("value 2").is_err());
    }
}
