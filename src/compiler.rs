use crate::chunk::{Chunk, OpCode};
use crate::reporter::{Phase, Report, Reporter};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind, TOKEN_KIND_COUNT};
use crate::value::Value;
use crate::vm::Vm;

/// Local variables occupy a fixed-capacity array; their index in it
/// is the stack slot they live in at runtime (`spec.md` §3/§4.4).
const MAX_LOCALS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    Xor,        // xor
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >= <>
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // reserved
    Primary,
}

impl Precedence {
    fn one_higher(self) -> Self {
        // Safe because `Primary` (the top) never needs to go higher:
        // every binary rule's precedence is strictly below `Primary`.
        let next = (self as u8) + 1;
        unsafe { std::mem::transmute(next) }
    }
}

type ParseFn = for<'a, 'r> fn(&mut Compiler<'a, 'r>, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

const NO_RULE: ParseRule = rule(None, None, Precedence::None);

/// Indexed by `TokenKind::rule_index()` — the Rust array is the exact
/// information-content equivalent of `clox`'s designated-initializer
/// `rules[]` table (Design Note 9 of `spec.md` licenses either form).
fn get_rule(kind: TokenKind) -> ParseRule {
    static RULES: [ParseRule; TOKEN_KIND_COUNT] = {
        let mut table = [NO_RULE; TOKEN_KIND_COUNT];
        table[TokenKind::LeftParen as usize] = rule(Some(Compiler::grouping), None, Precedence::None);
        table[TokenKind::Minus as usize] =
            rule(Some(Compiler::unary), Some(Compiler::binary), Precedence::Term);
        table[TokenKind::Plus as usize] = rule(None, Some(Compiler::binary), Precedence::Term);
        table[TokenKind::Slash as usize] = rule(None, Some(Compiler::binary), Precedence::Factor);
        table[TokenKind::Star as usize] = rule(None, Some(Compiler::binary), Precedence::Factor);
        table[TokenKind::Bang as usize] = rule(Some(Compiler::unary), None, Precedence::None);
        table[TokenKind::BangEqual as usize] = rule(None, Some(Compiler::binary), Precedence::Equality);
        table[TokenKind::EqualEqual as usize] = rule(None, Some(Compiler::binary), Precedence::Equality);
        table[TokenKind::Greater as usize] = rule(None, Some(Compiler::binary), Precedence::Comparison);
        table[TokenKind::GreaterEqual as usize] =
            rule(None, Some(Compiler::binary), Precedence::Comparison);
        table[TokenKind::Less as usize] = rule(None, Some(Compiler::binary), Precedence::Comparison);
        table[TokenKind::LessEqual as usize] = rule(None, Some(Compiler::binary), Precedence::Comparison);
        table[TokenKind::Diamond as usize] = rule(None, Some(Compiler::binary), Precedence::Comparison);
        table[TokenKind::Identifier as usize] = rule(Some(Compiler::variable), None, Precedence::None);
        table[TokenKind::String as usize] = rule(Some(Compiler::string), None, Precedence::None);
        table[TokenKind::Number as usize] = rule(Some(Compiler::number), None, Precedence::None);
        table[TokenKind::And as usize] = rule(None, Some(Compiler::and_), Precedence::And);
        table[TokenKind::Or as usize] = rule(None, Some(Compiler::or_), Precedence::Or);
        table[TokenKind::Xor as usize] = rule(None, Some(Compiler::xor_), Precedence::Xor);
        table[TokenKind::False as usize] = rule(Some(Compiler::literal), None, Precedence::None);
        table[TokenKind::True as usize] = rule(Some(Compiler::literal), None, Precedence::None);
        table[TokenKind::Nil as usize] = rule(Some(Compiler::literal), None, Precedence::None);
        table
    };
    RULES[kind.rule_index()]
}

struct Local<'a> {
    name: Token<'a>,
    depth: i32,
}

/// Single-pass Pratt parser: scans tokens and emits bytecode directly
/// into `chunk`, with no intermediate AST (`spec.md` §1/§4.4).
pub struct Compiler<'a, 'r> {
    scanner: Scanner<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    had_error: bool,
    panic_mode: bool,
    chunk: Chunk,
    locals: Vec<Local<'a>>,
    scope_depth: i32,
    vm: &'r mut Vm,
    reporter: &'r mut dyn Reporter<'a>,
}

impl<'a, 'r> Compiler<'a, 'r> {
    pub fn compile(
        source: &'a str,
        vm: &'r mut Vm,
        reporter: &'r mut dyn Reporter<'a>,
    ) -> Result<Chunk, ()> {
        let mut scanner = Scanner::new(source);
        let first = scanner.scan_token();
        let mut compiler = Compiler {
            scanner,
            current: first,
            previous: first,
            had_error: false,
            panic_mode: false,
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            vm,
            reporter,
        };

        while !compiler.check(TokenKind::Eof) {
            compiler.declaration();
        }

        compiler.consume(TokenKind::Eof, "Expect end of expression.");
        compiler.emit_op(OpCode::Return);

        if compiler.had_error {
            Err(())
        } else {
            Ok(compiler.chunk)
        }
    }

    // --- token stream plumbing -------------------------------------------------

    fn error_at(&mut self, token: Token<'a>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.reporter
            .error(Report::new(Phase::Parsing, message.to_string(), token));
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn advance(&mut self) {
        self.previous = self.current;

        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // --- byte/constant emission --------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn make_constant(&mut self, value: Value) -> usize {
        self.chunk.add_constant(value)
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        let line = self.previous.line;
        self.chunk.emit_constant(index, line);
    }

    /// Emits a jump instruction with a placeholder 16-bit offset and
    /// returns the index of the placeholder's first byte, for later
    /// `patch_jump`.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_bytes(0xff, 0xff);
        self.chunk.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        self.chunk.code[offset] = (jump >> 8) as u8;
        self.chunk.code[offset + 1] = jump as u8;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
            return;
        }
        self.emit_bytes((offset >> 8) as u8, offset as u8);
    }

    // --- scopes and locals --------------------------------------------------

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;

        let mut pop_count = 0usize;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.locals.pop();
            pop_count += 1;
        }

        // Batch the pops with `PopN` (`spec.md`'s documented opcode),
        // rather than one `Pop` per local the way the original does.
        while pop_count > 0 {
            let n = pop_count.min(u8::MAX as usize);
            if n == 1 {
                self.emit_op(OpCode::Pop);
            } else {
                self.emit_op(OpCode::PopN);
                self.emit_byte(n as u8);
            }
            pop_count -= n;
        }
    }

    fn identifiers_equal(a: &Token<'a>, b: &Token<'a>) -> bool {
        a.lexeme == b.lexeme
    }

    fn resolve_local(&mut self, name: Token<'a>) -> Option<usize> {
        for (index, local) in self.locals.iter().enumerate().rev() {
            if Self::identifiers_equal(&local.name, &name) {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(index);
            }
        }
        None
    }

    fn add_local(&mut self, name: Token<'a>) {
        if self.locals.len() == MAX_LOCALS {
            self.error("Too many local variables in current scope.");
            return;
        }
        self.locals.push(Local { name, depth: -1 });
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }

        let name = self.previous;
        for local in self.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.scope_depth {
                break;
            }
            if Self::identifiers_equal(&local.name, &name) {
                self.error("Already a variable with this name in this scope.");
            }
        }

        self.add_local(name);
    }

    fn identifier_constant(&mut self, name: Token<'a>) -> usize {
        let interned = self.vm.intern(name.lexeme);
        let index = self.make_constant(Value::Obj(interned));
        if index > u8::MAX as usize {
            self.error("Too many distinct global names in one chunk.");
        }
        index
    }

    fn parse_variable(&mut self, message: &str) -> usize {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }
        let name = self.previous;
        self.identifier_constant(name)
    }

    fn mark_initialized(&mut self) {
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    fn define_variable(&mut self, global: usize) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        let line = self.previous.line;
        self.emit_op(OpCode::DefineGlobal);
        self.chunk.emit_operand_byte(global, line);
    }

    // --- expressions --------------------------------------------------

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).prefix;
        let Some(prefix) = prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(f64::NAN);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let trimmed = &lexeme[1..lexeme.len() - 1];
        let interned = self.vm.intern(trimmed);
        self.emit_constant(Value::Obj(interned));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!("literal() called on a non-literal token"),
        }
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else {
            let arg = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, arg)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            let line = self.previous.line;
            self.emit_op(set_op);
            self.chunk.emit_operand_byte(arg, line);
        } else {
            let line = self.previous.line;
            self.emit_op(get_op);
            self.chunk.emit_operand_byte(arg, line);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous;
        self.named_variable(name, can_assign);
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary() called on a non-unary operator"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = get_rule(operator);
        self.parse_precedence(rule.precedence.one_higher());

        match operator {
            TokenKind::BangEqual => self.emit_bytes(OpCode::Equal as u8, OpCode::Not as u8),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_bytes(OpCode::Less as u8, OpCode::Not as u8),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_bytes(OpCode::Greater as u8, OpCode::Not as u8),
            TokenKind::Diamond => self.emit_op(OpCode::Diamond),
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary() called on a non-binary operator"),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    /// `xor` is recognized and has a real infix slot, but — per the
    /// Open Question resolution in `SPEC_FULL.md` §4.4 — never wires
    /// a runtime opcode; it always fails compilation, exactly as
    /// `original_source/clox/parser.c`'s `xor_` does.
    fn xor_(&mut self, _can_assign: bool) {
        self.parse_precedence(Precedence::Xor.one_higher());
        self.error("The xor operator is not supported.");
    }

    // --- statements --------------------------------------------------

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }
}
