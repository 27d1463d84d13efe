use crate::chunk::{Chunk, OpCode};
use crate::compiler::Compiler;
use crate::reporter::{Phase, Report, Reporter};
use crate::table::Table;
use crate::token::{Token, TokenKind};
use crate::value::{fnv1a_hash, ObjString, Value};
use std::rc::Rc;

const STACK_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// The stack-based interpreter: a value stack, a globals table, and
/// the string-interning pool every `ObjString` in the program funnels
/// through — `spec.md` §4.5 and the interning invariant of §3.
pub struct Vm {
    stack: Vec<Value>,
    globals: Table,
    strings: Table,
    /// Keeps every interned `ObjString` alive for the VM's lifetime so
    /// `Rc::clone`s handed out elsewhere never outlive their owner.
    objects: Vec<Rc<ObjString>>,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            strings: Table::new(),
            objects: Vec::new(),
        }
    }

    /// Returns the unique `Rc<ObjString>` for `chars`, creating and
    /// registering one the first time this exact byte sequence is
    /// seen. Every string-producing path (literals, concatenation,
    /// identifier names) must go through here — this is what makes
    /// `Value::Obj` equality-by-pointer sound.
    pub fn intern(&mut self, chars: &str) -> Rc<ObjString> {
        let hash = fnv1a_hash(chars.as_bytes());
        if let Some(existing) = self.strings.find_string(chars, hash) {
            return existing;
        }

        let obj = Rc::new(ObjString::new(chars.to_string()));
        self.strings.set(Rc::clone(&obj), Value::Nil);
        self.objects.push(Rc::clone(&obj));
        obj
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("compiler never emits an instruction that underflows the stack")
    }

    fn peek(&self, distance: usize) -> &Value {
        let len = self.stack.len();
        &self.stack[len - 1 - distance]
    }

    pub fn interpret<'a>(
        &mut self,
        source: &'a str,
        reporter: &mut dyn Reporter<'a>,
    ) -> InterpretResult {
        let chunk = match Compiler::compile(source, self, reporter) {
            Ok(chunk) => chunk,
            Err(()) => return InterpretResult::CompileError,
        };

        self.reset_stack();
        self.run(&chunk, reporter)
    }

    fn runtime_error(&mut self, reporter: &mut dyn Reporter<'_>, line: u32, message: String) {
        let token = Token::new(TokenKind::Error, "", line);
        reporter.error(Report::new(Phase::Runtime, message, token));
        self.reset_stack();
    }

    fn run(&mut self, chunk: &Chunk, reporter: &mut dyn Reporter<'_>) -> InterpretResult {
        let mut ip: usize = 0;

        macro_rules! read_byte {
            () => {{
                let byte = chunk.code[ip];
                ip += 1;
                byte
            }};
        }
        macro_rules! read_short {
            () => {{
                let hi = read_byte!() as u16;
                let lo = read_byte!() as u16;
                (hi << 8) | lo
            }};
        }
        macro_rules! read_constant {
            () => {{
                let index = read_byte!() as usize;
                chunk.constants[index].clone()
            }};
        }
        macro_rules! read_constant_long {
            () => {{
                let a = read_byte!() as usize;
                let b = read_byte!() as usize;
                let c = read_byte!() as usize;
                let index = (a << 16) | (b << 8) | c;
                chunk.constants[index].clone()
            }};
        }
        macro_rules! line {
            () => {
                chunk.lines[ip - 1]
            };
        }
        macro_rules! push {
            ($value:expr) => {{
                if self.stack.len() >= STACK_MAX {
                    let ln = line!();
                    self.runtime_error(reporter, ln, "Stack overflow.".to_string());
                    return InterpretResult::RuntimeError;
                }
                self.push($value);
            }};
        }
        macro_rules! binary_numeric_op {
            ($op:tt, $wrap:expr) => {{
                let (b, a) = (self.peek(0).clone(), self.peek(1).clone());
                match (a, b) {
                    (Value::Number(a), Value::Number(b)) => {
                        self.pop();
                        self.pop();
                        push!($wrap(a $op b));
                    }
                    _ => {
                        let ln = line!();
                        self.runtime_error(reporter, ln, "Operands must be numbers.".to_string());
                        return InterpretResult::RuntimeError;
                    }
                }
            }};
        }

        loop {
            #[cfg(feature = "debug-execution")]
            crate::debug::trace_execution(chunk, ip, &self.stack);

            let instruction = OpCode::from_byte(read_byte!());
            match instruction {
                OpCode::Constant => {
                    let value = read_constant!();
                    push!(value);
                }
                OpCode::ConstantLong => {
                    let value = read_constant_long!();
                    push!(value);
                }
                OpCode::Nil => push!(Value::Nil),
                OpCode::True => push!(Value::Bool(true)),
                OpCode::False => push!(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::PopN => {
                    let n = read_byte!() as usize;
                    let new_len = self.stack.len() - n;
                    self.stack.truncate(new_len);
                }
                OpCode::GetLocal => {
                    let slot = read_byte!() as usize;
                    push!(self.stack[slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = read_byte!() as usize;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::DefineGlobal => {
                    let name = read_constant!();
                    let name = name
                        .as_string()
                        .expect("global name constant is always a string")
                        .clone();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::GetGlobal => {
                    let name = read_constant!();
                    let name = name
                        .as_string()
                        .expect("global name constant is always a string");
                    match self.globals.get(name) {
                        Some(value) => {
                            let value = value.clone();
                            push!(value);
                        }
                        None => {
                            let ln = line!();
                            let message = format!("Undefined variable '{}'.", name.chars);
                            self.runtime_error(reporter, ln, message);
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = read_constant!();
                    let name = name
                        .as_string()
                        .expect("global name constant is always a string")
                        .clone();
                    let value = self.peek(0).clone();
                    if self.globals.set(Rc::clone(&name), value) {
                        self.globals.delete(&name);
                        let ln = line!();
                        let message = format!("Undefined variable '{}'.", name.chars);
                        self.runtime_error(reporter, ln, message);
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    push!(Value::Bool(a == b));
                }
                OpCode::Greater => binary_numeric_op!(>, Value::Bool),
                OpCode::Less => binary_numeric_op!(<, Value::Bool),
                OpCode::Diamond => {
                    let (b, a) = (self.peek(0).clone(), self.peek(1).clone());
                    match (a, b) {
                        (Value::Number(a), Value::Number(b)) => {
                            self.pop();
                            self.pop();
                            let ordering = if a < b {
                                -1.0
                            } else if a > b {
                                1.0
                            } else {
                                0.0
                            };
                            push!(Value::Number(ordering));
                        }
                        _ => {
                            let ln = line!();
                            self.runtime_error(reporter, ln, "Operands must be numbers.".to_string());
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::Add => {
                    let (b, a) = (self.peek(0).clone(), self.peek(1).clone());
                    match (a, b) {
                        (Value::Number(a), Value::Number(b)) => {
                            self.pop();
                            self.pop();
                            push!(Value::Number(a + b));
                        }
                        (Value::Obj(a), Value::Obj(b)) => {
                            self.pop();
                            self.pop();
                            let concatenated = format!("{}{}", a.chars, b.chars);
                            let interned = self.intern(&concatenated);
                            push!(Value::Obj(interned));
                        }
                        _ => {
                            let ln = line!();
                            self.runtime_error(reporter, ln, "Operands must be numbers.".to_string());
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::Subtract => binary_numeric_op!(-, Value::Number),
                OpCode::Multiply => binary_numeric_op!(*, Value::Number),
                OpCode::Divide => binary_numeric_op!(/, Value::Number),
                OpCode::Negate => {
                    if let Value::Number(n) = self.peek(0) {
                        let n = *n;
                        self.pop();
                        push!(Value::Number(-n));
                    } else {
                        let ln = line!();
                        self.runtime_error(reporter, ln, "Operand must be a number.".to_string());
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    push!(Value::Bool(value.is_falsey()));
                }
                OpCode::Jump => {
                    let offset = read_short!();
                    ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_short!();
                    if self.peek(0).is_falsey() {
                        ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = read_short!();
                    ip -= offset as usize;
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{value}");
                }
                OpCode::Return => {
                    return InterpretResult::Ok;
                }
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;

    fn run(source: &str) -> (InterpretResult, Vec<String>) {
        let mut vm = Vm::new();
        let mut reporter = CollectingReporter::new();
        let result = vm.interpret(source, &mut reporter);
        let errors = reporter.errors.iter().map(|r| r.message.clone()).collect();
        (result, errors)
    }

    #[test]
    fn arithmetic_and_print_round_trip() {
        let (result, errors) = run("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::Ok);
        assert!(errors.is_empty());
    }

    #[test]
    fn string_concatenation_interns_the_result() {
        let (result, _) = run("print `a` + `b`;");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn undefined_global_is_a_runtime_error() {
        let (result, errors) = run("print undefined_name;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(errors[0].contains("Undefined variable"));
    }

    #[test]
    fn xor_is_rejected_at_compile_time() {
        let (result, errors) = run("print true xor false;");
        assert_eq!(result, InterpretResult::CompileError);
        assert!(errors[0].contains("xor operator is not supported"));
    }

    #[test]
    fn locals_are_scoped_to_their_block() {
        let (result, errors) = run("{ var a = 1; print a; }");
        assert_eq!(result, InterpretResult::Ok);
        assert!(errors.is_empty());
    }

    #[test]
    fn nan_never_equals_itself_through_the_vm() {
        let (result, errors) = run("print (0/0 == 0/0);");
        assert_eq!(result, InterpretResult::Ok);
        assert!(errors.is_empty());
    }

    #[test]
    fn diamond_three_way_compares_numbers() {
        let (result, errors) = run("print 1 <> 2; print 2 <> 2; print 3 <> 2;");
        assert_eq!(result, InterpretResult::Ok);
        assert!(errors.is_empty());
    }

    #[test]
    fn diamond_requires_numbers() {
        let (result, errors) = run("print 1 <> `a`;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(errors[0].contains("Operands must be numbers."));
    }

    #[test]
    fn adding_a_number_to_a_string_reports_operands_must_be_numbers() {
        let (result, errors) = run("print 1 + `a`;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(errors[0].contains("Operands must be numbers."));
    }

    #[test]
    fn pushing_past_capacity_with_locals_live_overflows_the_stack() {
        let mut source = String::from("{\n");
        for i in 0..256 {
            source.push_str(&format!("var a{i} = {i};\n"));
        }
        source.push_str("print a0 + 1;\n}\n");

        let (result, errors) = run(&source);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(errors[0].contains("Stack overflow."));
    }
}
