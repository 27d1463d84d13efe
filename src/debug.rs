use crate::chunk::{Chunk, OpCode};
use crate::value::Value;

/// Disassembles an entire chunk to stdout, one instruction per line —
/// enabled by `debug-bytecode`, mirroring the teacher's `debug_bytecode`.
#[cfg(feature = "debug-bytecode")]
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

#[cfg(not(feature = "debug-bytecode"))]
pub fn disassemble_chunk(_chunk: &Chunk, _name: &str) {}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{name:<16} {slot:4}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let jump = ((chunk.code[offset + 1] as u16) << 8 | chunk.code[offset + 2] as u16) as i32;
    let target = offset as i32 + 3 + sign * jump;
    println!("{name:<16} {offset:4} -> {target}");
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.code[offset + 1] as usize;
    println!("{name:<16} {index:4} '{}'", chunk.constants[index]);
    offset + 2
}

fn constant_long_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = ((chunk.code[offset + 1] as usize) << 16)
        | ((chunk.code[offset + 2] as usize) << 8)
        | chunk.code[offset + 3] as usize;
    println!("{name:<16} {index:4} '{}'", chunk.constants[index]);
    offset + 4
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let instruction = OpCode::from_byte(chunk.code[offset]);
    match instruction {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset),
        OpCode::ConstantLong => constant_long_instruction("OP_CONSTANT_LONG", chunk, offset),
        OpCode::Nil => simple_instruction("OP_NIL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::PopN => byte_instruction("OP_POPN", chunk, offset),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Diamond => simple_instruction("OP_DIAMOND", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
    }
}

/// Prints the stack and the next instruction before each dispatch —
/// enabled by `debug-execution`, mirroring the teacher's execution tracer.
#[cfg(feature = "debug-execution")]
pub fn trace_execution(chunk: &Chunk, ip: usize, stack: &[Value]) {
    print!("          ");
    for value in stack {
        print!("[ {value} ]");
    }
    println!();
    disassemble_instruction(chunk, ip);
}

#[cfg(not(feature = "debug-execution"))]
pub fn trace_execution(_chunk: &Chunk, _ip: usize, _stack: &[Value]) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembling_an_empty_chunk_visits_nothing() {
        let chunk = Chunk::new();
        disassemble_chunk(&chunk, "empty");
    }

    #[test]
    fn constant_instruction_reports_its_operand_width() {
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.0));
        chunk.emit_constant(index, 1);
        let next = disassemble_instruction(&chunk, 0);
        assert_eq!(next, 2);
    }
}
