//! Raw-to-normalized instruction decoding.
//!
//! The adapter hides the host's opcode families and pool indirection:
//! in-place variants fold into their binary forms, the two pop flavors of
//! each branch become one opcode with a `pop` flag, and pool indices are
//! resolved into the values and names they denote. Opcodes with no QIR
//! mapping survive as `Unsupported` and only fail translation when the
//! interpreter actually reaches them.

use thiserror::Error;

use crate::code::{CodeObject, Const, RawInst};
use crate::opcode::{BinOp, CmpOp, Inst, InstSeq, Opcode};

/// Raised when the input is not a decodable function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("not an introspectable function: {0}")]
pub struct AdapterError(pub String);

const BINARY_OPNAMES: [(&str, BinOp); 16] = [
    ("BINARY_ADD", BinOp::Add),
    ("BINARY_SUBTRACT", BinOp::Sub),
    ("BINARY_MULTIPLY", BinOp::Mul),
    ("BINARY_TRUE_DIVIDE", BinOp::Div),
    ("BINARY_MODULO", BinOp::Mod),
    ("BINARY_POWER", BinOp::Pow),
    ("BINARY_AND", BinOp::And),
    ("BINARY_OR", BinOp::Or),
    ("INPLACE_ADD", BinOp::Add),
    ("INPLACE_SUBTRACT", BinOp::Sub),
    ("INPLACE_MULTIPLY", BinOp::Mul),
    ("INPLACE_TRUE_DIVIDE", BinOp::Div),
    ("INPLACE_MODULO", BinOp::Mod),
    ("INPLACE_POWER", BinOp::Pow),
    ("INPLACE_AND", BinOp::And),
    ("INPLACE_OR", BinOp::Or),
];

/// Decode a code object into the normalized instruction sequence.
pub fn adapt(code: &CodeObject) -> Result<InstSeq, AdapterError> {
    let mut insts = Vec::with_capacity(code.instructions.len());

    for raw in &code.instructions {
        let op = match raw.opname.as_str() {
            // The host inserts NOPs for alignment; they carry no meaning.
            "NOP" => continue,

            "LOAD_CONST" => Opcode::LoadConst(const_arg(code, raw)?),
            "LOAD_FAST" => Opcode::LoadFast(name_arg(&code.varnames, raw, "local")?),
            "STORE_FAST" => Opcode::StoreFast(name_arg(&code.varnames, raw, "local")?),
            "LOAD_NAME" | "LOAD_GLOBAL" => {
                Opcode::LoadGlobal(name_arg(&code.names, raw, "global")?)
            }
            "STORE_NAME" => Opcode::StoreFast(name_arg(&code.names, raw, "global")?),
            "LOAD_DEREF" | "LOAD_CLOSURE" => {
                Opcode::LoadDeref(name_arg(&code.freevars, raw, "free variable")?)
            }
            "LOAD_ATTR" => Opcode::LoadAttr(name_arg(&code.names, raw, "attribute")?),

            "COMPARE_OP" => {
                let index = num_arg(raw)?;
                Opcode::CompareOp(CmpOp::from_index(index).ok_or_else(|| {
                    AdapterError(format!(
                        "comparison index {} out of range at offset {}",
                        index, raw.offset
                    ))
                })?)
            }
            "UNARY_NOT" => Opcode::UnaryNot,

            "BUILD_LIST" | "BUILD_SET" => Opcode::BuildList(num_arg(raw)?),
            "BUILD_TUPLE" => Opcode::BuildTuple(num_arg(raw)?),
            "BUILD_MAP" => Opcode::BuildMap(num_arg(raw)?),
            "LIST_APPEND" | "SET_ADD" => Opcode::ListAppend(num_arg(raw)?),
            "MAP_ADD" => Opcode::MapAdd(num_arg(raw)?),

            "CALL" | "CALL_FUNCTION" => Opcode::Call(num_arg(raw)?),
            "MAKE_FUNCTION" => Opcode::MakeFunction,
            "RETURN_VALUE" => Opcode::ReturnValue,

            "JUMP_FORWARD" | "JUMP_ABSOLUTE" | "CONTINUE_LOOP" => Opcode::Jump(num_arg(raw)?),
            "POP_JUMP_IF_TRUE" => Opcode::JumpIfTrue {
                target: num_arg(raw)?,
                pop: true,
            },
            "POP_JUMP_IF_FALSE" => Opcode::JumpIfFalse {
                target: num_arg(raw)?,
                pop: true,
            },
            "JUMP_IF_TRUE_OR_POP" => Opcode::JumpIfTrue {
                target: num_arg(raw)?,
                pop: false,
            },
            "JUMP_IF_FALSE_OR_POP" => Opcode::JumpIfFalse {
                target: num_arg(raw)?,
                pop: false,
            },

            "GET_ITER" => Opcode::GetIter,
            "FOR_ITER" => Opcode::ForIter(num_arg(raw)?),

            other => {
                if let Some((_, op)) = BINARY_OPNAMES.iter().find(|(name, _)| *name == other) {
                    Opcode::BinaryOp(*op)
                } else {
                    Opcode::Unsupported(other.to_string())
                }
            }
        };

        insts.push(Inst {
            offset: raw.offset,
            op,
        });
    }

    let seq = InstSeq::new(insts);
    check_jump_targets(&seq)?;
    Ok(seq)
}

fn const_arg(code: &CodeObject, raw: &RawInst) -> Result<Const, AdapterError> {
    let index = num_arg(raw)? as usize;
    code.consts.get(index).cloned().ok_or_else(|| {
        AdapterError(format!(
            "constant index {} out of range at offset {}",
            index, raw.offset
        ))
    })
}

fn name_arg(table: &[String], raw: &RawInst, what: &str) -> Result<String, AdapterError> {
    let index = num_arg(raw)? as usize;
    table.get(index).cloned().ok_or_else(|| {
        AdapterError(format!(
            "{} index {} out of range at offset {}",
            what, index, raw.offset
        ))
    })
}

fn num_arg(raw: &RawInst) -> Result<u32, AdapterError> {
    raw.arg.ok_or_else(|| {
        AdapterError(format!(
            "{} at offset {} is missing its argument",
            raw.opname, raw.offset
        ))
    })
}

fn check_jump_targets(seq: &InstSeq) -> Result<(), AdapterError> {
    for inst in seq.iter() {
        let target = match inst.op {
            Opcode::Jump(target)
            | Opcode::JumpIfTrue { target, .. }
            | Opcode::JumpIfFalse { target, .. }
            | Opcode::ForIter(target) => target,
            _ => continue,
        };
        if seq.index_of(target).is_none() {
            return Err(AdapterError(format!(
                "jump at offset {} targets {} which is not an instruction boundary",
                inst.offset, target
            )));
        }
    }
    Ok(())
}
