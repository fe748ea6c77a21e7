//! The `.tapc` on-disk artifact format (spec §4.4).
//!
//! Layout, little-endian throughout:
//! 1. header (instruction count, 3 literal-pool counts, compile-time sizing info)
//! 2. instruction vector, 4 bytes each
//! 3. int literal pool, 8 bytes each
//! 4. float literal pool, 8 bytes each
//! 5. string literal pool: 8-byte length, bytes, NUL, per string

use std::convert::TryInto;
use std::io::{self, Read, Write};

use crate::common::opcode::Instruction;

/// Per-artifact sizing the compiler computed statically: how large the
/// named-object array, temp array, and eval stack of the top-level frame
/// must be. Function literals carry their own via `PUSHINFO` (see
/// `compiler::compile`); this header describes only the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub named_max: u32,
    pub temp_max: u32,
    pub stack_max: u8,
    pub param_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub header: ArtifactHeader,
    pub instructions: Vec<Instruction>,
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub strings: Vec<String>,
}

/// Failure loading or saving an artifact. Surfaced to callers as
/// `session::SessionError::Io`.
#[derive(Debug)]
pub enum ArtifactError {
    Io(io::Error),
    ShortRead { section: &'static str },
    BadInstruction(u32),
    BadString,
}

impl From<io::Error> for ArtifactError {
    fn from(e: io::Error) -> ArtifactError {
        ArtifactError::Io(e)
    }
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactError::Io(e) => write!(f, "io error: {}", e),
            ArtifactError::ShortRead { section } => {
                write!(f, "short read in {} section", section)
            }
            ArtifactError::BadInstruction(word) => {
                write!(f, "instruction word 0x{:08x} decodes to no known opcode", word)
            }
            ArtifactError::BadString => write!(f, "string literal missing its terminating NUL"),
        }
    }
}

impl std::error::Error for ArtifactError {}

impl Artifact {
    pub fn save<W: Write>(&self, w: &mut W) -> Result<(), ArtifactError> {
        w.write_all(&(self.instructions.len() as u64).to_le_bytes())?;
        w.write_all(&(self.ints.len() as u64).to_le_bytes())?;
        w.write_all(&(self.floats.len() as u64).to_le_bytes())?;
        w.write_all(&(self.strings.len() as u64).to_le_bytes())?;
        w.write_all(&self.header.named_max.to_le_bytes())?;
        w.write_all(&self.header.temp_max.to_le_bytes())?;
        w.write_all(&[self.header.stack_max])?;
        w.write_all(&self.header.param_count.to_le_bytes())?;

        for ins in &self.instructions {
            w.write_all(&ins.encode().to_le_bytes())?;
        }
        for i in &self.ints {
            w.write_all(&i.to_le_bytes())?;
        }
        for f in &self.floats {
            w.write_all(&f.to_le_bytes())?;
        }
        for s in &self.strings {
            w.write_all(&(s.len() as u64).to_le_bytes())?;
            w.write_all(s.as_bytes())?;
            w.write_all(&[0u8])?;
        }
        Ok(())
    }

    pub fn load<R: Read>(r: &mut R) -> Result<Artifact, ArtifactError> {
        let instr_count = read_u64(r, "header")? as usize;
        let int_count = read_u64(r, "header")? as usize;
        let float_count = read_u64(r, "header")? as usize;
        let string_count = read_u64(r, "header")? as usize;

        let named_max = read_u32(r, "header")?;
        let temp_max = read_u32(r, "header")?;
        let stack_max = read_u8(r, "header")?;
        let param_count = read_u32(r, "header")?;

        let mut instructions = Vec::with_capacity(instr_count);
        for _ in 0..instr_count {
            let word = read_u32(r, "instructions")?;
            let ins = Instruction::decode(word).ok_or(ArtifactError::BadInstruction(word))?;
            instructions.push(ins);
        }

        let mut ints = Vec::with_capacity(int_count);
        for _ in 0..int_count {
            ints.push(read_i64(r, "int pool")?);
        }

        let mut floats = Vec::with_capacity(float_count);
        for _ in 0..float_count {
            floats.push(read_f64(r, "float pool")?);
        }

        let mut strings = Vec::with_capacity(string_count);
        for _ in 0..string_count {
            let len = read_u64(r, "string pool")? as usize;
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes)
                .map_err(|_| ArtifactError::ShortRead { section: "string pool" })?;
            let nul = read_u8(r, "string pool")?;
            if nul != 0 {
                return Err(ArtifactError::BadString);
            }
            let s = String::from_utf8(bytes).map_err(|_| ArtifactError::BadString)?;
            strings.push(s);
        }

        Ok(Artifact {
            header: ArtifactHeader { named_max, temp_max, stack_max, param_count },
            instructions,
            ints,
            floats,
            strings,
        })
    }
}

fn read_u8<R: Read>(r: &mut R, section: &'static str) -> Result<u8, ArtifactError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|_| ArtifactError::ShortRead { section })?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R, section: &'static str) -> Result<u32, ArtifactError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| ArtifactError::ShortRead { section })?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R, section: &'static str) -> Result<u64, ArtifactError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|_| ArtifactError::ShortRead { section })?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R, section: &'static str) -> Result<i64, ArtifactError> {
    read_u64(r, section).map(|u| i64::from_le_bytes(u.to_le_bytes()))
}

fn read_f64<R: Read>(r: &mut R, section: &'static str) -> Result<f64, ArtifactError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|_| ArtifactError::ShortRead { section })?;
    Ok(f64::from_le_bytes(buf))
}

/// Truncating widen used when a pool index is known by construction to fit
/// (checked when the instruction was emitted); kept as a single named spot
/// rather than scattered `as usize` casts.
pub fn index_of(u: u32) -> usize {
    u.try_into().expect("pool index exceeds usize")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::opcode::{Opcode, Operands};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn sample() -> Artifact {
        Artifact {
            header: ArtifactHeader { named_max: 3, temp_max: 5, stack_max: 8, param_count: 1 },
            instructions: vec![
                Instruction::new(Opcode::PushI, Operands::U(0)).unwrap(),
                Instruction::new(Opcode::Add, Operands::LR(1, 2)).unwrap(),
                Instruction::new(Opcode::Ret, Operands::None).unwrap(),
            ],
            ints: vec![0, -7, i64::MAX],
            floats: vec![0.0, 3.5, -1.25],
            strings: vec!["hi".into(), "".into(), "with\0nul-unsafe chars? no".into()],
        }
    }

    #[test]
    fn round_trip() {
        let artifact = sample();
        let mut buf = Vec::new();
        artifact.save(&mut buf).unwrap();
        let loaded = Artifact::load(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn short_read_is_session_io_error() {
        let artifact = sample();
        let mut buf = Vec::new();
        artifact.save(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        let err = Artifact::load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ArtifactError::ShortRead { .. }));
    }

    proptest! {
        #[test]
        fn prop_int_float_round_trip(ints in prop::collection::vec(any::<i64>(), 0..8),
                                      floats in prop::collection::vec(any::<f64>(), 0..8)) {
            let artifact = Artifact {
                header: ArtifactHeader { named_max: 0, temp_max: 0, stack_max: 0, param_count: 0 },
                instructions: vec![],
                ints,
                floats,
                strings: vec![],
            };
            let mut buf = Vec::new();
            artifact.save(&mut buf).unwrap();
            let loaded = Artifact::load(&mut Cursor::new(buf)).unwrap();
            prop_assert_eq!(loaded.ints, artifact.ints);
            prop_assert!(loaded.floats.iter().zip(artifact.floats.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits()));
        }
    }
}
