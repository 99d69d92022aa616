use num_traits::FromPrimitive;
use spirv::Op;

use crate::error::{anyhow, bail, Result};

/// Forward cursor over an instruction stream (no header). Finite and
/// non-restartable; decoding stops at the first malformed length field.
pub struct Instrs<'a> {
    rest: &'a [u32],
}

impl<'a> Instrs<'a> {
    pub fn new(words: &'a [u32]) -> Result<Instrs<'a>> {
        Ok(Instrs { rest: words })
    }

    pub fn next(&mut self) -> Result<Option<Instr<'a>>> {
        let head = match self.rest.first() {
            Some(x) => *x,
            None => return Ok(None),
        };
        let len = (head >> 16) as usize;
        if len == 0 {
            bail!("instruction length is zero");
        }
        if len > self.rest.len() {
            bail!("instruction is truncated");
        }
        let instr = Instr {
            words: &self.rest[..len],
        };
        self.rest = &self.rest[len..];
        Ok(Some(instr))
    }
}

/// One decoded instruction: the length/opcode word plus operands.
#[derive(Debug, Clone, Copy)]
pub struct Instr<'a> {
    words: &'a [u32],
}

impl<'a> Instr<'a> {
    pub fn opcode(&self) -> u32 {
        self.words[0] & 0xFFFF
    }

    /// The opcode as a known `Op`, or `None` for opcodes this build's
    /// SPIR-V headers don't know about.
    pub fn op(&self) -> Option<Op> {
        Op::from_u32(self.opcode())
    }

    /// All words including the leading length/opcode word.
    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Operand reader positioned after the opcode word. Reads are bounds
    /// checked and fail on truncated operands.
    pub fn operands(&self) -> Operands<'a> {
        Operands(&self.words[1..])
    }
}

pub struct Operands<'a>(&'a [u32]);

impl<'a> Operands<'a> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        match self.0.first() {
            Some(&x) => {
                self.0 = &self.0[1..];
                Ok(x)
            }
            None => Err(anyhow!("operand is too short")),
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u32().map(|x| x != 0)
    }

    pub fn read_enum<E: FromPrimitive>(&mut self) -> Result<E> {
        self.read_u32()
            .and_then(|x| E::from_u32(x).ok_or_else(|| anyhow!("invalid enum value")))
    }

    /// A nul-terminated UTF-8 string packed four bytes to a word.
    pub fn read_str(&mut self) -> Result<String> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        while let Some(&word) = self.0.first() {
            self.0 = &self.0[1..];
            let chunk = word.to_le_bytes();
            if let Some(nul) = chunk.iter().position(|&x| x == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                return String::from_utf8(bytes).map_err(|_| anyhow!("string is not valid utf-8"));
            }
            bytes.extend_from_slice(&chunk);
        }
        bail!("string is not nul terminated")
    }

    /// All remaining operand words.
    pub fn read_list(&mut self) -> Result<&'a [u32]> {
        let rest = self.0;
        self.0 = &[];
        Ok(rest)
    }
}

/// Builds a single instruction word by word; the word count is filled in at
/// the end.
pub struct InstructionBuilder {
    words: Vec<u32>,
}

impl InstructionBuilder {
    pub fn new(op: Op) -> InstructionBuilder {
        InstructionBuilder {
            words: vec![(op as u32) & 0xFFFF],
        }
    }

    pub fn push(mut self, x: u32) -> Self {
        self.words.push(x);
        self
    }

    pub fn push_list(mut self, x: &[u32]) -> Self {
        self.words.extend_from_slice(x);
        self
    }

    pub fn push_str(mut self, x: &str) -> Self {
        let mut bytes = x.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        for chunk in bytes.chunks_exact(4) {
            self.words
                .push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        self
    }

    pub fn into_words(mut self) -> Vec<u32> {
        self.words[0] |= (self.words.len() as u32) << 16;
        self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_and_decodes() {
        let words = InstructionBuilder::new(Op::Name)
            .push(42)
            .push_str("vertEntry")
            .into_words();
        let mut instrs = Instrs::new(&words).unwrap();
        let instr = instrs.next().unwrap().unwrap();
        assert_eq!(instr.op(), Some(Op::Name));
        assert_eq!(instr.word_count(), words.len());
        let mut operands = instr.operands();
        assert_eq!(operands.read_u32().unwrap(), 42);
        assert_eq!(operands.read_str().unwrap(), "vertEntry");
        assert!(operands.is_empty());
        assert!(instrs.next().unwrap().is_none());
    }

    #[test]
    fn rejects_truncated_streams() {
        // Word count of 3 with only one word present.
        let words = [(3u32 << 16) | Op::Decorate as u32];
        let mut instrs = Instrs::new(&words).unwrap();
        assert!(instrs.next().is_err());

        let words = [0u32];
        let mut instrs = Instrs::new(&words).unwrap();
        assert!(instrs.next().is_err());
    }

    #[test]
    fn string_padding_is_word_aligned() {
        // A 4-byte name needs a second word for the terminator.
        let words = InstructionBuilder::new(Op::Name).push(1).push_str("vary").into_words();
        assert_eq!(words.len(), 1 + 1 + 2);
        let words = InstructionBuilder::new(Op::Name).push(1).push_str("xyz").into_words();
        assert_eq!(words.len(), 1 + 1 + 1);
    }
}
