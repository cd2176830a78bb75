//! Decode command.

use risu::{Error, Opcode, Result};
use risu_state::{OP_MASK, RISU_KEY};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

/// Handle the `decode` command.
pub fn cmd_decode(insn: &str) -> i32 {
    let word = match parse_insn(insn) {
        Ok(word) => word,
        Err(e) => {
            error!(error = %e, "cannot decode");
            return EXIT_FAILURE;
        }
    };

    let op = Opcode::classify(word);
    let keyed = word & !OP_MASK == RISU_KEY;
    let exchange = match op {
        op if op.is_register_compare() => "register snapshot",
        Opcode::CompareMem => "scratch block",
        _ => "none",
    };
    println!("insn     0x{word:08x}");
    println!("keyed    {}", if keyed { "yes" } else { "no" });
    println!("opcode   {op}");
    println!("exchange {exchange}");
    EXIT_SUCCESS
}

/// Parse a hex instruction word, with or without a `0x` prefix.
fn parse_insn(text: &str) -> Result<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidInsn(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insn() {
        assert_eq!(parse_insn("0x00005af1").unwrap(), 0x5af1);
        assert_eq!(parse_insn("5AF4").unwrap(), 0x5af4);
        assert_eq!(parse_insn("0X7c0002a6").unwrap(), 0x7c00_02a6);
        assert!(matches!(parse_insn("0xzz"), Err(Error::InvalidInsn(_))));
        assert!(parse_insn("0x1_0000_0000").is_err());
    }
}
