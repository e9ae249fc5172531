use crate::common::opcode::TERM;

/// Splits a number into a vector of bytes.
/// Numeric operands (sizes, counts, jump offsets) are written as
/// decimal ASCII followed by the terminator byte:
/// ```plain
/// -123 => [b'-', b'1', b'2', b'3', 0x18]
/// ```
/// These sequences are designed to be insertable into byte streams,
/// as no digit or sign collides with the terminator.
pub fn split_number(n: i64) -> Vec<u8> {
    let mut bytes = n.to_string().into_bytes();
    bytes.push(TERM);
    bytes
}

/// The number of bytes `split_number` produces for `n`.
pub fn width(n: i64) -> usize {
    // sign, digits, terminator
    let mut digits = 1;
    let mut i = n.unsigned_abs();
    while i >= 10 {
        i /= 10;
        digits += 1;
    }
    digits + 1 + usize::from(n < 0)
}

/// This takes a stream of bytes, and builds the next number in it.
/// Returns the number and how many bytes were eaten, terminator included.
/// Unlike the operand strings, a number must be well formed:
/// `None` if the stream ends before a terminator or holds a non-digit.
pub fn build_number(bytes: &[u8]) -> Option<(i64, usize)> {
    let end = bytes.iter().position(|b| *b == TERM)?;
    let text = std::str::from_utf8(&bytes[..end]).ok()?;
    let number = text.parse::<i64>().ok()?;
    Some((number, end + 1))
}
