//! RFC 4648 base32 encoding (standard alphabet, `=` padded).

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const PAD: u8 = b'=';
const BITS_PER_CHAR: usize = 5;
/// Output is padded to a multiple of this many characters (40 bits).
const BLOCK_CHARS: usize = 8;

/// Returns the padded encoded length of `input_len` bytes.
pub const fn encoded_len(input_len: usize) -> usize {
    input_len.div_ceil(5) * BLOCK_CHARS
}

/// Encodes `input` with the RFC 4648 standard alphabet, appending to `out`.
///
/// Bits are consumed most significant first. A trailing partial group is
/// zero-filled on the right and the output is padded with `=` to a multiple
/// of eight characters, matching the canonical "StdEncoding".
pub fn encode_into(input: &[u8], out: &mut String) {
    out.reserve(encoded_len(input.len()));
    let start = out.len();
    let mut acc = 0_u16;
    let mut bits = 0;
    let mask = 0x1F;

    for &b in input {
        acc = (acc << 8) | u16::from(b);
        bits += 8;
        while bits >= BITS_PER_CHAR {
            bits -= BITS_PER_CHAR;
            out.push(ALPHABET[usize::from((acc >> bits) & mask)] as char);
        }
        // Only the low `bits` bits are still pending.
        acc &= (1 << bits) - 1;
    }

    if bits > 0 {
        out.push(ALPHABET[usize::from((acc << (BITS_PER_CHAR - bits)) & mask)] as char);
    }

    while (out.len() - start) % BLOCK_CHARS != 0 {
        out.push(PAD as char);
    }
}

/// Encodes `input` into a new padded base32 string.
#[cfg(test)]
pub fn encode(input: &[u8]) -> String {
    let mut out = String::new();
    encode_into(input, &mut out);
    out
}
